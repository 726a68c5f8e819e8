use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::events::{BindCollection, DelegateWrapper};
use crate::tree::NodeId;
use crate::types::NodeTypeId;
use crate::value::Value;

/// Cached result of one link.
#[derive(Debug, Default)]
pub(crate) struct LinkCache {
    pub(crate) value: Option<Value>,
    /// Invalidation bindings on the nodes the value was resolved through.
    pub(crate) bindings: BindCollection,
}

impl LinkCache {
    pub(crate) fn reset(&mut self) {
        self.value = None;
        self.bindings.unbind_all();
    }
}

#[derive(Debug)]
pub(crate) struct NodeData {
    pub(crate) ty: NodeTypeId,
    pub(crate) properties: Vec<Value>,
    pub(crate) links: Vec<LinkCache>,
    pub(crate) parent: Option<NodeId>,
    /// Nearest ancestor-or-self of a root type.
    pub(crate) root: Option<NodeId>,
    pub(crate) data_key: String,
    pub(crate) collection_key: String,
    pub(crate) children: BTreeSet<NodeId>,
    pub(crate) dirty: bool,
    pub(crate) cached_hash: Option<String>,
    pub(crate) cached_imprint: Option<Vec<u8>>,
    pub(crate) bindings: BTreeMap<String, Vec<Rc<DelegateWrapper>>>,
    pub(crate) broadcast_depth: u32,
    pub(crate) changed_pending: bool,
    /// Link invalidation bindings on the node itself.
    pub(crate) owner_bindings: BindCollection,
}

impl NodeData {
    pub(crate) fn new(ty: NodeTypeId, properties: Vec<Value>, links: usize) -> Self {
        Self {
            ty,
            properties,
            links: (0..links).map(|_| LinkCache::default()).collect(),
            parent: None,
            root: None,
            data_key: String::new(),
            collection_key: String::new(),
            children: BTreeSet::new(),
            dirty: false,
            cached_hash: None,
            cached_imprint: None,
            bindings: BTreeMap::new(),
            broadcast_depth: 0,
            changed_pending: false,
            owner_bindings: BindCollection::new(),
        }
    }

    /// Drops wrappers unbound since the last prune.
    pub(crate) fn prune_bindings(&mut self) {
        self.bindings.retain(|_, wrappers| {
            wrappers.retain(|wrapper| !wrapper.is_unbound());
            !wrappers.is_empty()
        });
    }

    /// Addressing segment used by paths from the root.
    pub(crate) fn path_segment(&self) -> String {
        if self.collection_key.is_empty() {
            self.data_key.clone()
        } else {
            format!("{}.{}", self.collection_key, self.data_key)
        }
    }
}
