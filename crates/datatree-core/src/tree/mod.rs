//! Node arena.
//!
//! A [`DataTree`] owns every node by index. Parent and root back-references
//! are [`NodeId`]s into the same arena; a node reachable from a
//! node-reference property is always a child of exactly that property's
//! owner.

mod link;
mod node;
mod property;

pub use property::PropertyMut;

pub(crate) use node::NodeData;

use std::sync::Arc;

use tracing::error;

use crate::config::TreeConfig;
use crate::error::DataError;
use crate::events::{BindFlags, Event, REMOVED_FROM_ROOT};
use crate::events::dispatch::Dispatch;
use crate::schema::{Field, FieldHandle, NodeTypeDef, Schema};
use crate::types::{NodeTypeId, NodeTypeRef, TypeHierarchy};
use crate::value::Value;

/// Generational index of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<NodeData>,
}

/// Owner of a set of nodes built from one [`Schema`].
#[derive(Debug)]
pub struct DataTree {
    schema: Arc<Schema>,
    config: TreeConfig,
    slots: Vec<Slot>,
    free: Vec<u32>,
    pub(crate) dispatch: Dispatch,
}

impl DataTree {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::with_config(schema, TreeConfig::default())
    }

    pub fn with_config(schema: Arc<Schema>, config: TreeConfig) -> Self {
        Self {
            schema,
            config,
            slots: Vec::new(),
            free: Vec::new(),
            dispatch: Dispatch::default(),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<&NodeData, DataError> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(DataError::UnknownNode(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeData, DataError> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(DataError::UnknownNode(id))
    }

    /// Returns `Err` in strict mode, otherwise logs the violation so the
    /// caller can skip the offending operation.
    pub(crate) fn violation(&self, err: DataError) -> Result<(), DataError> {
        if self.config.strict {
            Err(err)
        } else {
            error!(%err, "integrity violation ignored");
            Ok(())
        }
    }

    pub fn type_of(&self, id: NodeId) -> Result<&NodeTypeDef, DataError> {
        let ty = self.node(id)?.ty;
        self.schema.get(ty).ok_or(DataError::UnknownType(ty))
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, DataError> {
        Ok(self.node(id)?.parent)
    }

    /// Nearest ancestor-or-self of a root type.
    pub fn root(&self, id: NodeId) -> Result<Option<NodeId>, DataError> {
        Ok(self.node(id)?.root)
    }

    pub fn children(&self, id: NodeId) -> Result<Vec<NodeId>, DataError> {
        Ok(self.node(id)?.children.iter().copied().collect())
    }

    /// Key under which the owning property stores the node: the field name
    /// for single references, the index or map key inside containers.
    pub fn data_key(&self, id: NodeId) -> Result<&str, DataError> {
        Ok(&self.node(id)?.data_key)
    }

    /// Name of the owning container field, empty for single references.
    pub fn collection_key(&self, id: NodeId) -> Result<&str, DataError> {
        Ok(&self.node(id)?.collection_key)
    }

    pub fn is_dirty(&self, id: NodeId) -> Result<bool, DataError> {
        Ok(self.node(id)?.dirty)
    }

    pub fn clear_dirty(&mut self, id: NodeId) -> Result<(), DataError> {
        self.node_mut(id)?.dirty = false;
        Ok(())
    }

    /// `true` when `ancestor` is a strict ancestor of `id`.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = self.node(id).ok().and_then(|node| node.parent);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.node(parent).ok().and_then(|node| node.parent);
        }
        false
    }

    /// Topmost ancestor-or-self.
    pub fn top(&self, id: NodeId) -> Result<NodeId, DataError> {
        let mut current = id;
        while let Some(parent) = self.node(current)?.parent {
            current = parent;
        }
        Ok(current)
    }

    /// Dot-path from the topmost ancestor to `id`.
    ///
    /// Children of containers contribute `collection_key.data_key`, children
    /// of single references their `data_key`.
    pub fn path_from_root(&self, id: NodeId) -> Result<String, DataError> {
        let mut segments = Vec::new();
        let mut current = id;
        loop {
            let node = self.node(current)?;
            let Some(parent) = node.parent else { break };
            segments.push(node.path_segment());
            current = parent;
        }
        segments.reverse();
        segments.retain(|segment| !segment.is_empty());
        Ok(segments.join("."))
    }

    pub(crate) fn field_of(&self, id: NodeId, index: usize) -> Result<Arc<Field>, DataError> {
        let ty = self.node(id)?.ty;
        self.schema
            .get(ty)
            .and_then(|def| def.field(index))
            .cloned()
            .ok_or_else(|| DataError::UnknownField {
                node: id,
                field: format!("#{index}"),
            })
    }

    pub(crate) fn field_by_name(&self, id: NodeId, name: &str) -> Result<Arc<Field>, DataError> {
        let ty = self.node(id)?.ty;
        self.schema
            .get(ty)
            .and_then(|def| def.field_by_name(name))
            .cloned()
            .ok_or_else(|| DataError::UnknownField {
                node: id,
                field: name.to_string(),
            })
    }

    /// Resolves a typed handle against a node, which must be of the
    /// handle's type or a subtype of it.
    pub(crate) fn handle_field<T>(
        &self,
        id: NodeId,
        handle: &FieldHandle<T>,
    ) -> Result<Arc<Field>, DataError> {
        self.check_owner(id, handle.owner)?;
        self.field_of(id, handle.index)
    }

    pub(crate) fn check_owner(&self, id: NodeId, owner: NodeTypeId) -> Result<(), DataError> {
        let ty = self.node(id)?.ty;
        if self.schema.is_subtype(ty, owner) {
            Ok(())
        } else {
            Err(DataError::ForeignHandle {
                owner: self.schema.type_name(owner).to_string(),
                actual: self.schema.type_name(ty).to_string(),
            })
        }
    }

    pub fn create(&mut self, ty: &NodeTypeRef) -> Result<NodeId, DataError> {
        self.create_of(ty.id)
    }

    /// Allocates a detached node with default properties. Strict node
    /// references are filled with fresh children.
    pub fn create_of(&mut self, ty: NodeTypeId) -> Result<NodeId, DataError> {
        let schema = self.schema.clone();
        let def = schema.get(ty).ok_or(DataError::UnknownType(ty))?;
        let properties = def
            .fields()
            .iter()
            .map(|field| Value::default_for(field.context()))
            .collect();
        let id = self.alloc(NodeData::new(ty, properties, def.links().len()));
        if def.is_root() {
            self.node_mut(id)?.root = Some(id);
        }

        self.enter_scope();
        let result = self.init_node(id, def);
        self.exit_scope();
        if let Err(err) = result {
            self.destroy(id).ok();
            return Err(err);
        }
        Ok(id)
    }

    fn init_node(&mut self, id: NodeId, def: &NodeTypeDef) -> Result<(), DataError> {
        for field in def.fields().iter().filter(|field| field.is_owned_strict()) {
            let Some(target) = field.context().node_type() else { continue };
            let child = self.create_of(target)?;
            self.node_mut(id)?.properties[field.index()] = Value::Node(Some(child));
            self.set_name(child, field.name(), "")?;
            self.add_child(id, child)?;
        }
        if !def.links().is_empty() {
            self.bind_link_owner(id, def)?;
        }
        Ok(())
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(data);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(data),
            });
            NodeId { index, generation: 0 }
        }
    }

    /// Frees a detached node and its whole subtree.
    pub fn destroy(&mut self, id: NodeId) -> Result<(), DataError> {
        if self.node(id)?.parent.is_some() {
            return Err(DataError::StillAttached(id));
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(slot) = self.slots.get_mut(current.index as usize) else { continue };
            if slot.generation != current.generation {
                continue;
            }
            if let Some(node) = slot.node.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(current.index);
                stack.extend(node.children.iter().copied());
            }
        }
        Ok(())
    }

    /// Destroys those of `ids` that are alive and detached. Inside a scope
    /// this waits until the outermost scope has flushed its deliveries.
    pub(crate) fn release(&mut self, ids: impl IntoIterator<Item = NodeId>) {
        if self.dispatch.in_scope() {
            self.dispatch.defer_release(ids);
            return;
        }
        for id in ids {
            if matches!(self.node(id), Ok(node) if node.parent.is_none()) {
                self.destroy(id).ok();
            }
        }
    }

    /// Recomputes roots below `id` after it was attached under a node whose
    /// root is `root`, or detached (`None`). Returns the nodes whose root
    /// changed.
    pub(crate) fn update_subtree_root(
        &mut self,
        id: NodeId,
        root: Option<NodeId>,
    ) -> Result<Vec<NodeId>, DataError> {
        let mut changed = Vec::new();
        let mut stack = vec![(id, root)];
        while let Some((current, inherited)) = stack.pop() {
            let ty = self.node(current)?.ty;
            let is_root = self.schema.get(ty).is_some_and(NodeTypeDef::is_root);
            let root = if is_root { Some(current) } else { inherited };
            let node = self.node_mut(current)?;
            if node.root != root {
                node.root = root;
                changed.push(current);
            }
            stack.extend(node.children.iter().rev().map(|&child| (child, root)));
        }
        Ok(changed)
    }

    /// Drops hash and imprint caches of `id` and its ancestors.
    pub(crate) fn invalidate_caches(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let Ok(node) = self.node_mut(node_id) else { break };
            node.cached_hash = None;
            node.cached_imprint = None;
            current = node.parent;
        }
    }

    fn bind_link_owner(&mut self, id: NodeId, def: &NodeTypeDef) -> Result<(), DataError> {
        let flags = BindFlags::NON_DEFERRED | BindFlags::IGNORE_FIELD_META;
        let mut handles = Vec::new();
        for link in def.links() {
            let index = link.index();
            let watched = std::iter::once(link.key_field()).chain(link.path_field());
            for field_index in watched {
                let Some(field) = def.field(field_index).cloned() else { continue };
                let handle = self.bind(
                    id,
                    field.changed_event(),
                    Some(&field),
                    flags,
                    move |tree: &mut DataTree, _: &mut Event| tree.reset_link(id, index),
                )?;
                handles.push(handle);
            }
        }
        let handle = self.bind(
            id,
            REMOVED_FROM_ROOT,
            None,
            flags,
            move |tree: &mut DataTree, _: &mut Event| tree.reset_links(id),
        )?;
        handles.push(handle);
        self.node_mut(id)?.owner_bindings.extend(handles);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldMeta, Registry};

    fn schema() -> (Arc<Schema>, NodeTypeRef, NodeTypeRef, FieldHandle<Option<NodeId>>) {
        let mut registry = Registry::new();
        let stats = registry.declare_type("Stats").unwrap();
        registry.field::<i32>(&stats, "speed", FieldMeta::new()).unwrap();
        registry.finalize_type(&stats).unwrap();
        let world = registry.declare_root_type("World").unwrap();
        let stats_field = registry
            .node(&world, "stats", &stats, FieldMeta::new().strict())
            .unwrap();
        registry.finalize_type(&world).unwrap();
        (registry.compile().unwrap(), world, stats, stats_field)
    }

    #[test]
    fn strict_children_are_allocated() {
        let (schema, world, stats, stats_field) = schema();
        let mut tree = DataTree::new(schema);
        let w = tree.create(&world).unwrap();
        let child = tree.get(w, &stats_field).unwrap().unwrap();
        assert_eq!(tree.parent(child).unwrap(), Some(w));
        assert_eq!(tree.root(child).unwrap(), Some(w));
        assert_eq!(tree.type_of(child).unwrap().id(), stats.id);
        assert_eq!(tree.data_key(child).unwrap(), "stats");
        assert_eq!(tree.path_from_root(child).unwrap(), "stats");
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn destroy_requires_detached_and_frees_subtree() {
        let (schema, world, _, stats_field) = schema();
        let mut tree = DataTree::new(schema);
        let w = tree.create(&world).unwrap();
        let child = tree.get(w, &stats_field).unwrap().unwrap();
        assert_eq!(tree.destroy(child), Err(DataError::StillAttached(child)));
        tree.destroy(w).unwrap();
        assert!(!tree.contains(w));
        assert!(!tree.contains(child));
        assert!(tree.is_empty());
    }

    #[test]
    fn stale_ids_do_not_alias_reused_slots() {
        let (schema, _, stats, _) = schema();
        let mut tree = DataTree::new(schema);
        let a = tree.create(&stats).unwrap();
        tree.destroy(a).unwrap();
        let b = tree.create(&stats).unwrap();
        assert_ne!(a, b);
        assert!(!tree.contains(a));
        assert_eq!(tree.parent(a), Err(DataError::UnknownNode(a)));
    }
}
