//! Per-node event bindings.
//!
//! Every node keeps a map from event type to an ordered list of delegate
//! wrappers. Callbacks receive the tree mutably, so they may bind, unbind
//! and mutate while a broadcast is in progress: the wrapper list is
//! snapshotted before delivery and unbound wrappers are pruned when the
//! outermost broadcast on that node completes.

pub(crate) mod dispatch;

use std::cell::{Cell, RefCell};
use std::ops::BitOr;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::schema::Field;
use crate::tree::{DataTree, NodeId};

pub const ADDED: &str = "Added";
pub const ADDED_TO_PARENT: &str = "AddedToParent";
pub const ADDED_TO_ROOT: &str = "AddedToRoot";
pub const REMOVED: &str = "Removed";
pub const REMOVED_FROM_PARENT: &str = "RemovedFromParent";
pub const REMOVED_FROM_ROOT: &str = "RemovedFromRoot";
/// Generic per-node change, raised once per mutation batch.
pub const CHANGED: &str = "Changed";
pub const NAME_CHANGED: &str = "NameChanged";

/// Event being delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub ty: String,
    pub bubbles: bool,
    /// Node the event was raised on.
    pub target: NodeId,
    /// Node currently delivering the event.
    pub current: NodeId,
    /// Child the event arrived from while bubbling.
    pub previous: Option<NodeId>,
    pub(crate) stopped: bool,
    pub(crate) stopped_immediate: bool,
    /// Field change of a field without event meta.
    pub(crate) requires_ignore_meta: bool,
}

impl Event {
    pub fn new(ty: impl Into<String>, target: NodeId) -> Self {
        Self {
            ty: ty.into(),
            bubbles: false,
            target,
            current: target,
            previous: None,
            stopped: false,
            stopped_immediate: false,
            requires_ignore_meta: false,
        }
    }

    pub fn bubbling(mut self) -> Self {
        self.bubbles = true;
        self
    }

    /// Stops bubbling after the current node.
    pub fn stop_propagation(&mut self) {
        self.stopped = true;
    }

    /// Stops delivery to the remaining listeners and bubbling.
    pub fn stop_immediate_propagation(&mut self) {
        self.stopped = true;
        self.stopped_immediate = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

/// Bind options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindFlags(u8);

impl BindFlags {
    pub const NONE: BindFlags = BindFlags(0);
    /// Receive `{field}Changed` even when the field has no event meta.
    pub const IGNORE_FIELD_META: BindFlags = BindFlags(1);
    /// Deliver at raise time, also inside a batch.
    pub const NON_DEFERRED: BindFlags = BindFlags(2);

    pub fn contains(self, other: BindFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for BindFlags {
    type Output = BindFlags;

    fn bitor(self, rhs: BindFlags) -> BindFlags {
        BindFlags(self.0 | rhs.0)
    }
}

/// Event callback.
pub type Delegate = Box<dyn FnMut(&mut DataTree, &mut Event)>;

pub(crate) struct DelegateWrapper {
    pub(crate) id: u64,
    pub(crate) field: Option<Arc<Field>>,
    pub(crate) flags: BindFlags,
    callback: RefCell<Option<Delegate>>,
    unbound: Cell<bool>,
}

impl DelegateWrapper {
    pub(crate) fn new(
        id: u64,
        field: Option<Arc<Field>>,
        flags: BindFlags,
        callback: Delegate,
    ) -> Self {
        Self {
            id,
            field,
            flags,
            callback: RefCell::new(Some(callback)),
            unbound: Cell::new(false),
        }
    }

    pub(crate) fn is_unbound(&self) -> bool {
        self.unbound.get()
    }

    pub(crate) fn unbind(&self) {
        self.unbound.set(true);
        // Absent while the callback runs; it is dropped when it returns.
        let callback = self.callback.borrow_mut().take();
        drop(callback);
    }

    /// Runs the callback unless it is unbound or already running further up
    /// the stack.
    pub(crate) fn invoke(&self, tree: &mut DataTree, event: &mut Event) {
        if self.is_unbound() {
            return;
        }
        let callback = self.callback.borrow_mut().take();
        if let Some(mut callback) = callback {
            callback(tree, event);
            if !self.is_unbound() {
                *self.callback.borrow_mut() = Some(callback);
            }
        }
    }
}

impl std::fmt::Debug for DelegateWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegateWrapper")
            .field("id", &self.id)
            .field("field", &self.field.as_ref().map(|field| field.name()))
            .field("flags", &self.flags)
            .field("unbound", &self.unbound.get())
            .finish()
    }
}

/// Handle returned by a bind. Unbinding does not need the tree.
#[derive(Debug, Clone, Default)]
pub struct BindHandle {
    wrapper: Weak<DelegateWrapper>,
}

impl BindHandle {
    pub(crate) fn new(wrapper: &Rc<DelegateWrapper>) -> Self {
        Self {
            wrapper: Rc::downgrade(wrapper),
        }
    }

    pub fn unbind(&self) {
        if let Some(wrapper) = self.wrapper.upgrade() {
            wrapper.unbind();
        }
    }

    pub fn is_bound(&self) -> bool {
        self.wrapper.upgrade().is_some_and(|wrapper| !wrapper.is_unbound())
    }
}

/// Handles unbound together, at the latest when the collection is dropped.
#[derive(Debug, Default)]
pub struct BindCollection {
    handles: Vec<BindHandle>,
}

impl BindCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: BindHandle) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn unbind_all(&mut self) {
        for handle in self.handles.drain(..) {
            handle.unbind();
        }
    }
}

impl Extend<BindHandle> for BindCollection {
    fn extend<I: IntoIterator<Item = BindHandle>>(&mut self, iter: I) {
        self.handles.extend(iter);
    }
}

impl Drop for BindCollection {
    fn drop(&mut self) {
        self.unbind_all();
    }
}
