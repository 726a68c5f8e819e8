use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use tracing::trace;

use crate::config::DispatchPolicy;
use crate::error::DataError;
use crate::events::{BindFlags, BindHandle, DelegateWrapper, Event, CHANGED};
use crate::schema::{Field, FieldHandle};
use crate::tree::{DataTree, NodeId};

#[derive(Debug)]
struct Queued {
    node: NodeId,
    event: Event,
    previous: Option<NodeId>,
    previous_key: Option<String>,
}

/// Scope and queue state shared by all nodes of a tree.
#[derive(Debug, Default)]
pub(crate) struct Dispatch {
    depth: usize,
    queue: VecDeque<Queued>,
    pending_changed: Vec<NodeId>,
    released: Vec<NodeId>,
    next_bind_id: u64,
}

impl Dispatch {
    pub(crate) fn in_scope(&self) -> bool {
        self.depth > 0
    }

    pub(crate) fn defer_release(&mut self, ids: impl IntoIterator<Item = NodeId>) {
        self.released.extend(ids);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Outside any scope: every listener.
    All,
    /// Raised inside a scope: non-deferred listeners only.
    Raise,
    /// Flushed at scope exit: the listeners skipped at raise time.
    Flush,
}

fn wrapper_matches(wrapper: &DelegateWrapper, event: &Event, previous_key: Option<&str>) -> bool {
    let Some(field) = &wrapper.field else { return true };
    match previous_key {
        None => event.ty == field.changed_event(),
        Some(key) => field.context().is_container() && key == field.name(),
    }
}

impl DataTree {
    /// Binds `callback` to events of type `ty` delivered to `node`.
    ///
    /// With a `field`, the callback only receives the field's own change
    /// event at `node`, and events bubbling up from children stored in the
    /// field when it is a container.
    pub fn bind<F>(
        &mut self,
        node: NodeId,
        ty: &str,
        field: Option<&Arc<Field>>,
        flags: BindFlags,
        callback: F,
    ) -> Result<BindHandle, DataError>
    where
        F: FnMut(&mut DataTree, &mut Event) + 'static,
    {
        let id = self.dispatch.next_bind_id;
        self.dispatch.next_bind_id += 1;
        let wrapper = Rc::new(DelegateWrapper::new(id, field.cloned(), flags, Box::new(callback)));
        let handle = BindHandle::new(&wrapper);
        let data = self.node_mut(node)?;
        if data.broadcast_depth == 0 {
            data.prune_bindings();
        }
        data.bindings.entry(ty.to_string()).or_default().push(wrapper);
        Ok(handle)
    }

    /// Binds to `{field}Changed` of `node`.
    pub fn on_change<T, F>(
        &mut self,
        node: NodeId,
        handle: &FieldHandle<T>,
        flags: BindFlags,
        callback: F,
    ) -> Result<BindHandle, DataError>
    where
        F: FnMut(&mut DataTree, &mut Event) + 'static,
    {
        let field = self.handle_field(node, handle)?;
        let ty = field.changed_event().to_string();
        self.bind(node, &ty, Some(&field), flags, callback)
    }

    /// Binds to events of type `ty` bubbling up from the children held in a
    /// container field of `node`.
    pub fn on_children<T, F>(
        &mut self,
        node: NodeId,
        ty: &str,
        handle: &FieldHandle<T>,
        flags: BindFlags,
        callback: F,
    ) -> Result<BindHandle, DataError>
    where
        F: FnMut(&mut DataTree, &mut Event) + 'static,
    {
        let field = self.handle_field(node, handle)?;
        self.bind(node, ty, Some(&field), flags, callback)
    }

    /// Whether `node`, or with `bubbles` any of its ancestors, has a live
    /// binding for `ty`.
    pub fn is_bound(&self, node: NodeId, ty: &str, bubbles: bool) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            let Ok(data) = self.node(id) else { return false };
            let bound = data
                .bindings
                .get(ty)
                .is_some_and(|wrappers| wrappers.iter().any(|wrapper| !wrapper.is_unbound()));
            if bound {
                return true;
            }
            current = if bubbles { data.parent } else { None };
        }
        false
    }

    /// Unbinds every listener of `ty` on `node`.
    pub fn unbind_all(&mut self, node: NodeId, ty: &str) -> Result<(), DataError> {
        let data = self.node_mut(node)?;
        if let Some(wrappers) = data.bindings.get(ty) {
            for wrapper in wrappers {
                wrapper.unbind();
            }
        }
        if data.broadcast_depth == 0 {
            data.prune_bindings();
        }
        Ok(())
    }

    /// Delivers `event` on `node` and, when it bubbles, on its ancestors.
    pub fn broadcast(&mut self, node: NodeId, event: Event) {
        self.broadcast_from(node, event, None);
    }

    /// Like [`DataTree::broadcast`], as if the event arrived from `previous`.
    pub(crate) fn broadcast_from(&mut self, node: NodeId, event: Event, previous: Option<NodeId>) {
        let previous_key = self.collection_key_of(previous);
        if self.dispatch.depth > 0 {
            self.deliver(node, event.clone(), previous, previous_key.clone(), Phase::Raise);
            self.dispatch.queue.push_back(Queued {
                node,
                event,
                previous,
                previous_key,
            });
        } else {
            self.deliver(node, event, previous, previous_key, Phase::All);
        }
    }

    fn collection_key_of(&self, id: Option<NodeId>) -> Option<String> {
        id.and_then(|id| self.node(id).ok()).map(|data| data.collection_key.clone())
    }

    /// Delivers along the bubbling chain. `previous_key` is the collection
    /// key `previous` had when the event was raised.
    fn deliver(
        &mut self,
        node: NodeId,
        mut event: Event,
        mut previous: Option<NodeId>,
        mut previous_key: Option<String>,
        phase: Phase,
    ) {
        let mut current = node;
        loop {
            event.current = current;
            event.previous = previous;
            let wrappers: Vec<Rc<DelegateWrapper>> = match self.node_mut(current) {
                Ok(data) => {
                    data.broadcast_depth += 1;
                    data.bindings.get(&event.ty).cloned().unwrap_or_default()
                }
                Err(_) => return,
            };

            for wrapper in wrappers {
                if wrapper.is_unbound() {
                    continue;
                }
                let non_deferred = wrapper.flags.contains(BindFlags::NON_DEFERRED);
                let wanted = match phase {
                    Phase::All => true,
                    Phase::Raise => non_deferred,
                    Phase::Flush => !non_deferred,
                };
                if !wanted {
                    continue;
                }
                if event.requires_ignore_meta
                    && !wrapper.flags.contains(BindFlags::IGNORE_FIELD_META)
                {
                    continue;
                }
                if !wrapper_matches(&wrapper, &event, previous_key.as_deref()) {
                    continue;
                }
                trace!(ty = %event.ty, node = ?current, bind = wrapper.id, "delivering event");
                wrapper.invoke(self, &mut event);
                if event.stopped_immediate {
                    break;
                }
            }

            let parent = match self.node_mut(current) {
                Ok(data) => {
                    data.broadcast_depth = data.broadcast_depth.saturating_sub(1);
                    if data.broadcast_depth == 0 {
                        data.prune_bindings();
                    }
                    data.parent
                }
                Err(_) => return,
            };
            if !event.bubbles || event.stopped {
                return;
            }
            match parent {
                Some(parent) => {
                    previous = Some(current);
                    previous_key = self.collection_key_of(previous);
                    current = parent;
                }
                None => return,
            }
        }
    }

    pub(crate) fn enter_scope(&mut self) {
        self.dispatch.depth += 1;
    }

    /// Leaves a scope. Leaving the outermost one flushes queued deliveries
    /// in raise order, then, with [`DispatchPolicy::Immediate`], the pending
    /// `Changed` events. Mutations made by listeners meanwhile are queued
    /// behind them. Nodes released inside the scope are destroyed last.
    pub(crate) fn exit_scope(&mut self) {
        self.dispatch.depth = self.dispatch.depth.saturating_sub(1);
        if self.dispatch.depth > 0 {
            return;
        }
        self.dispatch.depth = 1;
        loop {
            if let Some(queued) = self.dispatch.queue.pop_front() {
                self.deliver(
                    queued.node,
                    queued.event,
                    queued.previous,
                    queued.previous_key,
                    Phase::Flush,
                );
                continue;
            }
            if self.config().dispatch == DispatchPolicy::Immediate
                && !self.dispatch.pending_changed.is_empty()
            {
                self.raise_pending_changed();
                continue;
            }
            break;
        }
        self.dispatch.depth = 0;
        let released = std::mem::take(&mut self.dispatch.released);
        self.release(released);
    }

    fn raise_pending_changed(&mut self) {
        let pending = std::mem::take(&mut self.dispatch.pending_changed);
        for id in pending {
            match self.node_mut(id) {
                Ok(data) => data.changed_pending = false,
                Err(_) => continue,
            }
            self.broadcast_from(id, Event::new(CHANGED, id), None);
        }
    }

    /// Queues the generic `Changed` event of `node` once per batch.
    pub(crate) fn schedule_changed(&mut self, node: NodeId) {
        if let Ok(data) = self.node_mut(node) {
            if !data.changed_pending {
                data.changed_pending = true;
                self.dispatch.pending_changed.push(node);
            }
        }
    }

    /// Runs `f` as one mutation batch: deferred listeners see the events it
    /// raised, in order, after it returns.
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut DataTree) -> R) -> R {
        self.enter_scope();
        let result = f(self);
        self.exit_scope();
        result
    }

    /// Delivers `Changed` events parked by [`DispatchPolicy::Enqueue`].
    pub fn flush_deferred(&mut self) {
        self.enter_scope();
        self.raise_pending_changed();
        self.exit_scope();
    }

    /// Number of nodes with a parked `Changed` event.
    pub fn pending_changed(&self) -> usize {
        self.dispatch.pending_changed.len()
    }
}
