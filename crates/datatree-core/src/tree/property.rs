use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::error;

use crate::error::DataError;
use crate::events::{
    Event, ADDED, ADDED_TO_PARENT, ADDED_TO_ROOT, NAME_CHANGED, REMOVED, REMOVED_FROM_PARENT,
    REMOVED_FROM_ROOT,
};
use crate::schema::{Field, FieldHandle};
use crate::tree::{DataTree, NodeId};
use crate::types::{TypeContext, TypeHierarchy};
use crate::value::{DataValue, Value};

fn mismatch(field: &Field) -> DataError {
    DataError::TypeMismatch {
        field: field.name().to_string(),
        expected: field.context().to_string(),
    }
}

fn out_of_range(field: &Field, key: impl ToString) -> DataError {
    DataError::Path {
        path: datatree_path::join(field.name(), &key.to_string()),
        reason: "no such element".to_string(),
    }
}

impl DataTree {
    pub fn get<T: DataValue>(&self, node: NodeId, handle: &FieldHandle<T>) -> Result<T, DataError> {
        let field = self.handle_field(node, handle)?;
        let value = &self.node(node)?.properties[field.index()];
        T::from_value(value).ok_or_else(|| mismatch(&field))
    }

    pub fn value(&self, node: NodeId, index: usize) -> Result<&Value, DataError> {
        let field = self.field_of(node, index)?;
        Ok(&self.node(node)?.properties[field.index()])
    }

    pub fn value_by_name(&self, node: NodeId, name: &str) -> Result<&Value, DataError> {
        let field = self.field_by_name(node, name)?;
        Ok(&self.node(node)?.properties[field.index()])
    }

    /// Stores `value`. Setting an equal value is a no-op.
    ///
    /// Node references move ownership: the previous children are detached
    /// first, then the new ones are attached. Detached children stay alive
    /// until [`DataTree::destroy`] or until they are attached elsewhere.
    pub fn set<T: DataValue>(
        &mut self,
        node: NodeId,
        handle: &FieldHandle<T>,
        value: T,
    ) -> Result<(), DataError> {
        let field = self.handle_field(node, handle)?;
        if field.meta().is_read_only() {
            return Err(DataError::ReadOnly(field.name().to_string()));
        }
        self.assign(node, field.index(), value.into_value()).map(|_| ())
    }

    pub fn set_value(&mut self, node: NodeId, name: &str, value: Value) -> Result<(), DataError> {
        let field = self.field_by_name(node, name)?;
        if field.meta().is_read_only() {
            return Err(DataError::ReadOnly(field.name().to_string()));
        }
        self.assign(node, field.index(), value).map(|_| ())
    }

    /// Mutable view of a property, stored back when the guard is dropped or
    /// committed.
    pub fn get_mut<T: DataValue>(
        &mut self,
        node: NodeId,
        handle: &FieldHandle<T>,
    ) -> Result<PropertyMut<'_, T>, DataError> {
        let field = self.handle_field(node, handle)?;
        if field.meta().is_read_only() {
            return Err(DataError::ReadOnly(field.name().to_string()));
        }
        let value = self.get(node, handle)?;
        Ok(PropertyMut {
            tree: self,
            node,
            index: field.index(),
            value,
            done: false,
        })
    }

    /// Stores a value without the read-only check. Returns whether the
    /// property changed.
    pub(crate) fn assign(
        &mut self,
        node: NodeId,
        index: usize,
        value: Value,
    ) -> Result<bool, DataError> {
        let field = self.field_of(node, index)?;
        let value = value.coerce(field.context());
        if !value.conforms(field.context()) {
            return Err(mismatch(&field));
        }
        if self.node(node)?.properties[index].same(&value) {
            return Ok(false);
        }
        self.enter_scope();
        let result = self.assign_in_scope(node, &field, value);
        self.exit_scope();
        result
    }

    fn assign_in_scope(
        &mut self,
        node: NodeId,
        field: &Arc<Field>,
        value: Value,
    ) -> Result<bool, DataError> {
        if let Value::Mapping(items) = &value {
            if let Some(key) = items.keys().find(|key| !datatree_path::is_valid_key(key)) {
                self.violation(DataError::IllegalKey {
                    field: field.name().to_string(),
                    key: key.clone(),
                })?;
                return Ok(false);
            }
        }
        if field.context().is_node_reference() {
            if !self.transfer(node, field, value)? {
                return Ok(false);
            }
        } else {
            self.node_mut(node)?.properties[field.index()] = value;
        }
        self.changed(node, field)?;
        Ok(true)
    }

    /// Moves ownership for a node-reference property.
    fn transfer(
        &mut self,
        node: NodeId,
        field: &Arc<Field>,
        value: Value,
    ) -> Result<bool, DataError> {
        if matches!(value, Value::Node(None)) && field.meta().is_strict() {
            self.violation(DataError::StrictNull(field.name().to_string()))?;
            return Ok(false);
        }
        let old_ids = self.node(node)?.properties[field.index()].node_ids();
        let new_ids = value.node_ids();
        let Some(expected) = field.context().node_type() else {
            return Err(mismatch(field));
        };

        let mut seen = BTreeSet::new();
        for &id in &new_ids {
            let child = self.node(id)?;
            if !self.schema().is_subtype(child.ty, expected) {
                return Err(mismatch(field));
            }
            if !seen.insert(id) {
                self.violation(DataError::AlreadyAttached(id))?;
                return Ok(false);
            }
            if old_ids.contains(&id) {
                continue;
            }
            if child.parent.is_some() {
                self.violation(DataError::AlreadyAttached(id))?;
                return Ok(false);
            }
            if id == node || self.is_ancestor(id, node) {
                self.violation(DataError::Cycle(id))?;
                return Ok(false);
            }
        }

        for &id in old_ids.iter().filter(|id| !seen.contains(*id)) {
            self.remove_child(node, id)?;
        }
        self.node_mut(node)?.properties[field.index()] = value.clone();

        let named: Vec<(NodeId, String, &str)> = match &value {
            Value::Node(Some(id)) => vec![(*id, field.name().to_string(), "")],
            Value::Sequence(items) => items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| match item {
                    Value::Node(Some(id)) => Some((*id, i.to_string(), field.name())),
                    _ => None,
                })
                .collect(),
            Value::Mapping(items) => items
                .iter()
                .filter_map(|(key, item)| match item {
                    Value::Node(Some(id)) => Some((*id, key.clone(), field.name())),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        for (id, data_key, collection_key) in named {
            self.set_name(id, &data_key, collection_key)?;
            if !old_ids.contains(&id) {
                self.add_child(node, id)?;
            }
        }
        Ok(true)
    }

    pub(crate) fn set_name(
        &mut self,
        id: NodeId,
        data_key: &str,
        collection_key: &str,
    ) -> Result<(), DataError> {
        let node = self.node_mut(id)?;
        if node.data_key == data_key && node.collection_key == collection_key {
            return Ok(());
        }
        node.data_key = data_key.to_string();
        node.collection_key = collection_key.to_string();
        self.broadcast(id, Event::new(NAME_CHANGED, id));
        Ok(())
    }

    pub(crate) fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DataError> {
        let data = self.node_mut(child)?;
        if data.parent.is_some() {
            return Err(DataError::AlreadyAttached(child));
        }
        data.parent = Some(parent);
        let parent_data = self.node_mut(parent)?;
        parent_data.children.insert(child);
        let root = parent_data.root;
        let gained = self.update_subtree_root(child, root)?;
        self.invalidate_caches(parent);

        self.broadcast(child, Event::new(ADDED_TO_PARENT, child));
        self.broadcast(child, Event::new(ADDED, child).bubbling());
        for id in gained {
            self.broadcast(id, Event::new(ADDED_TO_ROOT, id));
        }
        Ok(())
    }

    pub(crate) fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DataError> {
        let data = self.node_mut(child)?;
        if data.parent != Some(parent) {
            return Err(DataError::NotAttached(child));
        }
        data.parent = None;
        self.node_mut(parent)?.children.remove(&child);
        let lost = self.update_subtree_root(child, None)?;
        self.invalidate_caches(parent);

        self.broadcast(child, Event::new(REMOVED_FROM_PARENT, child));
        let removed = Event::new(REMOVED, child).bubbling();
        self.broadcast(child, removed.clone());
        self.broadcast_from(parent, removed, Some(child));
        for id in lost {
            self.broadcast(id, Event::new(REMOVED_FROM_ROOT, id));
        }
        Ok(())
    }

    /// Effects of a property change: dirty flag, cache invalidation, the
    /// field's change event and the node's generic `Changed`.
    fn changed(&mut self, node: NodeId, field: &Field) -> Result<(), DataError> {
        self.node_mut(node)?.dirty = true;
        self.invalidate_caches(node);
        let mut event = Event::new(field.changed_event(), node);
        event.bubbles = field.meta().is_bubbling();
        event.requires_ignore_meta = !field.meta().is_event();
        self.broadcast(node, event);
        self.schedule_changed(node);
        Ok(())
    }

    /// Resets every property to its default.
    pub fn reset(&mut self, node: NodeId) -> Result<(), DataError> {
        let count = self.type_of(node)?.fields().len();
        self.batch(|tree| (0..count).try_for_each(|index| tree.reset_property(node, index)))
    }

    pub fn reset_field<T>(
        &mut self,
        node: NodeId,
        handle: &FieldHandle<T>,
    ) -> Result<(), DataError> {
        let field = self.handle_field(node, handle)?;
        self.reset_property(node, field.index())
    }

    /// Resets one property. A strict node reference gets a fresh default
    /// child; children dropped by the reset are destroyed.
    pub(crate) fn reset_property(&mut self, node: NodeId, index: usize) -> Result<(), DataError> {
        let field = self.field_of(node, index)?;
        let old_ids = self.node(node)?.properties[index].node_ids();
        let value = match (field.is_owned_strict(), field.context().node_type()) {
            (true, Some(target)) => Value::Node(Some(self.create_of(target)?)),
            _ => Value::default_for(field.context()),
        };
        let new_ids = value.node_ids();
        let result = self.assign(node, index, value);
        self.release(old_ids.into_iter().chain(new_ids));
        result.map(|_| ())
    }

    pub fn push<T: DataValue>(
        &mut self,
        node: NodeId,
        handle: &FieldHandle<Vec<T>>,
        item: T,
    ) -> Result<(), DataError> {
        let mut items = self.get(node, handle)?;
        items.push(item);
        self.set(node, handle, items)
    }

    pub fn insert<T: DataValue>(
        &mut self,
        node: NodeId,
        handle: &FieldHandle<Vec<T>>,
        index: usize,
        item: T,
    ) -> Result<(), DataError> {
        let mut items = self.get(node, handle)?;
        if index > items.len() {
            let field = self.handle_field(node, handle)?;
            return Err(out_of_range(&field, index));
        }
        items.insert(index, item);
        self.set(node, handle, items)
    }

    /// Removes and returns the element at `index`. Removed nodes stay alive,
    /// detached.
    pub fn remove_at<T: DataValue>(
        &mut self,
        node: NodeId,
        handle: &FieldHandle<Vec<T>>,
        index: usize,
    ) -> Result<T, DataError> {
        let mut items = self.get(node, handle)?;
        if index >= items.len() {
            let field = self.handle_field(node, handle)?;
            return Err(out_of_range(&field, index));
        }
        let removed = items.remove(index);
        self.set(node, handle, items)?;
        Ok(removed)
    }

    /// Inserts or replaces the entry at `key`, returning the previous one.
    pub fn insert_key<T: DataValue>(
        &mut self,
        node: NodeId,
        handle: &FieldHandle<BTreeMap<String, T>>,
        key: &str,
        item: T,
    ) -> Result<Option<T>, DataError> {
        let mut items = self.get(node, handle)?;
        let previous = items.insert(key.to_string(), item);
        self.set(node, handle, items)?;
        Ok(previous)
    }

    pub fn remove_key<T: DataValue>(
        &mut self,
        node: NodeId,
        handle: &FieldHandle<BTreeMap<String, T>>,
        key: &str,
    ) -> Result<Option<T>, DataError> {
        let mut items = self.get(node, handle)?;
        let removed = items.remove(key);
        if removed.is_some() {
            self.set(node, handle, items)?;
        }
        Ok(removed)
    }

    pub fn contains_key<T>(
        &self,
        node: NodeId,
        handle: &FieldHandle<BTreeMap<String, T>>,
        key: &str,
    ) -> bool {
        self.handle_field(node, handle)
            .ok()
            .and_then(|field| self.node(node).ok().map(|data| &data.properties[field.index()]))
            .is_some_and(|value| matches!(value, Value::Mapping(items) if items.contains_key(key)))
    }

    /// Type descriptor of a handle's field.
    pub fn context_of<T>(
        &self,
        node: NodeId,
        handle: &FieldHandle<T>,
    ) -> Result<TypeContext, DataError> {
        Ok(self.handle_field(node, handle)?.context().clone())
    }
}

/// Guard returned by [`DataTree::get_mut`].
pub struct PropertyMut<'t, T: DataValue> {
    tree: &'t mut DataTree,
    node: NodeId,
    index: usize,
    value: T,
    done: bool,
}

impl<T: DataValue> PropertyMut<'_, T> {
    /// Stores the value and reports the outcome.
    pub fn commit(mut self) -> Result<(), DataError> {
        self.done = true;
        self.tree.assign(self.node, self.index, self.value.clone().into_value()).map(|_| ())
    }
}

impl<T: DataValue> Deref for PropertyMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: DataValue> DerefMut for PropertyMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: DataValue> Drop for PropertyMut<'_, T> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Err(err) = self.tree.assign(self.node, self.index, self.value.clone().into_value()) {
            error!(%err, node = ?self.node, index = self.index, "property write-back failed");
        }
    }
}
