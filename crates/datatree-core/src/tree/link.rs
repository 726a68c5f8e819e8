use std::sync::Arc;

use tracing::trace;

use crate::error::DataError;
use crate::events::{BindFlags, Event, REMOVED_FROM_ROOT};
use crate::path::{PathExecutor, PathMode};
use crate::schema::{Field, Link, LinkHandle, LinkKey, LinkPath};
use crate::tree::{DataTree, NodeId};
use crate::types::{TypeContext, TypeHierarchy, ValueType};
use crate::value::{DataValue, Value};

/// Where one key of a link resolved to.
struct Resolved {
    value: Value,
    node: NodeId,
    field: Option<Arc<Field>>,
}

impl DataTree {
    /// Value of a link, resolved from the owner's root and cached until one
    /// of its sources changes.
    pub fn link<T: DataValue>(
        &mut self,
        node: NodeId,
        handle: &LinkHandle<T>,
    ) -> Result<T, DataError> {
        self.check_owner(node, handle.owner)?;
        let value = self.resolve_link(node, handle.index)?;
        T::from_value(&value).ok_or_else(|| DataError::TypeMismatch {
            field: handle.name.clone(),
            expected: std::any::type_name::<T>().to_string(),
        })
    }

    pub fn link_value(&mut self, node: NodeId, name: &str) -> Result<Value, DataError> {
        let index = self
            .type_of(node)?
            .link_by_name(name)
            .map(|link| link.index())
            .ok_or_else(|| DataError::UnknownField {
                node,
                field: name.to_string(),
            })?;
        self.resolve_link(node, index)
    }

    /// Only nullable links can be empty: when their key is empty, or for
    /// collection links when any key is empty.
    pub fn link_is_empty<T>(
        &self,
        node: NodeId,
        handle: &LinkHandle<T>,
    ) -> Result<bool, DataError> {
        self.check_owner(node, handle.owner)?;
        let link = self.link_of(node, handle.index)?;
        if !link.meta().nullable {
            return Ok(false);
        }
        let keys = self.link_keys(node, &link)?;
        Ok(match link.key_kind() {
            LinkKey::Collection => keys.iter().any(String::is_empty),
            _ => keys.first().map_or(true, String::is_empty),
        })
    }

    pub(crate) fn link_of(&self, node: NodeId, index: usize) -> Result<Arc<Link>, DataError> {
        self.type_of(node)?
            .links()
            .get(index)
            .cloned()
            .ok_or_else(|| DataError::UnknownField {
                node,
                field: format!("link #{index}"),
            })
    }

    pub(crate) fn reset_link(&mut self, node: NodeId, index: usize) {
        if let Ok(data) = self.node_mut(node) {
            if let Some(cache) = data.links.get_mut(index) {
                trace!(?node, index, "link cache reset");
                cache.reset();
            }
        }
    }

    pub(crate) fn reset_links(&mut self, node: NodeId) {
        if let Ok(data) = self.node_mut(node) {
            data.links.iter_mut().for_each(|cache| cache.reset());
        }
    }

    /// Keys produced by the link's key field.
    pub(crate) fn link_keys(&self, node: NodeId, link: &Link) -> Result<Vec<String>, DataError> {
        let value = self.value(node, link.key_field())?;
        let field = self.field_of(node, link.key_field())?;
        Ok(match (link.key_kind(), value) {
            (LinkKey::Text, value) => vec![value.as_str().unwrap_or_default().to_string()],
            (LinkKey::Enum, Value::Enum(ordinal) | Value::UInt8(ordinal)) => {
                let name = match field.context().element() {
                    ValueType::Enum(ty) => ty.variant_name(*ordinal).unwrap_or_default(),
                    _ => "",
                };
                vec![name.to_string()]
            }
            (LinkKey::Collection, Value::Sequence(items)) => items
                .iter()
                .map(|item| item.as_str().unwrap_or_default().to_string())
                .collect(),
            _ => vec![String::new()],
        })
    }

    pub(crate) fn link_path(&self, node: NodeId, link: &Link) -> Result<String, DataError> {
        Ok(match (link.path(), link.path_field()) {
            (LinkPath::Static(path), _) => path.clone(),
            (LinkPath::Property(_), Some(index)) => {
                self.value(node, index)?.as_str().unwrap_or_default().to_string()
            }
            _ => String::new(),
        })
    }

    fn resolve_link(&mut self, node: NodeId, index: usize) -> Result<Value, DataError> {
        let cached = self.node(node)?.links.get(index).and_then(|cache| cache.value.clone());
        if let Some(value) = cached {
            return Ok(value);
        }
        let link = self.link_of(node, index)?;
        let default = Value::default_for(&link.return_context());
        let label = format!("{}::{}", link.owner(), link.name());
        if link.is_abstract() {
            return Err(DataError::AbstractLink(label));
        }
        let Some(root) = self.node(node)?.root else {
            self.violation(DataError::NoRoot(label))?;
            return Ok(default);
        };
        let path = self.link_path(node, &link)?;
        if path.is_empty() {
            self.violation(DataError::Path {
                path,
                reason: format!("link {label} has empty path"),
            })?;
            return Ok(default);
        }

        let keys = self.link_keys(node, &link)?;
        let mut resolved = Vec::new();
        let mut complete = true;
        let value = if link.is_collection() {
            let mut items = Vec::with_capacity(keys.len());
            for key in &keys {
                match self.resolve_key(&link, &label, root, &path, key)? {
                    Some(hit) => {
                        items.push(hit.value.clone());
                        resolved.push(hit);
                    }
                    None => {
                        complete = false;
                        items.push(Value::default_element(link.element()));
                    }
                }
            }
            Value::Sequence(items)
        } else {
            let key = keys.into_iter().next().unwrap_or_default();
            match self.resolve_key(&link, &label, root, &path, &key)? {
                Some(hit) => {
                    let value = hit.value.clone();
                    resolved.push(hit);
                    value
                }
                None => {
                    complete = false;
                    default
                }
            }
        };

        if complete {
            self.watch_link(node, index, &resolved)?;
            if let Some(cache) = self.node_mut(node)?.links.get_mut(index) {
                cache.value = Some(value.clone());
            }
        }
        Ok(value)
    }

    /// Resolves `path.key` from `root`. Missing values are violations for
    /// links without nullable meta.
    fn resolve_key(
        &self,
        link: &Link,
        label: &str,
        root: NodeId,
        path: &str,
        key: &str,
    ) -> Result<Option<Resolved>, DataError> {
        if key.is_empty() {
            if !link.meta().nullable {
                self.violation(DataError::EmptyLink(label.to_string()))?;
            }
            return Ok(None);
        }
        let full = datatree_path::join(path, key);
        let mut executor = PathExecutor::new(self, root, path, PathMode::Lenient);
        executor.append_key(key);
        let hit = if executor.execute()? {
            executor.value()?.cloned().map(|value| Resolved {
                value,
                node: executor.node(),
                field: executor.field().cloned(),
            })
        } else {
            None
        };

        let context = TypeContext::Value(link.element().clone());
        let hit = hit
            .map(|hit| Resolved {
                value: hit.value.coerce(&context),
                ..hit
            })
            .filter(|hit| {
                hit.value.conforms(&context) && self.node_type_fits(&hit.value, link.element())
            });
        if hit.is_none() && !link.meta().nullable {
            self.violation(DataError::NullLink {
                link: label.to_string(),
                path: full,
            })?;
        }
        Ok(hit)
    }

    fn node_type_fits(&self, value: &Value, element: &ValueType) -> bool {
        match (value, element.node_type()) {
            (Value::Node(Some(id)), Some(expected)) => self
                .node(*id)
                .is_ok_and(|child| self.schema().is_subtype(child.ty, expected)),
            (Value::Node(None), _) => false,
            _ => true,
        }
    }

    /// Resets the cache when a resolved field changes or a resolved node
    /// leaves its root.
    fn watch_link(
        &mut self,
        owner: NodeId,
        index: usize,
        resolved: &[Resolved],
    ) -> Result<(), DataError> {
        let flags = BindFlags::NON_DEFERRED | BindFlags::IGNORE_FIELD_META;
        let mut handles = Vec::new();
        let mut watched_nodes = Vec::new();
        for hit in resolved {
            if let Some(field) = &hit.field {
                handles.push(self.bind(
                    hit.node,
                    field.changed_event(),
                    Some(field),
                    flags,
                    move |tree: &mut DataTree, _: &mut Event| tree.reset_link(owner, index),
                )?);
            }
            if hit.node != owner && !watched_nodes.contains(&hit.node) {
                watched_nodes.push(hit.node);
                handles.push(self.bind(
                    hit.node,
                    REMOVED_FROM_ROOT,
                    None,
                    flags,
                    move |tree: &mut DataTree, _: &mut Event| tree.reset_link(owner, index),
                )?);
            }
        }
        if let Some(cache) = self.node_mut(owner)?.links.get_mut(index) {
            cache.bindings.unbind_all();
            cache.bindings.extend(handles);
        }
        Ok(())
    }
}
