//! Dot-path resolution over a tree.
//!
//! A [`PathExecutor`] walks from a node through node-reference fields,
//! sequence indices and mapping keys. It stops on a field when no keys are
//! left, or on a container field when exactly one key is left; that key is
//! then the element key of the result.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::trace;

use crate::error::DataError;
use crate::schema::Field;
use crate::tree::{DataTree, NodeId};
use crate::value::Value;

/// What a resolution failure does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMode {
    /// Failures are errors.
    Strict,
    /// Failures yield `Ok(false)` / `Ok(None)`.
    Lenient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    /// No current field.
    Unresolved,
    /// Positioned on a field, keys may remain.
    Field,
    /// Positioned on a field, or an element of it, with no keys left.
    Value,
}

#[derive(Debug, Clone)]
pub struct PathExecutor<'t> {
    tree: &'t DataTree,
    mode: PathMode,
    node: NodeId,
    field: Option<Arc<Field>>,
    keys: VecDeque<String>,
    element: Option<String>,
}

impl<'t> PathExecutor<'t> {
    pub fn new(tree: &'t DataTree, node: NodeId, path: &str, mode: PathMode) -> Self {
        Self {
            tree,
            mode,
            node,
            field: None,
            keys: datatree_path::parse_path(path).into(),
            element: None,
        }
    }

    pub fn append_key(&mut self, key: &str) {
        self.keys.extend(datatree_path::parse_path(key));
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn field(&self) -> Option<&Arc<Field>> {
        self.field.as_ref()
    }

    pub fn element_key(&self) -> Option<&str> {
        self.element.as_deref()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Remaining path, with the current field and element in front.
    pub fn path(&self) -> String {
        let head = self.field.iter().map(|field| field.name().to_string());
        let element = self.element.iter().cloned();
        let keys: Vec<String> = head.chain(element).chain(self.keys.iter().cloned()).collect();
        datatree_path::format_path(&keys)
    }

    pub fn state(&self) -> PathState {
        match (&self.field, self.keys.is_empty()) {
            (None, _) => PathState::Unresolved,
            (Some(_), true) => PathState::Value,
            (Some(_), false) => PathState::Field,
        }
    }

    fn fail(&self, reason: &str) -> Result<bool, DataError> {
        trace!(path = %self.path(), reason, "path resolution failed");
        match self.mode {
            PathMode::Strict => Err(DataError::Path {
                path: self.path(),
                reason: reason.to_string(),
            }),
            PathMode::Lenient => Ok(false),
        }
    }

    fn current_value(&self) -> Result<&'t Value, DataError> {
        let Some(field) = &self.field else {
            return Err(DataError::Path {
                path: self.path(),
                reason: "no field".to_string(),
            });
        };
        self.tree.value(self.node, field.index())
    }

    /// Consumes keys until the path is resolved.
    pub fn execute(&mut self) -> Result<bool, DataError> {
        loop {
            let field = match &self.field {
                Some(field) => field.clone(),
                None => {
                    let Some(key) = self.keys.pop_front() else {
                        return self.fail("empty path");
                    };
                    let found = self
                        .tree
                        .type_of(self.node)
                        .ok()
                        .and_then(|def| def.field_by_name(&key))
                        .cloned();
                    match found {
                        Some(field) => {
                            trace!(node = ?self.node, field = field.name(), "path step");
                            self.field = Some(field.clone());
                            field
                        }
                        None => {
                            self.keys.push_front(key);
                            return self.fail("unknown field");
                        }
                    }
                }
            };

            match self.keys.len() {
                0 => return Ok(true),
                1 if field.context().is_container() => {
                    self.element = self.keys.pop_front();
                    return Ok(true);
                }
                _ => {}
            }
            if !field.context().is_node_reference() {
                return self.fail("can't descend into a value field");
            }

            let value = self.current_value()?;
            let child = if field.context().is_container() {
                let Some(key) = self.keys.front() else {
                    return self.fail("missing element key");
                };
                if field.context().is_sequence() && datatree_path::parse_index(key).is_none() {
                    return self.fail("invalid sequence index");
                }
                match value.element(key) {
                    Some(Value::Node(Some(id))) => {
                        self.keys.pop_front();
                        *id
                    }
                    _ => return self.fail("no such element"),
                }
            } else {
                match value {
                    Value::Node(Some(id)) => *id,
                    _ => return self.fail("null reference"),
                }
            };
            self.node = child;
            self.field = None;
        }
    }

    /// The resolved value: the field's value, or its element when an element
    /// key was consumed.
    pub fn value(&self) -> Result<Option<&'t Value>, DataError> {
        let value = self.current_value()?;
        let Some(key) = &self.element else {
            return Ok(Some(value));
        };
        match value.element(key) {
            Some(element) => Ok(Some(element)),
            None => self.fail("no such element").map(|_| None),
        }
    }

    pub fn execute_value(&mut self) -> Result<Option<Value>, DataError> {
        if !self.execute()? {
            return Ok(None);
        }
        Ok(self.value()?.cloned())
    }

    /// Steps one level toward the root, putting the step into the keys.
    ///
    /// On a field the field (and element) go back into the keys. On a node
    /// the node's own addressing key goes into the keys and the cursor moves
    /// to the owning field of the parent.
    pub fn previous(&mut self) -> Result<bool, DataError> {
        if let Some(field) = self.field.take() {
            if let Some(element) = self.element.take() {
                self.keys.push_front(element);
            }
            self.keys.push_front(field.name().to_string());
            return Ok(true);
        }
        let node = self.tree.node(self.node)?;
        let Some(parent) = node.parent else {
            return self.fail("no parent");
        };
        let owning = if node.collection_key.is_empty() {
            node.data_key.clone()
        } else {
            self.keys.push_front(node.data_key.clone());
            node.collection_key.clone()
        };
        let Some(field) = self.tree.type_of(parent)?.field_by_name(&owning).cloned() else {
            return self.fail("owning field not found");
        };
        self.node = parent;
        self.field = Some(field);
        Ok(true)
    }
}

impl DataTree {
    /// Lenient lookup of `path` from `node`.
    pub fn resolve(&self, node: NodeId, path: &str) -> Option<Value> {
        PathExecutor::new(self, node, path, PathMode::Lenient)
            .execute_value()
            .ok()
            .flatten()
    }

    /// Like [`DataTree::resolve`], failing with [`DataError::Path`].
    pub fn resolve_strict(&self, node: NodeId, path: &str) -> Result<Value, DataError> {
        PathExecutor::new(self, node, path, PathMode::Strict)
            .execute_value()?
            .ok_or_else(|| DataError::Path {
                path: path.to_string(),
                reason: "not found".to_string(),
            })
    }
}
