//! Change bundles for replicating a tree.
//!
//! A [`NetworkEvent`] addresses a property or a node by its path from the
//! top of the tree and carries the binary payload to apply there. Bundles
//! are built on the sending side with [`DataTree::commit_changes`],
//! [`DataTree::commit_added`] and [`DataTree::commit_removed`], shipped with
//! [`NetworkBundle::encode`], and replayed with [`DataTree::apply_bundle`].

use std::sync::Arc;

use datatree_buffers::{Reader, Writer};
use tracing::{debug, warn};

use crate::error::DataError;
use crate::path::{PathExecutor, PathMode};
use crate::schema::{Field, FieldHandle};
use crate::serialize::{BinaryDeserializer, BinarySerializer};
use crate::tree::{DataTree, NodeId};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NetworkEventKind {
    Changed = 0,
    Added = 1,
    Removed = 2,
}

impl TryFrom<u8> for NetworkEventKind {
    type Error = DataError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Changed),
            1 => Ok(Self::Added),
            2 => Ok(Self::Removed),
            other => Err(DataError::Codec(format!("unknown network event kind {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEvent {
    pub kind: NetworkEventKind,
    pub path: String,
    /// Binary payload, empty for removals.
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkBundle {
    events: Vec<NetworkEvent>,
}

impl NetworkBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: NetworkEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkEvent> {
        self.events.iter()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.u32(u32::try_from(self.events.len()).unwrap_or(u32::MAX));
        for event in &self.events {
            writer.u8(event.kind as u8);
            writer.str32(&event.path);
            if event.kind != NetworkEventKind::Removed {
                writer.bytes32(&event.data);
            }
        }
        writer.flush()
    }

    pub fn decode(data: &[u8]) -> Result<Self, DataError> {
        let mut reader = Reader::new(data);
        let count = reader.u32()?;
        let mut events = Vec::new();
        for _ in 0..count {
            let kind = NetworkEventKind::try_from(reader.u8()?)?;
            let path = reader.str32()?.to_string();
            let data = match kind {
                NetworkEventKind::Removed => Vec::new(),
                _ => reader.bytes32()?.to_vec(),
            };
            events.push(NetworkEvent { kind, path, data });
        }
        Ok(Self { events })
    }
}

impl<'a> IntoIterator for &'a NetworkBundle {
    type Item = &'a NetworkEvent;
    type IntoIter = std::slice::Iter<'a, NetworkEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// Where an event path landed.
struct Target {
    node: NodeId,
    field: Arc<Field>,
    element: Option<String>,
}

impl DataTree {
    /// Event carrying the current value of a value field.
    pub fn commit_changes<T>(
        &self,
        node: NodeId,
        handle: &FieldHandle<T>,
    ) -> Result<NetworkEvent, DataError> {
        let field = self.handle_field(node, handle)?;
        if field.context().is_node_reference() {
            return Err(DataError::TypeMismatch {
                field: field.name().to_string(),
                expected: "non-node value".to_string(),
            });
        }
        let mut serializer = BinarySerializer::new();
        self.serialize_value(field.context(), self.value(node, field.index())?, &mut serializer)?;
        let base = self.path_from_root(node)?;
        Ok(NetworkEvent {
            kind: NetworkEventKind::Changed,
            path: datatree_path::join(&base, field.name()),
            data: serializer.finish(),
        })
    }

    /// Event recreating `node` at its current position.
    pub fn commit_added(&self, node: NodeId) -> Result<NetworkEvent, DataError> {
        let mut serializer = BinarySerializer::new().skip_defaults();
        self.serialize(node, &mut serializer)?;
        Ok(NetworkEvent {
            kind: NetworkEventKind::Added,
            path: self.path_from_root(node)?,
            data: serializer.finish(),
        })
    }

    pub fn commit_removed(&self, node: NodeId) -> Result<NetworkEvent, DataError> {
        Ok(NetworkEvent {
            kind: NetworkEventKind::Removed,
            path: self.path_from_root(node)?,
            data: Vec::new(),
        })
    }

    /// Replays `bundle` below `root` in one event scope. Returns the paths
    /// of the events that were skipped.
    pub fn apply_bundle(
        &mut self,
        root: NodeId,
        bundle: &NetworkBundle,
    ) -> Result<Vec<String>, DataError> {
        self.node(root)?;
        let mut skipped = Vec::new();
        self.enter_scope();
        for event in bundle {
            let applied = match self.locate(root, &event.path) {
                Some(target) => match event.kind {
                    NetworkEventKind::Changed => self.apply_changed(&target, &event.data),
                    NetworkEventKind::Added => self.apply_added(&target, &event.data),
                    NetworkEventKind::Removed => self.apply_removed(&target),
                },
                None => false,
            };
            if !applied {
                warn!(path = %event.path, kind = ?event.kind, "network event skipped");
                skipped.push(event.path.clone());
            }
        }
        self.exit_scope();
        debug!(events = bundle.len(), skipped = skipped.len(), "network bundle applied");
        Ok(skipped)
    }

    fn locate(&self, root: NodeId, path: &str) -> Option<Target> {
        let mut executor = PathExecutor::new(self, root, path, PathMode::Lenient);
        if !executor.execute().ok()? {
            return None;
        }
        Some(Target {
            node: executor.node(),
            field: executor.field()?.clone(),
            element: executor.element_key().map(str::to_string),
        })
    }

    fn apply_changed(&mut self, target: &Target, data: &[u8]) -> bool {
        if target.element.is_some() {
            return false;
        }
        let Ok(previous) = self.value(target.node, target.field.index()).cloned() else {
            return false;
        };
        let mut deserializer = BinaryDeserializer::new(data);
        match self.read_value(target.field.context(), &previous, &mut deserializer, true) {
            Some(value) => {
                self.store_read(target.node, &target.field, &previous, value);
                true
            }
            None => false,
        }
    }

    fn apply_added(&mut self, target: &Target, data: &[u8]) -> bool {
        let field = &target.field;
        let Some(ty) = field.context().node_type() else {
            return false;
        };
        let Ok(previous) = self.value(target.node, field.index()).cloned() else {
            return false;
        };
        let Ok(child) = self.create_of(ty) else {
            return false;
        };
        if let Err(err) = self.from_binary(child, data, false) {
            warn!(%err, field = field.name(), "can't deserialize added node");
            self.destroy(child).ok();
            return false;
        }

        let value = match (&previous, target.element.as_deref()) {
            (Value::Sequence(items), element) => {
                let index = element
                    .and_then(datatree_path::parse_index)
                    .map_or(items.len(), |index| index.min(items.len()));
                let mut items = items.clone();
                items.insert(index, Value::Node(Some(child)));
                Some(Value::Sequence(items))
            }
            (Value::Mapping(items), Some(key)) if !items.contains_key(key) => {
                let mut items = items.clone();
                items.insert(key.to_string(), Value::Node(Some(child)));
                Some(Value::Mapping(items))
            }
            (Value::Node(_), None) => Some(Value::Node(Some(child))),
            _ => None,
        };
        match value {
            Some(value) => {
                self.store_read(target.node, field, &previous, value);
                true
            }
            None => {
                self.destroy(child).ok();
                false
            }
        }
    }

    fn apply_removed(&mut self, target: &Target) -> bool {
        let field = &target.field;
        let Ok(previous) = self.value(target.node, field.index()).cloned() else {
            return false;
        };
        let value = match (&previous, target.element.as_deref()) {
            (Value::Sequence(items), Some(key)) => match datatree_path::parse_index(key) {
                Some(index) if index < items.len() => {
                    let mut items = items.clone();
                    items.remove(index);
                    Value::Sequence(items)
                }
                _ => return false,
            },
            (Value::Mapping(items), Some(key)) if items.contains_key(key) => {
                let mut items = items.clone();
                items.remove(key);
                Value::Mapping(items)
            }
            (Value::Node(Some(_)), None) if field.is_owned_strict() => {
                return self.reset_property(target.node, field.index()).is_ok();
            }
            (Value::Node(Some(_)), None) => Value::Node(None),
            _ => return false,
        };
        self.store_read(target.node, field, &previous, value);
        true
    }
}
