use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use crate::error::DataError;
use crate::schema::Field;
use crate::serialize::{Deserializer, FieldKey, Serializer};
use crate::tree::{DataTree, NodeId};
use crate::types::{TypeContext, ValueType};
use crate::value::Value;

impl DataTree {
    /// Writes `node` as an object through `serializer`.
    pub fn serialize<S: Serializer + ?Sized>(
        &self,
        node: NodeId,
        serializer: &mut S,
    ) -> Result<(), DataError> {
        self.node(node)?;
        serializer.write_node(self, Some(node))
    }

    /// Writes the fields of `node` into an already opened object.
    pub fn serialize_fields<S: Serializer + ?Sized>(
        &self,
        node: NodeId,
        serializer: &mut S,
    ) -> Result<(), DataError> {
        let data = self.node(node)?;
        for field in self.schema().get_fields(data.ty) {
            if field.meta().is_deprecated() {
                continue;
            }
            let value = &data.properties[field.index()];
            if !serializer.writes_defaults() && value.is_default() {
                continue;
            }
            serializer.write_field_key(field);
            self.serialize_value(field.context(), value, serializer)?;
            serializer.pop_key();
        }
        Ok(())
    }

    /// Writes one property value described by `context`.
    pub fn serialize_value<S: Serializer + ?Sized>(
        &self,
        context: &TypeContext,
        value: &Value,
        serializer: &mut S,
    ) -> Result<(), DataError> {
        match value {
            Value::Sequence(items) => {
                serializer.write_array(items.len());
                for item in items {
                    self.serialize_element(context.element(), item, serializer)?;
                }
                serializer.pop_array();
            }
            Value::Mapping(items) => {
                serializer.write_map(items.len());
                for (key, item) in items {
                    serializer.write_key(key);
                    self.serialize_element(context.element(), item, serializer)?;
                    serializer.pop_key();
                }
                serializer.pop_object();
            }
            element => self.serialize_element(context.element(), element, serializer)?,
        }
        Ok(())
    }

    fn serialize_element<S: Serializer + ?Sized>(
        &self,
        element: &ValueType,
        value: &Value,
        serializer: &mut S,
    ) -> Result<(), DataError> {
        match value {
            Value::Int32(v) => serializer.write_i32(*v),
            Value::Int64(v) => serializer.write_i64(*v),
            Value::UInt8(v) => serializer.write_u8(*v),
            Value::Float(v) => serializer.write_f32(*v),
            Value::Bool(v) => serializer.write_bool(*v),
            Value::String(v) => serializer.write_string(v),
            Value::Name(v) => serializer.write_name(v),
            Value::Enum(v) => match element {
                ValueType::Enum(ty) => match ty.variant_name(*v) {
                    Some(name) => serializer.write_string(name),
                    None => serializer.write_string(&v.to_string()),
                },
                _ => serializer.write_u8(*v),
            },
            Value::Node(id) => serializer.write_node(self, *id)?,
            Value::Sequence(_) | Value::Mapping(_) => {
                return Err(DataError::Codec("nested containers are not supported".to_string()))
            }
        }
        Ok(())
    }

    /// Reads `node` from `deserializer`.
    ///
    /// In patch mode fields absent from the input keep their value, trailing
    /// sequence elements and absent mapping keys are kept. Otherwise absent
    /// fields are reset. Values that fail to read keep their previous value
    /// and are logged.
    pub fn deserialize<D: Deserializer + ?Sized>(
        &mut self,
        node: NodeId,
        deserializer: &mut D,
        patch: bool,
    ) -> Result<(), DataError> {
        self.node(node)?;
        if self.deserialize_fields(node, deserializer, patch) {
            Ok(())
        } else {
            Err(DataError::Codec("expected an object".to_string()))
        }
    }

    pub(crate) fn deserialize_fields<D: Deserializer + ?Sized>(
        &mut self,
        node: NodeId,
        deserializer: &mut D,
        patch: bool,
    ) -> bool {
        let Ok(ty) = self.node(node).map(|data| data.ty) else {
            return false;
        };
        if !deserializer.read_object() {
            return false;
        }
        let schema = self.schema().clone();
        let Some(def) = schema.get(ty) else {
            deserializer.pop_object();
            return false;
        };
        let mut seen = vec![false; def.fields().len()];

        self.enter_scope();
        while let Some(key) = deserializer.read_field_key() {
            let field = match &key {
                FieldKey::Name(name) => def.field_by_serialize_name(name),
                FieldKey::Hash(hash) => def.field_by_hash(*hash),
            };
            match field {
                Some(field) => {
                    seen[field.index()] = true;
                    self.read_property(node, field, deserializer, patch);
                }
                None => warn!(node_type = def.name(), %key, "property not found"),
            }
            deserializer.pop_key();
        }
        deserializer.pop_object();

        if !patch {
            for (index, _) in seen.iter().enumerate().filter(|(_, seen)| !**seen) {
                if let Err(err) = self.reset_property(node, index) {
                    warn!(%err, node_type = def.name(), index, "can't reset absent property");
                }
            }
        }
        self.exit_scope();
        true
    }

    fn read_property<D: Deserializer + ?Sized>(
        &mut self,
        node: NodeId,
        field: &Arc<Field>,
        deserializer: &mut D,
        patch: bool,
    ) {
        let Ok(previous) = self.value(node, field.index()).cloned() else {
            return;
        };
        match self.read_value(field.context(), &previous, deserializer, patch) {
            Some(value) => self.store_read(node, field, &previous, value),
            None => {
                warn!(owner = field.owner(), field = field.name(), "can't deserialize property");
                if !patch {
                    if let Err(err) = self.reset_property(node, field.index()) {
                        warn!(%err, field = field.name(), "can't reset property");
                    }
                }
            }
        }
    }

    /// Assigns a value produced by a reader. Nodes left detached by the
    /// assignment, old or newly read, are destroyed.
    pub(crate) fn store_read(
        &mut self,
        node: NodeId,
        field: &Field,
        previous: &Value,
        value: Value,
    ) {
        let mut involved = previous.node_ids();
        involved.extend(value.node_ids());
        if let Err(err) = self.assign(node, field.index(), value) {
            warn!(%err, field = field.name(), "can't store deserialized property");
        }
        self.release(involved);
    }

    /// Reads one value of `context`. `previous` provides the defaults that
    /// patch reads merge into.
    pub(crate) fn read_value<D: Deserializer + ?Sized>(
        &mut self,
        context: &TypeContext,
        previous: &Value,
        deserializer: &mut D,
        patch: bool,
    ) -> Option<Value> {
        match context {
            TypeContext::Value(element) => {
                self.read_element(element, previous, deserializer, patch)
            }
            TypeContext::Sequence(element) => {
                if !deserializer.read_array() {
                    return None;
                }
                let previous_items: &[Value] = match previous {
                    Value::Sequence(items) => items,
                    _ => &[],
                };
                let mut items = Vec::new();
                let mut position = 0;
                while deserializer.read_index() {
                    let fallback = previous_items
                        .get(position)
                        .cloned()
                        .unwrap_or_else(|| Value::default_element(element));
                    match self.read_element(element, &fallback, deserializer, patch) {
                        Some(value) => items.push(value),
                        None => {
                            warn!(index = position, "can't deserialize sequence element");
                            items.push(fallback);
                        }
                    }
                    deserializer.pop_index();
                    position += 1;
                }
                deserializer.pop_array();
                if patch && position < previous_items.len() {
                    items.extend_from_slice(&previous_items[position..]);
                }
                items.retain(|item| !matches!(item, Value::Node(None)));
                Some(Value::Sequence(items))
            }
            TypeContext::Mapping(element) => {
                if !deserializer.read_map() {
                    return None;
                }
                let previous_items = match previous {
                    Value::Mapping(items) => Some(items),
                    _ => None,
                };
                let mut items = match (patch, previous_items) {
                    (true, Some(items)) => items.clone(),
                    _ => BTreeMap::new(),
                };
                while let Some(key) = deserializer.read_key() {
                    let fallback = previous_items
                        .and_then(|items| items.get(&key))
                        .cloned()
                        .unwrap_or_else(|| Value::default_element(element));
                    match self.read_element(element, &fallback, deserializer, patch) {
                        Some(value) => {
                            items.insert(key, value);
                        }
                        None => {
                            warn!(%key, "can't deserialize mapping entry");
                            items.insert(key, fallback);
                        }
                    }
                    deserializer.pop_key();
                }
                deserializer.pop_object();
                items.retain(|_, item| !matches!(item, Value::Node(None)));
                Some(Value::Mapping(items))
            }
        }
    }

    fn read_element<D: Deserializer + ?Sized>(
        &mut self,
        element: &ValueType,
        previous: &Value,
        deserializer: &mut D,
        patch: bool,
    ) -> Option<Value> {
        match element {
            ValueType::Int32 => deserializer.read_i32().map(Value::Int32),
            ValueType::Int64 => deserializer.read_i64().map(Value::Int64),
            ValueType::UInt8 => deserializer.read_u8().map(Value::UInt8),
            ValueType::Float => deserializer.read_f32().map(Value::Float),
            ValueType::Bool => deserializer.read_bool().map(Value::Bool),
            ValueType::String => deserializer.read_string().map(Value::String),
            ValueType::Name => deserializer.read_name().map(Value::Name),
            ValueType::Enum(ty) => deserializer
                .read_string()
                .and_then(|name| ty.value_of(&name).or_else(|| name.parse().ok()))
                .map(Value::Enum),
            ValueType::Node(target) => {
                if deserializer.read_null() {
                    return Some(Value::Node(None));
                }
                let existing = match previous {
                    Value::Node(Some(id)) if self.contains(*id) => Some(*id),
                    _ => None,
                };
                let (id, fresh) = match existing {
                    Some(id) => (id, false),
                    None => match self.create_of(target.id) {
                        Ok(id) => (id, true),
                        Err(err) => {
                            warn!(%err, node_type = %target.name, "can't allocate node");
                            return None;
                        }
                    },
                };
                if self.deserialize_fields(id, deserializer, patch && !fresh) {
                    Some(Value::Node(Some(id)))
                } else {
                    if fresh {
                        self.destroy(id).ok();
                    }
                    None
                }
            }
        }
    }
}
