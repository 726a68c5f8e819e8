//! Visitor contract walked by every codec.
//!
//! A node is written as an object with one key per field, in declaration
//! order. Sequences are arrays, mappings are objects keyed by map key in
//! ascending order, node references recurse through
//! [`Serializer::write_node`]. Readers mirror the writer and report failure
//! per value; the tree falls back to the previous value and keeps reading.

pub mod binary;
mod hash;
mod tree;

pub use binary::{BinaryDeserializer, BinarySerializer};

use std::fmt;

use crate::error::DataError;
use crate::schema::Field;
use crate::tree::{DataTree, NodeId};

pub trait Serializer {
    fn write_key(&mut self, key: &str);

    /// Key of a node field. Name-keyed codecs write the serialize name.
    fn write_field_key(&mut self, field: &Field) {
        self.write_key(field.serialize_name());
    }

    fn write_array(&mut self, len: usize);
    fn write_object(&mut self);

    /// Opens a mapping object of `len` entries.
    fn write_map(&mut self, len: usize) {
        let _ = len;
        self.write_object();
    }

    fn write_i32(&mut self, value: i32);
    fn write_i64(&mut self, value: i64);
    fn write_u8(&mut self, value: u8);
    fn write_f32(&mut self, value: f32);
    fn write_bool(&mut self, value: bool);
    fn write_string(&mut self, value: &str);

    fn write_name(&mut self, value: &str) {
        self.write_string(value);
    }

    fn write_null(&mut self);

    /// Writes a referenced node, `null` when absent.
    fn write_node(&mut self, tree: &DataTree, node: Option<NodeId>) -> Result<(), DataError> {
        match node {
            None => {
                self.write_null();
                Ok(())
            }
            Some(id) => {
                self.write_object();
                let result = tree.serialize_fields(id, self);
                self.pop_object();
                result
            }
        }
    }

    fn pop_key(&mut self);
    fn pop_array(&mut self);
    fn pop_object(&mut self);

    /// Whether fields holding their type default are written.
    fn writes_defaults(&self) -> bool {
        true
    }
}

/// Key of a node field as found in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKey {
    Name(String),
    Hash(u32),
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKey::Name(name) => f.write_str(name),
            FieldKey::Hash(hash) => write!(f, "#{hash:08x}"),
        }
    }
}

/// Reading side of the contract. `read_*` calls that fail leave the value
/// unconsumed; the following `pop_*` call skips it.
pub trait Deserializer {
    /// Next key of the current object, `None` at its end.
    fn read_key(&mut self) -> Option<String>;

    fn read_field_key(&mut self) -> Option<FieldKey> {
        self.read_key().map(FieldKey::Name)
    }

    /// Whether the current array has another element.
    fn read_index(&mut self) -> bool;
    fn read_array(&mut self) -> bool;
    fn read_object(&mut self) -> bool;

    fn read_map(&mut self) -> bool {
        self.read_object()
    }

    fn read_i32(&mut self) -> Option<i32>;
    fn read_i64(&mut self) -> Option<i64>;
    fn read_u8(&mut self) -> Option<u8>;
    fn read_f32(&mut self) -> Option<f32>;
    fn read_bool(&mut self) -> Option<bool>;
    fn read_string(&mut self) -> Option<String>;

    fn read_name(&mut self) -> Option<String> {
        self.read_string()
    }

    /// Consumes a `null` value.
    fn read_null(&mut self) -> bool;

    fn pop_key(&mut self);
    fn pop_index(&mut self);
    fn pop_array(&mut self);
    fn pop_object(&mut self);
}
