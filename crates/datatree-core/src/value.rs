//! Dynamic property values and their typed views.

use std::collections::BTreeMap;
use std::fmt;

use crate::tree::NodeId;
use crate::types::{TypeContext, ValueType};

/// Value held by one property slot.
///
/// Mappings are `BTreeMap`s, so iteration is always in ascending key order.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    Float(f32),
    Bool(bool),
    String(String),
    Name(String),
    Enum(u8),
    Node(Option<NodeId>),
    Sequence(Vec<Value>),
    Mapping(BTreeMap<String, Value>),
}

impl Value {
    /// Default value for a slot of the given type.
    pub fn default_for(context: &TypeContext) -> Value {
        match context {
            TypeContext::Value(element) => Value::default_element(element),
            TypeContext::Sequence(_) => Value::Sequence(Vec::new()),
            TypeContext::Mapping(_) => Value::Mapping(BTreeMap::new()),
        }
    }

    pub fn default_element(element: &ValueType) -> Value {
        match element {
            ValueType::Int32 => Value::Int32(0),
            ValueType::Int64 => Value::Int64(0),
            ValueType::UInt8 => Value::UInt8(0),
            ValueType::Float => Value::Float(0.0),
            ValueType::Bool => Value::Bool(false),
            ValueType::String => Value::String(String::new()),
            ValueType::Name => Value::Name(String::new()),
            ValueType::Enum(_) => Value::Enum(0),
            ValueType::Node(_) => Value::Node(None),
        }
    }

    pub fn is_default(&self) -> bool {
        match self {
            Value::Int32(v) => *v == 0,
            Value::Int64(v) => *v == 0,
            Value::UInt8(v) | Value::Enum(v) => *v == 0,
            Value::Float(v) => v.to_bits() == 0,
            Value::Bool(v) => !*v,
            Value::String(v) | Value::Name(v) => v.is_empty(),
            Value::Node(v) => v.is_none(),
            Value::Sequence(v) => v.is_empty(),
            Value::Mapping(v) => v.is_empty(),
        }
    }

    /// Deep equality used for change detection. Floats compare bitwise so
    /// that writing the same NaN twice is not a change.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Sequence(a), Value::Sequence(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same(y))
            }
            (Value::Mapping(a), Value::Mapping(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.same(vb))
            }
            _ => self == other,
        }
    }

    /// Whether this value may be stored in a slot of `context`. Node ids are
    /// checked for shape only; their types are checked by the tree.
    pub fn conforms(&self, context: &TypeContext) -> bool {
        match (context, self) {
            (TypeContext::Value(element), value) => value.conforms_element(element),
            (TypeContext::Sequence(element), Value::Sequence(items)) => items
                .iter()
                .all(|item| item.conforms_element(element) && !matches!(item, Value::Node(None))),
            (TypeContext::Mapping(element), Value::Mapping(items)) => items
                .values()
                .all(|item| item.conforms_element(element) && !matches!(item, Value::Node(None))),
            _ => false,
        }
    }

    fn conforms_element(&self, element: &ValueType) -> bool {
        matches!(
            (element, self),
            (ValueType::Int32, Value::Int32(_))
                | (ValueType::Int64, Value::Int64(_))
                | (ValueType::UInt8, Value::UInt8(_))
                | (ValueType::Float, Value::Float(_))
                | (ValueType::Bool, Value::Bool(_))
                | (ValueType::String, Value::String(_))
                | (ValueType::Name, Value::Name(_))
                | (ValueType::Enum(_), Value::Enum(_))
                | (ValueType::Node(_), Value::Node(_))
        )
    }

    /// Converts between enum ordinals and plain `u8` so that values typed as
    /// either fit cast-compatible slots.
    pub(crate) fn coerce(self, context: &TypeContext) -> Value {
        fn element(value: Value, target: &ValueType) -> Value {
            match (target, value) {
                (ValueType::Enum(_), Value::UInt8(v)) => Value::Enum(v),
                (ValueType::UInt8, Value::Enum(v)) => Value::UInt8(v),
                (_, value) => value,
            }
        }
        match (context, self) {
            (TypeContext::Value(target), value) => element(value, target),
            (TypeContext::Sequence(target), Value::Sequence(items)) => {
                Value::Sequence(items.into_iter().map(|v| element(v, target)).collect())
            }
            (TypeContext::Mapping(target), Value::Mapping(items)) => Value::Mapping(
                items
                    .into_iter()
                    .map(|(k, v)| (k, element(v, target)))
                    .collect(),
            ),
            (_, value) => value,
        }
    }

    /// Node ids held by this value, in storage order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        match self {
            Value::Node(Some(id)) => vec![*id],
            Value::Sequence(items) => items.iter().flat_map(Value::node_ids).collect(),
            Value::Mapping(items) => items.values().flat_map(Value::node_ids).collect(),
            _ => Vec::new(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Element at a path key: a decimal index for sequences, the literal key
    /// for mappings.
    pub fn element(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Sequence(items) => datatree_path::parse_index(key).and_then(|i| items.get(i)),
            Value::Mapping(items) => items.get(key),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::UInt8(v) | Value::Enum(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::String(v) | Value::Name(v) => f.write_str(v),
            Value::Node(Some(id)) => write!(f, "{id:?}"),
            Value::Node(None) => f.write_str("null"),
            Value::Sequence(items) => write!(f, "[{} items]", items.len()),
            Value::Mapping(items) => write!(f, "{{{} entries}}", items.len()),
        }
    }
}

/// Interned-style identifier string, serialized distinctly from `String`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(pub String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Name(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Name(value.to_string())
    }
}

/// Conversion between a Rust type and [`Value`].
pub trait DataValue: Sized + Clone {
    fn into_value(self) -> Value;
    fn from_value(value: &Value) -> Option<Self>;
}

/// A Rust type with a fixed element kind.
pub trait ScalarValue: DataValue {
    fn value_type() -> ValueType;
}

macro_rules! scalar_value {
    ($ty:ty, $variant:ident, $kind:ident) => {
        impl DataValue for $ty {
            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }

        impl ScalarValue for $ty {
            fn value_type() -> ValueType {
                ValueType::$kind
            }
        }
    };
}

scalar_value!(i32, Int32, Int32);
scalar_value!(i64, Int64, Int64);
scalar_value!(f32, Float, Float);
scalar_value!(bool, Bool, Bool);
scalar_value!(String, String, String);

impl DataValue for u8 {
    fn into_value(self) -> Value {
        Value::UInt8(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::UInt8(v) | Value::Enum(v) => Some(*v),
            _ => None,
        }
    }
}

impl ScalarValue for u8 {
    fn value_type() -> ValueType {
        ValueType::UInt8
    }
}

impl DataValue for Name {
    fn into_value(self) -> Value {
        Value::Name(self.0)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Name(v) => Some(Name(v.clone())),
            _ => None,
        }
    }
}

impl ScalarValue for Name {
    fn value_type() -> ValueType {
        ValueType::Name
    }
}

impl DataValue for NodeId {
    fn into_value(self) -> Value {
        Value::Node(Some(self))
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Node(Some(id)) => Some(*id),
            _ => None,
        }
    }
}

impl DataValue for Option<NodeId> {
    fn into_value(self) -> Value {
        Value::Node(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Node(id) => Some(*id),
            _ => None,
        }
    }
}

impl<T: DataValue> DataValue for Vec<T> {
    fn into_value(self) -> Value {
        Value::Sequence(self.into_iter().map(DataValue::into_value).collect())
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Sequence(items) => items.iter().map(T::from_value).collect(),
            _ => None,
        }
    }
}

impl<T: DataValue> DataValue for BTreeMap<String, T> {
    fn into_value(self) -> Value {
        Value::Mapping(self.into_iter().map(|(k, v)| (k, v.into_value())).collect())
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Mapping(items) => items
                .iter()
                .map(|(k, v)| T::from_value(v).map(|v| (k.clone(), v)))
                .collect(),
            _ => None,
        }
    }
}

impl DataValue for Value {
    fn into_value(self) -> Value {
        self
    }

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}
