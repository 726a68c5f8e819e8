//! Type descriptors for field values.
//!
//! The set of kinds is closed: scalars, enums and node references, each of
//! which may be stored directly, in a sequence or in a string-keyed mapping.
//! Containers never nest.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Index of a node type inside a [`crate::Registry`] / [`crate::Schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeTypeId(pub(crate) u32);

impl NodeTypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A node type as seen from a field: identity plus the declared name, which
/// keeps type hashes independent of registration order.
#[derive(Debug, Clone)]
pub struct NodeTypeRef {
    pub id: NodeTypeId,
    pub name: Arc<str>,
}

impl PartialEq for NodeTypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NodeTypeRef {}

impl Hash for NodeTypeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Named enumeration stored as a `u8` ordinal and serialized by variant name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumType {
    name: String,
    variants: Vec<String>,
}

impl EnumType {
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        variants: impl IntoIterator<Item = S>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variants(&self) -> &[String] {
        &self.variants
    }

    pub fn variant_name(&self, value: u8) -> Option<&str> {
        self.variants.get(value as usize).map(String::as_str)
    }

    pub fn value_of(&self, name: &str) -> Option<u8> {
        self.variants
            .iter()
            .position(|variant| variant == name)
            .and_then(|index| u8::try_from(index).ok())
    }
}

/// Element kind of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Int32,
    Int64,
    UInt8,
    Float,
    Bool,
    String,
    Name,
    Enum(Arc<EnumType>),
    Node(NodeTypeRef),
}

impl ValueType {
    pub fn is_node(&self) -> bool {
        matches!(self, ValueType::Node(_))
    }

    pub fn is_enum(&self) -> bool {
        matches!(self, ValueType::Enum(_))
    }

    pub fn node_type(&self) -> Option<NodeTypeId> {
        match self {
            ValueType::Node(node) => Some(node.id),
            _ => None,
        }
    }

    /// Whether a value of this kind can be stored where `other` is expected.
    pub fn is_a(&self, other: &ValueType, hierarchy: &dyn TypeHierarchy) -> bool {
        match (self, other) {
            (ValueType::Node(a), ValueType::Node(b)) => hierarchy.is_subtype(a.id, b.id),
            (ValueType::Enum(_), ValueType::UInt8) | (ValueType::UInt8, ValueType::Enum(_)) => true,
            _ => self == other,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Int32 => f.write_str("int32"),
            ValueType::Int64 => f.write_str("int64"),
            ValueType::UInt8 => f.write_str("uint8"),
            ValueType::Float => f.write_str("float"),
            ValueType::Bool => f.write_str("bool"),
            ValueType::String => f.write_str("string"),
            ValueType::Name => f.write_str("name"),
            ValueType::Enum(e) => write!(f, "enum:{}", e.name()),
            ValueType::Node(n) => write!(f, "node:{}", n.name),
        }
    }
}

/// Answers subtype questions for node types.
pub trait TypeHierarchy {
    /// `true` when `child` equals `parent` or extends it.
    fn is_subtype(&self, child: NodeTypeId, parent: NodeTypeId) -> bool;
}

/// Per-field type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeContext {
    Value(ValueType),
    Sequence(ValueType),
    Mapping(ValueType),
}

impl TypeContext {
    pub fn element(&self) -> &ValueType {
        match self {
            TypeContext::Value(t) | TypeContext::Sequence(t) | TypeContext::Mapping(t) => t,
        }
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, TypeContext::Sequence(_))
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, TypeContext::Mapping(_))
    }

    pub fn is_container(&self) -> bool {
        !matches!(self, TypeContext::Value(_))
    }

    /// `true` for node references and containers of node references.
    pub fn is_node_reference(&self) -> bool {
        self.element().is_node()
    }

    pub fn is_enum(&self) -> bool {
        self.element().is_enum()
    }

    pub fn node_type(&self) -> Option<NodeTypeId> {
        self.element().node_type()
    }

    /// Stable 64-bit hash of the canonical descriptor.
    ///
    /// ```
    /// use datatree_core::{TypeContext, ValueType};
    ///
    /// let a = TypeContext::Sequence(ValueType::Int32);
    /// let b = TypeContext::Sequence(ValueType::Int32);
    /// assert_eq!(a.type_hash(), b.type_hash());
    /// assert_ne!(a.type_hash(), TypeContext::Mapping(ValueType::Int32).type_hash());
    /// ```
    pub fn type_hash(&self) -> u64 {
        let digest = blake3::hash(self.to_string().as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_be_bytes(bytes)
    }

    /// Whether a value described by `self` can be stored in a slot described
    /// by `other`: same container shape and a compatible element.
    pub fn cast_compatible(&self, other: &TypeContext, hierarchy: &dyn TypeHierarchy) -> bool {
        let same_shape = matches!(
            (self, other),
            (TypeContext::Value(_), TypeContext::Value(_))
                | (TypeContext::Sequence(_), TypeContext::Sequence(_))
                | (TypeContext::Mapping(_), TypeContext::Mapping(_))
        );
        same_shape && self.element().is_a(other.element(), hierarchy)
    }
}

impl fmt::Display for TypeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeContext::Value(t) => write!(f, "{t}"),
            TypeContext::Sequence(t) => write!(f, "seq<{t}>"),
            TypeContext::Mapping(t) => write!(f, "map<{t}>"),
        }
    }
}
