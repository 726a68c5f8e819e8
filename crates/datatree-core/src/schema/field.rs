use std::collections::BTreeMap;
use std::marker::PhantomData;

use tracing::error;

use crate::tree::NodeId;
use crate::types::{NodeTypeId, TypeContext};

/// Stable 32-bit hash of a field name: the first four bytes of its blake3
/// digest, big-endian.
///
/// ```
/// use datatree_core::schema::field_hash;
///
/// assert_eq!(field_hash("health"), field_hash("health"));
/// assert_ne!(field_hash("health"), field_hash("mana"));
/// ```
pub fn field_hash(name: &str) -> u32 {
    let digest = blake3::hash(name.as_bytes());
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&digest.as_bytes()[..4]);
    u32::from_be_bytes(bytes)
}

/// Declared flags of a field.
///
/// ```
/// use datatree_core::FieldMeta;
///
/// let meta = FieldMeta::new().event().bubbles().alias("hp");
/// assert!(meta.is_event() && meta.is_bubbling());
/// assert_eq!(meta.alias_name(), Some("hp"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMeta {
    read_only: bool,
    strict: bool,
    alias: Option<String>,
    hidden: bool,
    deprecated: bool,
    event: bool,
    bubbles: bool,
    custom_type: Option<String>,
}

impl FieldMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects writes through the public setters.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Non-nullable. Strict node references are allocated with their owner.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Name used by the name-keyed codecs instead of the field name.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Still read by deserializers, no longer written.
    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    /// Deliver `{name}Changed` to every listener, not only to
    /// [`crate::BindFlags::IGNORE_FIELD_META`] ones.
    pub fn event(mut self) -> Self {
        self.event = true;
        self
    }

    pub fn bubbles(mut self) -> Self {
        self.bubbles = true;
        self
    }

    pub fn custom_type(mut self, name: impl Into<String>) -> Self {
        self.custom_type = Some(name.into());
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn alias_name(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecated
    }

    pub fn is_event(&self) -> bool {
        self.event
    }

    pub fn is_bubbling(&self) -> bool {
        self.bubbles
    }

    pub fn custom_type_name(&self) -> Option<&str> {
        self.custom_type.as_deref()
    }

    pub(crate) fn set_read_only(&mut self) {
        self.read_only = true;
    }

    /// Drops flag combinations that can't be honoured and logs them.
    pub(crate) fn resolve_conflicts(&mut self, owner: &str, name: &str) {
        if self.strict && self.event {
            error!(owner, name, "strict property can't be an event property");
            self.event = false;
            self.bubbles = false;
        }
    }
}

/// Immutable descriptor of one declared property.
#[derive(Debug, Clone)]
pub struct Field {
    pub(crate) name: String,
    pub(crate) index: usize,
    pub(crate) hash: u32,
    pub(crate) owner: String,
    pub(crate) context: TypeContext,
    pub(crate) meta: FieldMeta,
    pub(crate) changed_event: String,
}

impl Field {
    pub(crate) fn new(
        owner: &str,
        name: &str,
        index: usize,
        context: TypeContext,
        mut meta: FieldMeta,
    ) -> Self {
        meta.resolve_conflicts(owner, name);
        Self {
            name: name.to_string(),
            index,
            hash: field_hash(name),
            owner: owner.to_string(),
            context,
            meta,
            changed_event: format!("{name}Changed"),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Offset of the property slot on every node of the owning type.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// Name of the type that declared the field.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn context(&self) -> &TypeContext {
        &self.context
    }

    pub fn meta(&self) -> &FieldMeta {
        &self.meta
    }

    /// `"{name}Changed"`.
    pub fn changed_event(&self) -> &str {
        &self.changed_event
    }

    pub fn serialize_name(&self) -> &str {
        self.meta.alias_name().unwrap_or(&self.name)
    }

    /// Strict single node reference: allocated with its owner.
    pub fn is_owned_strict(&self) -> bool {
        self.meta.strict
            && matches!(self.context, TypeContext::Value(_))
            && self.context.is_node_reference()
    }
}

/// Typed accessor for a field, returned at registration.
///
/// `T` is the Rust view of the slot: a scalar, `Vec<_>`, `BTreeMap<String, _>`,
/// `Option<NodeId>` for a single node reference.
#[derive(Debug)]
pub struct FieldHandle<T> {
    pub(crate) owner: NodeTypeId,
    pub(crate) index: usize,
    pub(crate) name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> FieldHandle<T> {
    pub(crate) fn new(owner: NodeTypeId, index: usize, name: &str) -> Self {
        Self {
            owner,
            index,
            name: name.to_string(),
            _marker: PhantomData,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> NodeTypeId {
        self.owner
    }

    /// The same slot viewed through a subtype. Inherited fields keep their
    /// index, so the handle stays valid.
    pub fn cast<U>(&self) -> FieldHandle<U> {
        FieldHandle::new(self.owner, self.index, &self.name)
    }
}

impl<T> Clone for FieldHandle<T> {
    fn clone(&self) -> Self {
        FieldHandle::new(self.owner, self.index, &self.name)
    }
}

/// Handle for a sequence of owned nodes.
pub type NodeSequenceHandle = FieldHandle<Vec<NodeId>>;
/// Handle for a mapping of owned nodes.
pub type NodeMappingHandle = FieldHandle<BTreeMap<String, NodeId>>;
