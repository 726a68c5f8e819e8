use std::marker::PhantomData;

use crate::types::{NodeTypeId, TypeContext, ValueType};

/// Where a link looks for its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkPath {
    /// Fixed dot-path from the owner's root.
    Static(String),
    /// Current value of a string field of the owner.
    Property(String),
    /// No path; a subtype must override the link before it is used.
    Abstract,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkMeta {
    pub nullable: bool,
}

impl LinkMeta {
    pub fn nullable() -> Self {
        Self { nullable: true }
    }
}

/// Declaration of a link passed to [`crate::Registry::register_link`].
#[derive(Debug, Clone)]
pub struct LinkSpec {
    pub name: String,
    /// Field of the owner holding the key appended to the path.
    pub key: String,
    pub path: LinkPath,
    /// Type of one resolved value. Containers are rejected.
    pub returns: TypeContext,
    pub meta: LinkMeta,
}

impl LinkSpec {
    pub fn new(
        name: impl Into<String>,
        key: impl Into<String>,
        path: LinkPath,
        returns: ValueType,
    ) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            path,
            returns: TypeContext::Value(returns),
            meta: LinkMeta::default(),
        }
    }

    pub fn nullable(mut self) -> Self {
        self.meta.nullable = true;
        self
    }
}

/// How the key field produces keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKey {
    /// String or name field.
    Text,
    /// Enum field; the variant name is the key.
    Enum,
    /// Sequence of strings or names; the link yields a sequence.
    Collection,
}

#[derive(Debug, Clone)]
pub struct Link {
    pub(crate) name: String,
    pub(crate) index: usize,
    pub(crate) owner: String,
    pub(crate) key_field: usize,
    pub(crate) key_kind: LinkKey,
    pub(crate) path: LinkPath,
    pub(crate) path_field: Option<usize>,
    pub(crate) element: ValueType,
    pub(crate) meta: LinkMeta,
}

impl Link {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn key_field(&self) -> usize {
        self.key_field
    }

    pub fn key_kind(&self) -> LinkKey {
        self.key_kind
    }

    pub fn path(&self) -> &LinkPath {
        &self.path
    }

    pub fn path_field(&self) -> Option<usize> {
        self.path_field
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self.path, LinkPath::Abstract)
    }

    pub fn is_collection(&self) -> bool {
        self.key_kind == LinkKey::Collection
    }

    pub fn meta(&self) -> LinkMeta {
        self.meta
    }

    /// Type of the value produced by [`crate::DataTree::link`].
    pub fn return_context(&self) -> TypeContext {
        if self.is_collection() {
            TypeContext::Sequence(self.element.clone())
        } else {
            TypeContext::Value(self.element.clone())
        }
    }

    pub fn element(&self) -> &ValueType {
        &self.element
    }
}

/// Typed accessor for a link. `T` is a `Vec` for collection links.
#[derive(Debug)]
pub struct LinkHandle<T> {
    pub(crate) owner: NodeTypeId,
    pub(crate) index: usize,
    pub(crate) name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> LinkHandle<T> {
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
}

impl<T> Clone for LinkHandle<T> {
    fn clone(&self) -> Self {
        LinkHandle::new(self.owner, self.index, &self.name)
    }
}
