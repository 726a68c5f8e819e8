//! Node type descriptions.
//!
//! Types are declared on a [`Registry`], given fields and links in
//! declaration order, finalized, and compiled into an immutable [`Schema`]
//! shared by every [`crate::DataTree`] built from it.
//!
//! ```
//! use datatree_core::{FieldMeta, Registry};
//!
//! let mut registry = Registry::new();
//! let item = registry.declare_type("Item").unwrap();
//! let count = registry.field::<i32>(&item, "count", FieldMeta::new()).unwrap();
//! registry.finalize_type(&item).unwrap();
//! let schema = registry.compile().unwrap();
//!
//! assert_eq!(count.index(), 0);
//! assert_eq!(schema.get_fields(item.id)[0].name(), "count");
//! ```

pub mod field;
pub mod link;

pub use field::{field_hash, Field, FieldHandle, FieldMeta, NodeMappingHandle, NodeSequenceHandle};
pub use link::{Link, LinkHandle, LinkKey, LinkMeta, LinkPath, LinkSpec};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::error::SchemaError;
use crate::tree::NodeId;
use crate::types::{EnumType, NodeTypeId, NodeTypeRef, TypeContext, TypeHierarchy, ValueType};
use crate::value::{DataValue, ScalarValue};

/// Fields and links of one node type.
#[derive(Debug, Clone)]
pub struct NodeTypeDef {
    id: NodeTypeId,
    name: Arc<str>,
    parent: Option<NodeTypeId>,
    root: bool,
    finalized: bool,
    fields: Vec<Arc<Field>>,
    links: Vec<Arc<Link>>,
    by_name: HashMap<String, usize>,
    by_serialize_name: HashMap<String, usize>,
    by_hash: HashMap<u32, usize>,
}

impl NodeTypeDef {
    fn new(id: NodeTypeId, name: &str, root: bool) -> Self {
        Self {
            id,
            name: Arc::from(name),
            parent: None,
            root,
            finalized: false,
            fields: Vec::new(),
            links: Vec::new(),
            by_name: HashMap::new(),
            by_serialize_name: HashMap::new(),
            by_hash: HashMap::new(),
        }
    }

    pub fn id(&self) -> NodeTypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_ref(&self) -> NodeTypeRef {
        NodeTypeRef {
            id: self.id,
            name: self.name.clone(),
        }
    }

    pub fn parent(&self) -> Option<NodeTypeId> {
        self.parent
    }

    /// Nodes of a root type are the root of their subtree.
    pub fn is_root(&self) -> bool {
        self.root
    }

    pub fn fields(&self) -> &[Arc<Field>] {
        &self.fields
    }

    pub fn links(&self) -> &[Arc<Link>] {
        &self.links
    }

    pub fn field(&self, index: usize) -> Option<&Arc<Field>> {
        self.fields.get(index)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&Arc<Field>> {
        self.by_name.get(name).and_then(|&i| self.fields.get(i))
    }

    /// Looks a field up by its serialize name, then by its declared name.
    pub fn field_by_serialize_name(&self, name: &str) -> Option<&Arc<Field>> {
        self.by_serialize_name
            .get(name)
            .or_else(|| self.by_name.get(name))
            .and_then(|&i| self.fields.get(i))
    }

    pub fn field_by_hash(&self, hash: u32) -> Option<&Arc<Field>> {
        self.by_hash.get(&hash).and_then(|&i| self.fields.get(i))
    }

    pub fn link_by_name(&self, name: &str) -> Option<&Arc<Link>> {
        self.links.iter().find(|link| link.name == name)
    }

    fn push_field(&mut self, field: Field) -> Result<Arc<Field>, SchemaError> {
        let owner = self.name.to_string();
        if self.by_name.contains_key(&field.name)
            || self.by_serialize_name.contains_key(&field.name)
        {
            return Err(SchemaError::DuplicateName {
                owner,
                name: field.name.clone(),
            });
        }
        if self.by_hash.contains_key(&field.hash) {
            return Err(SchemaError::DuplicateHash {
                owner,
                name: field.name.clone(),
                hash: field.hash,
            });
        }
        if let Some(alias) = field.meta.alias_name() {
            if alias != field.name
                && (self.by_name.contains_key(alias) || self.by_serialize_name.contains_key(alias))
            {
                return Err(SchemaError::DuplicateAlias {
                    owner,
                    name: field.name.clone(),
                    alias: alias.to_string(),
                });
            }
        }
        let index = self.fields.len();
        if field.index != index {
            return Err(SchemaError::IndexMismatch {
                owner,
                name: field.name.clone(),
                declared: field.index,
                stored: index,
            });
        }
        self.by_name.insert(field.name.clone(), index);
        self.by_serialize_name.insert(field.serialize_name().to_string(), index);
        self.by_hash.insert(field.hash, index);
        let field = Arc::new(field);
        self.fields.push(field.clone());
        Ok(field)
    }
}

/// Answers subtype questions over a list of type definitions.
fn is_subtype_in(types: &[NodeTypeDef], child: NodeTypeId, parent: NodeTypeId) -> bool {
    let mut current = Some(child);
    while let Some(id) = current {
        if id == parent {
            return true;
        }
        current = types.get(id.index()).and_then(|def| def.parent);
    }
    false
}

/// Mutable builder for a [`Schema`].
#[derive(Debug, Default)]
pub struct Registry {
    types: Vec<NodeTypeDef>,
    by_name: HashMap<String, NodeTypeId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_type(&mut self, name: &str) -> Result<NodeTypeRef, SchemaError> {
        self.declare(name, false, None)
    }

    /// Declares a type whose instances are the root of their subtree.
    pub fn declare_root_type(&mut self, name: &str) -> Result<NodeTypeRef, SchemaError> {
        self.declare(name, true, None)
    }

    /// Declares a type extending a finalized `parent`, inheriting its fields
    /// at the same indices and its links.
    pub fn declare_subtype(
        &mut self,
        name: &str,
        parent: &NodeTypeRef,
    ) -> Result<NodeTypeRef, SchemaError> {
        let parent_def = self.def(parent.id)?;
        if !parent_def.finalized {
            return Err(SchemaError::NotFinalized(parent_def.name().to_string()));
        }
        let root = parent_def.root;
        self.declare(name, root, Some(parent.id))
    }

    fn declare(
        &mut self,
        name: &str,
        root: bool,
        parent: Option<NodeTypeId>,
    ) -> Result<NodeTypeRef, SchemaError> {
        if self.by_name.contains_key(name) {
            return Err(SchemaError::DuplicateType(name.to_string()));
        }
        let id = NodeTypeId(self.types.len() as u32);
        let mut def = NodeTypeDef::new(id, name, root);
        if let Some(parent) = parent {
            let parent_def = self.def(parent)?;
            def.parent = Some(parent);
            def.fields = parent_def.fields.clone();
            def.links = parent_def.links.clone();
            def.by_name = parent_def.by_name.clone();
            def.by_serialize_name = parent_def.by_serialize_name.clone();
            def.by_hash = parent_def.by_hash.clone();
        }
        debug!(name, root, "declared node type");
        let type_ref = def.type_ref();
        self.by_name.insert(name.to_string(), id);
        self.types.push(def);
        Ok(type_ref)
    }

    fn def(&self, id: NodeTypeId) -> Result<&NodeTypeDef, SchemaError> {
        self.types
            .get(id.index())
            .ok_or_else(|| SchemaError::UnknownType(format!("#{}", id.0)))
    }

    fn def_mut(&mut self, id: NodeTypeId) -> Result<&mut NodeTypeDef, SchemaError> {
        let def = self
            .types
            .get_mut(id.index())
            .ok_or_else(|| SchemaError::UnknownType(format!("#{}", id.0)))?;
        if def.finalized {
            return Err(SchemaError::AlreadyFinalized(def.name().to_string()));
        }
        Ok(def)
    }

    pub fn type_by_name(&self, name: &str) -> Option<NodeTypeRef> {
        self.by_name
            .get(name)
            .and_then(|id| self.types.get(id.index()))
            .map(NodeTypeDef::type_ref)
    }

    /// Appends a field at the next declaration index.
    pub fn register_field(
        &mut self,
        owner: &NodeTypeRef,
        name: &str,
        context: TypeContext,
        meta: FieldMeta,
    ) -> Result<Arc<Field>, SchemaError> {
        let index = self.def(owner.id)?.fields.len();
        self.register_field_at(owner, index, name, context, meta)
    }

    /// Appends a field that the caller expects at `index`.
    pub fn register_field_at(
        &mut self,
        owner: &NodeTypeRef,
        index: usize,
        name: &str,
        context: TypeContext,
        meta: FieldMeta,
    ) -> Result<Arc<Field>, SchemaError> {
        let def = self.def_mut(owner.id)?;
        let field = Field::new(def.name(), name, index, context, meta);
        let field = def.push_field(field)?;
        debug!(owner = %owner.name, name, index, context = %field.context, "registered field");
        Ok(field)
    }

    fn typed<T>(
        &mut self,
        owner: &NodeTypeRef,
        name: &str,
        context: TypeContext,
        meta: FieldMeta,
    ) -> Result<FieldHandle<T>, SchemaError> {
        let field = self.register_field(owner, name, context, meta)?;
        Ok(FieldHandle::new(owner.id, field.index, name))
    }

    pub fn field<T: ScalarValue>(
        &mut self,
        owner: &NodeTypeRef,
        name: &str,
        meta: FieldMeta,
    ) -> Result<FieldHandle<T>, SchemaError> {
        self.typed(owner, name, TypeContext::Value(T::value_type()), meta)
    }

    pub fn sequence<T: ScalarValue>(
        &mut self,
        owner: &NodeTypeRef,
        name: &str,
        meta: FieldMeta,
    ) -> Result<FieldHandle<Vec<T>>, SchemaError> {
        self.typed(owner, name, TypeContext::Sequence(T::value_type()), meta)
    }

    pub fn mapping<T: ScalarValue>(
        &mut self,
        owner: &NodeTypeRef,
        name: &str,
        meta: FieldMeta,
    ) -> Result<FieldHandle<BTreeMap<String, T>>, SchemaError> {
        self.typed(owner, name, TypeContext::Mapping(T::value_type()), meta)
    }

    pub fn enum_field(
        &mut self,
        owner: &NodeTypeRef,
        name: &str,
        ty: &Arc<EnumType>,
        meta: FieldMeta,
    ) -> Result<FieldHandle<u8>, SchemaError> {
        self.typed(owner, name, TypeContext::Value(ValueType::Enum(ty.clone())), meta)
    }

    /// Single owned node reference.
    pub fn node(
        &mut self,
        owner: &NodeTypeRef,
        name: &str,
        target: &NodeTypeRef,
        meta: FieldMeta,
    ) -> Result<FieldHandle<Option<NodeId>>, SchemaError> {
        self.typed(owner, name, TypeContext::Value(ValueType::Node(target.clone())), meta)
    }

    pub fn node_sequence(
        &mut self,
        owner: &NodeTypeRef,
        name: &str,
        target: &NodeTypeRef,
        meta: FieldMeta,
    ) -> Result<NodeSequenceHandle, SchemaError> {
        self.typed(owner, name, TypeContext::Sequence(ValueType::Node(target.clone())), meta)
    }

    pub fn node_mapping(
        &mut self,
        owner: &NodeTypeRef,
        name: &str,
        target: &NodeTypeRef,
        meta: FieldMeta,
    ) -> Result<NodeMappingHandle, SchemaError> {
        self.typed(owner, name, TypeContext::Mapping(ValueType::Node(target.clone())), meta)
    }

    /// Registers a link, or overrides an inherited abstract one.
    pub fn register_link(
        &mut self,
        owner: &NodeTypeRef,
        spec: LinkSpec,
    ) -> Result<Arc<Link>, SchemaError> {
        let def = self.def_mut(owner.id)?;
        let owner_name = def.name().to_string();
        let LinkSpec {
            name,
            key,
            path,
            returns,
            meta,
        } = spec;

        let element = match returns {
            TypeContext::Value(element) => element,
            _ => return Err(SchemaError::ContainerLink { owner: owner_name, name }),
        };

        let key_field = def.field_by_name(&key).ok_or_else(|| SchemaError::UnknownField {
            owner: owner_name.clone(),
            name: key.clone(),
        })?;
        let key_kind = match key_field.context() {
            TypeContext::Value(ValueType::String | ValueType::Name) => LinkKey::Text,
            TypeContext::Value(ValueType::Enum(_)) => LinkKey::Enum,
            TypeContext::Sequence(ValueType::String | ValueType::Name) => LinkKey::Collection,
            other => {
                return Err(SchemaError::UnsupportedLinkKey {
                    owner: owner_name,
                    name,
                    key,
                    ty: other.to_string(),
                })
            }
        };
        let key_field = key_field.index();

        let path_field = match &path {
            LinkPath::Property(property) => {
                let field = def.field_by_name(property).ok_or_else(|| SchemaError::UnknownField {
                    owner: owner_name.clone(),
                    name: property.clone(),
                })?;
                if field.context() != &TypeContext::Value(ValueType::String) {
                    return Err(SchemaError::UnsupportedLinkPath {
                        owner: owner_name,
                        name,
                        path: property.clone(),
                        ty: field.context().to_string(),
                    });
                }
                Some(field.index())
            }
            _ => None,
        };

        if def.field_by_name(&name).is_some() {
            return Err(SchemaError::DuplicateName { owner: owner_name, name });
        }

        let existing = def.links.iter().position(|link| link.name == name);
        let index = match existing {
            Some(index) if def.links[index].is_abstract() => index,
            Some(_) => return Err(SchemaError::LinkOverride { owner: owner_name, name }),
            None => def.links.len(),
        };

        let link = Arc::new(Link {
            name,
            index,
            owner: owner_name,
            key_field,
            key_kind,
            path,
            path_field,
            element,
            meta,
        });
        if index == def.links.len() {
            def.links.push(link.clone());
        } else {
            def.links[index] = link.clone();
        }
        debug!(owner = %owner.name, name = %link.name, index, "registered link");
        Ok(link)
    }

    pub fn link<T: DataValue>(
        &mut self,
        owner: &NodeTypeRef,
        spec: LinkSpec,
    ) -> Result<LinkHandle<T>, SchemaError> {
        let link = self.register_link(owner, spec)?;
        Ok(LinkHandle::new(owner.id, link.index, &link.name))
    }

    /// Closes a type to further fields and links.
    pub fn finalize_type(&mut self, owner: &NodeTypeRef) -> Result<(), SchemaError> {
        let def = self.def_mut(owner.id)?;
        for (position, field) in def.fields.iter().enumerate() {
            if field.index != position {
                return Err(SchemaError::IndexMismatch {
                    owner: def.name().to_string(),
                    name: field.name.clone(),
                    declared: field.index,
                    stored: position,
                });
            }
        }
        def.finalized = true;
        debug!(
            name = %owner.name,
            fields = def.fields.len(),
            links = def.links.len(),
            "finalized node type"
        );
        Ok(())
    }

    pub fn get_fields(&self, owner: &NodeTypeRef) -> Result<&[Arc<Field>], SchemaError> {
        Ok(self.def(owner.id)?.fields())
    }

    /// Checks every type is finalized, propagates read-only through node
    /// references and rejects strict reference cycles.
    pub fn compile(mut self) -> Result<Arc<Schema>, SchemaError> {
        if let Some(def) = self.types.iter().find(|def| !def.finalized) {
            return Err(SchemaError::NotFinalized(def.name().to_string()));
        }
        self.propagate_read_only();
        self.check_strict_cycles()?;
        debug!(types = self.types.len(), "compiled schema");
        Ok(Arc::new(Schema {
            types: self.types,
            by_name: self.by_name,
        }))
    }

    fn propagate_read_only(&mut self) {
        let mut pending: Vec<NodeTypeId> = self
            .types
            .iter()
            .flat_map(|def| def.fields.iter())
            .filter(|field| field.meta.is_read_only())
            .filter_map(|field| field.context.node_type())
            .collect();
        let mut done = vec![false; self.types.len()];
        while let Some(target) = pending.pop() {
            let affected: Vec<NodeTypeId> = self
                .types
                .iter()
                .map(NodeTypeDef::id)
                .filter(|&id| is_subtype_in(&self.types, id, target))
                .collect();
            for id in affected {
                if std::mem::replace(&mut done[id.index()], true) {
                    continue;
                }
                let def = &mut self.types[id.index()];
                for field in def.fields.iter_mut() {
                    if !field.meta.is_read_only() {
                        let mut updated = Field::clone(field);
                        updated.meta.set_read_only();
                        *field = Arc::new(updated);
                    }
                    if let Some(next) = field.context.node_type() {
                        pending.push(next);
                    }
                }
            }
        }
    }

    fn check_strict_cycles(&self) -> Result<(), SchemaError> {
        // 0 = unvisited, 1 = on stack, 2 = done
        fn visit(
            types: &[NodeTypeDef],
            id: NodeTypeId,
            marks: &mut [u8],
        ) -> Result<(), SchemaError> {
            match marks[id.index()] {
                1 => return Err(SchemaError::StrictCycle(types[id.index()].name().to_string())),
                2 => return Ok(()),
                _ => {}
            }
            marks[id.index()] = 1;
            for field in types[id.index()].fields.iter().filter(|f| f.is_owned_strict()) {
                if let Some(target) = field.context.node_type() {
                    visit(types, target, marks)?;
                }
            }
            marks[id.index()] = 2;
            Ok(())
        }

        let mut marks = vec![0u8; self.types.len()];
        for def in &self.types {
            visit(&self.types, def.id, &mut marks)?;
        }
        Ok(())
    }
}

/// Compiled, immutable set of node types.
#[derive(Debug)]
pub struct Schema {
    types: Vec<NodeTypeDef>,
    by_name: HashMap<String, NodeTypeId>,
}

impl Schema {
    pub fn get(&self, id: NodeTypeId) -> Option<&NodeTypeDef> {
        self.types.get(id.index())
    }

    pub fn type_by_name(&self, name: &str) -> Option<&NodeTypeDef> {
        self.by_name.get(name).and_then(|id| self.get(*id))
    }

    /// Field table of a type; empty for unknown ids.
    pub fn get_fields(&self, id: NodeTypeId) -> &[Arc<Field>] {
        self.get(id).map(NodeTypeDef::fields).unwrap_or(&[])
    }

    pub fn get_links(&self, id: NodeTypeId) -> &[Arc<Link>] {
        self.get(id).map(NodeTypeDef::links).unwrap_or(&[])
    }

    pub fn types(&self) -> impl Iterator<Item = &NodeTypeDef> {
        self.types.iter()
    }

    pub fn type_name(&self, id: NodeTypeId) -> &str {
        self.get(id).map(NodeTypeDef::name).unwrap_or("<unknown>")
    }
}

impl TypeHierarchy for Schema {
    fn is_subtype(&self, child: NodeTypeId, parent: NodeTypeId) -> bool {
        is_subtype_in(&self.types, child, parent)
    }
}
