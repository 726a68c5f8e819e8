//! Content hashes, imprints and deep copies.

use crate::error::DataError;
use crate::schema::Field;
use crate::serialize::{BinarySerializer, Serializer};
use crate::tree::{DataTree, NodeId};

/// Binary writer that writes the first node's body and the hash of every
/// node below it.
struct HashSerializer {
    inner: BinarySerializer,
    started: bool,
}

impl HashSerializer {
    fn new() -> Self {
        Self {
            inner: BinarySerializer::new(),
            started: false,
        }
    }
}

impl Serializer for HashSerializer {
    fn write_key(&mut self, key: &str) {
        self.inner.write_key(key);
    }

    fn write_field_key(&mut self, field: &Field) {
        self.inner.write_field_key(field);
    }

    fn write_array(&mut self, len: usize) {
        self.inner.write_array(len);
    }

    fn write_object(&mut self) {
        self.inner.write_object();
    }

    fn write_map(&mut self, len: usize) {
        self.inner.write_map(len);
    }

    fn write_i32(&mut self, value: i32) {
        self.inner.write_i32(value);
    }

    fn write_i64(&mut self, value: i64) {
        self.inner.write_i64(value);
    }

    fn write_u8(&mut self, value: u8) {
        self.inner.write_u8(value);
    }

    fn write_f32(&mut self, value: f32) {
        self.inner.write_f32(value);
    }

    fn write_bool(&mut self, value: bool) {
        self.inner.write_bool(value);
    }

    fn write_string(&mut self, value: &str) {
        self.inner.write_string(value);
    }

    fn write_name(&mut self, value: &str) {
        self.inner.write_name(value);
    }

    fn write_null(&mut self) {
        self.inner.write_null();
    }

    fn write_node(&mut self, tree: &DataTree, node: Option<NodeId>) -> Result<(), DataError> {
        let Some(id) = node else {
            self.write_null();
            return Ok(());
        };
        if !self.started {
            self.started = true;
            self.write_object();
            let result = tree.serialize_fields(id, self);
            self.pop_object();
            return result;
        }
        let hash = match &tree.node(id)?.cached_hash {
            Some(hash) => hash.clone(),
            None => tree.compute_hash(id)?,
        };
        self.write_string(&hash);
        Ok(())
    }

    fn pop_key(&mut self) {
        self.inner.pop_key();
    }

    fn pop_array(&mut self) {
        self.inner.pop_array();
    }

    fn pop_object(&mut self) {
        self.inner.pop_object();
    }
}

impl DataTree {
    /// Hex content hash of `node`, cached until the node or a descendant
    /// changes.
    pub fn hash(&mut self, node: NodeId) -> Result<String, DataError> {
        if let Some(hash) = &self.node(node)?.cached_hash {
            return Ok(hash.clone());
        }
        // children first so each level reuses the cache below it
        let mut order = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let data = self.node(current)?;
            if data.cached_hash.is_some() {
                continue;
            }
            order.push(current);
            stack.extend(data.children.iter().copied());
        }
        let mut hash = String::new();
        for current in order.into_iter().rev() {
            hash = self.compute_hash(current)?;
            self.node_mut(current)?.cached_hash = Some(hash.clone());
        }
        Ok(hash)
    }

    /// Uncached hash over the type name and the node body.
    pub fn compute_hash(&self, node: NodeId) -> Result<String, DataError> {
        let name = self.type_of(node)?.name().to_string();
        let mut serializer = HashSerializer::new();
        serializer.write_node(self, Some(node))?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(name.as_bytes());
        hasher.update(&serializer.inner.finish());
        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Full binary serialization of `node`, defaults included, cached with
    /// the hash.
    pub fn imprint(&mut self, node: NodeId) -> Result<Vec<u8>, DataError> {
        if let Some(imprint) = &self.node(node)?.cached_imprint {
            return Ok(imprint.clone());
        }
        let mut serializer = BinarySerializer::new();
        self.serialize(node, &mut serializer)?;
        let imprint = serializer.finish();
        self.node_mut(node)?.cached_imprint = Some(imprint.clone());
        Ok(imprint)
    }

    /// Detached deep copy of `node`.
    pub fn copy(&mut self, node: NodeId) -> Result<NodeId, DataError> {
        let imprint = self.imprint(node)?;
        let ty = self.node(node)?.ty;
        let copy = self.create_of(ty)?;
        if let Err(err) = self.from_binary(copy, &imprint, false) {
            self.destroy(copy).ok();
            return Err(err);
        }
        Ok(copy)
    }
}
