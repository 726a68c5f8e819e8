//! Streaming JSON codec for datatree nodes.
//!
//! [`JsonSerializer`] and [`JsonDeserializer`] implement the core
//! [`Serializer`](datatree_core::Serializer) and
//! [`Deserializer`](datatree_core::Deserializer) contract, so a node is
//! walked exactly as it is for the binary codec. Objects carry one key per
//! field, keyed by serialize name. Absent node references are `null`.
//!
//! ```
//! # use datatree_core::{DataTree, FieldMeta, Registry};
//! let mut registry = Registry::new();
//! let info = registry.declare_type("Info").unwrap();
//! let cost = registry.field::<i32>(&info, "cost", FieldMeta::new()).unwrap();
//! registry.finalize_type(&info).unwrap();
//! let mut tree = DataTree::new(registry.compile().unwrap());
//!
//! let node = tree.create(&info).unwrap();
//! datatree_json::from_json_str(&mut tree, node, r#"{"cost": 12}"#, false).unwrap();
//! assert_eq!(tree.get(node, &cost).unwrap(), 12);
//! assert_eq!(datatree_json::to_json(&tree, node).unwrap(), r#"{"cost":12}"#);
//! ```

mod reader;
mod writer;

pub use reader::{JsonDeserializer, Token};
pub use writer::JsonSerializer;

use std::string::FromUtf8Error;

use datatree_core::{DataError, DataTree, JsonConfig, NodeId};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum JsonError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("serialized json is not valid utf-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

/// Writes `node` as JSON text.
pub fn to_json_string(
    tree: &DataTree,
    node: NodeId,
    options: &JsonConfig,
) -> Result<String, JsonError> {
    let mut serializer = JsonSerializer::with_config(options);
    tree.serialize(node, &mut serializer)?;
    Ok(serializer.finish()?)
}

/// Writes `node` with the tree's own JSON settings.
pub fn to_json(tree: &DataTree, node: NodeId) -> Result<String, JsonError> {
    to_json_string(tree, node, &tree.config().json)
}

/// Reads `text` into `node`. See [`DataTree::deserialize`] for `patch`.
pub fn from_json_str(
    tree: &mut DataTree,
    node: NodeId,
    text: &str,
    patch: bool,
) -> Result<(), JsonError> {
    let mut deserializer = JsonDeserializer::new(text);
    tree.deserialize(node, &mut deserializer, patch)?;
    debug!(?node, patch, consumed = deserializer.position(), "read json");
    Ok(())
}
