use datatree_buffers::BufferError;
use thiserror::Error;

use crate::tree::NodeId;
use crate::types::NodeTypeId;

/// Failures raised while describing node types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("node type {0} is already declared")]
    DuplicateType(String),
    #[error("unknown node type {0}")]
    UnknownType(String),
    #[error("node type {0} is already finalized")]
    AlreadyFinalized(String),
    #[error("node type {0} is not finalized")]
    NotFinalized(String),
    #[error("duplicate name for property {owner}::{name}")]
    DuplicateName { owner: String, name: String },
    #[error("can't generate unique hash for property {owner}::{name} {hash}")]
    DuplicateHash { owner: String, name: String, hash: u32 },
    #[error("duplicate alias {alias} for property {owner}::{name}")]
    DuplicateAlias {
        owner: String,
        name: String,
        alias: String,
    },
    #[error("field index mismatch for {owner}::{name}: declared {declared}, stored {stored}")]
    IndexMismatch {
        owner: String,
        name: String,
        declared: usize,
        stored: usize,
    },
    #[error("unknown field {owner}::{name}")]
    UnknownField { owner: String, name: String },
    #[error("link {owner}::{name} must return a non-container type")]
    ContainerLink { owner: String, name: String },
    #[error("link {owner}::{name} key field {key} has unsupported type {ty}")]
    UnsupportedLinkKey {
        owner: String,
        name: String,
        key: String,
        ty: String,
    },
    #[error("link {owner}::{name} path property {path} has unsupported type {ty}")]
    UnsupportedLinkPath {
        owner: String,
        name: String,
        path: String,
        ty: String,
    },
    #[error("can't override link {owner}::{name}")]
    LinkOverride { owner: String, name: String },
    #[error("strict node references form a cycle through {0}")]
    StrictCycle(String),
}

/// Failures raised by tree operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),
    #[error("unknown node type {0:?}")]
    UnknownType(NodeTypeId),
    #[error("node {node:?} has no field {field}")]
    UnknownField { node: NodeId, field: String },
    #[error("field handle for {owner} used on node of type {actual}")]
    ForeignHandle { owner: String, actual: String },
    #[error("value for {field} does not match type {expected}")]
    TypeMismatch { field: String, expected: String },
    #[error("property {0} is read-only")]
    ReadOnly(String),
    #[error("strict property {0} can't be null")]
    StrictNull(String),
    #[error("illegal key \"{key}\" for map {field}")]
    IllegalKey { field: String, key: String },
    #[error("child {0:?} already added")]
    AlreadyAttached(NodeId),
    #[error("child {0:?} not added")]
    NotAttached(NodeId),
    #[error("node {0:?} can't own one of its ancestors")]
    Cycle(NodeId),
    #[error("node {0:?} is still attached to a parent")]
    StillAttached(NodeId),
    #[error("can't resolve path \"{path}\": {reason}")]
    Path { path: String, reason: String },
    #[error("link {0} is abstract")]
    AbstractLink(String),
    #[error("link {0} doesn't have root data")]
    NoRoot(String),
    #[error("link {0} without nullable meta can't be empty")]
    EmptyLink(String),
    #[error("link {link} (path: {path}) without nullable meta can't be null")]
    NullLink { link: String, path: String },
    #[error("deserialization failed: {0}")]
    Codec(String),
    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),
}

/// Failures raised while loading a [`crate::TreeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse failed: {0}")]
    Parse(#[from] toml::de::Error),
}
