//! Reflected, observable data tree.
//!
//! Node types are described once through a [`Registry`] and compiled into a
//! [`Schema`]. A [`DataTree`] owns node instances in an arena, tracks
//! parent/child ownership through node-reference fields, addresses values by
//! dot-paths ([`PathExecutor`]), delivers bubbling change events and walks
//! nodes through the [`Serializer`]/[`Deserializer`] visitor contract.

pub mod config;
pub mod error;
pub mod events;
pub mod network;
pub mod path;
pub mod schema;
pub mod serialize;
pub mod tree;
pub mod types;
pub mod validation;
pub mod value;

pub use config::{BinaryConfig, DispatchPolicy, JsonConfig, TreeConfig};
pub use error::{ConfigError, DataError, SchemaError};
pub use events::{BindCollection, BindFlags, BindHandle, Delegate, Event};
pub use network::{NetworkBundle, NetworkEvent, NetworkEventKind};
pub use path::{PathExecutor, PathMode, PathState};
pub use schema::{
    Field, FieldHandle, FieldMeta, Link, LinkHandle, LinkMeta, LinkPath, LinkSpec, NodeTypeDef,
    Registry, Schema,
};
pub use serialize::{BinaryDeserializer, BinarySerializer, Deserializer, FieldKey, Serializer};
pub use tree::{DataTree, NodeId, PropertyMut};
pub use types::{EnumType, NodeTypeId, NodeTypeRef, TypeContext, TypeHierarchy, ValueType};
pub use validation::{Report, ReportKind};
pub use value::{DataValue, Name, ScalarValue, Value};
