//! Tree configuration.
//!
//! ```
//! use datatree_core::{DispatchPolicy, TreeConfig};
//!
//! let config = TreeConfig::from_toml_str(
//!     r#"
//!     strict = false
//!     dispatch = "enqueue"
//!
//!     [binary]
//!     write_defaults = false
//!     "#,
//! )
//! .unwrap();
//! assert!(!config.strict);
//! assert_eq!(config.dispatch, DispatchPolicy::Enqueue);
//! assert!(!config.binary.write_defaults);
//! assert!(!config.json.pretty);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Integrity violations return errors when set; otherwise they are
    /// logged and the offending operation is skipped.
    pub strict: bool,
    /// Delivery of the per-node `Changed` event.
    pub dispatch: DispatchPolicy,
    pub binary: BinaryConfig,
    pub json: JsonConfig,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            strict: true,
            dispatch: DispatchPolicy::Immediate,
            binary: BinaryConfig::default(),
            json: JsonConfig::default(),
        }
    }
}

impl TreeConfig {
    /// Strict defaults with lenient integrity handling.
    pub fn lenient() -> Self {
        Self {
            strict: false,
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// When the generic `Changed` event of a node is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DispatchPolicy {
    /// At the end of the outermost mutation batch.
    #[default]
    Immediate,
    /// Parked until [`crate::DataTree::flush_deferred`] is called.
    Enqueue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinaryConfig {
    /// Write fields that hold their type default.
    pub write_defaults: bool,
}

impl Default for BinaryConfig {
    fn default() -> Self {
        Self {
            write_defaults: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonConfig {
    pub pretty: bool,
}
