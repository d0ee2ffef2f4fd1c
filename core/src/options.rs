//! Compilation options.

use serde::{Deserialize, Serialize};

/// Settings that change how a schema document is compiled.
///
/// Deserializable so that callers can embed it in their own configuration
/// files; missing fields take their defaults.
///
/// # Examples
///
/// ```
/// use stream_schema_core::CompileOptions;
///
/// let options: CompileOptions = serde_json::from_str("{}").unwrap();
/// assert!(options.validate_formats);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Enforce the `format` keyword. When disabled, `format` is still
    /// type-checked in the schema but never rejects an instance.
    pub validate_formats: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            validate_formats: true,
        }
    }
}
