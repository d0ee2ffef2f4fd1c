//! Error types for schema compilation.
//!
//! Every failure carries the JSON Pointer of the schema location that caused
//! it (`""` is the document root). Validating an instance never produces one
//! of these; a non-conforming instance simply yields `false`.

use thiserror::Error;

/// Errors raised while resolving references in, or compiling, a schema
/// document.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A schema (or sub-schema) is not a JSON object.
    #[error("invalid JSON Schema at '{location}': a schema must be of type 'object'")]
    NotAnObject { location: String },

    /// A keyword has a value of the wrong JSON type.
    #[error("invalid JSON Schema at '{location}': \"{keyword}\" must be of type {expected}")]
    WrongType {
        location: String,
        keyword: &'static str,
        expected: &'static str,
    },

    /// An array keyword that must list at least one element is empty.
    #[error("invalid JSON Schema at '{location}': \"{keyword}\" must have at least one element")]
    EmptyArray {
        location: String,
        keyword: &'static str,
    },

    /// A keyword that must list unique strings contains a duplicate.
    #[error("invalid JSON Schema at '{location}': duplicate entry '{entry}' in \"{keyword}\"")]
    DuplicateEntry {
        location: String,
        keyword: &'static str,
        entry: String,
    },

    /// `type` names something other than the seven primitive types.
    #[error("invalid JSON Schema at '{location}': invalid primitive type '{name}'")]
    UnknownType { location: String, name: String },

    /// `type` lists the same primitive type twice.
    #[error("invalid JSON Schema at '{location}': duplicate primitive type '{name}'")]
    DuplicateType { location: String, name: String },

    /// A numeric keyword is outside its allowed range.
    #[error("invalid JSON Schema at '{location}': \"{keyword}\" must be {constraint}")]
    OutOfRange {
        location: String,
        keyword: &'static str,
        constraint: &'static str,
    },

    /// `exclusiveMaximum`/`exclusiveMinimum` without the bound they modify.
    #[error("invalid JSON Schema at '{location}': \"{keyword}\" requires presence of \"{requires}\"")]
    MissingPrerequisite {
        location: String,
        keyword: &'static str,
        requires: &'static str,
    },

    /// `pattern` or a `patternProperties` key is not a valid regular expression.
    #[error("invalid JSON Schema at '{location}': \"{keyword}\" must be a regular expression: {source}")]
    InvalidRegex {
        location: String,
        keyword: &'static str,
        #[source]
        source: regex::Error,
    },

    /// A `$ref` fragment cannot be resolved against the document.
    #[error("invalid JSON Reference '{reference}' at '{location}': {reason}")]
    InvalidReference {
        location: String,
        reference: String,
        reason: String,
    },

    /// A `$ref` resolves to the object that contains it.
    #[error("invalid JSON Reference '{reference}' at '{location}': self reference")]
    SelfReference { location: String, reference: String },

    /// A schema reaches itself through combinators alone, so validating any
    /// value against it would never bottom out.
    #[error("invalid JSON Schema at '{location}': schema recurses through allOf/anyOf/oneOf/not/dependencies without consuming input")]
    UnguardedRecursion { location: String },
}

/// Convenience alias for results with [`SchemaError`].
pub type Result<T> = std::result::Result<T, SchemaError>;
