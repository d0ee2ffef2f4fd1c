//! Streaming JSON Schema (draft 4) validation.
//!
//! This crate compiles a JSON Schema document once and then validates JSON
//! values against it from a stream of parse events, so an instance never has
//! to be materialized in memory:
//!
//! - [`SchemaDocument`] resolves internal `$ref`s into location aliases.
//! - [`CompiledSchema`] checks every reachable schema object and stores it as
//!   a [`CompiledNode`] in an arena addressed by [`NodeHandle`].
//! - [`ValidationSession`] is a [`Consumer`] of [`events`] that keeps a
//!   running verdict and decides it in [`ValidationSession::finalize`].
//!
//! Supporting pieces are public for reuse: [`Number`] keeps the literal
//! subtype of JSON numbers, [`HashAccumulator`] digests a value for
//! `uniqueItems`, [`ValueMatcher`] compares a stream against an `enum` entry,
//! and [`Format`] implements the `format` keyword.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use stream_schema_core::*;
//!
//! let schema = CompiledSchema::build(json!({
//!     "definitions": {"tag": {"type": "string", "pattern": "^[a-z]+$"}},
//!     "type": "array",
//!     "items": {"$ref": "#/definitions/tag"},
//!     "uniqueItems": true
//! }))
//! .unwrap();
//!
//! assert!(schema.validate(&json!(["alpha", "beta"])));
//! assert!(!schema.validate(&json!(["alpha", "alpha"])));
//!
//! // Events can come straight from a parser.
//! let mut session = schema.consumer();
//! events::from_str(r#"["Alpha"]"#, &mut session).unwrap();
//! assert!(!session.finalize());
//! ```

mod compare;
mod compiler;
mod error;
pub mod events;
mod format;
mod hash;
mod node;
mod number;
mod options;
mod reference;
mod session;

pub use compare::ValueMatcher;
pub use compiler::{CompiledSchema, SchemaCompiler};
pub use error::{Result, SchemaError};
pub use events::Consumer;
pub use format::Format;
pub use hash::{HashAccumulator, ValueDigest};
pub use node::{Additional, CompiledNode, Items, NodeHandle, TypeSet};
pub use number::{Bound, MultipleOf, Number, compare};
pub use options::CompileOptions;
pub use reference::SchemaDocument;
pub use session::ValidationSession;
