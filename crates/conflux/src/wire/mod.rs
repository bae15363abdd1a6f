//! Schema-driven conversion between object graphs and wire documents.
//!
//! The wire document is a structured tree of scalars, arrays, and objects
//! (`serde_json::Value`). Conversion is driven entirely by a type's derived
//! [`Schema`]: the [`marshal`] walker turns an object into a document
//! (writing header-bound fields onto the outgoing header map as a side
//! effect), and the [`unmarshal`] walker populates a fresh object from a
//! document and a response header map.
//!
//! # Example
//!
//! ```ignore
//! use conflux::prelude::*;
//!
//! #[derive(WireObject, Clone, Default)]
//! struct Echo {
//!     #[wire(name = "args.name")]
//!     name: Option<String>,
//! }
//!
//! let mut headers = Headers::new();
//! let doc = wire::marshal(&echo, &mut headers)?;
//! let back: Echo = wire::unmarshal(&doc, &Headers::new())?;
//! ```

mod codec;
mod marshal;
mod schema;
mod unmarshal;
mod value;

use std::fmt;

pub use codec::{Codec, CodecRegistry, JsonCodec};
pub use marshal::marshal;
pub use schema::{
    ElemKind, FieldDescriptor, FieldKind, FieldOrigin, ScalarKind, Schema, SchemaRef, WireObject,
};
pub use unmarshal::{unmarshal, unmarshal_into};
pub use value::FieldValue;

/// A schema/document mismatch during conversion.
///
/// Conversion failures indicate a configuration problem (the declared
/// schema does not match the wire data) and are surfaced as fatal rather
/// than retryable errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConvertError {
    /// A document leaf had an unexpected value type.
    TypeMismatch {
        /// The qualified field (`Type.field`).
        field: String,
        /// The declared type.
        expected: &'static str,
        /// The actual document value type.
        actual: String,
    },
    /// A header value failed to parse into the declared primitive type.
    Parse {
        /// The qualified field (`Type.field`).
        field: String,
        /// Parse failure detail.
        message: String,
    },
}

impl ConvertError {
    /// A declared-vs-actual type mismatch at the given field.
    pub fn mismatch(field: &str, expected: &'static str, actual: &str) -> Self {
        Self::TypeMismatch {
            field: field.to_string(),
            expected,
            actual: actual.to_string(),
        }
    }

    /// A primitive parse failure at the given field.
    pub fn parse(field: &str, message: impl Into<String>) -> Self {
        Self::Parse {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch {
                field,
                expected,
                actual,
            } => write!(
                f,
                "conversion failed at {field}: declared {expected}, document has {actual}"
            ),
            Self::Parse { field, message } => {
                write!(f, "conversion failed at {field}: {message}")
            }
        }
    }
}

impl std::error::Error for ConvertError {}

/// The document value type name, used in conversion diagnostics.
pub(crate) fn document_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
