//! Schema violation errors.

use std::fmt;

use thiserror::Error;

use crate::value::DynamicKey;
use crate::FieldId;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Address of a field inside a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldRef {
    Static(FieldId),
    Dynamic(DynamicKey),
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(id) => write!(f, "static field #{id}"),
            Self::Dynamic(key) => write!(f, "dynamic field {key}"),
        }
    }
}

/// Errors raised by misuse of a snapshot schema.
///
/// These are programmer errors and surface at the call site.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A static field was registered after setup.
    #[error("snapshot {unique_id:?} is set up; static fields are closed")]
    SchemaClosed { unique_id: String },

    /// Setup was called twice.
    #[error("snapshot {unique_id:?} is already set up")]
    AlreadySetup { unique_id: String },

    /// All 65536 static field ids are taken.
    #[error("snapshot {unique_id:?} has no static field ids left")]
    FieldIdsExhausted { unique_id: String },

    /// A raw kind tag outside the supported set.
    #[error("unsupported primitive kind tag {tag}")]
    UnsupportedKind { tag: u8 },

    /// A dynamic field with this key already exists.
    #[error("duplicate dynamic key {key}")]
    DuplicateDynamicKey { key: DynamicKey },

    /// A field was accessed as the wrong kind or type.
    #[error("{field} holds {found}, not {expected}")]
    FieldTypeMismatch {
        field: FieldRef,
        expected: &'static str,
        found: &'static str,
    },

    /// No field at this address.
    #[error("no {field}")]
    UnknownField { field: FieldRef },
}
