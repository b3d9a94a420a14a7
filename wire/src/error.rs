//! Error types for wire format operations.

use std::fmt;

use bitstream::BitError;
use thiserror::Error;

/// Result type for wire decoding.
pub type WireResult<T> = Result<T, DecodeError>;

/// Result type for wire encoding.
pub type EncodeResult<T> = Result<T, EncodeError>;

/// Errors raised while decoding wire structures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The underlying buffer could not satisfy a read.
    #[error("bitstream error: {0}")]
    Bitstream(#[from] BitError),

    /// A field kind tag outside the known set.
    #[error("unknown field tag: {tag}")]
    UnknownFieldTag { tag: u8 },

    /// A primitive kind tag outside the known set.
    #[error("unknown primitive tag: {tag}")]
    UnknownPrimitiveTag { tag: u8 },

    /// A control event tag outside the known set.
    #[error("unknown control event tag: {tag}")]
    UnknownControlTag { tag: u8 },

    /// A `char` payload that is not a Unicode scalar value.
    #[error("invalid char scalar: 0x{value:08X}")]
    InvalidChar { value: u32 },

    /// A declared count or length exceeded the configured limits.
    #[error("{kind} limit exceeded: {actual} > {limit}")]
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },
}

/// Errors raised while encoding wire structures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum EncodeError {
    /// The underlying buffer rejected a write.
    #[error("bitstream error: {0}")]
    Bitstream(#[from] BitError),

    /// The value to encode exceeds the configured limits.
    #[error("{kind} limit exceeded: {actual} > {limit}")]
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },
}

/// Specific wire limits that can be exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    UniqueIdLength,
    AckEntries,
    AcksPerEntry,
    StaticFields,
    DynamicFields,
    NestingDepth,
    CustomBytes,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UniqueIdLength => "unique id length",
            Self::AckEntries => "ack entries",
            Self::AcksPerEntry => "acks per entry",
            Self::StaticFields => "static fields",
            Self::DynamicFields => "dynamic fields",
            Self::NestingDepth => "nesting depth",
            Self::CustomBytes => "custom bytes",
        };
        write!(f, "{name}")
    }
}
