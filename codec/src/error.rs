//! Error types for codec operations.

use bitstream::BitError;
use schema::SchemaError;
use thiserror::Error;
use wire::{DecodeError, EncodeError};

use crate::types::{ConnectionId, SnapshotHandle, SnapshotId};

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while building, encoding or decoding snapshots.
///
/// Unknown fields and unknown snapshot ids on the wire are not errors; they
/// are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// Schema misuse by the caller.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Malformed or over-limit input.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Output could not be framed.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Buffer-level failure.
    #[error("bitstream error: {0}")]
    Bitstream(#[from] BitError),

    /// Every id on the connection is in use.
    #[error("no snapshot ids left on {connection}")]
    IdsExhausted { connection: ConnectionId },

    /// The peers disagree about which id a snapshot has.
    #[error("snapshot {unique_id:?} is bound to {expected} but the peer sent {found}")]
    IdentityMismatch {
        unique_id: String,
        expected: SnapshotId,
        found: SnapshotId,
    },

    /// The handle does not name a live snapshot.
    #[error("unknown snapshot handle {handle}")]
    UnknownSnapshot { handle: SnapshotHandle },

    /// The snapshot has no id yet.
    #[error("snapshot {unique_id:?} is not bound to an id")]
    NotBound { unique_id: String },

    /// A nested field would create a cycle, cross connections or roles, or
    /// reuse a child that already has a parent.
    #[error("cannot nest {child} under {parent}")]
    InvalidNesting {
        parent: SnapshotHandle,
        child: SnapshotHandle,
    },
}
