//! Wire framing for the snaprep replication protocol.
//!
//! This crate owns the byte layouts that sit around field data: the snapshot
//! payload header, the handshake control events and the delta ack table. It
//! does not know about fields or snapshots, only the structure of the frames.
//!
//! # Design Principles
//!
//! - **Stable wire format** - Fixed-width little-endian fields, no varints.
//! - **Bounded decoding** - Declared counts are validated against [`Limits`] before iteration.
//! - **No domain knowledge** - This crate handles framing, not game logic.
//!
//! # Layouts
//!
//! ```text
//! Header:       u16 static_count, u16 dynamic_count, u8 delta_id
//! Control:      u8 tag, u16 id, u16 len, unique_id bytes
//! Ack table:    u16 num_entries
//!                 per entry: u16 snapshot_id, u16 num_acked, [u8 delta_id]*
//! ```

mod ack;
mod control;
mod error;
mod header;
mod limits;

pub use ack::{decode_ack_table, encode_ack_table, AckEntry};
pub use control::{decode_control_event, encode_control_event, ControlEvent};
pub use error::{DecodeError, EncodeError, EncodeResult, LimitKind, WireResult};
pub use header::{HeaderSlot, SnapshotHeader, HEADER_SIZE};
pub use limits::Limits;
