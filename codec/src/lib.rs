//! Snapshots, delta compression and the id handshake for snaprep.
//!
//! This is the main crate of the workspace. It ties together bitstream, wire
//! and schema into replicated [`Snapshot`]s coordinated by a
//! [`SnapshotSystem`].
//!
//! # Features
//!
//! - Static fields with typed handles and runtime-keyed dynamic fields
//! - Triggers, nested snapshots and opaque custom payloads
//! - Delta compression against acknowledged baselines
//! - Order-independent id negotiation per connection
//! - Ack side-channel carried in every transport packet
//! - Forward compatible payloads: unknown fields are skipped, never fatal
//!
//! # Example
//!
//! ```
//! use bitstream::{BitReader, BitWriter};
//! use codec::{ConnectionId, Role, SnapshotSystem, SystemConfig};
//!
//! let conn = ConnectionId::new(1);
//! let mut server = SnapshotSystem::new(SystemConfig::default());
//! let mut client = SnapshotSystem::new(SystemConfig::default());
//!
//! let world = server.create_snapshot(conn, "WorldData", Role::Owner);
//! let tick = server.snapshot_mut(world)?.add_primitive(0u32)?;
//! server.setup(world)?;
//!
//! let mirror = client.create_snapshot(conn, "WorldData", Role::Remote);
//! let seen = client.snapshot_mut(mirror)?.add_primitive(0u32)?;
//! client.setup(mirror)?;
//!
//! for (_, event) in server.take_outgoing_events() {
//!     client.on_control_event(conn, event)?;
//! }
//!
//! server.snapshot_mut(world)?.set(tick, 7)?;
//! let mut writer = BitWriter::new();
//! server.write_packet(conn, &[world], &mut writer)?;
//! let bytes = writer.finish();
//!
//! client.read_packet(conn, &mut BitReader::new(&bytes))?;
//! assert_eq!(client.snapshot(mirror)?.get(seen)?, 7);
//! # Ok::<(), codec::CodecError>(())
//! ```

mod allocator;
mod custom;
mod delta;
mod error;
mod field;
mod inbox;
mod limits;
mod skip;
mod snapshot;
mod system;
mod types;

pub use allocator::IdAllocator;
pub use custom::{AsAny, CustomQueue, CustomSnapshot, QueueItem};
pub use delta::{Baseline, DeltaHistory, DeltaSnapshot, DeltaState, PendingAcks};
pub use error::{CodecError, CodecResult};
pub use field::{CustomField, Field, NestedField, PrimitiveField, TriggerField};
pub use inbox::{inbox, InboxSender, Inbound};
pub use limits::{CodecLimits, SystemConfig, MAX_DELTA_HISTORY};
pub use skip::{read_custom_len, read_field_kind, read_header, skip_field_payload, skip_payload};
pub use snapshot::Snapshot;
pub use system::{PumpStats, SnapshotSystem};
pub use types::{ConnectionId, Role, SnapshotHandle, SnapshotId};
pub use wire::Limits as WireLimits;
