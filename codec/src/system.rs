//! The per-process coordinator: snapshot arena, id handshake and acks.

use std::collections::{BTreeMap, HashMap, HashSet};

use bitstream::{BitReader, BitWriter};
use crossbeam_channel::Receiver;
use schema::DynamicKey;
use tracing::{debug, info, trace, warn};
use wire::{decode_ack_table, encode_ack_table, AckEntry, ControlEvent, EncodeError, LimitKind, SnapshotHeader};

use crate::allocator::IdAllocator;
use crate::delta::{DeltaHistory, DeltaState, PendingAcks};
use crate::error::{CodecError, CodecResult};
use crate::field::{Field, NestedField};
use crate::inbox::Inbound;
use crate::limits::{CodecLimits, SystemConfig};
use crate::skip::{check_depth, skip_payload};
use crate::snapshot::Snapshot;
use crate::types::{ConnectionId, Role, SnapshotHandle, SnapshotId};

/// Handshake and ack bookkeeping for one connection.
#[derive(Debug, Default)]
struct ConnectionInterface {
    allocator: IdAllocator,
    // ids announced by the peer before the local snapshot set up
    stash: HashMap<String, SnapshotId>,
    // remote snapshots set up before the peer announced their id
    waiting: HashMap<String, SnapshotHandle>,
    // snapshots that asked for delta compression before they were bound
    delta_waiting: HashSet<SnapshotHandle>,
    owned: BTreeMap<SnapshotId, SnapshotHandle>,
    remote: BTreeMap<SnapshotId, SnapshotHandle>,
}

/// Counters returned by [`SnapshotSystem::pump`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    /// Messages taken off the queue.
    pub messages: usize,
    /// Snapshot updates applied from packets.
    pub updates: usize,
    /// Messages whose processing failed.
    pub failures: usize,
}

/// Owns every snapshot of the process and the per-connection handshake
/// state.
///
/// All methods run on the tick thread. Transport threads hand their events
/// over through an [`inbox`](crate::inbox()) drained by [`pump`](Self::pump).
#[derive(Debug, Default)]
pub struct SnapshotSystem {
    config: SystemConfig,
    snapshots: BTreeMap<SnapshotHandle, Snapshot>,
    connections: BTreeMap<ConnectionId, ConnectionInterface>,
    outgoing: Vec<(ConnectionId, ControlEvent)>,
    next_handle: u64,
}

impl SnapshotSystem {
    #[must_use]
    pub fn new(config: SystemConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Creates an empty snapshot for `connection`. Register fields on it,
    /// then call [`setup`](Self::setup).
    pub fn create_snapshot(
        &mut self,
        connection: ConnectionId,
        unique_id: impl Into<String>,
        role: Role,
    ) -> SnapshotHandle {
        let handle = SnapshotHandle::new(self.next_handle);
        self.next_handle += 1;
        self.connections.entry(connection).or_default();
        let snapshot = Snapshot::new(unique_id.into(), role, connection);
        trace!(%connection, %handle, unique_id = snapshot.unique_id(), ?role, "created snapshot");
        self.snapshots.insert(handle, snapshot);
        handle
    }

    pub fn snapshot(&self, handle: SnapshotHandle) -> CodecResult<&Snapshot> {
        self.snapshots
            .get(&handle)
            .ok_or(CodecError::UnknownSnapshot { handle })
    }

    pub fn snapshot_mut(&mut self, handle: SnapshotHandle) -> CodecResult<&mut Snapshot> {
        self.snapshots
            .get_mut(&handle)
            .ok_or(CodecError::UnknownSnapshot { handle })
    }

    #[must_use]
    pub fn contains(&self, handle: SnapshotHandle) -> bool {
        self.snapshots.contains_key(&handle)
    }

    /// Number of live snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Live snapshot handles in creation order.
    pub fn handles(&self) -> impl Iterator<Item = SnapshotHandle> + '_ {
        self.snapshots.keys().copied()
    }

    /// Finds a snapshot by connection and unique id.
    #[must_use]
    pub fn find(&self, connection: ConnectionId, unique_id: &str) -> Option<SnapshotHandle> {
        self.snapshots
            .iter()
            .find(|(_, s)| s.connection() == connection && s.unique_id() == unique_id)
            .map(|(handle, _)| *handle)
    }

    /// Remote snapshot bound to `id` on `connection`.
    #[must_use]
    pub fn remote_handle(&self, connection: ConnectionId, id: SnapshotId) -> Option<SnapshotHandle> {
        self.connections
            .get(&connection)
            .and_then(|iface| iface.remote.get(&id).copied())
    }

    /// Owned snapshot bound to `id` on `connection`.
    #[must_use]
    pub fn owned_handle(&self, connection: ConnectionId, id: SnapshotId) -> Option<SnapshotHandle> {
        self.connections
            .get(&connection)
            .and_then(|iface| iface.owned.get(&id).copied())
    }

    /// Number of connections with handshake state.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    // ---- handshake ----

    /// Closes the static schema and starts the id handshake.
    ///
    /// An owner allocates an id right away and queues an
    /// `AllocateSnapshotId` event for the peer. A remote snapshot binds to a
    /// stashed id if the peer's event already arrived, and waits otherwise.
    pub fn setup(&mut self, handle: SnapshotHandle) -> CodecResult<()> {
        let snapshot = self.snapshot_mut(handle)?;
        snapshot.mark_setup()?;
        let connection = snapshot.connection();
        let role = snapshot.role();
        let unique_id = snapshot.unique_id().to_owned();
        let iface = self.connections.entry(connection).or_default();

        match role {
            Role::Owner => {
                let Some(id) = iface.allocator.allocate() else {
                    warn!(%connection, %unique_id, "snapshot ids exhausted");
                    if let Some(snapshot) = self.snapshots.get_mut(&handle) {
                        snapshot.clear_setup();
                    }
                    return Err(CodecError::IdsExhausted { connection });
                };
                self.bind(handle, id);
                self.outgoing.push((
                    connection,
                    ControlEvent::AllocateSnapshotId {
                        id: id.raw(),
                        unique_id,
                    },
                ));
            }
            Role::Remote => {
                if let Some(id) = iface.stash.remove(&unique_id) {
                    trace!(%connection, %unique_id, id = id.raw(), "consumed stashed id");
                    self.bind(handle, id);
                } else {
                    trace!(%connection, %unique_id, "awaiting id from peer");
                    iface.waiting.insert(unique_id, handle);
                }
            }
        }
        Ok(())
    }

    /// Applies a handshake event from the peer.
    pub fn on_control_event(&mut self, connection: ConnectionId, event: ControlEvent) -> CodecResult<()> {
        match event {
            ControlEvent::AllocateSnapshotId { id, unique_id } => {
                self.on_allocate(connection, SnapshotId::new(id), unique_id)
            }
            ControlEvent::ReleaseSnapshotId { id, unique_id } => {
                self.on_release(connection, SnapshotId::new(id), &unique_id);
                Ok(())
            }
        }
    }

    fn on_allocate(&mut self, connection: ConnectionId, id: SnapshotId, unique_id: String) -> CodecResult<()> {
        let iface = self.connections.entry(connection).or_default();
        if let Some(handle) = iface.waiting.remove(&unique_id) {
            self.bind(handle, id);
            return Ok(());
        }

        let bound = iface.remote.iter().find(|(_, handle)| {
            self.snapshots
                .get(handle)
                .is_some_and(|s| s.unique_id() == unique_id)
        });
        if let Some((&expected, _)) = bound {
            if expected != id {
                warn!(%connection, %unique_id, expected = expected.raw(), found = id.raw(), "peer disagrees about snapshot id");
                return Err(CodecError::IdentityMismatch {
                    unique_id,
                    expected,
                    found: id,
                });
            }
            trace!(%connection, %unique_id, "duplicate allocation event");
            return Ok(());
        }

        trace!(%connection, %unique_id, id = id.raw(), "stashed id for a snapshot not set up yet");
        iface.stash.insert(unique_id, id);
        Ok(())
    }

    fn on_release(&mut self, connection: ConnectionId, id: SnapshotId, unique_id: &str) {
        let Some(iface) = self.connections.get_mut(&connection) else {
            return;
        };
        if iface.stash.get(unique_id) == Some(&id) {
            iface.stash.remove(unique_id);
            trace!(%connection, %unique_id, "dropped stashed id");
        }
        let Some(handle) = iface.remote.remove(&id) else {
            return;
        };
        let Some(snapshot) = self.snapshots.get_mut(&handle) else {
            return;
        };
        snapshot.unbind();
        if matches!(snapshot.delta, DeltaState::Inbound(_)) {
            snapshot.delta = DeltaState::Requested;
            iface.delta_waiting.insert(handle);
        }
        iface.waiting.insert(snapshot.unique_id().to_owned(), handle);
        debug!(%connection, %unique_id, id = id.raw(), "peer released snapshot");
    }

    fn bind(&mut self, handle: SnapshotHandle, id: SnapshotId) {
        let Some(snapshot) = self.snapshots.get_mut(&handle) else {
            return;
        };
        snapshot.bind(id);
        let connection = snapshot.connection();
        let iface = self.connections.entry(connection).or_default();
        if snapshot.is_owner() {
            iface.owned.insert(id, handle);
        } else {
            iface.remote.insert(id, handle);
        }
        let requested = iface.delta_waiting.remove(&handle);
        if requested || matches!(snapshot.delta, DeltaState::Requested) {
            snapshot.delta = active_delta_state(snapshot.role(), &self.config);
        }
        debug!(
            %connection,
            unique_id = snapshot.unique_id(),
            id = id.raw(),
            delta = snapshot.is_delta_compressing(),
            "bound snapshot"
        );
    }

    /// Drains every queued handshake event.
    pub fn take_outgoing_events(&mut self) -> Vec<(ConnectionId, ControlEvent)> {
        std::mem::take(&mut self.outgoing)
    }

    /// Drains the queued handshake events for one connection.
    pub fn take_outgoing_events_for(&mut self, connection: ConnectionId) -> Vec<ControlEvent> {
        let (mine, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.outgoing)
            .into_iter()
            .partition(|(c, _)| *c == connection);
        self.outgoing = rest;
        mine.into_iter().map(|(_, event)| event).collect()
    }

    /// Turns on delta compression. Takes effect immediately when the
    /// snapshot is bound, otherwise when it binds.
    pub fn enable_delta_compression(&mut self, handle: SnapshotHandle) -> CodecResult<()> {
        let snapshot = self
            .snapshots
            .get_mut(&handle)
            .ok_or(CodecError::UnknownSnapshot { handle })?;
        if snapshot.delta.is_active() {
            return Ok(());
        }
        if snapshot.is_ready() {
            snapshot.delta = active_delta_state(snapshot.role(), &self.config);
            debug!(unique_id = snapshot.unique_id(), "delta compression active");
        } else {
            snapshot.delta = DeltaState::Requested;
            self.connections
                .entry(snapshot.connection())
                .or_default()
                .delta_waiting
                .insert(handle);
            trace!(unique_id = snapshot.unique_id(), "delta compression deferred until bound");
        }
        Ok(())
    }

    // ---- nesting ----

    /// Registers `child` as a static nested field of `parent`.
    pub fn add_nested(&mut self, parent: SnapshotHandle, child: SnapshotHandle) -> CodecResult<NestedField> {
        self.check_nesting(parent, child)?;
        let field = self.snapshot_mut(parent)?.add_nested(child)?;
        self.snapshot_mut(child)?.set_parent(Some(parent));
        Ok(field)
    }

    /// Adds `child` as a dynamic nested field of `parent` under `key`.
    pub fn add_dynamic_nested(
        &mut self,
        parent: SnapshotHandle,
        key: impl Into<DynamicKey>,
        child: SnapshotHandle,
    ) -> CodecResult<()> {
        self.check_nesting(parent, child)?;
        self.snapshot_mut(parent)?.add_dynamic_nested(key.into(), child)?;
        self.snapshot_mut(child)?.set_parent(Some(parent));
        Ok(())
    }

    fn check_nesting(&self, parent: SnapshotHandle, child: SnapshotHandle) -> CodecResult<()> {
        let outer = self.snapshot(parent)?;
        let inner = self.snapshot(child)?;
        let invalid = CodecError::InvalidNesting { parent, child };
        if parent == child
            || inner.parent().is_some()
            || outer.connection() != inner.connection()
            || outer.role() != inner.role()
        {
            return Err(invalid);
        }
        let mut cursor = outer.parent();
        while let Some(ancestor) = cursor {
            if ancestor == child {
                return Err(invalid);
            }
            cursor = self.snapshots.get(&ancestor).and_then(Snapshot::parent);
        }
        Ok(())
    }

    // ---- payloads ----

    /// Writes the snapshot payload (no id prefix).
    ///
    /// Triggers, custom queues and delta history only advance when the
    /// whole payload was written; on error the snapshot tree is unchanged.
    pub fn serialize(&mut self, handle: SnapshotHandle, writer: &mut BitWriter) -> CodecResult<()> {
        let mut written = Vec::new();
        self.serialize_tree(handle, writer, &mut written)?;
        self.commit_serialized(&written);
        Ok(())
    }

    fn serialize_tree(
        &mut self,
        handle: SnapshotHandle,
        writer: &mut BitWriter,
        written: &mut Vec<SnapshotHandle>,
    ) -> CodecResult<()> {
        if !self.contains(handle) {
            return Err(CodecError::UnknownSnapshot { handle });
        }
        let limits = self.config.codec.clone();
        self.serialize_at(handle, writer, &limits, 0, written)
    }

    fn commit_serialized(&mut self, written: &[SnapshotHandle]) {
        for handle in written {
            if let Some(snapshot) = self.snapshots.get_mut(handle) {
                snapshot.commit_serialized();
            }
        }
    }

    fn serialize_at(
        &mut self,
        handle: SnapshotHandle,
        writer: &mut BitWriter,
        limits: &CodecLimits,
        depth: usize,
        written: &mut Vec<SnapshotHandle>,
    ) -> CodecResult<()> {
        if depth > limits.max_nesting_depth {
            return Err(EncodeError::LimitsExceeded {
                kind: LimitKind::NestingDepth,
                limit: limits.max_nesting_depth,
                actual: depth,
            }
            .into());
        }
        let Some(mut snapshot) = self.snapshots.remove(&handle) else {
            trace!(%handle, "nested snapshot is gone; writing an empty payload");
            SnapshotHeader::default().encode(writer)?;
            return Ok(());
        };
        let result = snapshot.serialize_with(
            writer,
            limits,
            &mut |child: SnapshotHandle, w: &mut BitWriter| {
                self.serialize_at(child, w, limits, depth + 1, written)
            },
        );
        self.snapshots.insert(handle, snapshot);
        if result.is_ok() {
            written.push(handle);
        }
        result
    }

    /// Applies a snapshot payload (no id prefix).
    pub fn deserialize(&mut self, handle: SnapshotHandle, reader: &mut BitReader<'_>) -> CodecResult<()> {
        if !self.contains(handle) {
            return Err(CodecError::UnknownSnapshot { handle });
        }
        let limits = self.config.codec.clone();
        self.deserialize_at(handle, reader, &limits, 0)
    }

    fn deserialize_at(
        &mut self,
        handle: SnapshotHandle,
        reader: &mut BitReader<'_>,
        limits: &CodecLimits,
        depth: usize,
    ) -> CodecResult<()> {
        check_depth(depth, limits)?;
        let Some(mut snapshot) = self.snapshots.remove(&handle) else {
            trace!(%handle, "nested snapshot is gone; skipping its payload");
            skip_payload(reader, limits, depth)?;
            return Ok(());
        };
        let result = snapshot.deserialize_with(
            reader,
            limits,
            depth,
            &mut |child: SnapshotHandle, r: &mut BitReader<'_>| {
                self.deserialize_at(child, r, limits, depth + 1)
            },
        );
        self.snapshots.insert(handle, snapshot);
        result
    }

    /// Writes `[u16 id][payload]` for a bound snapshot.
    pub fn write_update(&mut self, handle: SnapshotHandle, writer: &mut BitWriter) -> CodecResult<()> {
        let mut written = Vec::new();
        self.write_update_into(handle, writer, &mut written)?;
        self.commit_serialized(&written);
        Ok(())
    }

    fn write_update_into(
        &mut self,
        handle: SnapshotHandle,
        writer: &mut BitWriter,
        written: &mut Vec<SnapshotHandle>,
    ) -> CodecResult<()> {
        let snapshot = self.snapshot(handle)?;
        let id = snapshot.id().ok_or_else(|| CodecError::NotBound {
            unique_id: snapshot.unique_id().to_owned(),
        })?;
        writer.write_u16(id.raw())?;
        self.serialize_tree(handle, writer, written)
    }

    /// Reads one `[u16 id][payload]` update and applies it to the remote
    /// snapshot bound to that id. Updates for unknown ids are skipped.
    pub fn read_update(
        &mut self,
        connection: ConnectionId,
        reader: &mut BitReader<'_>,
    ) -> CodecResult<Option<SnapshotHandle>> {
        let id = SnapshotId::new(reader.read_u16()?);
        let limits = self.config.codec.clone();
        if let Some(handle) = self.remote_handle(connection, id) {
            self.deserialize_at(handle, reader, &limits, 0)?;
            return Ok(Some(handle));
        }
        debug!(%connection, id = id.raw(), "skipping update for unknown snapshot");
        skip_payload(reader, &limits, 0)?;
        Ok(None)
    }

    /// Reads one update addressed to `handle`.
    ///
    /// Returns `false` if the snapshot is not bound yet and the payload was
    /// skipped. A wire id other than the bound one is an error.
    pub fn read_update_for(&mut self, handle: SnapshotHandle, reader: &mut BitReader<'_>) -> CodecResult<bool> {
        let found = SnapshotId::new(reader.read_u16()?);
        let snapshot = self.snapshot(handle)?;
        match snapshot.id() {
            Some(expected) if expected == found => {
                self.deserialize(handle, reader)?;
                Ok(true)
            }
            Some(expected) => {
                warn!(
                    unique_id = snapshot.unique_id(),
                    expected = expected.raw(),
                    found = found.raw(),
                    "update addressed to another snapshot id"
                );
                Err(CodecError::IdentityMismatch {
                    unique_id: snapshot.unique_id().to_owned(),
                    expected,
                    found,
                })
            }
            None => {
                trace!(unique_id = snapshot.unique_id(), "skipping update for unbound snapshot");
                skip_payload(reader, &self.config.codec, 0)?;
                Ok(false)
            }
        }
    }

    // ---- acks ----

    /// Appends the ack table for `connection` and clears what was written.
    ///
    /// Returns the number of entries written.
    pub fn on_outbound(&mut self, connection: ConnectionId, writer: &mut BitWriter) -> CodecResult<usize> {
        let limits = &self.config.wire;
        let mut entries = Vec::new();
        if let Some(iface) = self.connections.get(&connection) {
            for (id, handle) in &iface.remote {
                if entries.len() == limits.max_ack_entries {
                    break;
                }
                let Some(snapshot) = self.snapshots.get_mut(handle) else {
                    continue;
                };
                let DeltaState::Inbound(pending) = &mut snapshot.delta else {
                    continue;
                };
                if pending.is_empty() {
                    continue;
                }
                let delta_ids = pending.take(limits.max_acks_per_entry);
                entries.push(AckEntry {
                    snapshot_id: id.raw(),
                    delta_ids,
                });
            }
        }
        encode_ack_table(&entries, writer, limits)?;
        Ok(entries.len())
    }

    /// Reads an ack table and marks the named delta snapshots acknowledged.
    ///
    /// Returns the number of delta snapshots acknowledged. Entries for
    /// unknown snapshots are ignored.
    pub fn on_inbound(&mut self, connection: ConnectionId, reader: &mut BitReader<'_>) -> CodecResult<usize> {
        let entries = decode_ack_table(reader, &self.config.wire)?;
        let Some(iface) = self.connections.get(&connection) else {
            trace!(%connection, entries = entries.len(), "acks for unknown connection");
            return Ok(0);
        };
        let mut acknowledged = 0;
        for entry in entries {
            let history = iface
                .owned
                .get(&SnapshotId::new(entry.snapshot_id))
                .and_then(|handle| self.snapshots.get_mut(handle))
                .and_then(|snapshot| match &mut snapshot.delta {
                    DeltaState::Outbound(history) => Some(history),
                    _ => None,
                });
            let Some(history) = history else {
                trace!(%connection, id = entry.snapshot_id, "acks for unknown snapshot");
                continue;
            };
            for delta_id in entry.delta_ids {
                if history.acknowledge(delta_id) {
                    acknowledged += 1;
                } else {
                    trace!(%connection, id = entry.snapshot_id, delta_id, "ack for a delta no longer held");
                }
            }
        }
        Ok(acknowledged)
    }

    /// Writes a transport packet: the ack table, then an update for each
    /// bound snapshot in `handles`.
    ///
    /// Returns the number of updates written. Snapshots only advance once
    /// every update in the packet was written.
    pub fn write_packet(
        &mut self,
        connection: ConnectionId,
        handles: &[SnapshotHandle],
        writer: &mut BitWriter,
    ) -> CodecResult<usize> {
        self.on_outbound(connection, writer)?;
        let mut written = Vec::new();
        let mut updates = 0;
        for &handle in handles {
            if !self.snapshot(handle)?.is_ready() {
                trace!(%handle, "not bound yet; left out of packet");
                continue;
            }
            self.write_update_into(handle, writer, &mut written)?;
            updates += 1;
        }
        self.commit_serialized(&written);
        Ok(updates)
    }

    /// Reads a packet written by [`write_packet`](Self::write_packet).
    ///
    /// Returns the snapshots that were updated.
    pub fn read_packet(
        &mut self,
        connection: ConnectionId,
        reader: &mut BitReader<'_>,
    ) -> CodecResult<Vec<SnapshotHandle>> {
        self.on_inbound(connection, reader)?;
        let mut updated = Vec::new();
        while !reader.is_empty() {
            if let Some(handle) = self.read_update(connection, reader)? {
                updated.push(handle);
            }
        }
        Ok(updated)
    }

    // ---- lifecycle ----

    /// Destroys a snapshot and its nested children.
    ///
    /// An owner frees its id and queues a `ReleaseSnapshotId` event.
    pub fn dispose(&mut self, handle: SnapshotHandle) -> CodecResult<()> {
        let snapshot = self
            .snapshots
            .remove(&handle)
            .ok_or(CodecError::UnknownSnapshot { handle })?;
        self.release(handle, snapshot);
        Ok(())
    }

    fn release(&mut self, handle: SnapshotHandle, snapshot: Snapshot) {
        let connection = snapshot.connection();
        let unique_id = snapshot.unique_id();
        if let Some(iface) = self.connections.get_mut(&connection) {
            iface.delta_waiting.remove(&handle);
            if iface.waiting.get(unique_id) == Some(&handle) {
                iface.waiting.remove(unique_id);
            }
            if let Some(id) = snapshot.id() {
                if snapshot.is_owner() {
                    iface.owned.remove(&id);
                    iface.allocator.deallocate(id);
                    self.outgoing.push((
                        connection,
                        ControlEvent::ReleaseSnapshotId {
                            id: id.raw(),
                            unique_id: unique_id.to_owned(),
                        },
                    ));
                } else if iface.remote.get(&id) == Some(&handle) {
                    iface.remote.remove(&id);
                }
            }
        }
        if let Some(parent) = snapshot.parent() {
            if let Some(parent) = self.snapshots.get_mut(&parent) {
                parent.detach_child(handle);
            }
        }
        debug!(%connection, %handle, unique_id, "disposed snapshot");

        for child in snapshot.children() {
            if let Some(nested) = self.snapshots.remove(&child) {
                self.release(child, nested);
            }
        }
    }

    /// Removes a dynamic field, disposing the snapshot it held if nested.
    ///
    /// Returns `false` if no field was stored under `key`.
    pub fn remove_dynamic_field(&mut self, handle: SnapshotHandle, key: impl Into<DynamicKey>) -> CodecResult<bool> {
        match self.snapshot_mut(handle)?.remove_dynamic(&key.into()) {
            None => Ok(false),
            Some(Field::Nested { child }) => {
                if let Some(nested) = self.snapshots.remove(&child) {
                    self.release(child, nested);
                }
                Ok(true)
            }
            Some(_) => Ok(true),
        }
    }

    /// Tears down a connection: its handshake state, its snapshots and its
    /// queued events. Returns the handles that were dropped.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Vec<SnapshotHandle> {
        let dropped: Vec<SnapshotHandle> = self
            .snapshots
            .iter()
            .filter(|(_, s)| s.connection() == connection)
            .map(|(handle, _)| *handle)
            .collect();
        for handle in &dropped {
            self.snapshots.remove(handle);
        }
        self.connections.remove(&connection);
        self.outgoing.retain(|(c, _)| *c != connection);
        info!(%connection, snapshots = dropped.len(), "connection torn down");
        dropped
    }

    /// Applies every queued transport event. Failures are logged and
    /// counted; they do not stop the pump.
    pub fn pump(&mut self, inbox: &Receiver<Inbound>) -> PumpStats {
        let mut stats = PumpStats::default();
        for message in inbox.try_iter() {
            stats.messages += 1;
            let connection = message.connection();
            let result = match message {
                Inbound::Control { connection, event } => self.on_control_event(connection, event),
                Inbound::Packet {
                    connection,
                    payload,
                } => self
                    .read_packet(connection, &mut BitReader::new(&payload))
                    .map(|updated| stats.updates += updated.len()),
                Inbound::Disconnected { connection } => {
                    self.disconnect(connection);
                    Ok(())
                }
            };
            if let Err(error) = result {
                stats.failures += 1;
                warn!(%connection, %error, "inbound message failed");
            }
        }
        stats
    }
}

fn active_delta_state(role: Role, config: &SystemConfig) -> DeltaState {
    if role.is_owner() {
        DeltaState::Outbound(DeltaHistory::new(config.history_capacity()))
    } else {
        DeltaState::Inbound(PendingAcks::new())
    }
}
