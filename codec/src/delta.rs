//! Delta snapshots and the per-snapshot history they are kept in.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::num::NonZeroUsize;

use schema::{DynamicKey, FieldId, PrimitiveValue};

use crate::limits::MAX_DELTA_HISTORY;

/// The compressible primitive values of a snapshot at one serialize call.
///
/// Triggers and never-compress fields are not captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaSnapshot {
    delta_id: u8,
    acknowledged: bool,
    static_values: BTreeMap<FieldId, PrimitiveValue>,
    dynamic_values: HashMap<DynamicKey, PrimitiveValue>,
}

impl DeltaSnapshot {
    pub(crate) fn new(
        delta_id: u8,
        static_values: BTreeMap<FieldId, PrimitiveValue>,
        dynamic_values: HashMap<DynamicKey, PrimitiveValue>,
    ) -> Self {
        Self {
            delta_id,
            acknowledged: false,
            static_values,
            dynamic_values,
        }
    }

    /// Delta id written in the payload header for this state.
    #[must_use]
    pub const fn delta_id(&self) -> u8 {
        self.delta_id
    }

    /// Returns `true` once the peer has confirmed this state.
    #[must_use]
    pub const fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    /// Marks the state confirmed. Acknowledgment never reverts.
    pub fn acknowledge(&mut self) {
        self.acknowledged = true;
    }

    /// Recorded value of a static field.
    #[must_use]
    pub fn static_value(&self, id: FieldId) -> Option<&PrimitiveValue> {
        self.static_values.get(&id)
    }

    /// Recorded value of a dynamic field.
    #[must_use]
    pub fn dynamic_value(&self, key: &DynamicKey) -> Option<&PrimitiveValue> {
        self.dynamic_values.get(key)
    }

    /// Number of values captured.
    #[must_use]
    pub fn len(&self) -> usize {
        self.static_values.len() + self.dynamic_values.len()
    }

    /// Returns `true` if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A fixed-capacity ring of delta snapshots, oldest evicted first.
///
/// Entries carry their own delta id, so acknowledgments are matched by id
/// rather than by position relative to the running counter.
#[derive(Debug, Clone)]
pub struct DeltaHistory {
    entries: Vec<Option<DeltaSnapshot>>,
    head: usize,
    len: usize,
    current_delta_id: u8,
}

impl DeltaHistory {
    /// Creates an empty history. Capacity is clamped to [`MAX_DELTA_HISTORY`].
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        let cap = capacity.get().min(MAX_DELTA_HISTORY);
        let mut entries = Vec::with_capacity(cap);
        entries.resize_with(cap, || None);
        Self {
            entries,
            head: 0,
            len: 0,
            current_delta_id: 0,
        }
    }

    /// Returns the capacity of the history.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Returns the number of entries stored.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the history is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Delta id the next serialize call will use.
    #[must_use]
    pub const fn current_delta_id(&self) -> u8 {
        self.current_delta_id
    }

    /// Records a new state under the current delta id and advances the
    /// counter (wrapping).
    ///
    /// When the history is full, this overwrites the oldest entry.
    pub fn push(
        &mut self,
        static_values: BTreeMap<FieldId, PrimitiveValue>,
        dynamic_values: HashMap<DynamicKey, PrimitiveValue>,
    ) {
        let snapshot = DeltaSnapshot::new(self.current_delta_id, static_values, dynamic_values);
        let cap = self.entries.len();
        if self.len < cap {
            let idx = (self.head + self.len) % cap;
            self.entries[idx] = Some(snapshot);
            self.len += 1;
        } else {
            self.entries[self.head] = Some(snapshot);
            self.head = (self.head + 1) % cap;
        }
        self.current_delta_id = self.current_delta_id.wrapping_add(1);
    }

    /// Marks the entry with `delta_id` acknowledged.
    ///
    /// Returns `false` if no such entry is held (never sent or already
    /// evicted). Ids wrap every 256 pushes, so an ack delivered that late
    /// would name a newer entry; the remote side never queues ids that old
    /// (see [`PendingAcks`]).
    pub fn acknowledge(&mut self, delta_id: u8) -> bool {
        let cap = self.entries.len();
        for i in 0..self.len {
            let idx = (self.head + i) % cap;
            if let Some(entry) = self.entries[idx].as_mut() {
                if entry.delta_id == delta_id {
                    entry.acknowledge();
                    return true;
                }
            }
        }
        false
    }

    /// Returns the entry for `delta_id`, if held.
    #[must_use]
    pub fn get(&self, delta_id: u8) -> Option<&DeltaSnapshot> {
        self.iter().find(|entry| entry.delta_id == delta_id)
    }

    /// Returns an iterator from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &DeltaSnapshot> {
        let cap = self.entries.len();
        (0..self.len).filter_map(move |i| self.entries[(self.head + i) % cap].as_ref())
    }

    /// The newest acknowledged entry and every entry sent after it.
    ///
    /// Returns `None` when nothing is acknowledged.
    #[must_use]
    pub fn baseline(&self) -> Option<Baseline<'_>> {
        let mut window = Vec::new();
        for entry in self.iter().rev() {
            window.push(entry);
            if entry.acknowledged {
                return Some(Baseline { window });
            }
        }
        None
    }
}

/// Diff baseline for one serialize call.
///
/// A value may be omitted only if the peer is guaranteed to hold it: it
/// must match the acknowledged state and every state sent since, because
/// any of those may or may not have arrived.
#[derive(Debug, Clone)]
pub struct Baseline<'a> {
    // newest first; the last element is the acknowledged entry
    window: Vec<&'a DeltaSnapshot>,
}

impl Baseline<'_> {
    /// Delta id of the acknowledged entry.
    #[must_use]
    pub fn delta_id(&self) -> Option<u8> {
        self.window.last().map(|entry| entry.delta_id)
    }

    /// Returns `true` if a static field can be omitted.
    #[must_use]
    pub fn static_unchanged(&self, id: FieldId, value: &PrimitiveValue) -> bool {
        self.window
            .iter()
            .all(|entry| entry.static_value(id) == Some(value))
    }

    /// Returns `true` if a dynamic field can be omitted.
    #[must_use]
    pub fn dynamic_unchanged(&self, key: &DynamicKey, value: &PrimitiveValue) -> bool {
        self.window
            .iter()
            .all(|entry| entry.dynamic_value(key) == Some(value))
    }
}

/// Delta ids received on the remote side and not yet acknowledged.
///
/// Ids further than [`MAX_DELTA_HISTORY`] behind the newest received id
/// are dropped. The owner can no longer hold them, and once the counter
/// wraps they would name a different entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingAcks {
    ids: BTreeSet<u8>,
    newest: Option<u8>,
}

impl PendingAcks {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fully applied payload's delta id.
    ///
    /// Returns `false` if the id is too old to acknowledge.
    pub fn record(&mut self, delta_id: u8) -> bool {
        match self.newest {
            // arrived out of order
            Some(newest) if !within_window(newest, delta_id) => {
                if !within_window(delta_id, newest) {
                    return false;
                }
            }
            _ => {
                self.newest = Some(delta_id);
                self.ids.retain(|&held| within_window(held, delta_id));
            }
        }
        self.ids.insert(delta_id);
        true
    }

    /// Removes and returns up to `max` pending ids.
    pub fn take(&mut self, max: usize) -> Vec<u8> {
        let taken: Vec<u8> = self.ids.iter().copied().take(max).collect();
        for delta_id in &taken {
            self.ids.remove(delta_id);
        }
        taken
    }

    /// Returns `true` if a pending id equals `delta_id`.
    #[must_use]
    pub fn contains(&self, delta_id: u8) -> bool {
        self.ids.contains(&delta_id)
    }

    /// Number of pending ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// `later` is at most `MAX_DELTA_HISTORY - 1` ids after `earlier`.
fn within_window(earlier: u8, later: u8) -> bool {
    usize::from(later.wrapping_sub(earlier)) < MAX_DELTA_HISTORY
}

/// Delta compression state of one snapshot.
#[derive(Debug, Clone, Default)]
pub enum DeltaState {
    /// Every payload is complete.
    #[default]
    Disabled,
    /// Requested before the snapshot had an id; activated at bind time.
    Requested,
    /// Owner side: history of sent states.
    Outbound(DeltaHistory),
    /// Remote side: delta ids received and not yet acknowledged.
    Inbound(PendingAcks),
}

impl DeltaState {
    /// Returns `true` once delta bookkeeping is active.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Outbound(_) | Self::Inbound(_))
    }
}
