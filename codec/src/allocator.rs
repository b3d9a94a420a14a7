//! Per-connection snapshot id allocation.

use crate::types::SnapshotId;

const ID_SPACE: usize = 1 << 16;
const WORDS: usize = ID_SPACE / 64;

/// Allocator of 16-bit snapshot ids for one connection.
///
/// A counter walks the id space and wraps at 65536, skipping ids that are
/// still in use. Freed ids are found again on a later pass, so allocation
/// only fails when every id is taken.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    used: Box<[u64; WORDS]>,
    in_use: usize,
    next: u16,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    /// Creates an allocator with every id free.
    #[must_use]
    pub fn new() -> Self {
        Self {
            used: Box::new([0; WORDS]),
            in_use: 0,
            next: 0,
        }
    }

    /// Allocates the next free id, or `None` if all 65536 are in use.
    pub fn allocate(&mut self) -> Option<SnapshotId> {
        if self.in_use == ID_SPACE {
            return None;
        }
        let mut candidate = self.next;
        // a free id exists, so one lap over the id space finds it
        for _ in 0..ID_SPACE {
            if !self.is_set(candidate) {
                self.set(candidate, true);
                self.in_use += 1;
                self.next = candidate.wrapping_add(1);
                return Some(SnapshotId::new(candidate));
            }
            candidate = candidate.wrapping_add(1);
        }
        None
    }

    /// Frees an id. Returns `false` if it was not allocated.
    pub fn deallocate(&mut self, id: SnapshotId) -> bool {
        if !self.is_set(id.raw()) {
            return false;
        }
        self.set(id.raw(), false);
        self.in_use -= 1;
        true
    }

    /// Returns `true` if `id` is currently allocated.
    #[must_use]
    pub fn is_allocated(&self, id: SnapshotId) -> bool {
        self.is_set(id.raw())
    }

    /// Number of ids currently allocated.
    #[must_use]
    pub const fn in_use(&self) -> usize {
        self.in_use
    }

    /// Frees every id and rewinds the counter.
    pub fn reset(&mut self) {
        self.used.fill(0);
        self.in_use = 0;
        self.next = 0;
    }

    fn is_set(&self, id: u16) -> bool {
        let id = usize::from(id);
        self.used[id / 64] & (1 << (id % 64)) != 0
    }

    fn set(&mut self, id: u16, value: bool) {
        let id = usize::from(id);
        let word = &mut self.used[id / 64];
        if value {
            *word |= 1 << (id % 64);
        } else {
            *word &= !(1 << (id % 64));
        }
    }
}
