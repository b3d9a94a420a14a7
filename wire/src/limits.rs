//! Configurable limits for bounded decoding.

/// Wire-level limits for control events and ack tables.
///
/// These limits are enforced during decoding to prevent resource exhaustion
/// and keep memory bounded. Snapshot payload limits belong to the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Limits {
    /// Maximum length of a snapshot unique id in bytes.
    pub max_unique_id_len: usize,

    /// Maximum number of entries in one ack table.
    pub max_ack_entries: usize,

    /// Maximum number of delta ids acknowledged per entry.
    pub max_acks_per_entry: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_unique_id_len: 256,
            max_ack_entries: 4096,
            // one packet never needs to ack more than the full 8-bit id space
            max_acks_per_entry: 256,
        }
    }
}

impl Limits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_unique_id_len: 64,
            max_ack_entries: 64,
            max_acks_per_entry: 16,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_unique_id_len: usize::MAX,
            max_ack_entries: usize::MAX,
            max_acks_per_entry: usize::MAX,
        }
    }
}
