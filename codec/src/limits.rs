//! Limits and configuration for the snapshot system.

use std::num::NonZeroUsize;

/// Largest delta history a snapshot may keep.
///
/// Delta ids are eight bits wide; keeping the window at half the id space
/// means an id names at most one entry in the history. Acks must reach the
/// owner within 256 serialize calls of the payload they confirm, or they
/// name a newer entry.
pub const MAX_DELTA_HISTORY: usize = 128;

/// Codec-specific limits enforced while encoding and decoding payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CodecLimits {
    /// Maximum static field entries in one payload.
    pub max_static_fields: usize,
    /// Maximum dynamic field entries in one payload.
    pub max_dynamic_fields: usize,
    /// Maximum depth of nested snapshot payloads.
    pub max_nesting_depth: usize,
    /// Maximum length of a custom blob (capped by its `u16` prefix).
    pub max_custom_bytes: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_static_fields: 1024,
            max_dynamic_fields: 4096,
            max_nesting_depth: 8,
            max_custom_bytes: usize::from(u16::MAX),
        }
    }
}

impl CodecLimits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_static_fields: 64,
            max_dynamic_fields: 64,
            max_nesting_depth: 4,
            max_custom_bytes: 1024,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_static_fields: usize::MAX,
            max_dynamic_fields: usize::MAX,
            max_nesting_depth: usize::MAX,
            max_custom_bytes: usize::MAX,
        }
    }

    /// Custom blob limit after applying the `u16` length prefix cap.
    #[must_use]
    pub fn custom_bytes_cap(&self) -> usize {
        self.max_custom_bytes.min(usize::from(u16::MAX))
    }
}

/// Configuration of a [`SnapshotSystem`](crate::SnapshotSystem).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SystemConfig {
    /// Number of delta snapshots kept per delta-compressing snapshot.
    /// Clamped to `1..=MAX_DELTA_HISTORY`.
    pub delta_history_len: usize,
    /// Payload limits.
    pub codec: CodecLimits,
    /// Handshake and ack table limits.
    pub wire: wire::Limits,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            delta_history_len: 32,
            codec: CodecLimits::default(),
            wire: wire::Limits::default(),
        }
    }
}

impl SystemConfig {
    /// Creates a configuration suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            delta_history_len: 8,
            codec: CodecLimits::for_testing(),
            wire: wire::Limits::for_testing(),
        }
    }

    /// Effective delta history capacity.
    #[must_use]
    pub fn history_capacity(&self) -> NonZeroUsize {
        let len = self.delta_history_len.clamp(1, MAX_DELTA_HISTORY);
        NonZeroUsize::new(len).unwrap_or(NonZeroUsize::MIN)
    }
}
