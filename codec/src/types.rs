//! Core types for the codec.

use std::fmt;

/// A connection-scoped numeric snapshot id, negotiated by the handshake.
///
/// Ids are not stable across connections or reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SnapshotId(u16);

impl SnapshotId {
    /// Creates a new snapshot id.
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl From<u16> for SnapshotId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

impl From<SnapshotId> for u16 {
    fn from(id: SnapshotId) -> Self {
        id.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A handle to a snapshot owned by a [`SnapshotSystem`](crate::SnapshotSystem).
///
/// Handles are process-local and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotHandle(u64);

impl SnapshotHandle {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SnapshotHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Identity of a remote peer, supplied by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new connection id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw connection id.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for ConnectionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn{}", self.0)
    }
}

/// Which side of the handshake a snapshot is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Allocates the id and sends state.
    Owner,
    /// Awaits the id from the peer and receives state.
    Remote,
}

impl Role {
    /// Returns `true` for [`Role::Owner`].
    #[must_use]
    pub const fn is_owner(self) -> bool {
        matches!(self, Self::Owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_id_conversions() {
        let id: SnapshotId = 42u16.into();
        assert_eq!(id.raw(), 42);
        let raw: u16 = id.into();
        assert_eq!(raw, 42);
        assert_eq!(id.to_string(), "#42");
    }

    #[test]
    fn snapshot_id_ordering() {
        assert!(SnapshotId::new(1) < SnapshotId::new(2));
        assert_eq!(SnapshotId::default().raw(), 0);
    }

    #[test]
    fn connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn7");
        assert_eq!(ConnectionId::from(3u64).raw(), 3);
    }

    #[test]
    fn handle_display() {
        assert_eq!(SnapshotHandle::new(5).to_string(), "h5");
    }

    #[test]
    fn role_owner() {
        assert!(Role::Owner.is_owner());
        assert!(!Role::Remote.is_owner());
    }
}
