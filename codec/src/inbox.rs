//! Handoff from transport threads to the tick thread.
//!
//! The transport may receive bytes anywhere; everything that mutates a
//! [`SnapshotSystem`](crate::SnapshotSystem) goes through this queue and is
//! applied by [`pump`](crate::SnapshotSystem::pump) on the tick thread.

use crossbeam_channel::{unbounded, Receiver, Sender};
use wire::ControlEvent;

use crate::types::ConnectionId;

/// A transport event waiting to be applied on the tick thread.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A handshake event from the reliable control channel.
    Control {
        connection: ConnectionId,
        event: ControlEvent,
    },
    /// A transport packet: ack table followed by snapshot updates.
    Packet {
        connection: ConnectionId,
        payload: Vec<u8>,
    },
    /// The peer went away.
    Disconnected { connection: ConnectionId },
}

impl Inbound {
    /// Connection the event belongs to.
    #[must_use]
    pub const fn connection(&self) -> ConnectionId {
        match self {
            Self::Control { connection, .. }
            | Self::Packet { connection, .. }
            | Self::Disconnected { connection } => *connection,
        }
    }
}

/// Cloneable producer half of the inbound queue.
#[derive(Debug, Clone)]
pub struct InboxSender {
    tx: Sender<Inbound>,
}

impl InboxSender {
    /// Queues a handshake event. Returns `false` if the tick side is gone.
    pub fn control(&self, connection: ConnectionId, event: ControlEvent) -> bool {
        self.send(Inbound::Control { connection, event })
    }

    /// Queues a transport packet. Returns `false` if the tick side is gone.
    pub fn packet(&self, connection: ConnectionId, payload: Vec<u8>) -> bool {
        self.send(Inbound::Packet {
            connection,
            payload,
        })
    }

    /// Queues a disconnect. Returns `false` if the tick side is gone.
    pub fn disconnected(&self, connection: ConnectionId) -> bool {
        self.send(Inbound::Disconnected { connection })
    }

    fn send(&self, event: Inbound) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Creates an unbounded single-consumer inbound queue.
#[must_use]
pub fn inbox() -> (InboxSender, Receiver<Inbound>) {
    let (tx, rx) = unbounded();
    (InboxSender { tx }, rx)
}
