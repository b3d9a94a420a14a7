//! Opaque length-prefixed sub-payloads.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt::Debug;

use bitstream::{BitReader, BitWriter};
use wire::{DecodeError, LimitKind};

use crate::error::CodecResult;

/// Upcast helper so custom snapshots can be downcast to their concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A nested payload that is not field addressable.
///
/// The framework writes a `u16` length prefix around whatever
/// [`on_serialize`](Self::on_serialize) produces, so a receiver without a
/// matching field can skip it. [`on_deserialize`](Self::on_deserialize) gets
/// a reader bounded to the blob; bytes it leaves unread are discarded.
///
/// Custom payloads never take part in delta compression.
///
/// `on_serialize` may run for a payload that is later abandoned (a limit
/// was hit further on). State it hands off should only be released in
/// [`on_serialized`](Self::on_serialized), which runs once the payload was
/// written in full.
pub trait CustomSnapshot: AsAny + Debug {
    fn on_serialize(&mut self, writer: &mut BitWriter) -> CodecResult<()>;
    fn on_deserialize(&mut self, reader: &mut BitReader<'_>) -> CodecResult<()>;

    /// The last [`on_serialize`](Self::on_serialize) output was sent.
    fn on_serialized(&mut self) {}
}

pub(crate) fn downcast_ref<T: CustomSnapshot>(body: &dyn CustomSnapshot) -> Option<&T> {
    body.as_any().downcast_ref()
}

pub(crate) fn downcast_mut<T: CustomSnapshot>(body: &mut dyn CustomSnapshot) -> Option<&mut T> {
    body.as_any_mut().downcast_mut()
}

/// An item carried by a [`CustomQueue`].
pub trait QueueItem: Debug + Sized + 'static {
    fn write(&self, writer: &mut BitWriter) -> CodecResult<()>;
    fn read(reader: &mut BitReader<'_>) -> CodecResult<Self>;
}

/// A queue-shaped custom snapshot.
///
/// Items pushed on the sending side are drained into the next payload
/// (`u16 count` then the items); the receiving side collects them until
/// [`drain_received`](Self::drain_received) is called. Items leave the
/// outgoing queue only once their payload was written in full.
#[derive(Debug)]
pub struct CustomQueue<T> {
    outgoing: VecDeque<T>,
    in_flight: usize,
    received: Vec<T>,
    max_per_payload: usize,
}

impl<T> Default for CustomQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CustomQueue<T> {
    /// Creates a queue that sends everything pending each payload.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_per_payload(usize::from(u16::MAX))
    }

    /// Creates a queue that sends at most `max` items per payload.
    #[must_use]
    pub fn with_max_per_payload(max: usize) -> Self {
        Self {
            outgoing: VecDeque::new(),
            in_flight: 0,
            received: Vec::new(),
            max_per_payload: max.min(usize::from(u16::MAX)),
        }
    }

    /// Queues an item for the next payload.
    pub fn push(&mut self, item: T) {
        self.outgoing.push_back(item);
    }

    /// Number of items waiting to be sent.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.outgoing.len()
    }

    /// Items received so far, oldest first.
    #[must_use]
    pub fn received(&self) -> &[T] {
        &self.received
    }

    /// Takes every received item.
    pub fn drain_received(&mut self) -> Vec<T> {
        std::mem::take(&mut self.received)
    }
}

impl<T: QueueItem> CustomSnapshot for CustomQueue<T> {
    fn on_serialize(&mut self, writer: &mut BitWriter) -> CodecResult<()> {
        let count = self.outgoing.len().min(self.max_per_payload);
        // bounded by max_per_payload
        writer.write_u16(u16::try_from(count).unwrap_or(u16::MAX))?;
        self.in_flight = 0;
        for item in self.outgoing.iter().take(count) {
            item.write(writer)?;
        }
        self.in_flight = count;
        Ok(())
    }

    fn on_serialized(&mut self) {
        let sent = self.in_flight.min(self.outgoing.len());
        self.outgoing.drain(..sent);
        self.in_flight = 0;
    }

    fn on_deserialize(&mut self, reader: &mut BitReader<'_>) -> CodecResult<()> {
        let count = usize::from(reader.read_u16()?);
        if count > self.max_per_payload {
            return Err(DecodeError::LimitsExceeded {
                kind: LimitKind::CustomBytes,
                limit: self.max_per_payload,
                actual: count,
            }
            .into());
        }
        self.received.reserve(count.min(reader.bytes_remaining()));
        for _ in 0..count {
            self.received.push(T::read(reader)?);
        }
        Ok(())
    }
}
