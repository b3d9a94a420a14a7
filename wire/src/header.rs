//! Snapshot payload header.

use bitstream::{BitReader, BitWriter};

use crate::error::{EncodeResult, WireResult};

/// Header size in bytes: static count, dynamic count, delta id.
pub const HEADER_SIZE: usize = 2 + 2 + 1;

/// Header written at the front of every serialized snapshot payload.
///
/// ```text
/// u16 static_count, u16 dynamic_count, u8 delta_id
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SnapshotHeader {
    /// Number of static field entries that follow.
    pub static_count: u16,
    /// Number of dynamic field entries after the static ones.
    pub dynamic_count: u16,
    /// Delta id of this payload (0 when delta compression is off).
    pub delta_id: u8,
}

impl SnapshotHeader {
    /// Writes the header.
    pub fn encode(&self, writer: &mut BitWriter) -> EncodeResult<()> {
        writer.write_u16(self.static_count)?;
        writer.write_u16(self.dynamic_count)?;
        writer.write_u8(self.delta_id)?;
        Ok(())
    }

    /// Reads a header.
    pub fn decode(reader: &mut BitReader<'_>) -> WireResult<Self> {
        Ok(Self {
            static_count: reader.read_u16()?,
            dynamic_count: reader.read_u16()?,
            delta_id: reader.read_u8()?,
        })
    }

    /// Writes a placeholder header whose counts are filled in later.
    ///
    /// Entries are written after the header, but how many survive delta
    /// omission is only known once they have all been visited.
    pub fn reserve(writer: &mut BitWriter, delta_id: u8) -> EncodeResult<HeaderSlot> {
        let offset = writer.byte_len();
        Self {
            static_count: 0,
            dynamic_count: 0,
            delta_id,
        }
        .encode(writer)?;
        Ok(HeaderSlot { offset })
    }
}

/// Position of a reserved header inside a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderSlot {
    offset: usize,
}

impl HeaderSlot {
    /// Back-fills the field counts.
    pub fn patch(self, writer: &mut BitWriter, static_count: u16, dynamic_count: u16) -> EncodeResult<()> {
        writer.patch_u16(self.offset, static_count)?;
        writer.patch_u16(self.offset + 2, dynamic_count)?;
        Ok(())
    }

    /// Byte offset of the header.
    #[must_use]
    pub const fn offset(self) -> usize {
        self.offset
    }
}
