//! Delta acknowledgment side-channel.

use bitstream::{BitReader, BitWriter};

use crate::error::{DecodeError, EncodeError, EncodeResult, LimitKind, WireResult};
use crate::limits::Limits;

/// Delta ids acknowledged for one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AckEntry {
    /// Connection-scoped snapshot id.
    pub snapshot_id: u16,
    /// Delta ids received since the last outbound packet.
    pub delta_ids: Vec<u8>,
}

/// Encodes an ack table.
///
/// ```text
/// u16 num_entries
///   per entry: u16 snapshot_id, u16 num_acked, [u8 delta_id]*
/// ```
pub fn encode_ack_table(entries: &[AckEntry], writer: &mut BitWriter, limits: &Limits) -> EncodeResult<()> {
    let count = check_encode(entries.len(), limits.max_ack_entries, LimitKind::AckEntries)?;
    writer.write_u16(count)?;
    for entry in entries {
        let acked = check_encode(
            entry.delta_ids.len(),
            limits.max_acks_per_entry,
            LimitKind::AcksPerEntry,
        )?;
        writer.write_u16(entry.snapshot_id)?;
        writer.write_u16(acked)?;
        writer.write_bytes(&entry.delta_ids)?;
    }
    Ok(())
}

/// Decodes an ack table, validating declared counts against `limits`.
pub fn decode_ack_table(reader: &mut BitReader<'_>, limits: &Limits) -> WireResult<Vec<AckEntry>> {
    let count = usize::from(reader.read_u16()?);
    check_decode(count, limits.max_ack_entries, LimitKind::AckEntries)?;

    let mut entries = Vec::with_capacity(count.min(reader.bytes_remaining() / 4));
    for _ in 0..count {
        let snapshot_id = reader.read_u16()?;
        let acked = usize::from(reader.read_u16()?);
        check_decode(acked, limits.max_acks_per_entry, LimitKind::AcksPerEntry)?;
        let delta_ids = reader.read_bytes(acked)?.to_vec();
        entries.push(AckEntry {
            snapshot_id,
            delta_ids,
        });
    }
    Ok(entries)
}

fn check_encode(actual: usize, limit: usize, kind: LimitKind) -> EncodeResult<u16> {
    if actual > limit {
        return Err(EncodeError::LimitsExceeded {
            kind,
            limit,
            actual,
        });
    }
    u16::try_from(actual).map_err(|_| EncodeError::LimitsExceeded {
        kind,
        limit: usize::from(u16::MAX),
        actual,
    })
}

fn check_decode(actual: usize, limit: usize, kind: LimitKind) -> WireResult<()> {
    if actual > limit {
        return Err(DecodeError::LimitsExceeded {
            kind,
            limit,
            actual,
        });
    }
    Ok(())
}
