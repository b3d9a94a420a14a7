//! Handshake events carried over the reliable control channel.

use bitstream::{BitReader, BitWriter};

use crate::error::{DecodeError, EncodeError, EncodeResult, LimitKind, WireResult};
use crate::limits::Limits;

const TAG_ALLOCATE: u8 = 0;
const TAG_RELEASE: u8 = 1;

/// Id negotiation messages exchanged between peers.
///
/// ```text
/// u8 tag, u16 id, u16 unique_id_len, unique_id bytes
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ControlEvent {
    /// The owning side bound `unique_id` to `id` on this connection.
    AllocateSnapshotId { id: u16, unique_id: String },
    /// The owning side disposed `unique_id` and freed `id`.
    ReleaseSnapshotId { id: u16, unique_id: String },
}

impl ControlEvent {
    /// Numeric id carried by the event.
    #[must_use]
    pub const fn id(&self) -> u16 {
        match self {
            Self::AllocateSnapshotId { id, .. } | Self::ReleaseSnapshotId { id, .. } => *id,
        }
    }

    /// Unique id carried by the event.
    #[must_use]
    pub fn unique_id(&self) -> &str {
        match self {
            Self::AllocateSnapshotId { unique_id, .. }
            | Self::ReleaseSnapshotId { unique_id, .. } => unique_id,
        }
    }

    const fn tag(&self) -> u8 {
        match self {
            Self::AllocateSnapshotId { .. } => TAG_ALLOCATE,
            Self::ReleaseSnapshotId { .. } => TAG_RELEASE,
        }
    }
}

/// Encodes a control event.
pub fn encode_control_event(
    event: &ControlEvent,
    writer: &mut BitWriter,
    limits: &Limits,
) -> EncodeResult<()> {
    let unique_id = event.unique_id();
    if unique_id.len() > limits.max_unique_id_len {
        return Err(EncodeError::LimitsExceeded {
            kind: LimitKind::UniqueIdLength,
            limit: limits.max_unique_id_len,
            actual: unique_id.len(),
        });
    }
    writer.write_u8(event.tag())?;
    writer.write_u16(event.id())?;
    writer.write_str(unique_id)?;
    Ok(())
}

/// Decodes a control event.
pub fn decode_control_event(reader: &mut BitReader<'_>, limits: &Limits) -> WireResult<ControlEvent> {
    let tag = reader.read_u8()?;
    if tag != TAG_ALLOCATE && tag != TAG_RELEASE {
        return Err(DecodeError::UnknownControlTag { tag });
    }
    let id = reader.read_u16()?;

    // check the declared length before touching the string bytes
    let len = usize::from(reader.clone().read_u16()?);
    if len > limits.max_unique_id_len {
        return Err(DecodeError::LimitsExceeded {
            kind: LimitKind::UniqueIdLength,
            limit: limits.max_unique_id_len,
            actual: len,
        });
    }
    let unique_id = reader.read_str()?.to_owned();

    Ok(if tag == TAG_ALLOCATE {
        ControlEvent::AllocateSnapshotId { id, unique_id }
    } else {
        ControlEvent::ReleaseSnapshotId { id, unique_id }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(event: &ControlEvent) -> Vec<u8> {
        let mut writer = BitWriter::new();
        encode_control_event(event, &mut writer, &Limits::default()).unwrap();
        writer.finish()
    }

    #[test]
    fn allocate_layout() {
        let bytes = encode(&ControlEvent::AllocateSnapshotId {
            id: 42,
            unique_id: "World".to_owned(),
        });
        assert_eq!(bytes, vec![0, 42, 0, 5, 0, b'W', b'o', b'r', b'l', b'd']);
    }

    #[test]
    fn release_roundtrip() {
        let event = ControlEvent::ReleaseSnapshotId {
            id: 0xFFFF,
            unique_id: "NetEntity_42".to_owned(),
        };
        let bytes = encode(&event);
        let mut reader = BitReader::new(&bytes);
        let decoded = decode_control_event(&mut reader, &Limits::default()).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(decoded.id(), 0xFFFF);
        assert_eq!(decoded.unique_id(), "NetEntity_42");
        assert!(reader.is_empty());
    }

    #[test]
    fn unknown_tag_rejected() {
        let mut reader = BitReader::new(&[9, 0, 0, 0, 0]);
        let err = decode_control_event(&mut reader, &Limits::default()).unwrap_err();
        assert_eq!(err, DecodeError::UnknownControlTag { tag: 9 });
    }

    #[test]
    fn oversized_unique_id_rejected_both_ways() {
        let limits = Limits::for_testing();
        let event = ControlEvent::AllocateSnapshotId {
            id: 1,
            unique_id: "x".repeat(limits.max_unique_id_len + 1),
        };
        let mut writer = BitWriter::new();
        assert!(matches!(
            encode_control_event(&event, &mut writer, &limits),
            Err(EncodeError::LimitsExceeded { .. })
        ));

        let bytes = encode(&event);
        let mut reader = BitReader::new(&bytes);
        assert!(matches!(
            decode_control_event(&mut reader, &limits),
            Err(DecodeError::LimitsExceeded {
                kind: LimitKind::UniqueIdLength,
                ..
            })
        ));
    }
}
