//! Consuming payload data without a local field to apply it to.
//!
//! Every payload is self-describing once its tags are read, so a receiver
//! whose schema lacks a field can always find where the next one starts.

use bitstream::BitReader;
use schema::{read_kind, skip_primitive, FieldKind};
use wire::{DecodeError, LimitKind, SnapshotHeader, WireResult};

use crate::limits::CodecLimits;

/// Skips one field payload whose field tag has already been read.
///
/// `depth` is the nesting depth of the payload the field belongs to.
pub fn skip_field_payload(
    reader: &mut BitReader<'_>,
    kind: FieldKind,
    limits: &CodecLimits,
    depth: usize,
) -> WireResult<()> {
    match kind {
        FieldKind::Primitive => {
            let primitive = read_kind(reader)?;
            skip_primitive(reader, primitive)
        }
        FieldKind::Trigger => {
            reader.skip_bytes(1)?;
            Ok(())
        }
        FieldKind::Custom => {
            let len = read_custom_len(reader, limits)?;
            reader.skip_bytes(len)?;
            Ok(())
        }
        FieldKind::Snapshot => skip_payload(reader, limits, depth + 1),
    }
}

/// Skips a whole snapshot payload, header included.
pub fn skip_payload(reader: &mut BitReader<'_>, limits: &CodecLimits, depth: usize) -> WireResult<()> {
    check_depth(depth, limits)?;
    let header = read_header(reader, limits)?;
    for _ in 0..header.static_count {
        reader.read_u16()?;
        let kind = read_field_kind(reader)?;
        skip_field_payload(reader, kind, limits, depth)?;
    }
    for _ in 0..header.dynamic_count {
        let key = read_kind(reader)?;
        skip_primitive(reader, key)?;
        let kind = read_field_kind(reader)?;
        skip_field_payload(reader, kind, limits, depth)?;
    }
    Ok(())
}

/// Reads a field tag.
pub fn read_field_kind(reader: &mut BitReader<'_>) -> WireResult<FieldKind> {
    let tag = reader.read_u8()?;
    FieldKind::from_tag(tag).ok_or(DecodeError::UnknownFieldTag { tag })
}

/// Reads a payload header and checks its counts against `limits`.
pub fn read_header(reader: &mut BitReader<'_>, limits: &CodecLimits) -> WireResult<SnapshotHeader> {
    let header = SnapshotHeader::decode(reader)?;
    check(
        usize::from(header.static_count),
        limits.max_static_fields,
        LimitKind::StaticFields,
    )?;
    check(
        usize::from(header.dynamic_count),
        limits.max_dynamic_fields,
        LimitKind::DynamicFields,
    )?;
    Ok(header)
}

/// Reads a custom blob length prefix and checks it against `limits`.
pub fn read_custom_len(reader: &mut BitReader<'_>, limits: &CodecLimits) -> WireResult<usize> {
    let len = usize::from(reader.read_u16()?);
    check(len, limits.custom_bytes_cap(), LimitKind::CustomBytes)?;
    Ok(len)
}

pub(crate) fn check_depth(depth: usize, limits: &CodecLimits) -> WireResult<()> {
    check(depth, limits.max_nesting_depth, LimitKind::NestingDepth)
}

fn check(actual: usize, limit: usize, kind: LimitKind) -> WireResult<()> {
    if actual > limit {
        return Err(DecodeError::LimitsExceeded {
            kind,
            limit,
            actual,
        });
    }
    Ok(())
}
