//! Fixed-width encoding of primitive values.

use bitstream::{BitReader, BitResult, BitWriter};
use wire::{DecodeError, WireResult};

use crate::kind::PrimitiveKind;
use crate::value::{Flags8, PrimitiveValue};

/// Writes `[u8 kind tag][value]`.
pub fn write_primitive(writer: &mut BitWriter, value: PrimitiveValue) -> BitResult<()> {
    writer.write_u8(value.kind().tag())?;
    write_value(writer, value)
}

/// Writes the value bytes only.
pub fn write_value(writer: &mut BitWriter, value: PrimitiveValue) -> BitResult<()> {
    match value {
        PrimitiveValue::Byte(v) => writer.write_u8(v),
        PrimitiveValue::SByte(v) => writer.write_i16(i16::from(v)),
        PrimitiveValue::Char(v) => writer.write_u32(u32::from(v)),
        PrimitiveValue::Bool(v) => writer.write_u8(u8::from(v)),
        PrimitiveValue::Int16(v) => writer.write_i16(v),
        PrimitiveValue::Int32(v) => writer.write_i32(v),
        PrimitiveValue::Int64(v) => writer.write_i64(v),
        PrimitiveValue::UInt16(v) => writer.write_u16(v),
        PrimitiveValue::UInt32(v) => writer.write_u32(v),
        PrimitiveValue::UInt64(v) => writer.write_u64(v),
        PrimitiveValue::Float(v) => writer.write_f32(v),
        PrimitiveValue::Double(v) => writer.write_f64(v),
        PrimitiveValue::Flags8(v) => {
            for index in 0..8 {
                writer.write_bit(v.get(index));
            }
            Ok(())
        }
    }
}

/// Reads the value bytes of a known `kind`.
pub fn read_primitive(reader: &mut BitReader<'_>, kind: PrimitiveKind) -> WireResult<PrimitiveValue> {
    let value = match kind {
        PrimitiveKind::Byte => PrimitiveValue::Byte(reader.read_u8()?),
        PrimitiveKind::SByte => {
            let wide = reader.read_i16()?;
            let narrow = i8::try_from(wide).unwrap_or(if wide < 0 { i8::MIN } else { i8::MAX });
            PrimitiveValue::SByte(narrow)
        }
        PrimitiveKind::Char => {
            let scalar = reader.read_u32()?;
            let c = char::from_u32(scalar).ok_or(DecodeError::InvalidChar { value: scalar })?;
            PrimitiveValue::Char(c)
        }
        PrimitiveKind::Bool => PrimitiveValue::Bool(reader.read_u8()? != 0),
        PrimitiveKind::Int16 => PrimitiveValue::Int16(reader.read_i16()?),
        PrimitiveKind::Int32 => PrimitiveValue::Int32(reader.read_i32()?),
        PrimitiveKind::Int64 => PrimitiveValue::Int64(reader.read_i64()?),
        PrimitiveKind::UInt16 => PrimitiveValue::UInt16(reader.read_u16()?),
        PrimitiveKind::UInt32 => PrimitiveValue::UInt32(reader.read_u32()?),
        PrimitiveKind::UInt64 => PrimitiveValue::UInt64(reader.read_u64()?),
        PrimitiveKind::Float => PrimitiveValue::Float(reader.read_f32()?),
        PrimitiveKind::Double => PrimitiveValue::Double(reader.read_f64()?),
        PrimitiveKind::Flags8 => {
            let mut flags = Flags8::default();
            for index in 0..8 {
                flags.set(index, reader.read_bit()?);
            }
            PrimitiveValue::Flags8(flags)
        }
    };
    Ok(value)
}

/// Reads a kind tag.
pub fn read_kind(reader: &mut BitReader<'_>) -> WireResult<PrimitiveKind> {
    let tag = reader.read_u8()?;
    PrimitiveKind::from_tag(tag).ok_or(DecodeError::UnknownPrimitiveTag { tag })
}

/// Reads `[u8 kind tag][value]`.
pub fn read_tagged_primitive(reader: &mut BitReader<'_>) -> WireResult<PrimitiveValue> {
    let kind = read_kind(reader)?;
    read_primitive(reader, kind)
}

/// Skips the value bytes of a known `kind` without validating them.
pub fn skip_primitive(reader: &mut BitReader<'_>, kind: PrimitiveKind) -> WireResult<()> {
    reader.skip_bytes(kind.wire_width())?;
    Ok(())
}
