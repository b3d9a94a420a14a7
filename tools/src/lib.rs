//! Introspection and debugging tools for snaprep.
//!
//! Snapshot payloads are self-describing once their tags are read, so they
//! can be walked without the schema that produced them:
//!
//! - Decode a payload into a tree of fields with their byte sizes
//! - Decode a transport packet (ack table followed by updates)
//! - Decode ack tables and handshake control events
//!
//! # Design Principles
//!
//! - **First-class tooling** - These tools are part of the product, not afterthoughts.
//! - **Human-readable output** - Make it easy to understand what the codec is doing.

use std::fmt::Write as _;

use bitstream::BitReader;
use codec::{read_custom_len, read_field_kind, read_header, CodecLimits};
use schema::{read_tagged_primitive, FieldKind, PrimitiveValue};
use serde::Serialize;
use thiserror::Error;
use wire::{decode_ack_table, decode_control_event, AckEntry, ControlEvent, DecodeError, LimitKind};

/// Errors from inspecting malformed input.
#[derive(Debug, Error)]
pub enum InspectError {
    #[error("decode error at byte {offset}: {source}")]
    Decode {
        offset: usize,
        #[source]
        source: DecodeError,
    },
    #[error("{remaining} trailing bytes after the last entry")]
    TrailingBytes { remaining: usize },
}

pub type InspectResult<T> = Result<T, InspectError>;

/// Header counts of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeaderReport {
    pub static_count: u16,
    pub dynamic_count: u16,
    pub delta_id: u8,
}

/// One decoded snapshot payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayloadReport {
    pub header: HeaderReport,
    pub byte_len: usize,
    pub static_fields: Vec<StaticEntry>,
    pub dynamic_fields: Vec<DynamicEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaticEntry {
    pub id: u16,
    pub byte_len: usize,
    pub value: ValueReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DynamicEntry {
    pub key: PrimitiveValue,
    pub byte_len: usize,
    pub value: ValueReport,
}

/// Field payload, by field kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueReport {
    Primitive { value: PrimitiveValue },
    Trigger { count: u8 },
    Snapshot { payload: Box<PayloadReport> },
    Custom { len: usize },
}

/// One `[u16 id][payload]` update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateReport {
    pub snapshot_id: u16,
    pub payload: PayloadReport,
}

/// A transport packet: ack table followed by updates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacketReport {
    pub acks: Vec<AckEntry>,
    pub updates: Vec<UpdateReport>,
}

/// Decodes a bare snapshot payload. The whole input must be consumed.
pub fn inspect_payload(bytes: &[u8], limits: &CodecLimits) -> InspectResult<PayloadReport> {
    let mut reader = BitReader::new(bytes);
    let report = walk_payload(&mut reader, bytes.len(), limits, 0)?;
    expect_end(&reader)?;
    Ok(report)
}

/// Decodes one update (`[u16 id][payload]`).
pub fn inspect_update(bytes: &[u8], limits: &CodecLimits) -> InspectResult<UpdateReport> {
    let mut reader = BitReader::new(bytes);
    let update = walk_update(&mut reader, bytes.len(), limits)?;
    expect_end(&reader)?;
    Ok(update)
}

/// Decodes a transport packet written by `SnapshotSystem::write_packet`.
pub fn inspect_packet(bytes: &[u8], wire_limits: &wire::Limits, limits: &CodecLimits) -> InspectResult<PacketReport> {
    let mut reader = BitReader::new(bytes);
    let acks = decode_ack_table(&mut reader, wire_limits).map_err(|e| at(&reader, bytes.len(), e))?;
    let mut updates = Vec::new();
    while !reader.is_empty() {
        updates.push(walk_update(&mut reader, bytes.len(), limits)?);
    }
    Ok(PacketReport { acks, updates })
}

/// Decodes a standalone ack table.
pub fn inspect_ack_table(bytes: &[u8], limits: &wire::Limits) -> InspectResult<Vec<AckEntry>> {
    let mut reader = BitReader::new(bytes);
    let acks = decode_ack_table(&mut reader, limits).map_err(|e| at(&reader, bytes.len(), e))?;
    expect_end(&reader)?;
    Ok(acks)
}

/// Decodes a sequence of handshake control events.
pub fn inspect_control_events(bytes: &[u8], limits: &wire::Limits) -> InspectResult<Vec<ControlEvent>> {
    let mut reader = BitReader::new(bytes);
    let mut events = Vec::new();
    while !reader.is_empty() {
        events.push(decode_control_event(&mut reader, limits).map_err(|e| at(&reader, bytes.len(), e))?);
    }
    Ok(events)
}

fn walk_update(reader: &mut BitReader<'_>, total: usize, limits: &CodecLimits) -> InspectResult<UpdateReport> {
    let snapshot_id = reader
        .read_u16()
        .map_err(|e| at(reader, total, e.into()))?;
    let payload = walk_payload(reader, total, limits, 0)?;
    Ok(UpdateReport {
        snapshot_id,
        payload,
    })
}

fn walk_payload(
    reader: &mut BitReader<'_>,
    total: usize,
    limits: &CodecLimits,
    depth: usize,
) -> InspectResult<PayloadReport> {
    if depth > limits.max_nesting_depth {
        return Err(at(
            reader,
            total,
            DecodeError::LimitsExceeded {
                kind: LimitKind::NestingDepth,
                limit: limits.max_nesting_depth,
                actual: depth,
            },
        ));
    }
    let start = reader.bytes_remaining();
    let header = read_header(reader, limits).map_err(|e| at(reader, total, e))?;

    let mut static_fields = Vec::with_capacity(usize::from(header.static_count));
    for _ in 0..header.static_count {
        let before = reader.bytes_remaining();
        let id = reader.read_u16().map_err(|e| at(reader, total, e.into()))?;
        let value = walk_field(reader, total, limits, depth)?;
        static_fields.push(StaticEntry {
            id,
            byte_len: before - reader.bytes_remaining(),
            value,
        });
    }

    let mut dynamic_fields = Vec::with_capacity(usize::from(header.dynamic_count));
    for _ in 0..header.dynamic_count {
        let before = reader.bytes_remaining();
        let key = read_tagged(reader, total)?;
        let value = walk_field(reader, total, limits, depth)?;
        dynamic_fields.push(DynamicEntry {
            key,
            byte_len: before - reader.bytes_remaining(),
            value,
        });
    }

    Ok(PayloadReport {
        header: HeaderReport {
            static_count: header.static_count,
            dynamic_count: header.dynamic_count,
            delta_id: header.delta_id,
        },
        byte_len: start - reader.bytes_remaining(),
        static_fields,
        dynamic_fields,
    })
}

fn walk_field(
    reader: &mut BitReader<'_>,
    total: usize,
    limits: &CodecLimits,
    depth: usize,
) -> InspectResult<ValueReport> {
    let kind = read_field_kind(reader).map_err(|e| at(reader, total, e))?;
    Ok(match kind {
        FieldKind::Primitive => ValueReport::Primitive {
            value: read_tagged(reader, total)?,
        },
        FieldKind::Trigger => ValueReport::Trigger {
            count: reader.read_u8().map_err(|e| at(reader, total, e.into()))?,
        },
        FieldKind::Snapshot => ValueReport::Snapshot {
            payload: Box::new(walk_payload(reader, total, limits, depth + 1)?),
        },
        FieldKind::Custom => {
            let len = read_custom_len(reader, limits).map_err(|e| at(reader, total, e))?;
            reader
                .skip_bytes(len)
                .map_err(|e| at(reader, total, e.into()))?;
            ValueReport::Custom { len }
        }
    })
}

fn read_tagged(reader: &mut BitReader<'_>, total: usize) -> InspectResult<PrimitiveValue> {
    read_tagged_primitive(reader).map_err(|e| at(reader, total, e))
}

fn at(reader: &BitReader<'_>, total: usize, source: DecodeError) -> InspectError {
    InspectError::Decode {
        offset: total - reader.bytes_remaining(),
        source,
    }
}

fn expect_end(reader: &BitReader<'_>) -> InspectResult<()> {
    match reader.bytes_remaining() {
        0 => Ok(()),
        remaining => Err(InspectError::TrailingBytes { remaining }),
    }
}

/// Formats a payload as an indented tree.
#[must_use]
pub fn format_payload_pretty(report: &PayloadReport) -> String {
    let mut out = String::new();
    write_payload(&mut out, report, 0);
    out
}

fn write_payload(out: &mut String, report: &PayloadReport, indent: usize) {
    let pad = "  ".repeat(indent);
    let header = report.header;
    let _ = writeln!(
        out,
        "{pad}payload: {} bytes, {} static, {} dynamic, delta {}",
        report.byte_len, header.static_count, header.dynamic_count, header.delta_id
    );
    for entry in &report.static_fields {
        write_value(out, &format!("#{}", entry.id), entry.byte_len, &entry.value, indent + 1);
    }
    for entry in &report.dynamic_fields {
        write_value(out, &format!("[{}]", entry.key), entry.byte_len, &entry.value, indent + 1);
    }
}

fn write_value(out: &mut String, label: &str, byte_len: usize, value: &ValueReport, indent: usize) {
    let pad = "  ".repeat(indent);
    match value {
        ValueReport::Primitive { value } => {
            let _ = writeln!(out, "{pad}{label} {} = {value} ({byte_len} bytes)", value.kind());
        }
        ValueReport::Trigger { count } => {
            let _ = writeln!(out, "{pad}{label} trigger x{count}");
        }
        ValueReport::Custom { len } => {
            let _ = writeln!(out, "{pad}{label} custom {len} bytes");
        }
        ValueReport::Snapshot { payload } => {
            let _ = writeln!(out, "{pad}{label} snapshot");
            write_payload(out, payload, indent + 1);
        }
    }
}

/// Formats a packet: acks, then every update.
#[must_use]
pub fn format_packet_pretty(report: &PacketReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "acks: {} entries", report.acks.len());
    for entry in &report.acks {
        let _ = writeln!(out, "  snapshot {}: {:?}", entry.snapshot_id, entry.delta_ids);
    }
    for update in &report.updates {
        let _ = writeln!(out, "update for snapshot {}", update.snapshot_id);
        write_payload(&mut out, &update.payload, 1);
    }
    out
}
