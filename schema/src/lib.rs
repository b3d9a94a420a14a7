//! Primitive kinds, values and field tags for the snaprep replication protocol.
//!
//! This crate defines what a replicated field can hold and how primitive
//! values are laid out on the wire:
//! - The closed set of [`PrimitiveKind`]s and their stable tags
//! - [`PrimitiveValue`], a sum type over those kinds, and [`DynamicKey`]
//! - The sealed [`Primitive`] trait mapping Rust types to kinds
//! - Fixed-width value encoding (no varints)
//!
//! # Design Principles
//!
//! - **Closed kind set** - Unsupported kinds cannot be named through the typed API.
//! - **Fixed widths** - Every kind has a known size so unknown fields can be skipped.
//! - **No boxing** - Values are plain enums, hashable and comparable bitwise.

mod codec;
mod error;
mod kind;
mod primitive;
mod value;

pub use codec::{
    read_kind, read_primitive, read_tagged_primitive, skip_primitive, write_primitive,
    write_value,
};
pub use error::{FieldRef, SchemaError, SchemaResult};
pub use kind::{FieldKind, PrimitiveKind};
pub use primitive::Primitive;
pub use value::{DynamicKey, Flags8, PrimitiveValue};

/// A static field id within a snapshot.
pub type FieldId = u16;
