//! Primitive and field kind tags.

use std::fmt;

/// The closed set of primitive value kinds, with their stable wire tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum PrimitiveKind {
    Byte = 0,
    /// Widened to `i16` on the wire.
    SByte = 1,
    /// Unicode scalar value as `u32`.
    Char = 2,
    Bool = 3,
    Int16 = 4,
    Int32 = 5,
    Int64 = 6,
    UInt16 = 7,
    UInt32 = 8,
    UInt64 = 9,
    Float = 10,
    Double = 11,
    /// Eight independent booleans packed into one byte.
    Flags8 = 12,
}

impl PrimitiveKind {
    /// All kinds in tag order.
    pub const ALL: [Self; 13] = [
        Self::Byte,
        Self::SByte,
        Self::Char,
        Self::Bool,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::UInt16,
        Self::UInt32,
        Self::UInt64,
        Self::Float,
        Self::Double,
        Self::Flags8,
    ];

    /// Parses a kind from its wire tag.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Byte),
            1 => Some(Self::SByte),
            2 => Some(Self::Char),
            3 => Some(Self::Bool),
            4 => Some(Self::Int16),
            5 => Some(Self::Int32),
            6 => Some(Self::Int64),
            7 => Some(Self::UInt16),
            8 => Some(Self::UInt32),
            9 => Some(Self::UInt64),
            10 => Some(Self::Float),
            11 => Some(Self::Double),
            12 => Some(Self::Flags8),
            _ => None,
        }
    }

    /// Returns the wire tag.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Number of bytes the value occupies on the wire (tag excluded).
    #[must_use]
    pub const fn wire_width(self) -> usize {
        match self {
            Self::Byte | Self::Bool | Self::Flags8 => 1,
            Self::SByte | Self::Int16 | Self::UInt16 => 2,
            Self::Char | Self::Int32 | Self::UInt32 | Self::Float => 4,
            Self::Int64 | Self::UInt64 | Self::Double => 8,
        }
    }

    /// Human readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Byte => "byte",
            Self::SByte => "sbyte",
            Self::Char => "char",
            Self::Bool => "bool",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float => "float",
            Self::Double => "double",
            Self::Flags8 => "flags8",
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a field slot holds, with its stable wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum FieldKind {
    Primitive = 0,
    Trigger = 1,
    Snapshot = 2,
    Custom = 3,
}

impl FieldKind {
    /// Parses a field kind from its wire tag.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Primitive),
            1 => Some(Self::Trigger),
            2 => Some(Self::Snapshot),
            3 => Some(Self::Custom),
            _ => None,
        }
    }

    /// Returns the wire tag.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Human readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Primitive => "primitive",
            Self::Trigger => "trigger",
            Self::Snapshot => "snapshot",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
