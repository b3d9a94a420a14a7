//! Primitive values and dynamic field keys.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::kind::PrimitiveKind;

/// Eight independent booleans packed into one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Flags8(u8);

impl Flags8 {
    /// Creates flags from raw bits (bit `i` is flag `i`).
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns flag `index` (0..8). Out of range indices read as `false`.
    #[must_use]
    pub const fn get(self, index: u8) -> bool {
        index < 8 && self.0 & (1 << index) != 0
    }

    /// Sets flag `index` (0..8). Out of range indices are ignored.
    pub fn set(&mut self, index: u8, value: bool) {
        if index >= 8 {
            return;
        }
        if value {
            self.0 |= 1 << index;
        } else {
            self.0 &= !(1 << index);
        }
    }

    /// Builder form of [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, index: u8, value: bool) -> Self {
        self.set(index, value);
        self
    }
}

/// A value of one of the primitive kinds.
///
/// Equality and hashing are bitwise for floats, so `NaN == NaN` and
/// `0.0 != -0.0`. That is the comparison delta baselines need: a value is
/// unchanged only if it would encode to the same bytes.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PrimitiveValue {
    Byte(u8),
    SByte(i8),
    Char(char),
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Flags8(Flags8),
}

impl PrimitiveValue {
    /// The kind of this value.
    #[must_use]
    pub const fn kind(&self) -> PrimitiveKind {
        match self {
            Self::Byte(_) => PrimitiveKind::Byte,
            Self::SByte(_) => PrimitiveKind::SByte,
            Self::Char(_) => PrimitiveKind::Char,
            Self::Bool(_) => PrimitiveKind::Bool,
            Self::Int16(_) => PrimitiveKind::Int16,
            Self::Int32(_) => PrimitiveKind::Int32,
            Self::Int64(_) => PrimitiveKind::Int64,
            Self::UInt16(_) => PrimitiveKind::UInt16,
            Self::UInt32(_) => PrimitiveKind::UInt32,
            Self::UInt64(_) => PrimitiveKind::UInt64,
            Self::Float(_) => PrimitiveKind::Float,
            Self::Double(_) => PrimitiveKind::Double,
            Self::Flags8(_) => PrimitiveKind::Flags8,
        }
    }

    /// The zero value of `kind`.
    #[must_use]
    pub const fn zero(kind: PrimitiveKind) -> Self {
        match kind {
            PrimitiveKind::Byte => Self::Byte(0),
            PrimitiveKind::SByte => Self::SByte(0),
            PrimitiveKind::Char => Self::Char('\0'),
            PrimitiveKind::Bool => Self::Bool(false),
            PrimitiveKind::Int16 => Self::Int16(0),
            PrimitiveKind::Int32 => Self::Int32(0),
            PrimitiveKind::Int64 => Self::Int64(0),
            PrimitiveKind::UInt16 => Self::UInt16(0),
            PrimitiveKind::UInt32 => Self::UInt32(0),
            PrimitiveKind::UInt64 => Self::UInt64(0),
            PrimitiveKind::Float => Self::Float(0.0),
            PrimitiveKind::Double => Self::Double(0.0),
            PrimitiveKind::Flags8 => Self::Flags8(Flags8(0)),
        }
    }

    // Payload as raw bits, for bitwise comparison.
    #[allow(clippy::cast_sign_loss)]
    fn raw_bits(&self) -> u64 {
        match *self {
            Self::Byte(v) => u64::from(v),
            Self::SByte(v) => v as u64,
            Self::Char(v) => u64::from(u32::from(v)),
            Self::Bool(v) => u64::from(v),
            Self::Int16(v) => v as u64,
            Self::Int32(v) => v as u64,
            Self::Int64(v) => v as u64,
            Self::UInt16(v) => u64::from(v),
            Self::UInt32(v) => u64::from(v),
            Self::UInt64(v) => v,
            Self::Float(v) => u64::from(v.to_bits()),
            Self::Double(v) => v.to_bits(),
            Self::Flags8(v) => u64::from(v.bits()),
        }
    }
}

impl PartialEq for PrimitiveValue {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.raw_bits() == other.raw_bits()
    }
}

impl Eq for PrimitiveValue {}

impl Hash for PrimitiveValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        self.raw_bits().hash(state);
    }
}

impl fmt::Display for PrimitiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte(v) => write!(f, "{v}u8"),
            Self::SByte(v) => write!(f, "{v}i8"),
            Self::Char(v) => write!(f, "{v:?}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}i16"),
            Self::Int32(v) => write!(f, "{v}i32"),
            Self::Int64(v) => write!(f, "{v}i64"),
            Self::UInt16(v) => write!(f, "{v}u16"),
            Self::UInt32(v) => write!(f, "{v}u32"),
            Self::UInt64(v) => write!(f, "{v}u64"),
            Self::Float(v) => write!(f, "{v}f32"),
            Self::Double(v) => write!(f, "{v}f64"),
            Self::Flags8(v) => write!(f, "0b{:08b}", v.bits()),
        }
    }
}

/// Key of a dynamic field: any primitive value.
///
/// The key's kind tag is written on the wire ahead of the key bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DynamicKey(PrimitiveValue);

impl DynamicKey {
    /// Wraps a primitive value as a key.
    #[must_use]
    pub const fn new(value: PrimitiveValue) -> Self {
        Self(value)
    }

    /// The wrapped value.
    #[must_use]
    pub const fn value(&self) -> PrimitiveValue {
        self.0
    }

    /// Kind of the key.
    #[must_use]
    pub const fn kind(&self) -> PrimitiveKind {
        self.0.kind()
    }
}

impl From<PrimitiveValue> for DynamicKey {
    fn from(value: PrimitiveValue) -> Self {
        Self(value)
    }
}

impl fmt::Display for DynamicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0)
    }
}
