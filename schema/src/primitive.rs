//! Mapping between Rust types and primitive kinds.

use std::fmt::Debug;

use crate::kind::PrimitiveKind;
use crate::value::{DynamicKey, Flags8, PrimitiveValue};

mod sealed {
    pub trait Sealed {}
}

/// A Rust type that can be stored in a primitive field.
///
/// Implemented for exactly the types that have a [`PrimitiveKind`]; the set
/// is sealed so an unsupported kind cannot reach a field.
pub trait Primitive: sealed::Sealed + Copy + Debug + PartialEq + 'static {
    /// Kind tag used on the wire.
    const KIND: PrimitiveKind;

    /// Wraps the value.
    fn into_value(self) -> PrimitiveValue;

    /// Unwraps a value of the matching kind.
    fn from_value(value: PrimitiveValue) -> Option<Self>;
}

macro_rules! impl_primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Primitive for $ty {
                const KIND: PrimitiveKind = PrimitiveKind::$variant;

                fn into_value(self) -> PrimitiveValue {
                    PrimitiveValue::$variant(self)
                }

                fn from_value(value: PrimitiveValue) -> Option<Self> {
                    match value {
                        PrimitiveValue::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for PrimitiveValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }

            impl From<$ty> for DynamicKey {
                fn from(value: $ty) -> Self {
                    Self::new(PrimitiveValue::$variant(value))
                }
            }
        )*
    };
}

impl_primitive! {
    u8 => Byte,
    i8 => SByte,
    char => Char,
    bool => Bool,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    Flags8 => Flags8,
}
