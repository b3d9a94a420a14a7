//! Field storage and typed field handles.

use std::fmt;
use std::marker::PhantomData;

use schema::{FieldId, FieldKind, PrimitiveValue};

use crate::custom::CustomSnapshot;
use crate::types::SnapshotHandle;

/// The atomic unit of replicated state.
#[derive(Debug)]
pub enum Field {
    /// A primitive value. `never_compress` fields are sent every payload.
    Primitive {
        value: PrimitiveValue,
        never_compress: bool,
    },
    /// Activations since the last serialize, clamped to 255.
    Trigger { count: u8 },
    /// A child snapshot serialized inline.
    Nested { child: SnapshotHandle },
    /// An opaque length-prefixed blob.
    Custom { body: Box<dyn CustomSnapshot> },
}

impl Field {
    pub(crate) const fn primitive(value: PrimitiveValue, never_compress: bool) -> Self {
        Self::Primitive {
            value,
            never_compress,
        }
    }

    /// Wire kind of the field.
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::Primitive { .. } => FieldKind::Primitive,
            Self::Trigger { .. } => FieldKind::Trigger,
            Self::Nested { .. } => FieldKind::Snapshot,
            Self::Custom { .. } => FieldKind::Custom,
        }
    }

    /// Name of what the field holds, down to the primitive kind.
    #[must_use]
    pub const fn describe(&self) -> &'static str {
        match self {
            Self::Primitive { value, .. } => value.kind().name(),
            other => other.kind().name(),
        }
    }

    /// Value captured into delta snapshots, if the field is compressible.
    #[must_use]
    pub const fn compressible_value(&self) -> Option<PrimitiveValue> {
        match self {
            Self::Primitive {
                value,
                never_compress: false,
            } => Some(*value),
            _ => None,
        }
    }
}

/// Handle to a static primitive field holding a `T`.
pub struct PrimitiveField<T> {
    id: FieldId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PrimitiveField<T> {
    pub(crate) const fn new(id: FieldId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Static field id.
    #[must_use]
    pub const fn id(self) -> FieldId {
        self.id
    }
}

impl<T> Clone for PrimitiveField<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PrimitiveField<T> {}

impl<T> fmt::Debug for PrimitiveField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrimitiveField({})", self.id)
    }
}

impl<T> PartialEq for PrimitiveField<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for PrimitiveField<T> {}

/// Handle to a static trigger field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerField(pub(crate) FieldId);

impl TriggerField {
    /// Static field id.
    #[must_use]
    pub const fn id(self) -> FieldId {
        self.0
    }
}

/// Handle to a static nested snapshot field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NestedField(pub(crate) FieldId);

impl NestedField {
    /// Static field id.
    #[must_use]
    pub const fn id(self) -> FieldId {
        self.0
    }
}

/// Handle to a static custom field holding a `T`.
pub struct CustomField<T> {
    id: FieldId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> CustomField<T> {
    pub(crate) const fn new(id: FieldId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Static field id.
    #[must_use]
    pub const fn id(self) -> FieldId {
        self.id
    }
}

impl<T> Clone for CustomField<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for CustomField<T> {}

impl<T> fmt::Debug for CustomField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomField({})", self.id)
    }
}
