//! The schema and current-value container for one replicated object.

use std::collections::{BTreeMap, HashMap};

use bitstream::{BitReader, BitWriter};
use schema::{
    read_kind, read_primitive, read_tagged_primitive, skip_primitive, write_primitive, DynamicKey,
    FieldId, FieldKind, FieldRef, Primitive, PrimitiveValue, SchemaError, SchemaResult,
};
use tracing::trace;
use wire::{EncodeError, LimitKind, SnapshotHeader};

use crate::custom::{downcast_mut, downcast_ref, CustomSnapshot};
use crate::delta::DeltaState;
use crate::error::CodecResult;
use crate::field::{CustomField, Field, NestedField, PrimitiveField, TriggerField};
use crate::limits::CodecLimits;
use crate::skip::{read_custom_len, read_field_kind, read_header, skip_field_payload};
use crate::types::{ConnectionId, Role, SnapshotHandle, SnapshotId};

/// Serializes a nested child into the parent's payload.
pub(crate) type NestedWriter<'a> = dyn FnMut(SnapshotHandle, &mut BitWriter) -> CodecResult<()> + 'a;

/// Deserializes a nested child from the parent's payload.
pub(crate) type NestedReader<'a> = dyn FnMut(SnapshotHandle, &mut BitReader<'_>) -> CodecResult<()> + 'a;

/// One replicated object: its identity, its fields and its delta state.
///
/// Snapshots live inside a [`SnapshotSystem`](crate::SnapshotSystem), which
/// negotiates ids and drives serialization. Game code registers fields,
/// calls [`setup`](crate::SnapshotSystem::setup), then reads and writes
/// values through the typed handles returned at registration.
#[derive(Debug)]
pub struct Snapshot {
    unique_id: String,
    role: Role,
    connection: ConnectionId,
    id: Option<SnapshotId>,
    setup: bool,
    static_fields: BTreeMap<FieldId, Field>,
    next_static_id: Option<FieldId>,
    dynamic_fields: HashMap<DynamicKey, Field>,
    parent: Option<SnapshotHandle>,
    pub(crate) delta: DeltaState,
    accept_remote_dynamic: bool,
}

impl Snapshot {
    pub(crate) fn new(unique_id: String, role: Role, connection: ConnectionId) -> Self {
        Self {
            unique_id,
            role,
            connection,
            id: None,
            setup: false,
            static_fields: BTreeMap::new(),
            next_static_id: Some(0),
            dynamic_fields: HashMap::new(),
            parent: None,
            delta: DeltaState::Disabled,
            accept_remote_dynamic: false,
        }
    }

    /// Stable schema-level identity.
    #[must_use]
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Whether this side owns the snapshot or mirrors it.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Returns `true` on the side that allocates the id.
    #[must_use]
    pub const fn is_owner(&self) -> bool {
        self.role.is_owner()
    }

    /// Connection the snapshot is replicated over.
    #[must_use]
    pub const fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Negotiated id, once bound.
    #[must_use]
    pub const fn id(&self) -> Option<SnapshotId> {
        self.id
    }

    /// Returns `true` once the id is bound.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.id.is_some()
    }

    /// Returns `true` once setup has run and static fields are closed.
    #[must_use]
    pub const fn is_setup(&self) -> bool {
        self.setup
    }

    /// Snapshot this one is nested in.
    #[must_use]
    pub const fn parent(&self) -> Option<SnapshotHandle> {
        self.parent
    }

    /// Returns `true` once delta bookkeeping is active.
    #[must_use]
    pub const fn is_delta_compressing(&self) -> bool {
        self.delta.is_active()
    }

    /// Delta compression state.
    #[must_use]
    pub const fn delta_state(&self) -> &DeltaState {
        &self.delta
    }

    /// When enabled, unknown dynamic keys carrying primitive or trigger
    /// payloads create new dynamic fields instead of being skipped.
    pub fn accept_remote_dynamic_fields(&mut self, accept: bool) {
        self.accept_remote_dynamic = accept;
    }

    pub(crate) fn bind(&mut self, id: SnapshotId) {
        self.id = Some(id);
    }

    pub(crate) fn unbind(&mut self) -> Option<SnapshotId> {
        self.id.take()
    }

    pub(crate) fn mark_setup(&mut self) -> SchemaResult<()> {
        if self.setup {
            return Err(SchemaError::AlreadySetup {
                unique_id: self.unique_id.clone(),
            });
        }
        self.setup = true;
        Ok(())
    }

    pub(crate) fn clear_setup(&mut self) {
        self.setup = false;
    }

    pub(crate) fn set_parent(&mut self, parent: Option<SnapshotHandle>) {
        self.parent = parent;
    }

    // ---- static registration ----

    /// Registers a static primitive field.
    pub fn add_primitive<T: Primitive>(&mut self, initial: T) -> SchemaResult<PrimitiveField<T>> {
        let id = self.add_static(Field::primitive(initial.into_value(), false))?;
        Ok(PrimitiveField::new(id))
    }

    /// Registers a static primitive field that is sent in every payload.
    pub fn add_primitive_never_compress<T: Primitive>(
        &mut self,
        initial: T,
    ) -> SchemaResult<PrimitiveField<T>> {
        let id = self.add_static(Field::primitive(initial.into_value(), true))?;
        Ok(PrimitiveField::new(id))
    }

    /// Registers a static trigger field.
    pub fn add_trigger(&mut self) -> SchemaResult<TriggerField> {
        self.add_static(Field::Trigger { count: 0 }).map(TriggerField)
    }

    /// Registers a static custom field.
    pub fn add_custom<T: CustomSnapshot>(&mut self, body: T) -> SchemaResult<CustomField<T>> {
        let id = self.add_static(Field::Custom {
            body: Box::new(body),
        })?;
        Ok(CustomField::new(id))
    }

    pub(crate) fn add_nested(&mut self, child: SnapshotHandle) -> SchemaResult<NestedField> {
        self.add_static(Field::Nested { child }).map(NestedField)
    }

    fn add_static(&mut self, field: Field) -> SchemaResult<FieldId> {
        if self.setup {
            return Err(SchemaError::SchemaClosed {
                unique_id: self.unique_id.clone(),
            });
        }
        let id = self.next_static_id.ok_or_else(|| SchemaError::FieldIdsExhausted {
            unique_id: self.unique_id.clone(),
        })?;
        self.static_fields.insert(id, field);
        self.next_static_id = id.checked_add(1);
        Ok(id)
    }

    // ---- static access ----

    /// Reads a primitive field.
    pub fn get<T: Primitive>(&self, field: PrimitiveField<T>) -> SchemaResult<T> {
        let id = field.id();
        match self.static_field(id)? {
            Field::Primitive { value, .. } => T::from_value(*value).ok_or_else(|| {
                mismatch(FieldRef::Static(id), T::KIND.name(), value.kind().name())
            }),
            other => Err(mismatch(FieldRef::Static(id), T::KIND.name(), other.describe())),
        }
    }

    /// Writes a primitive field.
    pub fn set<T: Primitive>(&mut self, field: PrimitiveField<T>, value: T) -> SchemaResult<()> {
        let id = field.id();
        let slot = primitive_slot(self.static_field_mut(id)?, FieldRef::Static(id), T::KIND.name())?;
        if slot.kind() != T::KIND {
            return Err(mismatch(FieldRef::Static(id), T::KIND.name(), slot.kind().name()));
        }
        *slot = value.into_value();
        Ok(())
    }

    /// Counts one activation of a trigger (saturating at 255).
    pub fn fire(&mut self, field: TriggerField) -> SchemaResult<()> {
        let id = field.id();
        let count = trigger_slot(self.static_field_mut(id)?, FieldRef::Static(id))?;
        *count = count.saturating_add(1);
        Ok(())
    }

    /// Activations counted or received, without resetting.
    pub fn trigger_count(&self, field: TriggerField) -> SchemaResult<u8> {
        let id = field.id();
        match self.static_field(id)? {
            Field::Trigger { count } => Ok(*count),
            other => Err(mismatch(FieldRef::Static(id), "trigger", other.describe())),
        }
    }

    /// Reads and resets a trigger.
    pub fn take_trigger(&mut self, field: TriggerField) -> SchemaResult<u8> {
        let id = field.id();
        let count = trigger_slot(self.static_field_mut(id)?, FieldRef::Static(id))?;
        Ok(std::mem::take(count))
    }

    /// Child snapshot of a nested field.
    pub fn nested(&self, field: NestedField) -> SchemaResult<SnapshotHandle> {
        let id = field.id();
        match self.static_field(id)? {
            Field::Nested { child } => Ok(*child),
            other => Err(mismatch(FieldRef::Static(id), "snapshot", other.describe())),
        }
    }

    /// Borrows a custom field.
    pub fn custom<T: CustomSnapshot>(&self, field: CustomField<T>) -> SchemaResult<&T> {
        let id = field.id();
        match self.static_field(id)? {
            Field::Custom { body } => downcast_ref::<T>(body.as_ref())
                .ok_or_else(|| mismatch(FieldRef::Static(id), std::any::type_name::<T>(), "custom")),
            other => Err(mismatch(FieldRef::Static(id), "custom", other.describe())),
        }
    }

    /// Mutably borrows a custom field.
    pub fn custom_mut<T: CustomSnapshot>(&mut self, field: CustomField<T>) -> SchemaResult<&mut T> {
        let id = field.id();
        match self.static_field_mut(id)? {
            Field::Custom { body } => downcast_mut::<T>(body.as_mut())
                .ok_or_else(|| mismatch(FieldRef::Static(id), std::any::type_name::<T>(), "custom")),
            other => Err(mismatch(FieldRef::Static(id), "custom", other.describe())),
        }
    }

    /// Static field by id.
    pub fn static_field(&self, id: FieldId) -> SchemaResult<&Field> {
        self.static_fields
            .get(&id)
            .ok_or(SchemaError::UnknownField {
                field: FieldRef::Static(id),
            })
    }

    fn static_field_mut(&mut self, id: FieldId) -> SchemaResult<&mut Field> {
        self.static_fields
            .get_mut(&id)
            .ok_or(SchemaError::UnknownField {
                field: FieldRef::Static(id),
            })
    }

    /// Number of static fields.
    #[must_use]
    pub fn static_len(&self) -> usize {
        self.static_fields.len()
    }

    // ---- dynamic fields ----

    /// Adds a dynamic primitive field. Allowed at any time.
    pub fn add_dynamic_primitive(
        &mut self,
        key: impl Into<DynamicKey>,
        value: impl Into<PrimitiveValue>,
    ) -> SchemaResult<()> {
        self.add_dynamic(key.into(), Field::primitive(value.into(), false))
    }

    /// Adds a dynamic primitive field that is sent in every payload.
    pub fn add_dynamic_primitive_never_compress(
        &mut self,
        key: impl Into<DynamicKey>,
        value: impl Into<PrimitiveValue>,
    ) -> SchemaResult<()> {
        self.add_dynamic(key.into(), Field::primitive(value.into(), true))
    }

    /// Adds a dynamic trigger field.
    pub fn add_dynamic_trigger(&mut self, key: impl Into<DynamicKey>) -> SchemaResult<()> {
        self.add_dynamic(key.into(), Field::Trigger { count: 0 })
    }

    /// Adds a dynamic custom field.
    pub fn add_dynamic_custom<T: CustomSnapshot>(
        &mut self,
        key: impl Into<DynamicKey>,
        body: T,
    ) -> SchemaResult<()> {
        self.add_dynamic(
            key.into(),
            Field::Custom {
                body: Box::new(body),
            },
        )
    }

    pub(crate) fn add_dynamic_nested(&mut self, key: DynamicKey, child: SnapshotHandle) -> SchemaResult<()> {
        self.add_dynamic(key, Field::Nested { child })
    }

    fn add_dynamic(&mut self, key: DynamicKey, field: Field) -> SchemaResult<()> {
        if self.dynamic_fields.contains_key(&key) {
            return Err(SchemaError::DuplicateDynamicKey { key });
        }
        self.dynamic_fields.insert(key, field);
        Ok(())
    }

    pub(crate) fn remove_dynamic(&mut self, key: &DynamicKey) -> Option<Field> {
        self.dynamic_fields.remove(key)
    }

    /// Drops dynamic fields pointing at `child`. Static nested fields stay
    /// and serialize as empty payloads.
    pub(crate) fn detach_child(&mut self, child: SnapshotHandle) {
        self.dynamic_fields
            .retain(|_, field| !matches!(field, Field::Nested { child: c } if *c == child));
    }

    /// Reads a dynamic primitive field.
    pub fn get_dynamic(&self, key: impl Into<DynamicKey>) -> SchemaResult<PrimitiveValue> {
        let key = key.into();
        match self.dynamic_field(&key)? {
            Field::Primitive { value, .. } => Ok(*value),
            other => Err(mismatch(FieldRef::Dynamic(key), "primitive", other.describe())),
        }
    }

    /// Reads a dynamic primitive field as `T`.
    pub fn get_dynamic_as<T: Primitive>(&self, key: impl Into<DynamicKey>) -> SchemaResult<T> {
        let key = key.into();
        let value = self.get_dynamic(key)?;
        T::from_value(value)
            .ok_or_else(|| mismatch(FieldRef::Dynamic(key), T::KIND.name(), value.kind().name()))
    }

    /// Writes a dynamic primitive field. The kind must not change.
    pub fn set_dynamic(
        &mut self,
        key: impl Into<DynamicKey>,
        value: impl Into<PrimitiveValue>,
    ) -> SchemaResult<()> {
        let key = key.into();
        let value = value.into();
        let slot = primitive_slot(
            self.dynamic_field_mut(&key)?,
            FieldRef::Dynamic(key),
            value.kind().name(),
        )?;
        if slot.kind() != value.kind() {
            return Err(mismatch(
                FieldRef::Dynamic(key),
                value.kind().name(),
                slot.kind().name(),
            ));
        }
        *slot = value;
        Ok(())
    }

    /// Counts one activation of a dynamic trigger.
    pub fn fire_dynamic(&mut self, key: impl Into<DynamicKey>) -> SchemaResult<()> {
        let key = key.into();
        let count = trigger_slot(self.dynamic_field_mut(&key)?, FieldRef::Dynamic(key))?;
        *count = count.saturating_add(1);
        Ok(())
    }

    /// Reads and resets a dynamic trigger.
    pub fn take_dynamic_trigger(&mut self, key: impl Into<DynamicKey>) -> SchemaResult<u8> {
        let key = key.into();
        let count = trigger_slot(self.dynamic_field_mut(&key)?, FieldRef::Dynamic(key))?;
        Ok(std::mem::take(count))
    }

    /// Child snapshot of a dynamic nested field.
    pub fn dynamic_nested(&self, key: impl Into<DynamicKey>) -> SchemaResult<SnapshotHandle> {
        let key = key.into();
        match self.dynamic_field(&key)? {
            Field::Nested { child } => Ok(*child),
            other => Err(mismatch(FieldRef::Dynamic(key), "snapshot", other.describe())),
        }
    }

    /// Mutably borrows a dynamic custom field.
    pub fn dynamic_custom_mut<T: CustomSnapshot>(
        &mut self,
        key: impl Into<DynamicKey>,
    ) -> SchemaResult<&mut T> {
        let key = key.into();
        match self.dynamic_field_mut(&key)? {
            Field::Custom { body } => downcast_mut::<T>(body.as_mut()).ok_or_else(|| {
                mismatch(FieldRef::Dynamic(key), std::any::type_name::<T>(), "custom")
            }),
            other => Err(mismatch(FieldRef::Dynamic(key), "custom", other.describe())),
        }
    }

    /// Dynamic field by key.
    pub fn dynamic_field(&self, key: &DynamicKey) -> SchemaResult<&Field> {
        self.dynamic_fields
            .get(key)
            .ok_or(SchemaError::UnknownField {
                field: FieldRef::Dynamic(*key),
            })
    }

    fn dynamic_field_mut(&mut self, key: &DynamicKey) -> SchemaResult<&mut Field> {
        self.dynamic_fields
            .get_mut(key)
            .ok_or(SchemaError::UnknownField {
                field: FieldRef::Dynamic(*key),
            })
    }

    /// Returns `true` if a dynamic field exists under `key`.
    #[must_use]
    pub fn has_dynamic(&self, key: impl Into<DynamicKey>) -> bool {
        self.dynamic_fields.contains_key(&key.into())
    }

    /// Keys of all dynamic fields, in no particular order.
    pub fn dynamic_keys(&self) -> impl Iterator<Item = &DynamicKey> {
        self.dynamic_fields.keys()
    }

    /// Handles of every nested child, static then dynamic.
    #[must_use]
    pub fn children(&self) -> Vec<SnapshotHandle> {
        self.static_fields
            .values()
            .chain(self.dynamic_fields.values())
            .filter_map(|field| match field {
                Field::Nested { child } => Some(*child),
                _ => None,
            })
            .collect()
    }

    // ---- wire ----

    /// Writes the payload, recursing into children through `nested`.
    ///
    /// Nothing is consumed until [`commit_serialized`](Self::commit_serialized).
    pub(crate) fn serialize_with(
        &mut self,
        writer: &mut BitWriter,
        limits: &CodecLimits,
        nested: &mut NestedWriter<'_>,
    ) -> CodecResult<()> {
        let baseline = match &self.delta {
            DeltaState::Outbound(history) => history.baseline(),
            _ => None,
        };
        let delta_id = match &self.delta {
            DeltaState::Outbound(history) => history.current_delta_id(),
            _ => 0,
        };
        let slot = SnapshotHeader::reserve(writer, delta_id)?;

        let mut static_count = 0usize;
        for (id, field) in &mut self.static_fields {
            let unchanged = |value: &PrimitiveValue| {
                baseline
                    .as_ref()
                    .is_some_and(|b| b.static_unchanged(*id, value))
            };
            if !should_send(field, unchanged) {
                continue;
            }
            writer.write_u16(*id)?;
            write_field(field, writer, limits, nested)?;
            static_count += 1;
        }

        let mut dynamic_count = 0usize;
        for (key, field) in &mut self.dynamic_fields {
            let unchanged = |value: &PrimitiveValue| {
                baseline
                    .as_ref()
                    .is_some_and(|b| b.dynamic_unchanged(key, value))
            };
            if !should_send(field, unchanged) {
                continue;
            }
            write_primitive(writer, key.value())?;
            write_field(field, writer, limits, nested)?;
            dynamic_count += 1;
        }

        slot.patch(
            writer,
            field_count(static_count, limits.max_static_fields, LimitKind::StaticFields)?,
            field_count(dynamic_count, limits.max_dynamic_fields, LimitKind::DynamicFields)?,
        )?;
        Ok(())
    }

    /// Applies the side effects of a written payload: sent triggers reset,
    /// custom bodies release what they wrote and the sent values become a
    /// delta history entry.
    ///
    /// Only called once the whole update, nested children included, was
    /// written, so a failed serialize leaves the snapshot untouched.
    pub(crate) fn commit_serialized(&mut self) {
        for field in self.static_fields.values_mut().chain(self.dynamic_fields.values_mut()) {
            match field {
                Field::Trigger { count } => *count = 0,
                Field::Custom { body } => body.on_serialized(),
                Field::Primitive { .. } | Field::Nested { .. } => {}
            }
        }
        if let DeltaState::Outbound(history) = &mut self.delta {
            let statics = self
                .static_fields
                .iter()
                .filter_map(|(id, f)| f.compressible_value().map(|v| (*id, v)))
                .collect();
            let dynamics = self
                .dynamic_fields
                .iter()
                .filter_map(|(key, f)| f.compressible_value().map(|v| (*key, v)))
                .collect();
            history.push(statics, dynamics);
        }
    }

    /// Applies a payload, recursing into children through `nested`.
    ///
    /// `depth` is this payload's nesting depth, used to bound skipped
    /// children.
    pub(crate) fn deserialize_with(
        &mut self,
        reader: &mut BitReader<'_>,
        limits: &CodecLimits,
        depth: usize,
        nested: &mut NestedReader<'_>,
    ) -> CodecResult<()> {
        for field in self.static_fields.values_mut().chain(self.dynamic_fields.values_mut()) {
            if let Field::Trigger { count } = field {
                *count = 0;
            }
        }

        let header = read_header(reader, limits)?;

        for _ in 0..header.static_count {
            let id = reader.read_u16()?;
            let kind = read_field_kind(reader)?;
            match self.static_fields.get_mut(&id) {
                Some(field) if field.kind() == kind => {
                    apply_field(field, reader, limits, nested)?;
                }
                found => {
                    trace!(
                        unique_id = %self.unique_id,
                        field = id,
                        wire_kind = %kind,
                        local = found.map(|f| f.describe()),
                        "skipping static field"
                    );
                    skip_field_payload(reader, kind, limits, depth)?;
                }
            }
        }

        for _ in 0..header.dynamic_count {
            let key = DynamicKey::new(read_tagged_primitive(reader)?);
            let kind = read_field_kind(reader)?;
            if !self.dynamic_fields.contains_key(&key) && self.accept_remote_dynamic {
                match kind {
                    FieldKind::Primitive => {
                        let value = read_tagged_primitive(reader)?;
                        trace!(unique_id = %self.unique_id, %key, "accepted remote dynamic primitive");
                        self.dynamic_fields.insert(key, Field::primitive(value, false));
                        continue;
                    }
                    FieldKind::Trigger => {
                        let count = reader.read_u8()?;
                        trace!(unique_id = %self.unique_id, %key, "accepted remote dynamic trigger");
                        self.dynamic_fields.insert(key, Field::Trigger { count });
                        continue;
                    }
                    FieldKind::Snapshot | FieldKind::Custom => {}
                }
            }
            match self.dynamic_fields.get_mut(&key) {
                Some(field) if field.kind() == kind => {
                    apply_field(field, reader, limits, nested)?;
                }
                _ => {
                    trace!(unique_id = %self.unique_id, %key, wire_kind = %kind, "skipping dynamic field");
                    skip_field_payload(reader, kind, limits, depth)?;
                }
            }
        }

        // only a fully applied payload may become a baseline
        if let DeltaState::Inbound(pending) = &mut self.delta {
            if !pending.record(header.delta_id) {
                trace!(unique_id = %self.unique_id, delta_id = header.delta_id, "delta id too old to acknowledge");
            }
        }
        Ok(())
    }
}

fn should_send(field: &Field, unchanged: impl FnOnce(&PrimitiveValue) -> bool) -> bool {
    match field {
        Field::Primitive {
            value,
            never_compress,
        } => *never_compress || !unchanged(value),
        Field::Trigger { count } => *count > 0,
        Field::Nested { .. } | Field::Custom { .. } => true,
    }
}

fn write_field(
    field: &mut Field,
    writer: &mut BitWriter,
    limits: &CodecLimits,
    nested: &mut NestedWriter<'_>,
) -> CodecResult<()> {
    writer.write_u8(field.kind().tag())?;
    match field {
        Field::Primitive { value, .. } => write_primitive(writer, *value)?,
        Field::Trigger { count } => writer.write_u8(*count)?,
        Field::Nested { child } => nested(*child, writer)?,
        Field::Custom { body } => {
            let len_at = writer.byte_len();
            writer.write_u16(0)?;
            let start = writer.byte_len();
            body.on_serialize(writer)?;
            writer.align_to_byte();
            let len = writer.byte_len() - start;
            let cap = limits.custom_bytes_cap();
            if len > cap {
                return Err(EncodeError::LimitsExceeded {
                    kind: LimitKind::CustomBytes,
                    limit: cap,
                    actual: len,
                }
                .into());
            }
            writer.patch_u16(len_at, count_u16(len, LimitKind::CustomBytes)?)?;
        }
    }
    Ok(())
}

fn apply_field(
    field: &mut Field,
    reader: &mut BitReader<'_>,
    limits: &CodecLimits,
    nested: &mut NestedReader<'_>,
) -> CodecResult<()> {
    match field {
        Field::Primitive { value, .. } => {
            let kind = read_kind(reader)?;
            if kind == value.kind() {
                *value = read_primitive(reader, kind)?;
            } else {
                trace!(local = %value.kind(), wire = %kind, "skipping primitive of another kind");
                skip_primitive(reader, kind)?;
            }
        }
        Field::Trigger { count } => *count = reader.read_u8()?,
        Field::Nested { child } => nested(*child, reader)?,
        Field::Custom { body } => {
            let len = read_custom_len(reader, limits)?;
            let blob = reader.read_bytes(len)?;
            body.on_deserialize(&mut BitReader::new(blob))?;
        }
    }
    Ok(())
}

fn primitive_slot<'a>(
    field: &'a mut Field,
    at: FieldRef,
    expected: &'static str,
) -> SchemaResult<&'a mut PrimitiveValue> {
    match field {
        Field::Primitive { value, .. } => Ok(value),
        other => Err(mismatch(at, expected, other.describe())),
    }
}

fn trigger_slot(field: &mut Field, at: FieldRef) -> SchemaResult<&mut u8> {
    match field {
        Field::Trigger { count } => Ok(count),
        other => Err(mismatch(at, "trigger", other.describe())),
    }
}

const fn mismatch(field: FieldRef, expected: &'static str, found: &'static str) -> SchemaError {
    SchemaError::FieldTypeMismatch {
        field,
        expected,
        found,
    }
}

fn field_count(count: usize, limit: usize, kind: LimitKind) -> CodecResult<u16> {
    if count > limit {
        return Err(EncodeError::LimitsExceeded {
            kind,
            limit,
            actual: count,
        }
        .into());
    }
    count_u16(count, kind)
}

fn count_u16(count: usize, kind: LimitKind) -> CodecResult<u16> {
    u16::try_from(count).map_err(|_| {
        EncodeError::LimitsExceeded {
            kind,
            limit: usize::from(u16::MAX),
            actual: count,
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom::{CustomQueue, QueueItem};
    use schema::Flags8;

    fn owner() -> Snapshot {
        Snapshot::new("Test".to_owned(), Role::Owner, ConnectionId::new(1))
    }

    fn no_nesting_writer() -> impl FnMut(SnapshotHandle, &mut BitWriter) -> CodecResult<()> {
        |_: SnapshotHandle, _: &mut BitWriter| -> CodecResult<()> {
            panic!("no nested fields in this test")
        }
    }

    fn no_nesting_reader() -> impl FnMut(SnapshotHandle, &mut BitReader<'_>) -> CodecResult<()> {
        |_: SnapshotHandle, _: &mut BitReader<'_>| -> CodecResult<()> {
            panic!("no nested fields in this test")
        }
    }

    fn serialize(snap: &mut Snapshot) -> Vec<u8> {
        let mut writer = BitWriter::new();
        snap.serialize_with(&mut writer, &CodecLimits::default(), &mut no_nesting_writer())
            .unwrap();
        snap.commit_serialized();
        writer.finish()
    }

    fn deserialize(snap: &mut Snapshot, bytes: &[u8]) {
        let mut reader = BitReader::new(bytes);
        snap.deserialize_with(&mut reader, &CodecLimits::default(), 0, &mut no_nesting_reader())
            .unwrap();
        assert!(reader.is_empty());
    }

    #[derive(Debug, PartialEq)]
    struct Bullet(u16);

    impl QueueItem for Bullet {
        fn write(&self, writer: &mut BitWriter) -> CodecResult<()> {
            writer.write_u16(self.0)?;
            Ok(())
        }

        fn read(reader: &mut BitReader<'_>) -> CodecResult<Self> {
            Ok(Self(reader.read_u16()?))
        }
    }

    #[test]
    fn identity_accessors() {
        let snap = owner();
        assert_eq!(snap.role(), Role::Owner);
        assert!(snap.is_owner());
        assert_eq!(snap.connection(), ConnectionId::new(1));

        let mirror = Snapshot::new("Test".to_owned(), Role::Remote, ConnectionId::new(4));
        assert_eq!(mirror.role(), Role::Remote);
        assert!(!mirror.is_owner());
        assert_eq!(mirror.connection(), ConnectionId::new(4));
    }

    #[test]
    fn static_ids_are_sequential() {
        let mut snap = owner();
        let a = snap.add_primitive(1u8).unwrap();
        let b = snap.add_trigger().unwrap();
        let c = snap.add_primitive(2.0f32).unwrap();
        assert_eq!((a.id(), b.id(), c.id()), (0, 1, 2));
        assert_eq!(snap.static_len(), 3);
    }

    #[test]
    fn registration_closes_after_setup() {
        let mut snap = owner();
        snap.add_primitive(0i32).unwrap();
        snap.mark_setup().unwrap();
        assert!(matches!(
            snap.add_primitive(1i32),
            Err(SchemaError::SchemaClosed { .. })
        ));
        assert!(matches!(
            snap.add_trigger(),
            Err(SchemaError::SchemaClosed { .. })
        ));
        assert!(matches!(
            snap.mark_setup(),
            Err(SchemaError::AlreadySetup { .. })
        ));
        // dynamic fields stay open
        snap.add_dynamic_primitive(7u32, 1.5f64).unwrap();
    }

    #[test]
    fn typed_access() {
        let mut snap = owner();
        let hp = snap.add_primitive(100i16).unwrap();
        let jump = snap.add_trigger().unwrap();
        snap.set(hp, 90).unwrap();
        assert_eq!(snap.get(hp).unwrap(), 90);
        snap.fire(jump).unwrap();
        snap.fire(jump).unwrap();
        assert_eq!(snap.trigger_count(jump).unwrap(), 2);
        assert_eq!(snap.take_trigger(jump).unwrap(), 2);
        assert_eq!(snap.trigger_count(jump).unwrap(), 0);
    }

    #[test]
    fn handle_from_other_schema_is_rejected() {
        let mut snap = owner();
        snap.add_trigger().unwrap();
        let bogus = PrimitiveField::<u8>::new(0);
        assert!(matches!(
            snap.get(bogus),
            Err(SchemaError::FieldTypeMismatch {
                expected: "byte",
                found: "trigger",
                ..
            })
        ));
        assert!(matches!(
            snap.get(PrimitiveField::<u8>::new(9)),
            Err(SchemaError::UnknownField { .. })
        ));
    }

    #[test]
    fn trigger_saturates() {
        let mut snap = owner();
        let t = snap.add_trigger().unwrap();
        for _ in 0..300 {
            snap.fire(t).unwrap();
        }
        assert_eq!(snap.trigger_count(t).unwrap(), 255);
    }

    #[test]
    fn dynamic_fields() {
        let mut snap = owner();
        snap.add_dynamic_primitive(1u32, 5i32).unwrap();
        assert!(matches!(
            snap.add_dynamic_trigger(1u32),
            Err(SchemaError::DuplicateDynamicKey { .. })
        ));
        snap.set_dynamic(1u32, 6i32).unwrap();
        assert_eq!(snap.get_dynamic_as::<i32>(1u32).unwrap(), 6);
        assert!(snap.set_dynamic(1u32, 6u8).is_err());
        assert!(snap.has_dynamic(1u32));
        assert!(!snap.has_dynamic(1u16));
        assert!(snap.remove_dynamic(&DynamicKey::from(1u32)).is_some());
        assert!(!snap.has_dynamic(1u32));
    }

    #[test]
    fn payload_layout() {
        let mut snap = owner();
        snap.add_primitive(0x0102u16).unwrap();
        let bytes = serialize(&mut snap);
        assert_eq!(
            bytes,
            vec![
                1, 0, // static count
                0, 0, // dynamic count
                0, // delta id
                0, 0, // field id
                0, // field kind: primitive
                7, // primitive kind: uint16
                0x02, 0x01,
            ]
        );
    }

    #[test]
    fn roundtrip_all_field_kinds() {
        let build = |snap: &mut Snapshot| {
            let a = snap.add_primitive('x').unwrap();
            let b = snap.add_primitive(Flags8::default()).unwrap();
            let c = snap.add_trigger().unwrap();
            let d = snap.add_custom(CustomQueue::<Bullet>::new()).unwrap();
            snap.add_dynamic_primitive(-3i64, 0u64).unwrap();
            (a, b, c, d)
        };
        let mut sender = owner();
        let (a, b, c, d) = build(&mut sender);
        let mut receiver = Snapshot::new("Test".to_owned(), Role::Remote, ConnectionId::new(1));
        build(&mut receiver);

        sender.set(a, 'é').unwrap();
        sender.set(b, Flags8::from_bits(0b1001)).unwrap();
        sender.fire(c).unwrap();
        sender.custom_mut(d).unwrap().push(Bullet(12));
        sender.set_dynamic(-3i64, u64::MAX).unwrap();

        let bytes = serialize(&mut sender);
        assert_eq!(sender.trigger_count(c).unwrap(), 0);
        deserialize(&mut receiver, &bytes);

        assert_eq!(receiver.get(a).unwrap(), 'é');
        assert_eq!(receiver.get(b).unwrap(), Flags8::from_bits(0b1001));
        assert_eq!(receiver.take_trigger(c).unwrap(), 1);
        assert_eq!(
            receiver.custom_mut(d).unwrap().drain_received(),
            vec![Bullet(12)]
        );
        assert_eq!(
            receiver.get_dynamic(-3i64).unwrap(),
            PrimitiveValue::UInt64(u64::MAX)
        );
    }

    #[test]
    fn zero_trigger_is_omitted_and_reads_zero() {
        let mut sender = owner();
        let t = sender.add_trigger().unwrap();
        let mut receiver = owner();
        receiver.add_trigger().unwrap();
        receiver.fire(t).unwrap();

        let bytes = serialize(&mut sender);
        assert_eq!(bytes, vec![0, 0, 0, 0, 0]);
        deserialize(&mut receiver, &bytes);
        assert_eq!(receiver.trigger_count(t).unwrap(), 0);
    }

    #[test]
    fn mismatched_local_kind_is_skipped() {
        let mut sender = owner();
        sender.add_primitive(5u32).unwrap();
        sender.add_primitive(9u8).unwrap();
        let mut receiver = owner();
        let first = receiver.add_primitive(0.0f32).unwrap();
        let second = receiver.add_primitive(0u8).unwrap();

        let bytes = serialize(&mut sender);
        deserialize(&mut receiver, &bytes);
        assert_eq!(receiver.get(first).unwrap(), 0.0);
        assert_eq!(receiver.get(second).unwrap(), 9);
    }

    #[test]
    fn remote_dynamic_fields_are_opt_in() {
        let mut sender = owner();
        sender.add_dynamic_primitive(3u8, 1.0f32).unwrap();
        sender.add_dynamic_trigger(4u8).unwrap();
        sender.fire_dynamic(4u8).unwrap();
        let bytes = serialize(&mut sender);

        let mut strict = owner();
        deserialize(&mut strict, &bytes);
        assert_eq!(strict.dynamic_keys().count(), 0);

        let mut open = owner();
        open.accept_remote_dynamic_fields(true);
        deserialize(&mut open, &bytes);
        assert_eq!(open.get_dynamic_as::<f32>(3u8).unwrap(), 1.0);
        assert_eq!(open.take_dynamic_trigger(4u8).unwrap(), 1);
    }
}
