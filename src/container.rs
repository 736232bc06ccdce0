//! Typed container instances: data element groups and segments.
//!
//! A [`Container`] holds one slot per schema field, in schema order. Single fields hold
//! an optional value; repeated fields hold a [`ValueList`]. Cells left over after parsing
//! a segment are kept as additional data and written back verbatim.

use crate::error::FieldError;
use crate::explode::Cell;
use crate::registry::HEADER_FIELD;
use crate::schema::{ContainerSchema, FieldDef, FieldType, SegmentSchema};
use crate::value::{Password, Value, ValueList};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Single(Option<Value>),
    Repeated(ValueList),
}

impl Slot {
    fn for_field(def: &FieldDef) -> Slot {
        if def.count.is_repeated() {
            Slot::Repeated(ValueList::new(def.count.min(), def.count.max()))
        } else {
            Slot::Single(None)
        }
    }

    fn is_unset(&self) -> bool {
        match self {
            Slot::Single(v) => v.as_ref().map_or(true, Value::is_blank),
            Slot::Repeated(list) => list.values().all(Value::is_blank),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Container {
    schema: Arc<ContainerSchema>,
    slots: Vec<Slot>,
    additional: Vec<Cell>,
}

impl Container {
    pub fn new(schema: Arc<ContainerSchema>) -> Self {
        let slots = schema.fields.iter().map(Slot::for_field).collect();
        Container {
            schema,
            slots,
            additional: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Arc<ContainerSchema> {
        &self.schema
    }

    /// Fields with their slots, in wire order.
    pub fn fields(&self) -> impl Iterator<Item = (&FieldDef, &Slot)> + '_ {
        self.schema.fields.iter().zip(self.slots.iter())
    }

    fn index(&self, name: &str) -> Result<usize, FieldError> {
        self.schema
            .field_index(name)
            .ok_or_else(|| FieldError::UnknownField {
                container: self.schema.name.clone(),
                field: name.to_string(),
            })
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut Slot {
        &mut self.slots[index]
    }

    /// Value of a single field, or the first element of a repeated one.
    pub fn get(&self, name: &str) -> Result<Option<&Value>, FieldError> {
        match &self.slots[self.index(name)?] {
            Slot::Single(v) => Ok(v.as_ref()),
            Slot::Repeated(list) => list.get(0),
        }
    }

    pub fn get_at(&self, name: &str, index: usize) -> Result<Option<&Value>, FieldError> {
        self.list(name)?.get(index)
    }

    pub fn list(&self, name: &str) -> Result<&ValueList, FieldError> {
        match &self.slots[self.index(name)?] {
            Slot::Repeated(list) => Ok(list),
            Slot::Single(_) => Err(not_repeated(&self.schema.name, name)),
        }
    }

    pub fn list_mut(&mut self, name: &str) -> Result<&mut ValueList, FieldError> {
        let i = self.index(name)?;
        match &mut self.slots[i] {
            Slot::Repeated(list) => Ok(list),
            Slot::Single(_) => Err(not_repeated(&self.schema.name, name)),
        }
    }

    /// Assign a single field (or element 0 of a repeated one). The value is normalised to
    /// the field kind's canonical variant; blank values clear the field.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), FieldError> {
        let i = self.index(name)?;
        let value = self.schema.fields[i].coerce(value.into())?;
        match &mut self.slots[i] {
            Slot::Single(v) => *v = value,
            Slot::Repeated(list) => list.set(0, value)?,
        }
        Ok(())
    }

    pub fn set_at(&mut self, name: &str, index: usize, value: impl Into<Value>) -> Result<(), FieldError> {
        let i = self.index(name)?;
        let value = self.schema.fields[i].coerce(value.into())?;
        match &mut self.slots[i] {
            Slot::Repeated(list) => list.set(index, value),
            Slot::Single(_) => Err(not_repeated(&self.schema.name, name)),
        }
    }

    /// Append to a repeated field; returns the index written.
    pub fn push(&mut self, name: &str, value: impl Into<Value>) -> Result<usize, FieldError> {
        let i = self.index(name)?;
        let value = self.schema.fields[i].coerce(value.into())?;
        match (&mut self.slots[i], value) {
            (Slot::Repeated(list), Some(v)) => list.push(v),
            (Slot::Repeated(list), None) => Ok(list.len()),
            (Slot::Single(_), _) => Err(not_repeated(&self.schema.name, name)),
        }
    }

    pub fn clear(&mut self, name: &str) -> Result<(), FieldError> {
        let i = self.index(name)?;
        self.slots[i] = Slot::for_field(&self.schema.fields[i]);
        Ok(())
    }

    pub fn group(&self, name: &str) -> Option<&Container> {
        self.get(name).ok().flatten().and_then(Value::as_group)
    }

    /// Nested group of a single group field, created empty when unset.
    pub fn group_mut(&mut self, name: &str) -> Result<&mut Container, FieldError> {
        let i = self.index(name)?;
        let FieldType::Group(schema) = &self.schema.fields[i].ty else {
            return Err(FieldError::InvalidValue {
                field: name.to_string(),
                kind: "group",
                reason: format!("{}.{} is not a group", self.schema.name, name),
            });
        };
        let schema = schema.clone();
        let slot = match &mut self.slots[i] {
            Slot::Single(v) => v,
            Slot::Repeated(list) => list.slot_mut(0)?,
        };
        if !matches!(slot, Some(Value::Group(_))) {
            *slot = Some(Value::Group(Container::new(schema)));
        }
        slot.as_mut()
            .and_then(Value::as_group_mut)
            .ok_or_else(|| FieldError::InvalidValue {
                field: name.to_string(),
                kind: "group",
                reason: "group slot holds a scalar".to_string(),
            })
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).ok().flatten().and_then(Value::as_str)
    }

    pub fn numeric(&self, name: &str) -> Option<u64> {
        self.get(name).ok().flatten().and_then(Value::as_u64)
    }

    /// Value at a dotted path such as `"key_name.bank_identifier.bank_code"`.
    pub fn get_path(&self, path: &str) -> Result<Option<&Value>, FieldError> {
        match path.rsplit_once('.') {
            None => self.get(path),
            Some((parent, leaf)) => {
                let mut current = self;
                for part in parent.split('.') {
                    match current.get(part)?.and_then(Value::as_group) {
                        Some(group) => current = group,
                        None => return Ok(None),
                    }
                }
                current.get(leaf)
            }
        }
    }

    /// Assign at a dotted path, creating intermediate groups.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) -> Result<(), FieldError> {
        match path.rsplit_once('.') {
            None => self.set(path, value),
            Some((parent, leaf)) => {
                let mut current = self;
                for part in parent.split('.') {
                    current = current.group_mut(part)?;
                }
                current.set(leaf, value)
            }
        }
    }

    pub(crate) fn segment_sequences_mut(&mut self) -> impl Iterator<Item = &mut Vec<Segment>> + '_ {
        self.slots.iter_mut().filter_map(|slot| match slot {
            Slot::Single(Some(Value::Segments(segments))) => Some(segments),
            _ => None,
        })
    }

    pub fn additional_data(&self) -> &[Cell] {
        &self.additional
    }

    pub(crate) fn set_additional_data(&mut self, cells: Vec<Cell>) {
        self.additional = cells;
    }

    /// No field holds a value and no additional data is attached.
    pub fn is_unset(&self) -> bool {
        self.additional.is_empty() && self.slots.iter().all(Slot::is_unset)
    }

    /// Replace every password, here and in nested groups and segments, with a placeholder.
    pub fn redact_secrets(&mut self) {
        fn redact(value: &mut Value) {
            match value {
                Value::Password(p) => *p = Password::placeholder(),
                Value::Group(c) => c.redact_secrets(),
                Value::Segments(segments) => segments.iter_mut().for_each(|s| s.redact_secrets()),
                _ => {}
            }
        }
        for slot in &mut self.slots {
            match slot {
                Slot::Single(Some(v)) => redact(v),
                Slot::Single(None) => {}
                Slot::Repeated(list) => list.items_mut().for_each(redact),
            }
        }
    }
}

fn not_repeated(container: &str, name: &str) -> FieldError {
    FieldError::InvalidValue {
        field: name.to_string(),
        kind: "list",
        reason: format!("{}.{} is not a repeated field", container, name),
    }
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        self.schema.name == other.schema.name
            && self.slots == other.slots
            && self.additional == other.additional
    }
}

/// A segment: a container whose first field is the segment header.
#[derive(Debug, Clone)]
pub struct Segment {
    schema: Arc<SegmentSchema>,
    body: Container,
}

impl Segment {
    /// Empty segment; for non-generic schemas the header type and version are filled in.
    pub fn new(schema: Arc<SegmentSchema>) -> Self {
        let mut segment = Segment {
            body: Container::new(schema.body.clone()),
            schema,
        };
        if !segment.schema.generic {
            let kind = segment.schema.kind.clone();
            let version = segment.schema.version;
            let filled = segment
                .set_header("type", kind)
                .and_then(|()| segment.set_header("version", version));
            debug_assert!(filled.is_ok(), "segment header lacks type or version: {:?}", filled);
        }
        segment
    }

    pub(crate) fn from_parts(schema: Arc<SegmentSchema>, body: Container) -> Self {
        Segment { schema, body }
    }

    pub fn schema(&self) -> &Arc<SegmentSchema> {
        &self.schema
    }

    pub fn is_generic(&self) -> bool {
        self.schema.generic
    }

    pub fn header(&self) -> Option<&Container> {
        self.body.group(HEADER_FIELD)
    }

    fn set_header(&mut self, field: &str, value: impl Into<Value>) -> Result<(), FieldError> {
        self.body.group_mut(HEADER_FIELD)?.set(field, value)
    }

    /// Segment type mnemonic from the header, e.g. `"HNHBK"`.
    pub fn kind(&self) -> &str {
        self.header().and_then(|h| h.text("type")).unwrap_or("")
    }

    pub fn version(&self) -> u32 {
        self.header_number("version").unwrap_or(0)
    }

    pub fn number(&self) -> Option<u32> {
        self.header_number("number")
    }

    pub fn reference(&self) -> Option<u32> {
        self.header_number("reference")
    }

    fn header_number(&self, field: &str) -> Option<u32> {
        self.header()
            .and_then(|h| h.numeric(field))
            .and_then(|n| u32::try_from(n).ok())
    }

    pub fn set_number(&mut self, number: u32) -> Result<(), FieldError> {
        self.set_header("number", number)
    }

    pub fn set_reference(&mut self, reference: Option<u32>) -> Result<(), FieldError> {
        match reference {
            Some(r) => self.set_header("reference", r),
            None => self.body.group_mut(HEADER_FIELD)?.clear("reference"),
        }
    }

    /// `HNHBK3`-style name taken from the header.
    pub fn name(&self) -> String {
        format!("{}{}", self.kind(), self.version())
    }

    pub fn into_body(self) -> Container {
        self.body
    }
}

impl Deref for Segment {
    type Target = Container;

    fn deref(&self) -> &Container {
        &self.body
    }
}

impl DerefMut for Segment {
    fn deref_mut(&mut self) -> &mut Container {
        &mut self.body
    }
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.body == other.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    #[test]
    fn new_segment_carries_type_and_version() {
        let reg = Registry::builtin();
        let mut seg = reg.new_segment("HKIDN", 2).unwrap();
        assert_eq!(seg.name(), "HKIDN2");
        assert_eq!(seg.number(), None);
        seg.set_number(3).unwrap();
        seg.set_reference(Some(1)).unwrap();
        assert_eq!((seg.number(), seg.reference()), (Some(3), Some(1)));
        seg.set_reference(None).unwrap();
        assert_eq!(seg.reference(), None);
    }

    #[test]
    fn paths_create_intermediate_groups() {
        let reg = Registry::builtin();
        let mut seg = reg.new_segment("HNVSK", 3).unwrap();
        seg.set_path("key_name.bank_identifier.bank_code", "12345678").unwrap();
        assert_eq!(
            seg.get_path("key_name.bank_identifier.bank_code").unwrap(),
            Some(&Value::from("12345678"))
        );
        assert_eq!(seg.get_path("certificate.certificate_type").unwrap(), None);
        assert!(seg.get_path("key_name.nope").is_err());
    }

    #[test]
    fn set_normalises_and_rejects_bad_values() {
        let reg = Registry::builtin();
        let mut seg = reg.new_segment("HKVVB", 3).unwrap();
        seg.set("bpd_version", "78").unwrap();
        assert_eq!(seg.numeric("bpd_version"), Some(78));
        assert!(seg.set("language", "9").is_err());
        assert!(matches!(
            seg.set("no_such_field", 1u32),
            Err(FieldError::UnknownField { .. })
        ));
    }

    #[test]
    fn repeated_fields_use_value_lists() {
        let reg = Registry::builtin();
        let mut seg = reg.new_segment("HIRMG", 2).unwrap();
        let schema = reg.group("Response").unwrap();
        let mut response = Container::new(schema);
        response.set("code", "0010").unwrap();
        response.set("text", "ok").unwrap();
        assert_eq!(seg.push("responses", response).unwrap(), 0);
        assert_eq!(seg.list("responses").unwrap().len(), 1);
        assert!(matches!(
            seg.set_at("responses", 99, Value::from("x")),
            Err(FieldError::InvalidValue { .. }) | Err(FieldError::Cardinality { .. })
        ));
        assert!(seg.list("header").is_err());
    }

    #[test]
    fn redaction_reaches_nested_passwords() {
        let reg = Registry::builtin();
        let mut seg = reg.new_segment("HNSHA", 2).unwrap();
        seg.set_path("user_defined_signature.pin", Password::new("1234")).unwrap();
        seg.redact_secrets();
        let pin = seg.get_path("user_defined_signature.pin").unwrap().unwrap();
        assert_eq!(pin.as_password().unwrap().reveal(), "***");
    }
}
