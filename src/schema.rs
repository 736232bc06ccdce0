//! Resolved schemas: ordered field definitions of data element groups and segments.

use crate::error::FieldError;
use crate::explode::Scalar;
use crate::field::{Count, FieldKind, Length};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Type of a field: a scalar kind or a nested data element group.
#[derive(Debug, Clone)]
pub enum FieldType {
    Scalar(FieldKind),
    Group(Arc<ContainerSchema>),
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub ty: FieldType,
    pub length: Length,
    pub count: Count,
    pub required: bool,
    /// Closed code list; `None` lets any code through.
    pub codes: Option<Vec<String>>,
}

impl FieldDef {
    pub fn scalar(name: &str, kind: FieldKind) -> Self {
        FieldDef {
            name: name.to_string(),
            ty: FieldType::Scalar(kind),
            length: kind.default_length(),
            count: Count::default(),
            required: true,
            codes: None,
        }
    }

    pub fn group(name: &str, schema: Arc<ContainerSchema>) -> Self {
        FieldDef {
            name: name.to_string(),
            ty: FieldType::Group(schema),
            length: Length::Any,
            count: Count::default(),
            required: true,
            codes: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_length(mut self, length: Length) -> Self {
        self.length = length;
        self
    }

    pub fn with_count(mut self, count: Count) -> Self {
        self.count = count;
        self
    }

    pub fn kind(&self) -> Option<FieldKind> {
        match self.ty {
            FieldType::Scalar(k) => Some(k),
            FieldType::Group(_) => None,
        }
    }

    pub fn group_schema(&self) -> Option<&Arc<ContainerSchema>> {
        match &self.ty {
            FieldType::Group(s) => Some(s),
            FieldType::Scalar(_) => None,
        }
    }

    /// Number of flat element positions one occurrence takes inside a group.
    pub fn element_width(&self) -> usize {
        match &self.ty {
            FieldType::Scalar(_) => 1,
            FieldType::Group(schema) => schema.flat_width(),
        }
    }

    /// Number of flat element positions of the whole field (all occurrences) inside a group.
    pub fn flat_width(&self) -> usize {
        let occurrences = self.count.max().unwrap_or_else(|| self.count.min());
        self.element_width() * occurrences
    }

    fn kind_or_group(&self) -> &'static str {
        self.kind().map_or("group", FieldKind::tag)
    }

    fn parse_error(&self, reason: String) -> FieldError {
        FieldError::Parse {
            field: self.name.clone(),
            kind: self.kind_or_group(),
            reason,
        }
    }

    fn invalid(&self, reason: String) -> FieldError {
        FieldError::InvalidValue {
            field: self.name.clone(),
            kind: self.kind_or_group(),
            reason,
        }
    }

    fn check_code(&self, value: &Value) -> Result<(), String> {
        match (&self.codes, value.as_str()) {
            (Some(codes), Some(code)) if !codes.iter().any(|c| c == code) => {
                Err(format!("code {:?} not in {:?}", code, codes))
            }
            _ => Ok(()),
        }
    }

    /// Parse one wire element. Empty elements are absent values.
    pub fn parse(&self, raw: &Scalar) -> Result<Option<Value>, FieldError> {
        let FieldType::Scalar(kind) = self.ty else {
            return Err(self.parse_error("group field parsed as scalar".to_string()));
        };
        if raw.is_empty() {
            return Ok(None);
        }
        let codec = kind.codec();
        let value = codec.parse(raw).map_err(|r| self.parse_error(r))?;
        codec.validate(&value).map_err(|r| self.parse_error(r))?;
        self.check_code(&value).map_err(|r| self.parse_error(r))?;
        Ok(Some(value))
    }

    /// Render one value to a wire element, enforcing the length constraint.
    pub fn render(&self, value: &Value) -> Result<Scalar, FieldError> {
        let FieldType::Scalar(kind) = self.ty else {
            return Err(self.invalid("group field rendered as scalar".to_string()));
        };
        let scalar = match (kind, value, self.length.exact()) {
            (FieldKind::Digits, Value::Number(n), Some(width)) => {
                Scalar::Text(format!("{:0width$}", n, width = width))
            }
            _ => kind.codec().render(value).map_err(|r| self.invalid(r))?,
        };
        let len = match (value, &scalar) {
            (Value::Password(p), _) => p.char_len(),
            (_, Scalar::Text(s)) => s.chars().count(),
            (_, Scalar::Binary(b)) => b.len(),
            (_, Scalar::Empty) => 0,
        };
        if !scalar.is_empty() || matches!(scalar, Scalar::Binary(_)) {
            self.length
                .check(len)
                .map_err(|constraint| FieldError::Length {
                    field: self.name.clone(),
                    len,
                    constraint,
                })?;
        }
        Ok(scalar)
    }

    /// Bring an assigned value into the canonical variant of this field's kind.
    ///
    /// Lengths are not checked here; they are enforced when rendering.
    pub fn coerce(&self, value: Value) -> Result<Option<Value>, FieldError> {
        match (&self.ty, value) {
            (FieldType::Group(_), v @ Value::Group(_)) => Ok(Some(v)),
            (FieldType::Group(_), other) => Err(self.invalid(format!(
                "expected a group, got {:?}",
                std::mem::discriminant(&other)
            ))),
            (FieldType::Scalar(FieldKind::SegmentSequence), v @ Value::Segments(_)) => Ok(Some(v)),
            (FieldType::Scalar(FieldKind::Password), v @ Value::Password(_)) => Ok(Some(v)),
            (FieldType::Scalar(kind), v) => {
                if v.is_blank() {
                    return Ok(None);
                }
                let codec = kind.codec();
                let raw = match (kind, &v, self.length.exact()) {
                    (FieldKind::Digits, Value::Number(n), Some(width)) => {
                        Scalar::Text(format!("{:0width$}", n, width = width))
                    }
                    _ => codec.render(&v).map_err(|r| self.invalid(r))?,
                };
                let canonical = codec.parse(&raw).map_err(|r| self.invalid(r))?;
                codec.validate(&canonical).map_err(|r| self.invalid(r))?;
                self.check_code(&canonical).map_err(|r| self.invalid(r))?;
                Ok(Some(canonical))
            }
        }
    }
}

/// Ordered field list of a data element group or segment body. Field order is wire order.
#[derive(Debug)]
pub struct ContainerSchema {
    pub name: String,
    pub fields: Vec<FieldDef>,
    index: HashMap<String, usize>,
}

impl ContainerSchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        ContainerSchema {
            name: name.into(),
            fields,
            index,
        }
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.field_index(name).map(|i| &self.fields[i])
    }

    /// Number of flat element positions the group occupies when nested.
    pub fn flat_width(&self) -> usize {
        self.fields.iter().map(FieldDef::flat_width).sum()
    }
}

/// A versioned segment type. Field 0 of `body` is always the segment header group.
#[derive(Debug)]
pub struct SegmentSchema {
    pub kind: String,
    pub version: u32,
    pub body: Arc<ContainerSchema>,
    pub generic: bool,
}

impl SegmentSchema {
    /// Declared fields after the header.
    pub fn declared_fields(&self) -> usize {
        self.body.fields.len().saturating_sub(1)
    }

    pub fn name(&self) -> String {
        format!("{}{}", self.kind, self.version)
    }
}
