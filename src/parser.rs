//! Apply segment schemas to exploded segments.
//!
//! Parsing is per segment: the header cell is parsed generically, the (type, version)
//! pair selects a schema from the [`Registry`] and the schema's fields are walked
//! against the remaining cells. In [`ParseMode::Lenient`] a segment that fails typed
//! parsing falls back to a generic segment and a [`ParseDiagnostic`] is recorded; the
//! rest of the message is unaffected. [`ParseMode::Strict`] aborts on the first failure.

use crate::container::{Container, Segment, Slot};
use crate::error::{Error, FieldError, Result};
use crate::explode::{explode_segments, Cell, Scalar};
use crate::field::FieldKind;
use crate::message::Message;
use crate::registry::Registry;
use crate::schema::{ContainerSchema, FieldDef, FieldType, SegmentSchema};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    Strict,
    #[default]
    Lenient,
}

/// A segment that was degraded to generic form in lenient mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDiagnostic {
    /// `HKIDN2`-style name, or `?` when the header itself was unreadable.
    pub segment: String,
    /// Zero-based position of the segment in its segment list.
    pub position: usize,
    pub reason: String,
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment #{} {}: {}", self.position, self.segment, self.reason)
    }
}

#[derive(Debug, Clone)]
pub struct Parser {
    registry: Arc<Registry>,
    mode: ParseMode,
}

impl Parser {
    pub fn new(registry: Arc<Registry>, mode: ParseMode) -> Self {
        Parser { registry, mode }
    }

    pub fn mode(&self) -> ParseMode {
        self.mode
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn parse_message(&self, data: &[u8]) -> Result<Message> {
        let mut diagnostics = Vec::new();
        let segments = self.parse_segments(data, &mut diagnostics)?;
        Ok(Message {
            segments,
            diagnostics,
        })
    }

    pub fn parse_segments(
        &self,
        data: &[u8],
        diagnostics: &mut Vec<ParseDiagnostic>,
    ) -> Result<Vec<Segment>> {
        explode_segments(data)?
            .iter()
            .enumerate()
            .map(|(position, cells)| self.parse_segment(cells, position, diagnostics))
            .collect()
    }

    pub fn parse_segment(
        &self,
        cells: &[Cell],
        position: usize,
        diagnostics: &mut Vec<ParseDiagnostic>,
    ) -> Result<Segment> {
        let Some((head, body)) = cells.split_first() else {
            return Ok(Segment::new(self.registry.generic().clone()));
        };

        let header = match self.parse_header(head) {
            Ok(header) => header,
            Err(source) => {
                if self.mode == ParseMode::Strict {
                    return Err(Error::Segment {
                        segment: format!("#{}", position),
                        source,
                    });
                }
                warn!(position, reason = %source, "unreadable segment header");
                diagnostics.push(ParseDiagnostic {
                    segment: "?".to_string(),
                    position,
                    reason: source.to_string(),
                });
                let mut body = Container::new(self.registry.generic().body.clone());
                body.set_additional_data(cells.to_vec());
                return Ok(Segment::from_parts(self.registry.generic().clone(), body));
            }
        };

        let kind = header.text("type").unwrap_or("").to_string();
        let version = header
            .numeric("version")
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0);

        let Some(schema) = self.registry.lookup(&kind, version) else {
            if self.mode == ParseMode::Strict {
                return Err(Error::UnknownSegment { kind, version });
            }
            debug!(kind = %kind, version, "no schema, keeping segment generic");
            return Ok(self.generic(header, body));
        };

        match self.parse_typed(&schema, header.clone(), body, diagnostics) {
            Ok(segment) => Ok(segment),
            Err(source) if self.mode == ParseMode::Strict => Err(Error::Segment {
                segment: schema.name(),
                source,
            }),
            Err(source) => {
                warn!(segment = %schema.name(), position, reason = %source, "falling back to generic segment");
                diagnostics.push(ParseDiagnostic {
                    segment: schema.name(),
                    position,
                    reason: source.to_string(),
                });
                Ok(self.generic(header, body))
            }
        }
    }

    fn parse_header(&self, head: &Cell) -> std::result::Result<Container, FieldError> {
        let schema = self.registry.header();
        let elements = head.elements();
        let mut pos = 0;
        let header = self.walk_group(schema, elements, &mut pos, true, &mut Vec::new())?;
        check_consumed(schema, elements, pos)?;
        for field in ["type", "number", "version"] {
            if header.get(field)?.is_none() {
                return Err(FieldError::RequiredFieldMissing {
                    container: schema.name.clone(),
                    field: field.to_string(),
                });
            }
        }
        Ok(header)
    }

    fn generic(&self, header: Container, body: &[Cell]) -> Segment {
        let schema = self.registry.generic().clone();
        let mut container = Container::new(schema.body.clone());
        *container.slot_mut(0) = Slot::Single(Some(Value::Group(header)));
        container.set_additional_data(body.to_vec());
        Segment::from_parts(schema, container)
    }

    fn parse_typed(
        &self,
        schema: &Arc<SegmentSchema>,
        header: Container,
        cells: &[Cell],
        diagnostics: &mut Vec<ParseDiagnostic>,
    ) -> std::result::Result<Segment, FieldError> {
        let mut container = Container::new(schema.body.clone());
        *container.slot_mut(0) = Slot::Single(Some(Value::Group(header)));

        let mut pos = 0;
        for (index, field) in schema.body.fields.iter().enumerate().skip(1) {
            if field.count.is_repeated() {
                let Slot::Repeated(list) = container.slot_mut(index) else {
                    continue;
                };
                let mut taken = 0;
                while pos < cells.len() && field.count.max().map_or(true, |max| taken < max) {
                    let value = self.parse_cell(field, &cells[pos], diagnostics)?;
                    list.set(taken, value)?;
                    pos += 1;
                    taken += 1;
                }
                if field.required && taken < field.count.min() {
                    return Err(missing(&schema.body, field));
                }
            } else {
                let Some(cell) = cells.get(pos) else {
                    if field.required {
                        return Err(missing(&schema.body, field));
                    }
                    break;
                };
                pos += 1;
                let value = self.parse_cell(field, cell, diagnostics)?;
                *container.slot_mut(index) = Slot::Single(value);
            }
        }
        container.set_additional_data(cells[pos.min(cells.len())..].to_vec());
        Ok(Segment::from_parts(schema.clone(), container))
    }

    /// One top-level cell: a scalar, or a whole group occurrence.
    fn parse_cell(
        &self,
        field: &FieldDef,
        cell: &Cell,
        diagnostics: &mut Vec<ParseDiagnostic>,
    ) -> std::result::Result<Option<Value>, FieldError> {
        match &field.ty {
            FieldType::Group(schema) => {
                if cell.is_empty() {
                    return Ok(None);
                }
                let elements = cell.elements();
                let mut pos = 0;
                let group = self.walk_group(schema, elements, &mut pos, field.required, diagnostics)?;
                check_consumed(schema, elements, pos)?;
                Ok(Some(Value::Group(group)))
            }
            FieldType::Scalar(_) => match cell {
                Cell::Scalar(raw) => self.parse_scalar(field, raw, diagnostics),
                Cell::Group(elements) => Err(FieldError::Parse {
                    field: field.name.clone(),
                    kind: field.kind().map_or("?", FieldKind::tag),
                    reason: format!("{} elements where one was expected", elements.len()),
                }),
            },
        }
    }

    fn parse_scalar(
        &self,
        field: &FieldDef,
        raw: &Scalar,
        diagnostics: &mut Vec<ParseDiagnostic>,
    ) -> std::result::Result<Option<Value>, FieldError> {
        let value = field.parse(raw)?;
        match (field.kind(), value) {
            (Some(FieldKind::SegmentSequence), Some(Value::Binary(bytes))) => self
                .parse_segments(&bytes, diagnostics)
                .map(|segments| Some(Value::Segments(segments)))
                .map_err(|e| FieldError::Parse {
                    field: field.name.clone(),
                    kind: FieldKind::SegmentSequence.tag(),
                    reason: e.to_string(),
                }),
            (_, value) => Ok(value),
        }
    }

    /// Walk a group's fields over a flat element list starting at `*pos`.
    ///
    /// `required` is false when the whole group may be cut short, e.g. for an optional
    /// group or the last occurrence of an open-ended list.
    fn walk_group(
        &self,
        schema: &Arc<ContainerSchema>,
        elements: &[Scalar],
        pos: &mut usize,
        required: bool,
        diagnostics: &mut Vec<ParseDiagnostic>,
    ) -> std::result::Result<Container, FieldError> {
        let mut container = Container::new(schema.clone());
        for (index, field) in schema.fields.iter().enumerate() {
            let field_required = required && field.required;
            if field.count.is_repeated() {
                let max = field.count.max();
                let mut taken = 0;
                let mut values = Vec::new();
                while *pos < elements.len() && max.map_or(true, |max| taken < max) {
                    let value = match &field.ty {
                        FieldType::Scalar(_) => {
                            let raw = &elements[*pos];
                            *pos += 1;
                            self.parse_scalar(field, raw, diagnostics)?
                        }
                        FieldType::Group(sub) => {
                            let start = *pos;
                            let occurrence_required = field_required && max.is_some();
                            let group =
                                self.walk_group(sub, elements, pos, occurrence_required, diagnostics)?;
                            if *pos == start {
                                break;
                            }
                            (!group.is_unset()).then_some(Value::Group(group))
                        }
                    };
                    values.push(value);
                    taken += 1;
                }
                if field_required && taken < field.count.min() {
                    return Err(missing(schema, field));
                }
                if let Slot::Repeated(list) = container.slot_mut(index) {
                    for (i, value) in values.into_iter().enumerate() {
                        list.set(i, value)?;
                    }
                }
            } else {
                match &field.ty {
                    FieldType::Scalar(_) => {
                        let Some(raw) = elements.get(*pos) else {
                            if field_required {
                                return Err(missing(schema, field));
                            }
                            break;
                        };
                        *pos += 1;
                        let value = self.parse_scalar(field, raw, diagnostics)?;
                        *container.slot_mut(index) = Slot::Single(value);
                    }
                    FieldType::Group(sub) => {
                        if *pos >= elements.len() {
                            if field_required {
                                return Err(missing(schema, field));
                            }
                            break;
                        }
                        let group = self.walk_group(sub, elements, pos, field_required, diagnostics)?;
                        let value = (!group.is_unset()).then_some(Value::Group(group));
                        *container.slot_mut(index) = Slot::Single(value);
                    }
                }
            }
        }
        Ok(container)
    }
}

fn missing(schema: &ContainerSchema, field: &FieldDef) -> FieldError {
    FieldError::RequiredFieldMissing {
        container: schema.name.clone(),
        field: field.name.clone(),
    }
}

/// Elements left over inside a group cell are an error unless they are all empty.
fn check_consumed(
    schema: &ContainerSchema,
    elements: &[Scalar],
    pos: usize,
) -> std::result::Result<(), FieldError> {
    let rest = &elements[pos.min(elements.len())..];
    if rest.iter().all(Scalar::is_empty) {
        return Ok(());
    }
    Err(FieldError::Parse {
        field: schema.name.clone(),
        kind: "group",
        reason: format!("{} unconsumed elements", rest.len()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser(mode: ParseMode) -> Parser {
        Parser::new(Registry::builtin(), mode)
    }

    #[test]
    fn header_only_segment_needs_message_number() {
        let err = parser(ParseMode::Strict).parse_message(b"HNHBS:5:1'").unwrap_err();
        assert!(matches!(
            err,
            Error::Segment {
                source: FieldError::RequiredFieldMissing { .. },
                ..
            }
        ));

        let msg = parser(ParseMode::Lenient).parse_message(b"HNHBS:5:1'").unwrap();
        let seg = &msg.segments[0];
        assert!(seg.is_generic());
        assert_eq!((seg.kind(), seg.number(), seg.version()), ("HNHBS", Some(5), 1));
        assert!(seg.additional_data().is_empty());
        assert_eq!(msg.diagnostics.len(), 1);
        assert_eq!(msg.diagnostics[0].segment, "HNHBS1");
    }

    #[test]
    fn typed_segment_with_nested_groups() {
        let raw = b"HKIDN:3:2+280:12345678+user1+0+1'";
        let msg = parser(ParseMode::Strict).parse_message(raw).unwrap();
        let seg = &msg.segments[0];
        assert!(!seg.is_generic());
        assert_eq!(
            seg.get_path("bank_identifier.bank_code").unwrap(),
            Some(&Value::from("12345678"))
        );
        assert_eq!(seg.text("system_id"), Some("0"));
    }

    #[test]
    fn leftover_cells_become_additional_data() {
        let msg = parser(ParseMode::Strict)
            .parse_message(b"HKEND:4:1+DLG-1+extra+x:y'")
            .unwrap();
        let seg = &msg.segments[0];
        assert_eq!(seg.text("dialog_id"), Some("DLG-1"));
        assert_eq!(seg.additional_data().len(), 2);
    }

    #[test]
    fn one_bad_segment_does_not_block_the_rest() {
        let raw = b"HNHBS:1:1+07'HKEND:2:1+DLG'";
        let msg = parser(ParseMode::Lenient).parse_message(raw).unwrap();
        assert!(msg.segments[0].is_generic());
        assert!(!msg.segments[1].is_generic());
        assert!(parser(ParseMode::Strict).parse_message(raw).is_err());
    }

    #[test]
    fn unreadable_header_is_generic_in_lenient_mode() {
        let msg = parser(ParseMode::Lenient).parse_message(b"X:a:1+y'").unwrap();
        assert!(msg.segments[0].is_generic());
        assert_eq!(msg.segments[0].additional_data().len(), 2);
        assert_eq!(msg.diagnostics[0].segment, "?");
    }

    #[test]
    fn leftover_group_elements_are_an_error() {
        let err = parser(ParseMode::Strict)
            .parse_message(b"HKIDN:3:2+280:12345678:zz+user1+0+1'")
            .unwrap_err();
        assert!(matches!(err, Error::Segment { source: FieldError::Parse { .. }, .. }));
    }

    #[test]
    fn open_ended_response_list() {
        let raw = b"HIRMG:2:2+0010::Nachricht entgegengenommen+3060::Teilweise liegen Warnungen vor:p1:p2'";
        let msg = parser(ParseMode::Strict).parse_message(raw).unwrap();
        let list = msg.segments[0].list("responses").unwrap();
        assert_eq!(list.len(), 2);
        let second = list.get(1).unwrap().and_then(Value::as_group).unwrap();
        assert_eq!(second.list("parameters").unwrap().len(), 2);
    }

    #[test]
    fn segment_sequences_parse_recursively() {
        let inner = b"HKEND:3:1+DLG'";
        let mut raw = format!("HNVSD:999:1+@{}@", inner.len()).into_bytes();
        raw.extend_from_slice(inner);
        raw.push(b'\'');
        let msg = parser(ParseMode::Strict).parse_message(&raw).unwrap();
        let nested = msg.segments[0]
            .get("data")
            .unwrap()
            .and_then(Value::as_segments)
            .unwrap();
        assert_eq!(nested[0].text("dialog_id"), Some("DLG"));
    }
}
