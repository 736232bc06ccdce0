//! Render typed segments back to cells and bytes.
//!
//! Empty fields are not emitted right away. They are counted as pending blanks and only
//! written out (as empty placeholders) once a later field carries a value, so interior
//! gaps keep their position and trailing gaps disappear. Inside groups the gap left by
//! a nested group's own elided tail is counted the same way, keeping the flat element
//! positions of later fields intact.

use crate::container::{Container, Segment, Slot};
use crate::error::{Error, FieldError, Result};
use crate::explode::{implode_segments, Cell, ExplodedSegment, Scalar};
use crate::schema::{FieldDef, FieldType};
use crate::value::Value;

/// Empty placeholders not yet known to be interior.
#[derive(Debug, Default)]
struct Pending(usize);

impl Pending {
    fn flush_cells(&mut self, out: &mut Vec<Cell>) {
        out.extend(std::iter::repeat_with(Cell::empty).take(self.0));
        self.0 = 0;
    }

    fn flush_elements(&mut self, out: &mut Vec<Scalar>) {
        out.extend(std::iter::repeat_with(Scalar::default).take(self.0));
        self.0 = 0;
    }
}

pub fn serialize_segment(segment: &Segment) -> Result<ExplodedSegment> {
    render_segment(segment).map_err(|source| Error::Segment {
        segment: segment.name(),
        source,
    })
}

pub fn serialize_segments(segments: &[Segment]) -> Result<Vec<u8>> {
    let exploded = segments
        .iter()
        .map(serialize_segment)
        .collect::<Result<Vec<_>>>()?;
    Ok(implode_segments(&exploded)?)
}

fn render_segment(segment: &Segment) -> std::result::Result<ExplodedSegment, FieldError> {
    let mut cells = Vec::new();
    let mut pending = Pending::default();
    for (field, slot) in segment.fields() {
        match slot {
            Slot::Single(value) => push_cell(field, value.as_ref(), &mut cells, &mut pending)?,
            Slot::Repeated(list) => {
                for value in list.iter() {
                    push_cell(field, value, &mut cells, &mut pending)?;
                }
                if let Some(max) = field.count.max() {
                    pending.0 += max.saturating_sub(list.len());
                }
            }
        }
    }
    if !segment.additional_data().is_empty() {
        pending.flush_cells(&mut cells);
        cells.extend(segment.additional_data().iter().cloned());
    }
    Ok(cells)
}

fn push_cell(
    field: &FieldDef,
    value: Option<&Value>,
    cells: &mut Vec<Cell>,
    pending: &mut Pending,
) -> std::result::Result<(), FieldError> {
    let Some(value) = value.filter(|v| !v.is_blank()) else {
        pending.0 += 1;
        return Ok(());
    };
    let cell = match (&field.ty, value) {
        (FieldType::Group(_), Value::Group(group)) => {
            let mut elements = Vec::new();
            flatten_group(group, &mut elements)?;
            Cell::Group(elements)
        }
        _ => Cell::Scalar(render_scalar(field, value)?),
    };
    pending.flush_cells(cells);
    cells.push(cell);
    Ok(())
}

fn render_scalar(field: &FieldDef, value: &Value) -> std::result::Result<Scalar, FieldError> {
    match value {
        Value::Segments(segments) => serialize_segments(segments)
            .map(Scalar::Binary)
            .map_err(|e| FieldError::InvalidValue {
                field: field.name.clone(),
                kind: "sf",
                reason: e.to_string(),
            }),
        _ => field.render(value),
    }
}

/// Append a group's elements, without its trailing blanks.
fn flatten_group(group: &Container, out: &mut Vec<Scalar>) -> std::result::Result<(), FieldError> {
    let mut pending = Pending::default();
    for (field, slot) in group.fields() {
        match slot {
            Slot::Single(value) => push_element(field, value.as_ref(), out, &mut pending)?,
            Slot::Repeated(list) => {
                for value in list.iter() {
                    push_element(field, value, out, &mut pending)?;
                }
                if let Some(max) = field.count.max() {
                    pending.0 += max.saturating_sub(list.len()) * field.element_width();
                }
            }
        }
    }
    Ok(())
}

fn push_element(
    field: &FieldDef,
    value: Option<&Value>,
    out: &mut Vec<Scalar>,
    pending: &mut Pending,
) -> std::result::Result<(), FieldError> {
    let Some(value) = value.filter(|v| !v.is_blank()) else {
        pending.0 += field.element_width();
        return Ok(());
    };
    match (&field.ty, value) {
        (FieldType::Group(schema), Value::Group(group)) => {
            let mut nested = Vec::new();
            flatten_group(group, &mut nested)?;
            pending.flush_elements(out);
            let width = schema.flat_width();
            let used = nested.len();
            out.extend(nested);
            pending.0 += width.saturating_sub(used);
        }
        _ => {
            let scalar = render_scalar(field, value)?;
            pending.flush_elements(out);
            out.push(scalar);
        }
    }
    Ok(())
}
