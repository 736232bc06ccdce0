//! Format parsed messages for display (debug logging, the `decode_message` tool).
//!
//! Passwords always print as `***` and binary values as `<n bytes>`; the dump is safe to
//! hand to a log sink.

use crate::container::{Container, Segment, Slot};
use crate::explode::{Cell, Scalar};
use crate::message::Message;
use crate::registry::HEADER_FIELD;
use crate::value::Value;
use std::fmt::Write;

/// Indented tree of every segment, followed by the parse diagnostics.
pub fn format_message(message: &Message) -> String {
    let mut out = String::new();
    for segment in &message.segments {
        write_segment(&mut out, segment, 0);
    }
    for diagnostic in &message.diagnostics {
        let _ = writeln!(out, "! {}", diagnostic);
    }
    out
}

pub fn format_segment(segment: &Segment) -> String {
    let mut out = String::new();
    write_segment(&mut out, segment, 0);
    out
}

/// One-line rendering of a scalar value; groups and segment lists are summarised.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Text(s) | Value::Digits(s) | Value::Decimal(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => if *b { "J" } else { "N" }.to_string(),
        Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        Value::Time(t) => t.format("%H:%M:%S").to_string(),
        Value::Binary(b) => format!("<{} bytes>", b.len()),
        Value::Password(p) => p.redacted().to_string(),
        Value::Group(c) => format!("{} {{..}}", c.schema().name),
        Value::Segments(s) => format!("<{} segments>", s.len()),
    }
}

fn pad(depth: usize) -> String {
    "  ".repeat(depth)
}

fn write_segment(out: &mut String, segment: &Segment, depth: usize) {
    let _ = write!(out, "{}{}", pad(depth), segment.name());
    if let Some(number) = segment.number() {
        let _ = write!(out, " #{}", number);
    }
    if let Some(reference) = segment.reference() {
        let _ = write!(out, " -> #{}", reference);
    }
    if segment.is_generic() {
        out.push_str(" (generic)");
    }
    out.push('\n');
    write_fields(out, segment, depth + 1, true);
}

fn write_fields(out: &mut String, container: &Container, depth: usize, skip_header: bool) {
    for (field, slot) in container.fields() {
        if skip_header && field.name == HEADER_FIELD {
            continue;
        }
        match slot {
            Slot::Single(Some(value)) if !value.is_blank() => {
                write_value(out, &field.name, value, depth);
            }
            Slot::Single(_) => {}
            Slot::Repeated(list) => {
                for (i, value) in list.iter().enumerate() {
                    if let Some(value) = value.filter(|v| !v.is_blank()) {
                        write_value(out, &format!("{}[{}]", field.name, i), value, depth);
                    }
                }
            }
        }
    }
    if !container.additional_data().is_empty() {
        let cells: Vec<String> = container.additional_data().iter().map(format_cell).collect();
        let _ = writeln!(out, "{}+ {}", pad(depth), cells.join(" + "));
    }
}

fn write_value(out: &mut String, name: &str, value: &Value, depth: usize) {
    match value {
        Value::Group(group) => {
            let _ = writeln!(out, "{}{} {{", pad(depth), name);
            write_fields(out, group, depth + 1, false);
            let _ = writeln!(out, "{}}}", pad(depth));
        }
        Value::Segments(segments) => {
            let _ = writeln!(out, "{}{} [", pad(depth), name);
            for segment in segments {
                write_segment(out, segment, depth + 1);
            }
            let _ = writeln!(out, "{}]", pad(depth));
        }
        scalar => {
            let _ = writeln!(out, "{}{} = {}", pad(depth), name, format_value(scalar));
        }
    }
}

fn format_scalar(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Empty => String::new(),
        Scalar::Text(s) => s.clone(),
        Scalar::Binary(b) => format!("<{} bytes>", b.len()),
    }
}

/// Raw cell of additional data, elements joined by `:`.
pub fn format_cell(cell: &Cell) -> String {
    cell.elements().iter().map(format_scalar).collect::<Vec<_>>().join(":")
}
