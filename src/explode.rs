//! Explode a token stream into segments of cells, and implode cells back into bytes.
//!
//! A segment is a list of cells separated by `+`. A cell holding a single data element
//! collapses to [`Cell::Scalar`]; a cell with `:`-separated elements stays a
//! [`Cell::Group`]. Explosion keeps every cell, including trailing empty ones. Implosion is
//! the only place where trailing empty elements of a group are trimmed.

use crate::error::WireError;
use crate::tokenizer::{
    decode_text, encode_text, escape, find_binary_marker, Token, Tokenizer, BINARY_MARKER, ELEMENT_SEPARATOR,
    GROUP_SEPARATOR, SEGMENT_TERMINATOR,
};

/// One data element as found on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Scalar {
    #[default]
    Empty,
    Text(String),
    Binary(Vec<u8>),
}

impl Scalar {
    pub fn is_empty(&self) -> bool {
        match self {
            Scalar::Empty => true,
            Scalar::Text(s) => s.is_empty(),
            Scalar::Binary(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Scalar::Empty
        } else {
            Scalar::Text(s.to_string())
        }
    }
}

/// One `+`-separated position of a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Scalar(Scalar),
    Group(Vec<Scalar>),
}

impl Cell {
    pub fn empty() -> Self {
        Cell::Scalar(Scalar::Empty)
    }

    /// Elements of the cell; a scalar cell is a one-element group.
    pub fn elements(&self) -> &[Scalar] {
        match self {
            Cell::Scalar(s) => std::slice::from_ref(s),
            Cell::Group(v) => v,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.elements().iter().all(Scalar::is_empty)
    }
}

pub type ExplodedSegment = Vec<Cell>;

fn collapse(mut group: Vec<Scalar>) -> Cell {
    if group.len() == 1 {
        Cell::Scalar(group.pop().unwrap_or_default())
    } else {
        Cell::Group(group)
    }
}

/// Split raw bytes into segments of cells.
pub fn explode_segments(data: &[u8]) -> Result<Vec<ExplodedSegment>, WireError> {
    let mut segments = Vec::new();
    let mut segment: ExplodedSegment = Vec::new();
    let mut group: Vec<Scalar> = Vec::new();
    let mut element: Option<Scalar> = None;
    let mut touched = false;

    for token in Tokenizer::new(data) {
        match token? {
            Token::Text(bytes) => {
                element = Some(Scalar::Text(decode_text(&bytes)));
                touched = true;
            }
            Token::Binary(bytes) => {
                element = Some(Scalar::Binary(bytes.to_vec()));
                touched = true;
            }
            Token::ElementSeparator => {
                group.push(element.take().unwrap_or_default());
                touched = true;
            }
            Token::GroupSeparator => {
                group.push(element.take().unwrap_or_default());
                segment.push(collapse(std::mem::take(&mut group)));
                touched = true;
            }
            Token::SegmentTerminator => {
                if touched {
                    group.push(element.take().unwrap_or_default());
                    segment.push(collapse(std::mem::take(&mut group)));
                    segments.push(std::mem::take(&mut segment));
                }
                touched = false;
            }
            Token::End => {
                if touched {
                    group.push(element.take().unwrap_or_default());
                    segment.push(collapse(std::mem::take(&mut group)));
                    segments.push(std::mem::take(&mut segment));
                }
                break;
            }
        }
    }
    Ok(segments)
}

fn implode_scalar(out: &mut Vec<u8>, scalar: &Scalar) -> Result<(), WireError> {
    match scalar {
        Scalar::Empty => {}
        Scalar::Text(s) => {
            let bytes = encode_text(s)?;
            if let Some(offset) = find_binary_marker(&bytes) {
                return Err(WireError::MalformedToken {
                    offset,
                    reason: "text contains a binary length marker",
                });
            }
            out.extend(escape(&bytes));
        }
        Scalar::Binary(b) => {
            out.push(BINARY_MARKER);
            out.extend(b.len().to_string().as_bytes());
            out.push(BINARY_MARKER);
            out.extend_from_slice(b);
        }
    }
    Ok(())
}

/// Render one segment without the terminator.
pub fn implode_segment(out: &mut Vec<u8>, segment: &[Cell]) -> Result<(), WireError> {
    for (i, cell) in segment.iter().enumerate() {
        if i > 0 {
            out.push(GROUP_SEPARATOR);
        }
        match cell {
            Cell::Scalar(s) => implode_scalar(out, s)?,
            Cell::Group(elements) => {
                let highest = elements
                    .iter()
                    .rposition(|e| !e.is_empty())
                    .map_or(0, |i| i + 1);
                for (j, e) in elements[..highest].iter().enumerate() {
                    if j > 0 {
                        out.push(ELEMENT_SEPARATOR);
                    }
                    implode_scalar(out, e)?;
                }
            }
        }
    }
    Ok(())
}

/// Render segments, each followed by `'`.
pub fn implode_segments(segments: &[ExplodedSegment]) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::new();
    for segment in segments {
        implode_segment(&mut out, segment)?;
        out.push(SEGMENT_TERMINATOR);
    }
    Ok(out)
}
