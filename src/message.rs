//! Messages: ordered segment lists with numbering, size finalisation and response lookup.

use crate::container::{Container, Segment, Slot};
use crate::error::Result;
use crate::parser::ParseDiagnostic;
use crate::serializer::serialize_segments;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Direction of a message, used for per-direction numbering and the message journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Customer to institute.
    Customer,
    /// Institute to customer.
    Institute,
}

/// First segment number reserved for the encryption envelope (HNVSK 998, HNVSD 999).
pub const ENVELOPE_SEGMENT_NUMBER: u32 = 998;

/// Response code carrying the touchdown pointer as its first parameter.
pub const TOUCHDOWN_CODE: &str = "3040";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    pub segments: Vec<Segment>,
    /// Segments degraded to generic form while parsing in lenient mode.
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl Message {
    pub fn new() -> Self {
        Message::default()
    }

    /// Append `segment` numbered after the highest regular segment number; returns the number.
    pub fn push_numbered(&mut self, mut segment: Segment) -> Result<u32> {
        let number = self
            .all_segments()
            .filter_map(Segment::number)
            .filter(|n| *n < ENVELOPE_SEGMENT_NUMBER)
            .max()
            .unwrap_or(0)
            + 1;
        segment.set_number(number)?;
        self.segments.push(segment);
        Ok(number)
    }

    /// Set the HNHBK message size to the exact rendered length.
    ///
    /// The size field is fixed-width, so the length does not depend on its own value.
    pub fn finalize_size(&mut self) -> Result<usize> {
        if let Some(header) = self.header_mut() {
            header.set("message_size", 0u64)?;
        }
        let len = self.render()?.len();
        if let Some(header) = self.header_mut() {
            header.set("message_size", len as u64)?;
        }
        Ok(len)
    }

    fn header_mut(&mut self) -> Option<&mut Segment> {
        self.segments.first_mut().filter(|s| s.kind() == "HNHBK")
    }

    pub fn render(&self) -> Result<Vec<u8>> {
        serialize_segments(&self.segments)
    }

    /// Copy with every PIN and TAN replaced by a placeholder.
    pub fn redacted(&self) -> Message {
        let mut copy = self.clone();
        for segment in &mut copy.segments {
            segment.redact_secrets();
        }
        copy
    }

    /// Every segment, depth first, including those wrapped in `sf` fields.
    pub fn all_segments(&self) -> impl Iterator<Item = &Segment> + '_ {
        let mut out = Vec::new();
        collect(&self.segments, &mut out);
        out.into_iter()
    }

    pub fn find_segments<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Segment> + 'a {
        self.all_segments().filter(move |s| s.kind() == kind)
    }

    pub fn find_segment_first(&self, kind: &str) -> Option<&Segment> {
        self.all_segments().find(|s| s.kind() == kind)
    }

    pub fn find_segment_first_mut(&mut self, kind: &str) -> Option<&mut Segment> {
        find_mut(&mut self.segments, kind)
    }

    /// Segments whose header references segment `number` of the request.
    pub fn find_segment_by_reference(&self, number: u32) -> impl Iterator<Item = &Segment> + '_ {
        self.all_segments()
            .filter(move |s| s.reference() == Some(number))
    }

    pub fn message_number(&self) -> Option<u32> {
        self.find_segment_first("HNHBK")?
            .numeric("message_number")
            .and_then(|n| u32::try_from(n).ok())
    }

    pub fn dialog_id(&self) -> Option<&str> {
        self.find_segment_first("HNHBK")?.text("dialog_id")
    }

    /// Every response of HIRMG (message level) and HIRMS (segment level).
    pub fn responses(&self) -> Vec<ResponseCode> {
        self.all_segments()
            .filter(|s| matches!(s.kind(), "HIRMG" | "HIRMS"))
            .flat_map(|s| {
                let reference = if s.kind() == "HIRMS" { s.reference() } else { None };
                s.list("responses")
                    .into_iter()
                    .flat_map(|list| list.values())
                    .filter_map(Value::as_group)
                    .map(move |c| ResponseCode::from_container(c, reference))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// HIRMS responses for request segment `reference`, optionally only one code.
    pub fn responses_for(&self, reference: u32, code: Option<&str>) -> Vec<ResponseCode> {
        self.responses()
            .into_iter()
            .filter(|r| r.segment_reference == Some(reference))
            .filter(|r| code.map_or(true, |c| r.code == c))
            .collect()
    }

    /// Continuation pointer for request segment `reference`, if the result is paginated.
    pub fn touchdown_for(&self, reference: u32) -> Option<String> {
        self.responses_for(reference, Some(TOUCHDOWN_CODE))
            .into_iter()
            .find_map(|r| r.parameters.into_iter().next())
    }
}

fn collect<'a>(segments: &'a [Segment], out: &mut Vec<&'a Segment>) {
    for segment in segments {
        out.push(segment);
        for (_, slot) in segment.fields() {
            if let Slot::Single(Some(Value::Segments(inner))) = slot {
                collect(inner, out);
            }
        }
    }
}

fn find_mut<'a>(segments: &'a mut [Segment], kind: &str) -> Option<&'a mut Segment> {
    for segment in segments {
        if segment.kind() == kind {
            return Some(segment);
        }
        for inner in segment.segment_sequences_mut() {
            if let Some(found) = find_mut(inner, kind) {
                return Some(found);
            }
        }
    }
    None
}

/// One bank response: code, optional reference element, text and parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCode {
    pub code: String,
    pub reference_element: Option<String>,
    pub text: String,
    pub parameters: Vec<String>,
    /// Number of the request segment an HIRMS response refers to.
    pub segment_reference: Option<u32>,
}

impl ResponseCode {
    fn from_container(c: &Container, segment_reference: Option<u32>) -> Self {
        ResponseCode {
            code: c.text("code").unwrap_or_default().to_string(),
            reference_element: c.text("reference_element").map(str::to_string),
            text: c.text("text").unwrap_or_default().to_string(),
            parameters: c
                .list("parameters")
                .map(|l| l.values().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default(),
            segment_reference,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code.starts_with('0')
    }

    pub fn is_warning(&self) -> bool {
        self.code.starts_with('3')
    }

    pub fn is_error(&self) -> bool {
        self.code.starts_with('9')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParseMode, Parser};
    use crate::registry::Registry;

    fn parse(raw: &[u8]) -> Message {
        Parser::new(Registry::builtin(), ParseMode::Strict)
            .parse_message(raw)
            .unwrap()
    }

    #[test]
    fn numbering_skips_envelope_numbers() {
        let reg = Registry::builtin();
        let mut msg = Message::new();
        assert_eq!(msg.push_numbered(reg.new_segment("HNHBK", 3).unwrap()).unwrap(), 1);
        let mut envelope = reg.new_segment("HNVSK", 3).unwrap();
        envelope.set_number(998).unwrap();
        msg.segments.push(envelope);
        assert_eq!(msg.push_numbered(reg.new_segment("HKEND", 1).unwrap()).unwrap(), 2);
    }

    #[test]
    fn size_matches_rendered_length() {
        let reg = Registry::builtin();
        let mut msg = Message::new();
        let mut header = reg.new_segment("HNHBK", 3).unwrap();
        header.set("hbci_version", 300u32).unwrap();
        header.set("dialog_id", "0").unwrap();
        header.set("message_number", 1u32).unwrap();
        msg.push_numbered(header).unwrap();
        let mut end = reg.new_segment("HNHBS", 1).unwrap();
        end.set("message_number", 1u32).unwrap();
        msg.push_numbered(end).unwrap();
        let len = msg.finalize_size().unwrap();
        let bytes = msg.render().unwrap();
        assert_eq!(bytes.len(), len);
        assert!(bytes.starts_with(format!("HNHBK:1:3+{:012}+300+0+1'", len).as_bytes()));
    }

    #[test]
    fn responses_and_touchdown() {
        let msg = parse(
            b"HNHBK:1:3+000000000000+300+DLG+2+DLG:2'\
HIRMG:2:2+0010::Nachricht entgegengenommen'\
HIRMS:3:2:3+3040::Es liegen weitere Informationen vor:TD-2+0020::ok'\
HNHBS:4:1+2'",
        );
        assert_eq!(msg.dialog_id(), Some("DLG"));
        assert_eq!(msg.message_number(), Some(2));
        let all = msg.responses();
        assert_eq!(all.len(), 3);
        assert!(all[0].is_success());
        assert_eq!(all[0].segment_reference, None);
        assert!(all[1].is_warning());
        assert_eq!(msg.responses_for(3, None).len(), 2);
        assert_eq!(msg.touchdown_for(3), Some("TD-2".to_string()));
        assert_eq!(msg.touchdown_for(4), None);
        assert_eq!(msg.find_segment_by_reference(3).count(), 1);
    }

    #[test]
    fn find_reaches_into_encrypted_data() {
        let inner = b"HNSHK:2:4+PIN:1+999+1+1+1+1::0+1+1:20240101:120000+1:999:1+6:10:16+280:1:u:S:0:0'";
        let mut raw = format!("HNVSD:999:1+@{}@", inner.len()).into_bytes();
        raw.extend_from_slice(inner);
        raw.push(b'\'');
        let mut msg = parse(&raw);
        assert!(msg.find_segment_first("HNSHK").is_some());
        let shk = msg.find_segment_first_mut("HNSHK").unwrap();
        shk.set("security_reference", "77").unwrap();
        assert_eq!(
            msg.find_segment_first("HNSHK").unwrap().text("security_reference"),
            Some("77")
        );
    }
}
