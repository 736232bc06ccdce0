//! Scalar field kinds: per-kind parse/render/validate behaviour plus length and count specs.
//!
//! Kinds are a closed set selected by their catalogue tag (`num`, `dig`, `dat`, ...). Each
//! kind is backed by a [`KindCodec`]; the tag-to-kind table is [`FieldKind::from_tag`].

use crate::explode::Scalar;
use crate::value::{Password, Value};
use chrono::{NaiveDate, NaiveTime};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Text,
    Alphanumeric,
    Dtaus,
    Id,
    Numeric,
    Digits,
    Float,
    Amount,
    Boolean,
    Date,
    Time,
    Binary,
    Code,
    Country,
    Currency,
    Password,
    SegmentSequence,
}

const KIND_TAGS: &[(&str, FieldKind)] = &[
    ("txt", FieldKind::Text),
    ("an", FieldKind::Alphanumeric),
    ("dta", FieldKind::Dtaus),
    ("id", FieldKind::Id),
    ("num", FieldKind::Numeric),
    ("dig", FieldKind::Digits),
    ("float", FieldKind::Float),
    ("wrt", FieldKind::Amount),
    ("jn", FieldKind::Boolean),
    ("dat", FieldKind::Date),
    ("tim", FieldKind::Time),
    ("bin", FieldKind::Binary),
    ("code", FieldKind::Code),
    ("ctr", FieldKind::Country),
    ("cur", FieldKind::Currency),
    ("pwd", FieldKind::Password),
    ("sf", FieldKind::SegmentSequence),
];

impl FieldKind {
    pub fn from_tag(tag: &str) -> Option<FieldKind> {
        KIND_TAGS.iter().find(|(t, _)| *t == tag).map(|(_, k)| *k)
    }

    pub fn tag(self) -> &'static str {
        KIND_TAGS
            .iter()
            .find(|(_, k)| *k == self)
            .map_or("?", |(t, _)| t)
    }

    /// Length applied when the catalogue does not declare one.
    pub fn default_length(self) -> Length {
        match self {
            FieldKind::Id => Length::Bounds { min: None, max: Some(30) },
            FieldKind::Country | FieldKind::Currency => Length::Exact(3),
            FieldKind::Password => Length::Bounds { min: None, max: Some(99) },
            _ => Length::Any,
        }
    }

    pub fn codec(self) -> &'static dyn KindCodec {
        match self {
            FieldKind::Text
            | FieldKind::Alphanumeric
            | FieldKind::Dtaus
            | FieldKind::Id
            | FieldKind::Code => &TextCodec,
            FieldKind::Numeric => &NumericCodec,
            FieldKind::Digits => &DigitsCodec,
            FieldKind::Float | FieldKind::Amount => &DecimalCodec,
            FieldKind::Boolean => &BooleanCodec,
            FieldKind::Date => &DateCodec,
            FieldKind::Time => &TimeCodec,
            FieldKind::Binary | FieldKind::SegmentSequence => &BinaryCodec,
            FieldKind::Country => &CountryCodec,
            FieldKind::Currency => &CurrencyCodec,
            FieldKind::Password => &PasswordCodec,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Parse, render and validate contract of one kind. Errors are plain reasons; the field
/// layer attaches names.
pub trait KindCodec: Sync {
    fn parse(&self, raw: &Scalar) -> Result<Value, String>;
    fn render(&self, value: &Value) -> Result<Scalar, String>;
    fn validate(&self, _value: &Value) -> Result<(), String> {
        Ok(())
    }
}

fn raw_text(raw: &Scalar) -> Result<&str, String> {
    match raw {
        Scalar::Text(s) => Ok(s),
        Scalar::Empty => Ok(""),
        Scalar::Binary(_) => Err("binary data where text was expected".to_string()),
    }
}

fn mismatch(value: &Value) -> String {
    format!("unsupported value {}", variant_name(value))
}

fn variant_name(value: &Value) -> &'static str {
    match value {
        Value::Text(_) => "text",
        Value::Number(_) => "number",
        Value::Digits(_) => "digits",
        Value::Decimal(_) => "decimal",
        Value::Bool(_) => "boolean",
        Value::Date(_) => "date",
        Value::Time(_) => "time",
        Value::Binary(_) => "binary",
        Value::Password(_) => "password",
        Value::Group(_) => "group",
        Value::Segments(_) => "segments",
    }
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

struct TextCodec;

impl KindCodec for TextCodec {
    fn parse(&self, raw: &Scalar) -> Result<Value, String> {
        Ok(Value::Text(raw_text(raw)?.to_string()))
    }

    fn render(&self, value: &Value) -> Result<Scalar, String> {
        match value {
            Value::Text(s) | Value::Digits(s) => Ok(Scalar::from(s.as_str())),
            Value::Number(n) => Ok(Scalar::Text(n.to_string())),
            _ => Err(mismatch(value)),
        }
    }
}

struct NumericCodec;

fn check_numeric(s: &str) -> Result<u64, String> {
    if !all_digits(s) {
        return Err(format!("{:?} is not numeric", s));
    }
    if s.len() > 1 && s.starts_with('0') {
        return Err(format!("leading zero not allowed in {:?}", s));
    }
    s.parse().map_err(|_| format!("{:?} out of range", s))
}

impl KindCodec for NumericCodec {
    fn parse(&self, raw: &Scalar) -> Result<Value, String> {
        check_numeric(raw_text(raw)?).map(Value::Number)
    }

    fn render(&self, value: &Value) -> Result<Scalar, String> {
        match value {
            Value::Number(n) => Ok(Scalar::Text(n.to_string())),
            Value::Text(s) | Value::Digits(s) => {
                check_numeric(s)?;
                Ok(Scalar::Text(s.clone()))
            }
            _ => Err(mismatch(value)),
        }
    }
}

struct DigitsCodec;

impl KindCodec for DigitsCodec {
    fn parse(&self, raw: &Scalar) -> Result<Value, String> {
        let s = raw_text(raw)?;
        if !all_digits(s) {
            return Err(format!("{:?} contains non-digits", s));
        }
        Ok(Value::Digits(s.to_string()))
    }

    fn render(&self, value: &Value) -> Result<Scalar, String> {
        match value {
            Value::Number(n) => Ok(Scalar::Text(n.to_string())),
            Value::Text(s) | Value::Digits(s) => {
                if !all_digits(s) {
                    return Err(format!("{:?} contains non-digits", s));
                }
                Ok(Scalar::Text(s.clone()))
            }
            _ => Err(mismatch(value)),
        }
    }
}

struct DecimalCodec;

/// Validate `int[,frac]` (wire) or `int[.frac]` (canonical) and return the canonical form.
fn canonical_decimal(s: &str, separator: char) -> Result<String, String> {
    let (int, frac) = match s.split_once(separator) {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if !all_digits(int) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("{:?} is not a decimal number", s));
    }
    if int.len() > 1 && int.starts_with('0') {
        return Err(format!("leading zero not allowed in {:?}", s));
    }
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        Ok(int.to_string())
    } else {
        Ok(format!("{}.{}", int, frac))
    }
}

impl KindCodec for DecimalCodec {
    fn parse(&self, raw: &Scalar) -> Result<Value, String> {
        canonical_decimal(raw_text(raw)?, ',').map(Value::Decimal)
    }

    fn render(&self, value: &Value) -> Result<Scalar, String> {
        let canonical = match value {
            Value::Decimal(s) | Value::Text(s) => canonical_decimal(s, '.')?,
            Value::Number(n) => n.to_string(),
            _ => return Err(mismatch(value)),
        };
        let wire = match canonical.split_once('.') {
            Some((int, frac)) => format!("{},{}", int, frac),
            None => format!("{},", canonical),
        };
        Ok(Scalar::Text(wire))
    }
}

struct BooleanCodec;

impl KindCodec for BooleanCodec {
    fn parse(&self, raw: &Scalar) -> Result<Value, String> {
        match raw_text(raw)? {
            "J" => Ok(Value::Bool(true)),
            "N" => Ok(Value::Bool(false)),
            other => Err(format!("{:?} is neither J nor N", other)),
        }
    }

    fn render(&self, value: &Value) -> Result<Scalar, String> {
        match value {
            Value::Bool(true) => Ok(Scalar::Text("J".to_string())),
            Value::Bool(false) => Ok(Scalar::Text("N".to_string())),
            Value::Text(s) if s == "J" || s == "N" => Ok(Scalar::Text(s.clone())),
            _ => Err(mismatch(value)),
        }
    }
}

struct DateCodec;

impl KindCodec for DateCodec {
    fn parse(&self, raw: &Scalar) -> Result<Value, String> {
        let s = raw_text(raw)?;
        if s.len() != 8 || !all_digits(s) {
            return Err(format!("{:?} is not YYYYMMDD", s));
        }
        NaiveDate::parse_from_str(s, "%Y%m%d")
            .map(Value::Date)
            .map_err(|e| format!("{:?}: {}", s, e))
    }

    fn render(&self, value: &Value) -> Result<Scalar, String> {
        match value {
            Value::Date(d) => Ok(Scalar::Text(d.format("%Y%m%d").to_string())),
            Value::Text(s) | Value::Digits(s) => self
                .parse(&Scalar::Text(s.clone()))
                .and_then(|v| self.render(&v)),
            _ => Err(mismatch(value)),
        }
    }
}

struct TimeCodec;

impl KindCodec for TimeCodec {
    fn parse(&self, raw: &Scalar) -> Result<Value, String> {
        let s = raw_text(raw)?;
        if s.len() != 6 || !all_digits(s) {
            return Err(format!("{:?} is not HHMMSS", s));
        }
        NaiveTime::parse_from_str(s, "%H%M%S")
            .map(Value::Time)
            .map_err(|e| format!("{:?}: {}", s, e))
    }

    fn render(&self, value: &Value) -> Result<Scalar, String> {
        match value {
            Value::Time(t) => Ok(Scalar::Text(t.format("%H%M%S").to_string())),
            Value::Text(s) | Value::Digits(s) => self
                .parse(&Scalar::Text(s.clone()))
                .and_then(|v| self.render(&v)),
            _ => Err(mismatch(value)),
        }
    }
}

struct BinaryCodec;

impl KindCodec for BinaryCodec {
    fn parse(&self, raw: &Scalar) -> Result<Value, String> {
        match raw {
            Scalar::Binary(b) => Ok(Value::Binary(b.clone())),
            Scalar::Text(s) => crate::tokenizer::encode_text(s)
                .map(Value::Binary)
                .map_err(|e| e.to_string()),
            Scalar::Empty => Ok(Value::Binary(Vec::new())),
        }
    }

    fn render(&self, value: &Value) -> Result<Scalar, String> {
        match value {
            Value::Binary(b) => Ok(Scalar::Binary(b.clone())),
            Value::Text(s) => crate::tokenizer::encode_text(s)
                .map(Scalar::Binary)
                .map_err(|e| e.to_string()),
            _ => Err(mismatch(value)),
        }
    }
}

struct CountryCodec;

impl KindCodec for CountryCodec {
    fn parse(&self, raw: &Scalar) -> Result<Value, String> {
        let s = raw_text(raw)?;
        if s.len() != 3 || !all_digits(s) {
            return Err(format!("{:?} is not a 3-digit country code", s));
        }
        Ok(Value::Digits(s.to_string()))
    }

    fn render(&self, value: &Value) -> Result<Scalar, String> {
        match value {
            Value::Number(n) => Ok(Scalar::Text(format!("{:03}", n))),
            Value::Text(s) | Value::Digits(s) => {
                self.parse(&Scalar::Text(s.clone()))?;
                Ok(Scalar::Text(s.clone()))
            }
            _ => Err(mismatch(value)),
        }
    }
}

struct CurrencyCodec;

impl KindCodec for CurrencyCodec {
    fn parse(&self, raw: &Scalar) -> Result<Value, String> {
        Ok(Value::Text(raw_text(raw)?.to_string()))
    }

    fn render(&self, value: &Value) -> Result<Scalar, String> {
        match value {
            Value::Text(s) => Ok(Scalar::from(s.as_str())),
            _ => Err(mismatch(value)),
        }
    }

    fn validate(&self, value: &Value) -> Result<(), String> {
        match value.as_str() {
            Some(s) if s.bytes().all(|b| b.is_ascii_uppercase()) => Ok(()),
            _ => Err("currency must be an upper-case ISO 4217 code".to_string()),
        }
    }
}

struct PasswordCodec;

impl KindCodec for PasswordCodec {
    fn parse(&self, raw: &Scalar) -> Result<Value, String> {
        Ok(Value::Password(Password::new(raw_text(raw)?)))
    }

    fn render(&self, value: &Value) -> Result<Scalar, String> {
        match value {
            Value::Password(p) => Ok(Scalar::from(p.reveal())),
            Value::Text(s) => Ok(Scalar::from(s.as_str())),
            _ => Err(mismatch(value)),
        }
    }
}

/// Allowed length of a rendered value, in characters (text) or bytes (binary).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    Any,
    Exact(usize),
    Bounds { min: Option<usize>, max: Option<usize> },
}

impl Length {
    pub fn check(&self, len: usize) -> Result<(), String> {
        match *self {
            Length::Any => Ok(()),
            Length::Exact(n) if len != n => Err(format!("length={}", n)),
            Length::Bounds { min: Some(min), .. } if len < min => Err(format!("min_length={}", min)),
            Length::Bounds { max: Some(max), .. } if len > max => Err(format!("max_length={}", max)),
            _ => Ok(()),
        }
    }

    pub fn exact(&self) -> Option<usize> {
        match *self {
            Length::Exact(n) => Some(n),
            _ => None,
        }
    }
}

/// Number of occurrences of a field. The default is exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Count {
    Exact(usize),
    Bounds { min: usize, max: Option<usize> },
}

impl Default for Count {
    fn default() -> Self {
        Count::Exact(1)
    }
}

impl Count {
    pub fn is_repeated(&self) -> bool {
        *self != Count::Exact(1)
    }

    pub fn min(&self) -> usize {
        match *self {
            Count::Exact(n) => n,
            Count::Bounds { min, .. } => min,
        }
    }

    pub fn max(&self) -> Option<usize> {
        match *self {
            Count::Exact(n) => Some(n),
            Count::Bounds { max, .. } => max,
        }
    }
}
