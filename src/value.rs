//! Runtime values held by containers (segments and data element groups).

use crate::container::{Container, Segment};
use crate::error::FieldError;
use chrono::{NaiveDate, NaiveTime};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// A single parsed or assigned value.
///
/// Each field kind parses into one canonical variant (`num` into [`Value::Number`], `dig`
/// into [`Value::Digits`], ...). Assignments through
/// [`Container::set`](crate::container::Container::set) are normalised to that variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(u64),
    /// Digit string, leading zeros significant.
    Digits(String),
    /// Decimal number in `.` notation, e.g. `"1234.5"`. Rendered with a comma on the wire.
    Decimal(String),
    Bool(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    Binary(Vec<u8>),
    Password(Password),
    Group(Container),
    /// Segments carried inside a binary element (`sf` fields).
    Segments(Vec<Segment>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Digits(s) | Value::Decimal(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Digits(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_password(&self) -> Option<&Password> {
        match self {
            Value::Password(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&Container> {
        match self {
            Value::Group(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_group_mut(&mut self) -> Option<&mut Container> {
        match self {
            Value::Group(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_segments(&self) -> Option<&[Segment]> {
        match self {
            Value::Segments(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_segments_mut(&mut self) -> Option<&mut Vec<Segment>> {
        match self {
            Value::Segments(s) => Some(s),
            _ => None,
        }
    }

    /// True for values that render as nothing: unset groups and empty text.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Text(s) => s.is_empty(),
            Value::Group(c) => c.is_unset(),
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(u64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<NaiveTime> for Value {
    fn from(t: NaiveTime) -> Self {
        Value::Time(t)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Binary(b)
    }
}

impl From<Password> for Value {
    fn from(p: Password) -> Self {
        Value::Password(p)
    }
}

impl From<Container> for Value {
    fn from(c: Container) -> Self {
        Value::Group(c)
    }
}

impl From<Vec<Segment>> for Value {
    fn from(s: Vec<Segment>) -> Self {
        Value::Segments(s)
    }
}

/// Storage for a repeated field with `min..=max` occurrences.
///
/// Reading past the stored elements yields absent values; writing past them extends the
/// storage with absent values. Any index at or beyond `max` is a
/// [`FieldError::Cardinality`]. The logical length is the highest index holding a value
/// plus one, but never less than `min`.
#[derive(Debug, Clone)]
pub struct ValueList {
    items: Vec<Option<Value>>,
    min: usize,
    max: Option<usize>,
}

impl ValueList {
    pub fn new(min: usize, max: Option<usize>) -> Self {
        ValueList {
            items: Vec::new(),
            min,
            max,
        }
    }

    pub fn min_count(&self) -> usize {
        self.min
    }

    pub fn max_count(&self) -> Option<usize> {
        self.max
    }

    fn check_index(&self, index: usize) -> Result<(), FieldError> {
        match self.max {
            Some(max) if index >= max => Err(FieldError::Cardinality { index, max }),
            _ => Ok(()),
        }
    }

    /// Logical length.
    pub fn len(&self) -> usize {
        let used = self
            .items
            .iter()
            .rposition(|v| v.as_ref().is_some_and(|v| !v.is_blank()))
            .map_or(0, |i| i + 1);
        used.max(self.min)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stored slots, including trailing absent ones.
    pub fn physical_len(&self) -> usize {
        self.items.len()
    }

    pub fn get(&self, index: usize) -> Result<Option<&Value>, FieldError> {
        self.check_index(index)?;
        Ok(self.items.get(index).and_then(Option::as_ref))
    }

    /// Mutable slot at `index`, extending the storage with absent values as needed.
    pub fn slot_mut(&mut self, index: usize) -> Result<&mut Option<Value>, FieldError> {
        self.check_index(index)?;
        if index >= self.items.len() {
            self.items.resize(index + 1, None);
        }
        Ok(&mut self.items[index])
    }

    pub fn set(&mut self, index: usize, value: Option<Value>) -> Result<(), FieldError> {
        *self.slot_mut(index)? = value;
        Ok(())
    }

    /// Store `value` right after the last present element.
    pub fn push(&mut self, value: Value) -> Result<usize, FieldError> {
        let index = self
            .items
            .iter()
            .rposition(|v| v.as_ref().is_some_and(|v| !v.is_blank()))
            .map_or(0, |i| i + 1);
        self.set(index, Some(value))?;
        Ok(index)
    }

    /// Elements up to the logical length; absent ones are `None`.
    pub fn iter(&self) -> impl Iterator<Item = Option<&Value>> + '_ {
        (0..self.len()).map(move |i| self.items.get(i).and_then(Option::as_ref))
    }

    /// Present elements only.
    pub fn values(&self) -> impl Iterator<Item = &Value> + '_ {
        self.iter().flatten()
    }

    pub(crate) fn items_mut(&mut self) -> impl Iterator<Item = &mut Value> + '_ {
        self.items.iter_mut().flatten()
    }
}

impl PartialEq for ValueList {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

/// PIN or TAN. Has no `Display`; [`Password::reveal`] is the only way to the clear text.
#[derive(Clone)]
pub struct Password(SecretString);

const REDACTED: &str = "***";

impl Password {
    pub fn new(secret: impl Into<String>) -> Self {
        Password(SecretString::from(secret.into()))
    }

    /// Placeholder stored in journals and dumps instead of the real secret.
    pub fn placeholder() -> Self {
        Password::new(REDACTED)
    }

    /// Clear text. Only the wire renderer should need this.
    pub fn reveal(&self) -> &str {
        self.0.expose_secret()
    }

    /// Always-redacted rendering for log and diagnostic call sites.
    pub fn redacted(&self) -> Redacted {
        Redacted
    }

    /// Length in characters, used for length checks without exposing the value.
    pub fn char_len(&self) -> usize {
        self.0.expose_secret().chars().count()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Password({})", REDACTED)
    }
}

impl PartialEq for Password {
    fn eq(&self, other: &Self) -> bool {
        self.reveal() == other.reveal()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Redacted;

impl fmt::Display for Redacted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}
