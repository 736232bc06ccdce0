//! Error taxonomy shared by every layer of the crate.
//!
//! Wire errors are always fatal to the message being parsed. Field errors are fatal in
//! [`ParseMode::Strict`](crate::parser::ParseMode::Strict) and recovered per segment in
//! lenient mode. Dialog errors leave the dialog unusable. None of the messages ever
//! contain a PIN or TAN.

use crate::connection::TransportError;
use thiserror::Error;

/// Lexical and structural violations of the wire grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("malformed token at byte {offset}: {reason}")]
    MalformedToken { offset: usize, reason: &'static str },
    #[error("malformed structure at byte {offset}: {reason}")]
    MalformedStructure { offset: usize, reason: String },
    #[error("character {ch:?} cannot be encoded as ISO-8859-1")]
    Unencodable { ch: char },
}

/// A value violates the contract of its field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("field {field} ({kind}): cannot parse: {reason}")]
    Parse {
        field: String,
        kind: &'static str,
        reason: String,
    },
    #[error("field {field} ({kind}): invalid value: {reason}")]
    InvalidValue {
        field: String,
        kind: &'static str,
        reason: String,
    },
    #[error("field {field}: length {len} violates {constraint}")]
    Length {
        field: String,
        len: usize,
        constraint: String,
    },
    #[error("index {index} beyond max count {max}")]
    Cardinality { index: usize, max: usize },
    #[error("required field {container}.{field} was not present")]
    RequiredFieldMissing { container: String, field: String },
    #[error("no field {field} in {container}")]
    UnknownField { container: String, field: String },
}

/// Catalogue DSL syntax and resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("catalogue syntax: {0}")]
    Syntax(String),
    #[error("catalogue line {line}: {reason}")]
    Resolve { line: usize, reason: String },
    #[error("no schema for segment {kind}{version}")]
    UnknownSegment { kind: String, version: u32 },
}

/// Session-state misuse and dialog-level protocol failures.
#[derive(Debug, Error)]
pub enum DialogError {
    #[error("dialog is paused")]
    Paused,
    #[error("dialog is not open")]
    NotOpen,
    #[error("dialog was already initialised")]
    AlreadyInitialized,
    #[error("bank response carries no dialog id")]
    IdMissing,
    #[error("expected institute message number {expected}, got {got:?}")]
    UnexpectedMessageNumber { expected: u32, got: Option<u32> },
    #[error("signature check failed: {0}")]
    Security(String),
    #[error("response lacks segment {0}")]
    MissingSegment(&'static str),
    #[error("pause blob: {0}")]
    Blob(String),
    #[error("pause blob version {0} is not supported")]
    UnsupportedBlobVersion(u32),
    #[error("no configured authentication mechanism accepts a TAN")]
    TanNotSupported,
    #[error("bank holds {} until a TAN is submitted", .0.segment_type)]
    TanRequired(Box<crate::dialog::TanChallenge>),
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error("segment {segment}: {source}")]
    Segment {
        segment: String,
        #[source]
        source: FieldError,
    },
    #[error("unknown segment {kind}{version} (strict mode)")]
    UnknownSegment { kind: String, version: u32 },
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Dialog(#[from] DialogError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
