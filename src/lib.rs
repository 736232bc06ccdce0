//! # fints3: FinTS/HBCI 3.0 wire codec, segment schemas and dialog state machine
//!
//! A segment catalogue DSL with a PEST grammar describes FinTS segments and data element
//! groups; a schema-driven parser and serializer move between the escaped wire format and
//! typed segments; the dialog state machine wraps business segments in the PIN/TAN security
//! envelope and drives SYNC, INIT, task exchanges and END against a bank.
//!
//! ## Wire format
//!
//! - Segments end with `'`, data elements are separated by `+`, group elements by `:`
//! - `?` escapes any of `+ : ' ?`
//! - `@len@` introduces `len` raw bytes of binary data
//!
//! ## Catalogue DSL
//!
//! ```text
//! group BankIdentifier {
//! 	country_identifier: ctr;
//! 	bank_code: an(max 30);
//! }
//!
//! segment HKEND1 {
//! 	dialog_id: id;
//! }
//! ```
//!
//! Field kinds: `txt an dta id num dig float wrt jn dat tim bin code ctr cur pwd sf`, or a
//! group name. Lengths: `(n)`, `(max n)`, `(min n)`, `(n..m)`. Counts: `[n]`, `[n..m]`,
//! `[n..]`, `[..m]`. A trailing `?` marks a field optional; `in ("a", "b")` closes a code list.
//!
//! ## Usage
//!
//! ```no_run
//! use fints3::{BankIdentifier, Client, ClientConfig, Password, TransportError};
//!
//! # fn main() -> fints3::Result<()> {
//! let config = ClientConfig::new(BankIdentifier::german("12345678"), "user1");
//! let transport = |_msg: &[u8]| -> Result<Vec<u8>, TransportError> { unimplemented!() };
//! let mut client = Client::new(config, Password::new("1234"), transport);
//! client.synchronize()?;
//! let mut dialog = client.dialog();
//! let _response = dialog.send(vec![])?;
//! dialog.end()?;
//! # Ok(())
//! # }
//! ```

pub mod ast;
pub mod catalogue;
pub mod client;
pub mod config;
pub mod connection;
pub mod container;
pub mod dialog;
pub mod dump;
pub mod error;
pub mod explode;
pub mod field;
pub mod lint;
pub mod message;
pub mod parser;
pub mod registry;
pub mod schema;
pub mod security;
pub mod segments;
pub mod serializer;
pub mod tokenizer;
pub mod value;

pub use client::Client;
pub use config::{BankIdentifier, ClientConfig};
pub use connection::{Connection, TransportError};
pub use container::{Container, Segment};
pub use dialog::{Dialog, DialogState, TanChallenge, TaskOutcome};
pub use error::{DialogError, Error, FieldError, Result, SchemaError, WireError};
pub use explode::{explode_segments, implode_segments, Cell, Scalar};
pub use message::{Direction, Message, ResponseCode};
pub use parser::{ParseDiagnostic, ParseMode, Parser};
pub use registry::Registry;
pub use security::{AuthenticationMechanism, EncryptionMechanism, MechanismState};
pub use serializer::{serialize_segment, serialize_segments};
pub use tokenizer::{escape, unescape};
pub use value::{Password, Value, ValueList};
