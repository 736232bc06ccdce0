//! Connection collaborator: moves one rendered message to the bank and returns the reply.
//!
//! The core never interprets transport status beyond success or failure. HTTP and the
//! base64 PIN/TAN transport encoding live behind this trait.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport returned status {status}")]
    Status { status: u16 },
    #[error("transport I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport: {0}")]
    Other(String),
}

/// Sends a rendered FinTS message and returns the raw reply bytes.
///
/// Implementations must not retry on their own behalf unless the caller configured them to;
/// the dialog treats any error as fatal for the current exchange.
pub trait Connection {
    fn send(&mut self, message: &[u8]) -> Result<Vec<u8>, TransportError>;
}

impl<F> Connection for F
where
    F: FnMut(&[u8]) -> Result<Vec<u8>, TransportError>,
{
    fn send(&mut self, message: &[u8]) -> Result<Vec<u8>, TransportError> {
        self(message)
    }
}
