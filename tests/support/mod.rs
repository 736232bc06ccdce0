//! Scripted bank for dialog tests.
//!
//! The bank answers every request with a plaintext message: an HNHBK header carrying its
//! own message number, the configured dialog id and a reference to the request, the next
//! scripted body (or a plain `0010` acknowledgement) and an HNHBS trailer.

#![allow(dead_code)]

use fints3::{
    explode_segments, BankIdentifier, Client, ClientConfig, Connection, Message, ParseMode,
    Parser, Password, Registry, TransportError,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Once};
use tracing::Level;

pub const PIN: &str = "s3cr3t-pin";
pub const BANK_CODE: &str = "12345678";

const ACKNOWLEDGED: &str = "HIRMG:2:2+0010::Nachricht entgegengenommen.'";

static INIT_TRACING: Once = Once::new();

/// Install a compact `tracing` subscriber once per test binary.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_target(false)
            .without_time()
            .try_init();
    });
}

#[derive(Debug)]
pub struct Script {
    /// Dialog id put into every reply; `"0"` simulates a bank that never assigns one.
    pub dialog_id: String,
    /// Message number of the next reply.
    pub institute_number: u32,
    replies: VecDeque<String>,
    raw_requests: Vec<Vec<u8>>,
    requests: Vec<Message>,
}

impl Script {
    /// Queue the body (segments numbered from 2) of the next reply.
    pub fn reply(&mut self, body: &str) {
        self.replies.push_back(body.to_string());
    }

    pub fn raw_requests(&self) -> &[Vec<u8>] {
        &self.raw_requests
    }

    /// Requests as the bank parsed them, with the encrypted payload expanded.
    pub fn requests(&self) -> &[Message] {
        &self.requests
    }
}

#[derive(Debug, Clone)]
pub struct MockBank {
    script: Arc<Mutex<Script>>,
    parser: Parser,
}

impl MockBank {
    pub fn new(dialog_id: &str) -> (MockBank, Arc<Mutex<Script>>) {
        let script = Arc::new(Mutex::new(Script {
            dialog_id: dialog_id.to_string(),
            institute_number: 1,
            replies: VecDeque::new(),
            raw_requests: Vec::new(),
            requests: Vec::new(),
        }));
        let bank = MockBank {
            script: script.clone(),
            parser: Parser::new(Registry::builtin(), ParseMode::Lenient),
        };
        (bank, script)
    }
}

impl Connection for MockBank {
    fn send(&mut self, message: &[u8]) -> Result<Vec<u8>, TransportError> {
        let request = self
            .parser
            .parse_message(message)
            .map_err(|e| TransportError::Other(format!("bank cannot parse request: {}", e)))?;
        let mut script = self
            .script
            .lock()
            .map_err(|_| TransportError::Other("script lock poisoned".to_string()))?;

        let body = script.replies.pop_front().unwrap_or_else(|| ACKNOWLEDGED.to_string());
        let body_segments = explode_segments(body.as_bytes())
            .map_err(|e| TransportError::Other(e.to_string()))?
            .len();
        // A request numbered 1 after earlier traffic opens a new dialog.
        let number = if request.message_number() == Some(1) && !script.requests.is_empty() {
            1
        } else {
            script.institute_number
        };
        script.institute_number = number + 1;

        let render = |size: usize| {
            format!(
                "HNHBK:1:3+{:012}+300+{}+{}+{}:{}'{}HNHBS:{}:1+{}'",
                size,
                script.dialog_id,
                number,
                request.dialog_id().unwrap_or("0"),
                request.message_number().unwrap_or(0),
                body,
                body_segments + 2,
                number
            )
        };
        let size = render(0).len();
        let reply = render(size).into_bytes();

        script.raw_requests.push(message.to_vec());
        script.requests.push(request);
        Ok(reply)
    }
}

pub fn config(two_step: bool) -> ClientConfig {
    let mut config = ClientConfig::new(BankIdentifier::german(BANK_CODE), "user1");
    if two_step {
        config.security_function = "942".to_string();
    }
    config
}

pub fn client(bank: MockBank, two_step: bool) -> Client {
    Client::new(config(two_step), Password::new(PIN), bank)
}
