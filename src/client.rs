//! Client context: configuration, credentials, registry and connection, plus the
//! parameters the bank reports back (allowed TAN procedures, BPD/UPD versions).

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::dialog::Dialog;
use crate::error::{DialogError, Result};
use crate::message::Message;
use crate::parser::Parser;
use crate::registry::Registry;
use crate::security::{
    AuthenticationMechanism, EncryptionMechanism, PinTanAuthentication, PinTanDummyEncryption,
    SecurityContext,
};
use crate::segments;
use crate::value::Password;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Response code listing the two-step procedures allowed for the user.
pub const ALLOWED_PROCEDURES_CODE: &str = "3920";

pub struct Client {
    config: ClientConfig,
    pin: Password,
    parser: Parser,
    connection: Box<dyn Connection>,
    allowed_security_functions: Vec<String>,
    bpd_version: u32,
    upd_version: u32,
    bank_name: Option<String>,
}

impl Client {
    /// Client over the built-in catalogue.
    pub fn new(config: ClientConfig, pin: Password, connection: impl Connection + 'static) -> Self {
        Self::with_registry(config, pin, Registry::builtin(), connection)
    }

    pub fn with_registry(
        config: ClientConfig,
        pin: Password,
        registry: Arc<Registry>,
        connection: impl Connection + 'static,
    ) -> Self {
        let parser = Parser::new(registry, config.parse_mode);
        Client {
            bpd_version: config.bpd_version,
            upd_version: config.upd_version,
            config,
            pin,
            parser,
            connection: Box::new(connection),
            allowed_security_functions: Vec::new(),
            bank_name: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.parser.registry()
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    pub fn system_id(&self) -> &str {
        &self.config.system_id
    }

    /// Two-step procedures the bank allowed in its last `3920` response.
    pub fn allowed_security_functions(&self) -> &[String] {
        &self.allowed_security_functions
    }

    pub fn bpd_version(&self) -> u32 {
        self.bpd_version
    }

    pub fn upd_version(&self) -> u32 {
        self.upd_version
    }

    pub fn bank_name(&self) -> Option<&str> {
        self.bank_name.as_deref()
    }

    pub(crate) fn security_context(&self) -> SecurityContext<'_> {
        SecurityContext {
            registry: self.parser.registry(),
            bank: &self.config.bank,
            user_id: &self.config.user_id,
            system_id: &self.config.system_id,
            pin: &self.pin,
        }
    }

    pub(crate) fn transmit(&mut self, message: &[u8]) -> Result<Vec<u8>> {
        Ok(self.connection.send(message)?)
    }

    /// Encryption and authentication mechanisms for the configured security function.
    pub fn mechanisms(
        &self,
    ) -> (
        Option<Box<dyn EncryptionMechanism>>,
        Vec<Box<dyn AuthenticationMechanism>>,
    ) {
        let (version, auth): (u32, Box<dyn AuthenticationMechanism>) = if self.config.is_two_step() {
            (
                2,
                Box::new(PinTanAuthentication::two_step(self.config.security_function.clone())),
            )
        } else {
            (1, Box::new(PinTanAuthentication::one_step()))
        };
        let enc: Box<dyn EncryptionMechanism> = Box::new(PinTanDummyEncryption::new(version));
        (Some(enc), vec![auth])
    }

    /// New dialog with the configured mechanisms and lazy-init setting.
    pub fn dialog(&mut self) -> Dialog<'_> {
        let (enc, auths) = self.mechanisms();
        let lazy_init = self.config.lazy_init;
        Dialog::new(self, enc, auths, lazy_init)
    }

    /// Take over what the bank reports: allowed procedures, parameter versions, system id.
    pub fn process_response(&mut self, message: &Message) {
        for response in message.responses() {
            if response.is_error() {
                warn!(code = %response.code, "bank: {}", response.text);
            } else {
                info!(code = %response.code, "bank: {}", response.text);
            }
            if response.code == ALLOWED_PROCEDURES_CODE {
                self.allowed_security_functions = response.parameters.clone();
            }
        }
        if let Some(bpa) = message.find_segment_first("HIBPA") {
            if let Some(version) = bpa.numeric("bpd_version").and_then(|v| u32::try_from(v).ok()) {
                self.bpd_version = version;
            }
            self.bank_name = bpa.text("bank_name").map(str::to_string);
        }
        if let Some(version) = message
            .find_segment_first("HIUPA")
            .and_then(|s| s.numeric("upd_version"))
            .and_then(|v| u32::try_from(v).ok())
        {
            self.upd_version = version;
        }
        if let Some(system_id) = message.find_segment_first("HISYN").and_then(|s| s.text("system_id")) {
            info!(system_id = %system_id, "system id assigned");
            self.config.system_id = system_id.to_string();
        }
    }

    /// Obtain a system id: a dialog whose init carries HKSYN mode 0, then ended.
    pub fn synchronize(&mut self) -> Result<String> {
        let sync = segments::synchronization(self.registry(), "0")?;
        let mut dialog = self.dialog();
        let response = dialog.init(vec![sync])?;
        if response.find_segment_first("HISYN").is_none() {
            return Err(DialogError::MissingSegment("HISYN").into());
        }
        dialog.end()?;
        Ok(self.config.system_id.clone())
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("pin", &self.pin.redacted())
            .field("allowed_security_functions", &self.allowed_security_functions)
            .field("bpd_version", &self.bpd_version)
            .field("upd_version", &self.upd_version)
            .finish_non_exhaustive()
    }
}
