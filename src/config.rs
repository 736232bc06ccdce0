//! Client configuration, loaded from JSON.
//!
//! The PIN is deliberately not a configuration value; it is passed to
//! [`Client::new`](crate::client::Client::new) separately.

use crate::parser::ParseMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Country code and bank code (BLZ) of the institute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankIdentifier {
    #[serde(default = "default_country")]
    pub country_identifier: String,
    pub bank_code: String,
}

impl BankIdentifier {
    /// German bank (country code 280).
    pub fn german(bank_code: impl Into<String>) -> Self {
        BankIdentifier {
            country_identifier: default_country(),
            bank_code: bank_code.into(),
        }
    }
}

/// One-step PIN/TAN security function.
pub const ONE_STEP: &str = "999";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub bank: BankIdentifier,
    /// PIN/TAN endpoint; used by the transport, not by the protocol core.
    #[serde(default)]
    pub server: String,
    pub user_id: String,
    /// Defaults to the user id.
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default = "default_system_id")]
    pub system_id: String,
    #[serde(default = "default_product_name")]
    pub product_name: String,
    #[serde(default = "default_product_version")]
    pub product_version: String,
    #[serde(default)]
    pub parse_mode: ParseMode,
    #[serde(default = "default_true")]
    pub lazy_init: bool,
    /// `999` for one-step, otherwise the two-step TAN procedure (e.g. `942`).
    #[serde(default = "default_security_function")]
    pub security_function: String,
    #[serde(default)]
    pub bpd_version: u32,
    #[serde(default)]
    pub upd_version: u32,
}

fn default_country() -> String {
    "280".to_string()
}

fn default_system_id() -> String {
    crate::segments::SYSTEM_ID_UNASSIGNED.to_string()
}

fn default_product_name() -> String {
    "fints3".to_string()
}

fn default_product_version() -> String {
    env!("CARGO_PKG_VERSION").chars().take(5).collect()
}

fn default_true() -> bool {
    true
}

fn default_security_function() -> String {
    ONE_STEP.to_string()
}

impl ClientConfig {
    pub fn new(bank: BankIdentifier, user_id: impl Into<String>) -> Self {
        ClientConfig {
            bank,
            server: String::new(),
            user_id: user_id.into(),
            customer_id: None,
            system_id: default_system_id(),
            product_name: default_product_name(),
            product_version: default_product_version(),
            parse_mode: ParseMode::default(),
            lazy_init: true,
            security_function: default_security_function(),
            bpd_version: 0,
            upd_version: 0,
        }
    }

    pub fn customer_id(&self) -> &str {
        self.customer_id.as_deref().unwrap_or(&self.user_id)
    }

    pub fn is_two_step(&self) -> bool {
        self.security_function != ONE_STEP
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}
