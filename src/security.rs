//! Security envelope: the encryption and authentication roles wrapped around every message.
//!
//! The PIN/TAN profile applies no real cryptography. [`PinTanDummyEncryption`] moves the
//! signed segments into an HNVSD container behind an HNVSK head, and the PIN/TAN
//! authentication mechanisms sign by placing the PIN (and TAN) into HNSHA.
//!
//! A message is assembled in this order: header, then `sign_prepare` of every
//! authentication mechanism (outer to inner), business segments, then `sign_commit` in
//! reverse order, the trailer, and finally `encrypt`.

use crate::config::{BankIdentifier, ONE_STEP};
use crate::container::Segment;
use crate::error::{DialogError, Result};
use crate::message::Message;
use crate::registry::Registry;
use crate::segments::{self, SecurityParameters};
use crate::value::{Password, Value};
use chrono::Local;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Everything a mechanism needs from the client to build envelope segments.
pub struct SecurityContext<'a> {
    pub registry: &'a Registry,
    pub bank: &'a BankIdentifier,
    pub user_id: &'a str,
    pub system_id: &'a str,
    pub pin: &'a Password,
}

impl SecurityContext<'_> {
    fn parameters(&self, security_method_version: u32) -> SecurityParameters<'_> {
        SecurityParameters {
            security_method_version,
            bank: self.bank,
            user_id: self.user_id,
            system_id: self.system_id,
            timestamp: Local::now().naive_local(),
        }
    }
}

impl fmt::Debug for SecurityContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityContext")
            .field("bank", self.bank)
            .field("user_id", &self.user_id)
            .field("system_id", &self.system_id)
            .field("pin", &self.pin.redacted())
            .finish()
    }
}

pub trait EncryptionMechanism: fmt::Debug {
    fn encrypt(&mut self, ctx: &SecurityContext<'_>, message: &mut Message) -> Result<()>;
    fn decrypt(&mut self, ctx: &SecurityContext<'_>, message: &mut Message) -> Result<()>;
    /// Serialisable configuration, stored in the pause blob.
    fn state(&self) -> MechanismState;
}

pub trait AuthenticationMechanism: fmt::Debug {
    /// Insert the signature head. Segment numbers of business segments are not known yet.
    fn sign_prepare(&mut self, ctx: &SecurityContext<'_>, message: &mut Message) -> Result<()>;
    /// Append the signature trailer matching the prepared head.
    fn sign_commit(&mut self, ctx: &SecurityContext<'_>, message: &mut Message) -> Result<()>;
    /// Check the signature metadata of an incoming message.
    fn verify(&mut self, ctx: &SecurityContext<'_>, message: &Message) -> Result<()>;
    fn state(&self) -> MechanismState;

    /// Hand over a TAN for the next signature; returns false if the mechanism takes none.
    fn set_pending_tan(&mut self, _tan: Password) -> bool {
        false
    }

    /// Drop a TAN handed over with [`set_pending_tan`](Self::set_pending_tan) but never used.
    fn clear_pending_tan(&mut self) {}
}

/// Serialised form of a configured mechanism.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mechanism", rename_all = "snake_case")]
pub enum MechanismState {
    PinTanDummyEncryption { security_method_version: u32 },
    PinTanOneStep,
    PinTanTwoStep { security_function: String },
}

impl MechanismState {
    pub fn into_encryption(self) -> Result<Box<dyn EncryptionMechanism>> {
        match self {
            MechanismState::PinTanDummyEncryption {
                security_method_version,
            } => Ok(Box::new(PinTanDummyEncryption::new(security_method_version))),
            other => Err(DialogError::Blob(format!("{:?} is not an encryption mechanism", other)).into()),
        }
    }

    pub fn into_authentication(self) -> Result<Box<dyn AuthenticationMechanism>> {
        match self {
            MechanismState::PinTanOneStep => Ok(Box::new(PinTanAuthentication::one_step())),
            MechanismState::PinTanTwoStep { security_function } => {
                Ok(Box::new(PinTanAuthentication::two_step(security_function)))
            }
            other => Err(DialogError::Blob(format!("{:?} is not an authentication mechanism", other)).into()),
        }
    }
}

/// HNVSK/HNVSD wrapper without encryption.
#[derive(Debug, Clone)]
pub struct PinTanDummyEncryption {
    security_method_version: u32,
}

impl PinTanDummyEncryption {
    pub fn new(security_method_version: u32) -> Self {
        PinTanDummyEncryption {
            security_method_version,
        }
    }
}

impl EncryptionMechanism for PinTanDummyEncryption {
    fn encrypt(&mut self, ctx: &SecurityContext<'_>, message: &mut Message) -> Result<()> {
        if message.segments.len() < 2 {
            return Err(DialogError::MissingSegment("HNHBS").into());
        }
        let trailer_at = message.segments.len() - 1;
        let inner: Vec<Segment> = message.segments.drain(1..trailer_at).collect();
        let params = ctx.parameters(self.security_method_version);
        let head = segments::encryption_header(ctx.registry, &params)?;
        let data = segments::encrypted_data(ctx.registry, inner)?;
        message.segments.insert(1, head);
        message.segments.insert(2, data);
        Ok(())
    }

    fn decrypt(&mut self, _ctx: &SecurityContext<'_>, message: &mut Message) -> Result<()> {
        let Some(at) = message.segments.iter().position(|s| s.kind() == "HNVSD") else {
            return Ok(());
        };
        let inner = match message.segments[at].get("data") {
            Ok(Some(Value::Segments(inner))) => inner.clone(),
            _ => {
                warn!("HNVSD payload was not parsed as segments, leaving it wrapped");
                return Ok(());
            }
        };
        let mut unwrapped = Vec::with_capacity(message.segments.len() + inner.len());
        for (i, segment) in message.segments.drain(..).enumerate() {
            if i == at {
                unwrapped.extend(inner.iter().cloned());
            } else if segment.kind() != "HNVSK" {
                unwrapped.push(segment);
            }
        }
        message.segments = unwrapped;
        Ok(())
    }

    fn state(&self) -> MechanismState {
        MechanismState::PinTanDummyEncryption {
            security_method_version: self.security_method_version,
        }
    }
}

/// PIN/TAN signature: HNSHK with the security function, HNSHA with PIN and optional TAN.
#[derive(Debug, Clone)]
pub struct PinTanAuthentication {
    security_function: String,
    pending_reference: Option<String>,
    pending_tan: Option<Password>,
}

impl PinTanAuthentication {
    pub fn one_step() -> Self {
        Self::two_step(ONE_STEP)
    }

    /// `security_function` is the TAN procedure code, e.g. `942`.
    pub fn two_step(security_function: impl Into<String>) -> Self {
        PinTanAuthentication {
            security_function: security_function.into(),
            pending_reference: None,
            pending_tan: None,
        }
    }

    pub fn is_two_step(&self) -> bool {
        self.security_function != ONE_STEP
    }

    pub fn security_function(&self) -> &str {
        &self.security_function
    }

    fn security_method_version(&self) -> u32 {
        if self.is_two_step() {
            2
        } else {
            1
        }
    }
}

pub fn security_reference() -> String {
    rand::thread_rng().gen_range(1_000_000..10_000_000u32).to_string()
}

impl AuthenticationMechanism for PinTanAuthentication {
    fn sign_prepare(&mut self, ctx: &SecurityContext<'_>, message: &mut Message) -> Result<()> {
        let reference = security_reference();
        let params = ctx.parameters(self.security_method_version());
        let head = segments::signature_header(ctx.registry, &params, &self.security_function, &reference)?;
        message.push_numbered(head)?;
        self.pending_reference = Some(reference);
        Ok(())
    }

    fn sign_commit(&mut self, ctx: &SecurityContext<'_>, message: &mut Message) -> Result<()> {
        let reference = self
            .pending_reference
            .take()
            .ok_or_else(|| DialogError::Security("signature trailer without a prepared head".to_string()))?;
        let tan = self.pending_tan.take();
        if let Some(tan) = &tan {
            debug!(security_reference = %reference, "signing with TAN {}", tan.redacted());
        }
        let trailer = segments::signature_trailer(ctx.registry, &reference, ctx.pin, tan.as_ref())?;
        message.push_numbered(trailer)?;
        Ok(())
    }

    fn verify(&mut self, _ctx: &SecurityContext<'_>, message: &Message) -> Result<()> {
        let trailers: Vec<&str> = message
            .find_segments("HNSHA")
            .filter_map(|s| s.text("security_reference"))
            .collect();
        for head in message.find_segments("HNSHK") {
            let reference = head.text("security_reference").unwrap_or_default();
            if !trailers.contains(&reference) {
                return Err(DialogError::Security(format!(
                    "signature head {} has no matching trailer",
                    reference
                ))
                .into());
            }
        }
        Ok(())
    }

    fn state(&self) -> MechanismState {
        if self.is_two_step() {
            MechanismState::PinTanTwoStep {
                security_function: self.security_function.clone(),
            }
        } else {
            MechanismState::PinTanOneStep
        }
    }

    fn set_pending_tan(&mut self, tan: Password) -> bool {
        if !self.is_two_step() {
            return false;
        }
        self.pending_tan = Some(tan);
        true
    }

    fn clear_pending_tan(&mut self) {
        self.pending_tan = None;
    }
}
