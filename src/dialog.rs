//! Dialog state machine: message numbering, dialog id lifecycle, the security envelope,
//! touchdown pagination, two-step TAN submission and pause/resume.
//!
//! A [`Dialog`] borrows its [`Client`] mutably for its whole lifetime, so one client drives
//! at most one dialog at a time. Resuming the same pause blob twice yields two dialogs
//! racing against one bank session; callers must not do that.

use crate::client::Client;
use crate::container::Segment;
use crate::dump::format_message;
use crate::error::{DialogError, Result};
use crate::message::{Direction, Message};
use crate::security::{AuthenticationMechanism, EncryptionMechanism, MechanismState};
use crate::segments::{self, DIALOG_ID_UNASSIGNED};
use crate::value::Password;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Magic marker of the pause blob.
pub const BLOB_MAGIC: &str = "fints3-dialog";
/// Pause blob format version written by this crate.
pub const BLOB_VERSION: u32 = 1;

/// Response code announcing that the task needs a TAN.
pub const TAN_REQUIRED_CODE: &str = "0030";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogState {
    Uninitialized,
    /// Init exchange in flight.
    Syncing,
    Open,
    Ending,
    Closed,
}

/// Result of [`Dialog::send_task`].
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Done(Message),
    /// The bank holds the task until a TAN is submitted.
    NeedTan(TanChallenge),
}

/// A pending two-step task, as announced by HITAN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TanChallenge {
    /// Type of the business segment waiting for the TAN.
    pub segment_type: String,
    pub task_reference: String,
    pub challenge: Option<String>,
    #[serde(default)]
    pub challenge_hhduc: Option<Vec<u8>>,
}

impl TanChallenge {
    /// Challenge announced by `response` for a `segment_type` task, if the bank answered `0030`.
    ///
    /// Callers of [`Dialog::init`] in two-step mode check the init response with
    /// `segment_type` `"HKIDN"`.
    pub fn from_response(segment_type: &str, response: &Message) -> Result<Option<TanChallenge>> {
        if !response.responses().iter().any(|r| r.code == TAN_REQUIRED_CODE) {
            return Ok(None);
        }
        let hitan = response
            .find_segment_first("HITAN")
            .ok_or(DialogError::MissingSegment("HITAN"))?;
        Ok(Some(TanChallenge {
            segment_type: segment_type.to_string(),
            task_reference: hitan.text("task_reference").unwrap_or_default().to_string(),
            challenge: hitan.text("challenge").map(str::to_string),
            challenge_hhduc: hitan
                .get("challenge_hhduc")
                .ok()
                .flatten()
                .and_then(|v| v.as_bytes())
                .map(<[u8]>::to_vec),
        }))
    }
}

pub struct Dialog<'c> {
    client: &'c mut Client,
    state: DialogState,
    paused: bool,
    lazy_init: bool,
    need_init: bool,
    dialog_id: String,
    next_message_number: BTreeMap<Direction, u32>,
    messages: BTreeMap<Direction, BTreeMap<u32, Message>>,
    enc: Option<Box<dyn EncryptionMechanism>>,
    auths: Vec<Box<dyn AuthenticationMechanism>>,
}

impl<'c> Dialog<'c> {
    pub fn new(
        client: &'c mut Client,
        enc: Option<Box<dyn EncryptionMechanism>>,
        auths: Vec<Box<dyn AuthenticationMechanism>>,
        lazy_init: bool,
    ) -> Self {
        Dialog {
            client,
            state: DialogState::Uninitialized,
            paused: false,
            lazy_init,
            need_init: true,
            dialog_id: DIALOG_ID_UNASSIGNED.to_string(),
            next_message_number: [(Direction::Customer, 1), (Direction::Institute, 1)]
                .into_iter()
                .collect(),
            messages: BTreeMap::new(),
            enc,
            auths,
        }
    }

    pub fn state(&self) -> DialogState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == DialogState::Open
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn dialog_id(&self) -> &str {
        &self.dialog_id
    }

    pub fn next_message_number(&self, direction: Direction) -> u32 {
        self.next_message_number.get(&direction).copied().unwrap_or(1)
    }

    /// Journalled messages of one direction, by message number. Secrets are redacted.
    pub fn journal(&self, direction: Direction) -> impl Iterator<Item = (u32, &Message)> + '_ {
        self.messages
            .get(&direction)
            .into_iter()
            .flat_map(|m| m.iter().map(|(n, msg)| (*n, msg)))
    }

    pub fn last_sent(&self) -> Option<&Message> {
        self.messages
            .get(&Direction::Customer)
            .and_then(|m| m.values().next_back())
    }

    pub fn client(&self) -> &Client {
        self.client
    }

    fn is_two_step(&self) -> bool {
        self.auths
            .iter()
            .any(|a| matches!(a.state(), MechanismState::PinTanTwoStep { .. }))
    }

    fn check_not_paused(&self) -> Result<()> {
        if self.paused {
            return Err(DialogError::Paused.into());
        }
        Ok(())
    }

    /// Send identification and processing preparation, followed by `extra` segments.
    pub fn init(&mut self, extra: Vec<Segment>) -> Result<Message> {
        self.check_not_paused()?;
        if !self.need_init || self.state != DialogState::Uninitialized {
            return Err(DialogError::AlreadyInitialized.into());
        }
        let config = self.client.config();
        let reg = self.client.registry().clone();
        let mut segs = vec![
            segments::identification(&reg, &config.bank, config.customer_id(), &config.system_id)?,
            segments::processing_preparation(
                &reg,
                self.client.bpd_version(),
                self.client.upd_version(),
                &config.product_name,
                &config.product_version,
            )?,
        ];
        if self.is_two_step() {
            segs.push(segments::tan_process_4(&reg, "HKIDN")?);
        }
        segs.extend(extra);

        self.state = DialogState::Syncing;
        match self.exchange(segs) {
            Ok(response) => {
                self.state = DialogState::Open;
                self.need_init = false;
                self.lazy_init = false;
                info!(dialog_id = %self.dialog_id, "dialog initialised");
                Ok(response)
            }
            Err(e) => {
                self.state = DialogState::Uninitialized;
                Err(e)
            }
        }
    }

    /// Send business segments in one message, initialising first if the dialog is lazy.
    ///
    /// Fails with [`DialogError::TanRequired`] if the lazy init is held for a TAN; the
    /// segments are not sent then.
    pub fn send(&mut self, segments: Vec<Segment>) -> Result<Message> {
        if let Some(challenge) = self.ensure_open()? {
            return Err(DialogError::TanRequired(Box::new(challenge)).into());
        }
        self.exchange(segments)
    }

    /// Run a pending lazy init. Returns the bank's TAN challenge for HKIDN, if any.
    fn ensure_open(&mut self) -> Result<Option<TanChallenge>> {
        self.check_not_paused()?;
        if self.state == DialogState::Open {
            return Ok(None);
        }
        if !(self.lazy_init && self.need_init && self.state == DialogState::Uninitialized) {
            return Err(DialogError::NotOpen.into());
        }
        let response = self.init(Vec::new())?;
        let challenge = TanChallenge::from_response("HKIDN", &response)?;
        if let Some(challenge) = &challenge {
            info!(task_reference = %challenge.task_reference, "dialog init needs a TAN");
        }
        Ok(challenge)
    }

    /// Terminate the dialog. The dialog id is reset and the dialog cannot be reused.
    pub fn end(&mut self) -> Result<Message> {
        self.check_not_paused()?;
        if self.state != DialogState::Open {
            return Err(DialogError::NotOpen.into());
        }
        self.state = DialogState::Ending;
        let end = segments::dialog_end(self.client.registry(), &self.dialog_id)?;
        let result = self.exchange(vec![end]);
        self.state = DialogState::Closed;
        info!(dialog_id = %self.dialog_id, "dialog ended");
        self.dialog_id = DIALOG_ID_UNASSIGNED.to_string();
        result
    }

    /// Send a business segment; with a two-step mechanism, HKTAN process 4 is appended.
    ///
    /// If a lazy init is held for a TAN, the init challenge is returned and the task is not
    /// sent; submit the TAN and call `send_task` again.
    pub fn send_task(&mut self, segment: Segment) -> Result<TaskOutcome> {
        let segment_type = segment.kind().to_string();
        let mut segs = vec![segment];
        if self.is_two_step() {
            segs.push(segments::tan_process_4(self.client.registry(), &segment_type)?);
        }
        if let Some(challenge) = self.ensure_open()? {
            return Ok(TaskOutcome::NeedTan(challenge));
        }
        let response = self.exchange(segs)?;
        match TanChallenge::from_response(&segment_type, &response)? {
            Some(challenge) => {
                info!(
                    segment_type = %segment_type,
                    task_reference = %challenge.task_reference,
                    "task needs a TAN"
                );
                Ok(TaskOutcome::NeedTan(challenge))
            }
            None => Ok(TaskOutcome::Done(response)),
        }
    }

    /// Release a task held by the bank. The TAN travels in the signature trailer.
    ///
    /// The dialog must be open: the TAN is bound to the next outgoing message, which has to
    /// be the HKTAN release.
    pub fn submit_tan(&mut self, challenge: &TanChallenge, tan: Password) -> Result<Message> {
        self.check_not_paused()?;
        if self.state != DialogState::Open {
            return Err(DialogError::NotOpen.into());
        }
        let hktan = segments::tan_process_2(self.client.registry(), &challenge.task_reference)?;
        let mut accepted = false;
        for auth in &mut self.auths {
            accepted |= auth.set_pending_tan(tan.clone());
        }
        if !accepted {
            return Err(DialogError::TanNotSupported.into());
        }
        let result = self.exchange(vec![hktan]);
        if result.is_err() {
            for auth in &mut self.auths {
                auth.clear_pending_tan();
            }
        }
        result
    }

    /// Send the request built by `build` and follow touchdown pointers until the last page.
    ///
    /// `build` receives the pointer of the previous page (`None` for the first request).
    /// Returns every `response_kind` segment of all pages in order.
    pub fn fetch_with_touchdowns<F>(&mut self, response_kind: &str, mut build: F) -> Result<Vec<Segment>>
    where
        F: FnMut(Option<&str>) -> Result<Segment>,
    {
        let mut results = Vec::new();
        let mut touchdown: Option<String> = None;
        loop {
            let request = build(touchdown.as_deref())?;
            let kind = request.kind().to_string();
            let response = self.send(vec![request])?;
            results.extend(response.find_segments(response_kind).cloned());
            let number = self
                .last_sent()
                .and_then(|m| m.find_segment_first(&kind))
                .and_then(Segment::number);
            let next = number.and_then(|n| response.touchdown_for(n));
            match next {
                Some(pointer) if touchdown.as_deref() == Some(pointer.as_str()) => {
                    warn!(touchdown = %pointer, "bank repeated the touchdown pointer, stopping");
                    break;
                }
                Some(pointer) => {
                    debug!(segment = %kind, touchdown = %pointer, "fetching next page");
                    touchdown = Some(pointer);
                }
                None => break,
            }
        }
        Ok(results)
    }

    fn build_message(&mut self, number: u32, business: Vec<Segment>) -> Result<Message> {
        let ctx = self.client.security_context();
        let mut msg = Message::new();
        msg.push_numbered(segments::message_header(ctx.registry, &self.dialog_id, number)?)?;
        for auth in self.auths.iter_mut() {
            auth.sign_prepare(&ctx, &mut msg)?;
        }
        for segment in business {
            msg.push_numbered(segment)?;
        }
        for auth in self.auths.iter_mut().rev() {
            auth.sign_commit(&ctx, &mut msg)?;
        }
        msg.push_numbered(segments::message_trailer(ctx.registry, number)?)?;
        if let Some(enc) = self.enc.as_mut() {
            enc.encrypt(&ctx, &mut msg)?;
        }
        msg.finalize_size()?;
        Ok(msg)
    }

    /// One request/response round trip.
    ///
    /// The customer message number is consumed and the request journalled before the reply
    /// arrives. A reply with an unexpected institute message number is rejected without
    /// being journalled or counted.
    fn exchange(&mut self, business: Vec<Segment>) -> Result<Message> {
        let number = self.next_message_number(Direction::Customer);
        let request = self.build_message(number, business)?;
        assert_eq!(
            request.message_number(),
            Some(number),
            "outgoing message must carry the next customer message number"
        );
        let bytes = request.render()?;
        let request = request.redacted();
        debug!("sending message {}:\n{}", number, format_message(&request));
        self.record(Direction::Customer, number, request);
        self.next_message_number.insert(Direction::Customer, number + 1);

        let reply = self.client.transmit(&bytes)?;
        let mut response = self.client.parser().parse_message(&reply)?;
        let expected = self.next_message_number(Direction::Institute);
        let got = response.message_number();
        if got != Some(expected) {
            return Err(DialogError::UnexpectedMessageNumber { expected, got }.into());
        }
        self.next_message_number.insert(Direction::Institute, expected + 1);

        let ctx = self.client.security_context();
        if let Some(enc) = self.enc.as_mut() {
            enc.decrypt(&ctx, &mut response)?;
        }
        for auth in self.auths.iter_mut() {
            auth.verify(&ctx, &response)?;
        }
        debug!("received message {}:\n{}", expected, format_message(&response));
        self.record(Direction::Institute, expected, response.redacted());

        if self.dialog_id == DIALOG_ID_UNASSIGNED {
            match response.dialog_id() {
                Some(id) if id != DIALOG_ID_UNASSIGNED => {
                    info!(dialog_id = %id, "dialog id assigned");
                    self.dialog_id = id.to_string();
                }
                _ => return Err(DialogError::IdMissing.into()),
            }
        }
        self.client.process_response(&response);
        Ok(response)
    }

    fn record(&mut self, direction: Direction, number: u32, message: Message) {
        self.messages.entry(direction).or_default().insert(number, message);
    }

    /// Suspend the dialog and capture its state as a portable blob.
    ///
    /// Every further operation fails with [`DialogError::Paused`]; continue with
    /// [`Dialog::resume`].
    pub fn pause(&mut self) -> Result<Vec<u8>> {
        self.check_not_paused()?;
        let mut journal = Vec::new();
        for (direction, messages) in &self.messages {
            for (number, message) in messages {
                journal.push(JournalEntry {
                    direction: *direction,
                    number: *number,
                    data: STANDARD.encode(message.render()?),
                });
            }
        }
        let blob = PauseBlob {
            magic: BLOB_MAGIC.to_string(),
            version: BLOB_VERSION,
            fields: DialogFields {
                state: self.state,
                lazy_init: self.lazy_init,
                need_init: self.need_init,
                dialog_id: self.dialog_id.clone(),
                next_message_number: self.next_message_number.clone(),
                messages: journal,
                enc: self.enc.as_ref().map(|e| e.state()),
                auths: self.auths.iter().map(|a| a.state()).collect(),
                client: BackRef::to("client"),
                dialog: BackRef::to("dialog"),
            },
        };
        let bytes = serde_json::to_vec(&blob).map_err(|e| DialogError::Blob(e.to_string()))?;
        self.paused = true;
        info!(dialog_id = %self.dialog_id, "dialog paused");
        Ok(bytes)
    }

    /// Rebuild a paused dialog bound to `client`. Unknown blob versions are rejected.
    pub fn resume(client: &'c mut Client, blob: &[u8]) -> Result<Dialog<'c>> {
        let envelope: BlobEnvelope =
            serde_json::from_slice(blob).map_err(|e| DialogError::Blob(e.to_string()))?;
        if envelope.magic != BLOB_MAGIC {
            return Err(DialogError::Blob(format!("unexpected magic {:?}", envelope.magic)).into());
        }
        if envelope.version != BLOB_VERSION {
            return Err(DialogError::UnsupportedBlobVersion(envelope.version).into());
        }
        let fields: DialogFields =
            serde_json::from_value(envelope.fields).map_err(|e| DialogError::Blob(e.to_string()))?;
        fields.client.expect_target("client")?;
        fields.dialog.expect_target("dialog")?;

        let mut messages: BTreeMap<Direction, BTreeMap<u32, Message>> = BTreeMap::new();
        for entry in fields.messages {
            let raw = STANDARD
                .decode(entry.data.as_bytes())
                .map_err(|e| DialogError::Blob(e.to_string()))?;
            let message = client.parser().parse_message(&raw)?;
            messages.entry(entry.direction).or_default().insert(entry.number, message);
        }
        let enc = fields.enc.map(MechanismState::into_encryption).transpose()?;
        let auths = fields
            .auths
            .into_iter()
            .map(MechanismState::into_authentication)
            .collect::<Result<Vec<_>>>()?;

        info!(dialog_id = %fields.dialog_id, "dialog resumed");
        Ok(Dialog {
            client,
            state: fields.state,
            paused: false,
            lazy_init: fields.lazy_init,
            need_init: fields.need_init,
            dialog_id: fields.dialog_id,
            next_message_number: fields.next_message_number,
            messages,
            enc,
            auths,
        })
    }
}

impl fmt::Debug for Dialog<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dialog")
            .field("state", &self.state)
            .field("paused", &self.paused)
            .field("dialog_id", &self.dialog_id)
            .field("next_message_number", &self.next_message_number)
            .field("enc", &self.enc)
            .field("auths", &self.auths)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct BlobEnvelope {
    magic: String,
    version: u32,
    fields: serde_json::Value,
}

#[derive(Serialize)]
struct PauseBlob {
    magic: String,
    version: u32,
    fields: DialogFields,
}

#[derive(Serialize, Deserialize)]
struct DialogFields {
    state: DialogState,
    lazy_init: bool,
    need_init: bool,
    dialog_id: String,
    next_message_number: BTreeMap<Direction, u32>,
    messages: Vec<JournalEntry>,
    enc: Option<MechanismState>,
    auths: Vec<MechanismState>,
    client: BackRef,
    dialog: BackRef,
}

#[derive(Serialize, Deserialize)]
struct JournalEntry {
    direction: Direction,
    number: u32,
    /// Rendered, redacted message, base64.
    data: String,
}

/// Placeholder for a live object supplied by the caller at resume time.
#[derive(Serialize, Deserialize)]
struct BackRef {
    #[serde(rename = "$backref")]
    target: String,
}

impl BackRef {
    fn to(target: &str) -> Self {
        BackRef {
            target: target.to_string(),
        }
    }

    fn expect_target(&self, target: &str) -> Result<()> {
        if self.target != target {
            return Err(DialogError::Blob(format!(
                "back-reference {:?} where {:?} was expected",
                self.target, target
            ))
            .into());
        }
        Ok(())
    }
}
