//! Constructors for the segments the dialog and the security envelope emit.
//!
//! Segments are returned unnumbered; [`Message::push_numbered`](crate::message::Message::push_numbered)
//! assigns the number.

use crate::config::BankIdentifier;
use crate::container::Segment;
use crate::error::Result;
use crate::registry::Registry;
use crate::value::Password;
use chrono::NaiveDateTime;

pub const HBCI_VERSION: u32 = 300;
/// Dialog id used until the bank assigns one.
pub const DIALOG_ID_UNASSIGNED: &str = "0";
/// System id used before synchronisation.
pub const SYSTEM_ID_UNASSIGNED: &str = "0";

/// Segment number of the encryption head.
pub const ENCRYPTION_HEAD_NUMBER: u32 = 998;
/// Segment number of the encrypted data segment.
pub const ENCRYPTED_DATA_NUMBER: u32 = 999;

/// Security profile, identification, date and key name shared by HNSHK and HNVSK.
#[derive(Debug, Clone)]
pub struct SecurityParameters<'a> {
    pub security_method_version: u32,
    pub bank: &'a BankIdentifier,
    pub user_id: &'a str,
    pub system_id: &'a str,
    pub timestamp: NaiveDateTime,
}

impl SecurityParameters<'_> {
    fn apply(&self, seg: &mut Segment, key_type: &str) -> Result<()> {
        seg.set_path("security_profile.security_method", "PIN")?;
        seg.set_path("security_profile.security_method_version", self.security_method_version)?;
        seg.set_path("security_identification_details.identified_role", "1")?;
        seg.set_path("security_identification_details.identifier", self.system_id)?;
        seg.set_path("security_datetime.date_time_type", "1")?;
        seg.set_path("security_datetime.date", self.timestamp.date())?;
        seg.set_path("security_datetime.time", self.timestamp.time())?;
        set_bank(seg, "key_name.bank_identifier", self.bank)?;
        seg.set_path("key_name.user_id", self.user_id)?;
        seg.set_path("key_name.key_type", key_type)?;
        seg.set_path("key_name.key_number", 0u32)?;
        seg.set_path("key_name.key_version", 0u32)?;
        Ok(())
    }
}

fn set_bank(seg: &mut Segment, path: &str, bank: &BankIdentifier) -> Result<()> {
    seg.set_path(&format!("{}.country_identifier", path), bank.country_identifier.as_str())?;
    seg.set_path(&format!("{}.bank_code", path), bank.bank_code.as_str())?;
    Ok(())
}

/// HNHBK3 with a zero size; the size is fixed by `Message::finalize_size`.
pub fn message_header(reg: &Registry, dialog_id: &str, message_number: u32) -> Result<Segment> {
    let mut seg = reg.new_segment("HNHBK", 3)?;
    seg.set("message_size", 0u64)?;
    seg.set("hbci_version", HBCI_VERSION)?;
    seg.set("dialog_id", dialog_id)?;
    seg.set("message_number", message_number)?;
    Ok(seg)
}

pub fn message_trailer(reg: &Registry, message_number: u32) -> Result<Segment> {
    let mut seg = reg.new_segment("HNHBS", 1)?;
    seg.set("message_number", message_number)?;
    Ok(seg)
}

pub fn identification(
    reg: &Registry,
    bank: &BankIdentifier,
    customer_id: &str,
    system_id: &str,
) -> Result<Segment> {
    let mut seg = reg.new_segment("HKIDN", 2)?;
    set_bank(&mut seg, "bank_identifier", bank)?;
    seg.set("customer_id", customer_id)?;
    seg.set("system_id", system_id)?;
    seg.set("system_id_status", "1")?;
    Ok(seg)
}

pub fn processing_preparation(
    reg: &Registry,
    bpd_version: u32,
    upd_version: u32,
    product_name: &str,
    product_version: &str,
) -> Result<Segment> {
    let mut seg = reg.new_segment("HKVVB", 3)?;
    seg.set("bpd_version", bpd_version)?;
    seg.set("upd_version", upd_version)?;
    seg.set("language", "0")?;
    seg.set("product_name", product_name)?;
    seg.set("product_version", product_version)?;
    Ok(seg)
}

/// HKSYN3; mode `0` requests a new system id.
pub fn synchronization(reg: &Registry, mode: &str) -> Result<Segment> {
    let mut seg = reg.new_segment("HKSYN", 3)?;
    seg.set("synchronization_mode", mode)?;
    Ok(seg)
}

pub fn dialog_end(reg: &Registry, dialog_id: &str) -> Result<Segment> {
    let mut seg = reg.new_segment("HKEND", 1)?;
    seg.set("dialog_id", dialog_id)?;
    Ok(seg)
}

pub fn signature_header(
    reg: &Registry,
    params: &SecurityParameters<'_>,
    security_function: &str,
    security_reference: &str,
) -> Result<Segment> {
    let mut seg = reg.new_segment("HNSHK", 4)?;
    seg.set("security_function", security_function)?;
    seg.set("security_reference", security_reference)?;
    seg.set("security_application_area", "1")?;
    seg.set("security_role", "1")?;
    seg.set("security_reference_number", 1u32)?;
    seg.set_path("hash_algorithm.usage_hash", "1")?;
    seg.set_path("hash_algorithm.hash_algorithm", "999")?;
    seg.set_path("hash_algorithm.algorithm_parameter_name", "1")?;
    seg.set_path("signature_algorithm.usage_signature", "6")?;
    seg.set_path("signature_algorithm.signature_algorithm", "10")?;
    seg.set_path("signature_algorithm.operation_mode", "16")?;
    params.apply(&mut seg, "S")?;
    Ok(seg)
}

pub fn signature_trailer(
    reg: &Registry,
    security_reference: &str,
    pin: &Password,
    tan: Option<&Password>,
) -> Result<Segment> {
    let mut seg = reg.new_segment("HNSHA", 2)?;
    seg.set("security_reference", security_reference)?;
    seg.set_path("user_defined_signature.pin", pin.clone())?;
    if let Some(tan) = tan {
        seg.set_path("user_defined_signature.tan", tan.clone())?;
    }
    Ok(seg)
}

/// HNVSK3 of the PIN/TAN profile: declares an encryption that is not applied.
pub fn encryption_header(reg: &Registry, params: &SecurityParameters<'_>) -> Result<Segment> {
    let mut seg = reg.new_segment("HNVSK", 3)?;
    seg.set_number(ENCRYPTION_HEAD_NUMBER)?;
    seg.set("security_function", "998")?;
    seg.set("security_role", "1")?;
    seg.set_path("encryption_algorithm.usage_encryption", "2")?;
    seg.set_path("encryption_algorithm.operation_mode", "2")?;
    seg.set_path("encryption_algorithm.encryption_algorithm", "13")?;
    seg.set_path("encryption_algorithm.algorithm_parameter_value", vec![0u8; 8])?;
    seg.set_path("encryption_algorithm.algorithm_parameter_name", "5")?;
    seg.set_path("encryption_algorithm.algorithm_parameter_iv_name", "1")?;
    seg.set("compression_function", "0")?;
    params.apply(&mut seg, "V")?;
    Ok(seg)
}

pub fn encrypted_data(reg: &Registry, segments: Vec<Segment>) -> Result<Segment> {
    let mut seg = reg.new_segment("HNVSD", 1)?;
    seg.set_number(ENCRYPTED_DATA_NUMBER)?;
    seg.set("data", segments)?;
    Ok(seg)
}

/// HKTAN6 process 4: announce a task that may need a TAN.
pub fn tan_process_4(reg: &Registry, segment_type: &str) -> Result<Segment> {
    let mut seg = reg.new_segment("HKTAN", 6)?;
    seg.set("tan_process", "4")?;
    seg.set("segment_type", segment_type)?;
    Ok(seg)
}

/// HKTAN6 process 2: submit the TAN for a pending task.
pub fn tan_process_2(reg: &Registry, task_reference: &str) -> Result<Segment> {
    let mut seg = reg.new_segment("HKTAN", 6)?;
    seg.set("tan_process", "2")?;
    seg.set("task_reference", task_reference)?;
    seg.set("further_tan_follows", false)?;
    Ok(seg)
}
