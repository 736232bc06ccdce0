//! Dialog state machine against a scripted bank.

mod support;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use fints3::dialog::BLOB_VERSION;
use fints3::dump::format_message;
use fints3::{
    Client, Dialog, DialogError, DialogState, Direction, Error, Password, Registry, Segment,
    TaskOutcome, TransportError,
};
use std::io::Write;
use std::sync::Arc;
use support::{client, config, init_tracing, MockBank, PIN};

const IBAN: &str = "DE02120300000000202051";

fn balance_request(reg: &Registry) -> Segment {
    let mut seg = reg.new_segment("HKSAL", 7).unwrap();
    seg.set_path("account.iban", IBAN).unwrap();
    seg.set("all_accounts", false).unwrap();
    seg
}

fn transactions_request(reg: &Registry, touchdown: Option<&str>) -> fints3::Result<Segment> {
    let mut seg = reg.new_segment("HKKAZ", 7)?;
    seg.set_path("account.iban", IBAN)?;
    seg.set("all_accounts", false)?;
    if let Some(touchdown) = touchdown {
        seg.set("touchdown_point", touchdown)?;
    }
    Ok(seg)
}

fn kinds(message: &fints3::Message) -> Vec<&str> {
    message.segments.iter().map(Segment::kind).collect()
}

fn registry_of(client: &Client) -> Arc<Registry> {
    client.registry().clone()
}

// ==================== Lifecycle ====================

#[test]
fn five_messages_are_numbered_consecutively() {
    init_tracing();
    let (bank, script) = MockBank::new("DLG-1");
    let mut client = client(bank, false);
    let reg = registry_of(&client);
    let mut dialog = client.dialog();

    dialog.init(vec![]).unwrap();
    assert_eq!(dialog.state(), DialogState::Open);
    assert_eq!(dialog.dialog_id(), "DLG-1");
    for _ in 0..3 {
        dialog.send(vec![balance_request(&reg)]).unwrap();
    }
    dialog.end().unwrap();
    assert_eq!(dialog.state(), DialogState::Closed);
    assert_eq!(dialog.dialog_id(), "0");
    assert_eq!(dialog.next_message_number(Direction::Customer), 6);
    assert_eq!(dialog.next_message_number(Direction::Institute), 6);
    assert_eq!(dialog.journal(Direction::Customer).count(), 5);
    assert_eq!(dialog.journal(Direction::Institute).count(), 5);

    let script = script.lock().unwrap();
    let requests = script.requests();
    let numbers: Vec<_> = requests.iter().map(|m| m.message_number()).collect();
    assert_eq!(numbers, [Some(1), Some(2), Some(3), Some(4), Some(5)]);
    let ids: Vec<_> = requests.iter().map(|m| m.dialog_id()).collect();
    assert_eq!(
        ids,
        [Some("0"), Some("DLG-1"), Some("DLG-1"), Some("DLG-1"), Some("DLG-1")]
    );
    assert_eq!(
        requests[4].find_segment_first("HKEND").and_then(|s| s.text("dialog_id")),
        Some("DLG-1")
    );
}

#[test]
fn requests_travel_in_the_security_envelope() {
    init_tracing();
    let (bank, script) = MockBank::new("DLG-1");
    let mut client = client(bank, false);
    let mut dialog = client.dialog();
    dialog.init(vec![]).unwrap();

    let script = script.lock().unwrap();
    let request = &script.requests()[0];
    assert_eq!(kinds(request), ["HNHBK", "HNVSK", "HNVSD", "HNHBS"]);
    let numbers: Vec<_> = request.all_segments().filter_map(Segment::number).collect();
    assert_eq!(numbers, [1, 998, 999, 2, 3, 4, 5, 6]);
    let inner: Vec<_> = request.all_segments().map(Segment::kind).collect();
    assert_eq!(
        inner,
        ["HNHBK", "HNVSK", "HNVSD", "HNSHK", "HKIDN", "HKVVB", "HNSHA", "HNHBS"]
    );

    let raw = &script.raw_requests()[0];
    let size = request.segments[0].text("message_size").unwrap();
    assert_eq!(size.parse::<usize>().unwrap(), raw.len());
    assert_eq!(
        request.find_segment_first("HNSHK").and_then(|s| s.text("security_function")),
        Some("999")
    );
}

#[test]
fn lazy_dialog_initialises_on_first_send() {
    init_tracing();
    let (bank, script) = MockBank::new("DLG-2");
    let mut client = client(bank, false);
    let reg = registry_of(&client);
    let mut dialog = client.dialog();
    dialog.send(vec![balance_request(&reg)]).unwrap();
    assert!(dialog.is_open());

    let script = script.lock().unwrap();
    assert_eq!(script.requests().len(), 2);
    assert!(script.requests()[0].find_segment_first("HKIDN").is_some());
    assert!(script.requests()[1].find_segment_first("HKSAL").is_some());
}

#[test]
fn eager_dialog_refuses_send_before_init() {
    init_tracing();
    let (bank, _script) = MockBank::new("DLG-1");
    let mut config = config(false);
    config.lazy_init = false;
    let mut client = Client::new(config, Password::new(PIN), bank);
    let mut dialog = client.dialog();
    assert!(matches!(
        dialog.send(vec![]),
        Err(Error::Dialog(DialogError::NotOpen))
    ));
    dialog.init(vec![]).unwrap();
    assert!(matches!(
        dialog.init(vec![]),
        Err(Error::Dialog(DialogError::AlreadyInitialized))
    ));
}

#[test]
fn ended_dialog_cannot_be_reused() {
    init_tracing();
    let (bank, _script) = MockBank::new("DLG-1");
    let mut client = client(bank, false);
    let mut dialog = client.dialog();
    dialog.init(vec![]).unwrap();
    dialog.end().unwrap();
    assert!(matches!(dialog.send(vec![]), Err(Error::Dialog(DialogError::NotOpen))));
    assert!(matches!(dialog.end(), Err(Error::Dialog(DialogError::NotOpen))));
    assert!(matches!(
        dialog.init(vec![]),
        Err(Error::Dialog(DialogError::AlreadyInitialized))
    ));
}

#[test]
fn missing_dialog_id_fails_init() {
    init_tracing();
    let (bank, _script) = MockBank::new("0");
    let mut client = client(bank, false);
    let mut dialog = client.dialog();
    assert!(matches!(
        dialog.init(vec![]),
        Err(Error::Dialog(DialogError::IdMissing))
    ));
    assert_eq!(dialog.state(), DialogState::Uninitialized);
}

#[test]
fn institute_message_number_is_checked() {
    init_tracing();
    let (bank, script) = MockBank::new("DLG-1");
    script.lock().unwrap().institute_number = 7;
    let mut client = client(bank, false);
    let mut dialog = client.dialog();
    assert!(matches!(
        dialog.init(vec![]),
        Err(Error::Dialog(DialogError::UnexpectedMessageNumber {
            expected: 1,
            got: Some(7)
        }))
    ));
}

#[test]
fn transport_failure_leaves_dialog_uninitialised() {
    init_tracing();
    let transport = |_msg: &[u8]| -> Result<Vec<u8>, TransportError> {
        Err(TransportError::Status { status: 503 })
    };
    let mut client = Client::new(config(false), Password::new(PIN), transport);
    let mut dialog = client.dialog();
    assert!(matches!(
        dialog.init(vec![]),
        Err(Error::Transport(TransportError::Status { status: 503 }))
    ));
    assert_eq!(dialog.state(), DialogState::Uninitialized);
}

#[test]
fn business_errors_are_returned_not_raised() {
    init_tracing();
    let (bank, script) = MockBank::new("DLG-1");
    let mut client = client(bank, false);
    let reg = registry_of(&client);
    let mut dialog = client.dialog();
    dialog.init(vec![]).unwrap();
    script
        .lock()
        .unwrap()
        .reply("HIRMG:2:2+9050::Die Nachricht enthaelt Fehler.'HIRMS:3:2:3+9010::Konto unbekannt.'");
    let response = dialog.send(vec![balance_request(&reg)]).unwrap();
    let codes: Vec<_> = response.responses().into_iter().map(|r| r.code).collect();
    assert_eq!(codes, ["9050", "9010"]);
    assert!(response.responses_for(3, None)[0].is_error());
    assert!(dialog.is_open());
}

// ==================== Bank parameters ====================

#[test]
fn synchronize_obtains_system_id() {
    init_tracing();
    let (bank, script) = MockBank::new("DLG-SYNC");
    script.lock().unwrap().reply(
        "HIRMG:2:2+0010::Nachricht entgegengenommen.'\
         HIBPA:3:3:4+12+280:12345678+Testbank+3+1+300'\
         HISYN:4:4:6+SYS-42'",
    );
    let mut client = client(bank, false);
    let system_id = client.synchronize().unwrap();
    assert_eq!(system_id, "SYS-42");
    assert_eq!(client.system_id(), "SYS-42");
    assert_eq!(client.bpd_version(), 12);
    assert_eq!(client.bank_name(), Some("Testbank"));

    let mut dialog = client.dialog();
    dialog.init(vec![]).unwrap();

    let script = script.lock().unwrap();
    let requests = script.requests();
    assert_eq!(requests.len(), 3);
    let sync = requests[0].find_segment_first("HKSYN").unwrap();
    assert_eq!(sync.text("synchronization_mode"), Some("0"));
    assert!(requests[1].find_segment_first("HKEND").is_some());
    let idn = requests[2].find_segment_first("HKIDN").unwrap();
    assert_eq!(idn.text("system_id"), Some("SYS-42"));
    let vvb = requests[2].find_segment_first("HKVVB").unwrap();
    assert_eq!(vvb.numeric("bpd_version"), Some(12));
}

#[test]
fn synchronize_without_hisyn_fails() {
    init_tracing();
    let (bank, _script) = MockBank::new("DLG-SYNC");
    let mut client = client(bank, false);
    assert!(matches!(
        client.synchronize(),
        Err(Error::Dialog(DialogError::MissingSegment("HISYN")))
    ));
}

// ==================== Touchdown pagination ====================

#[test]
fn touchdowns_are_followed_until_the_last_page() {
    init_tracing();
    let (bank, script) = MockBank::new("DLG-1");
    let mut client = client(bank, false);
    let reg = registry_of(&client);
    let mut dialog = client.dialog();
    dialog.init(vec![]).unwrap();
    {
        let mut script = script.lock().unwrap();
        script.reply("HIRMS:2:2:3+3040::Es liegen weitere Informationen vor.:TD-1'HIKAZ:3:7:3+@6@page-1'");
        script.reply("HIRMS:2:2:3+3040::Es liegen weitere Informationen vor.:TD-2'HIKAZ:3:7:3+@6@page-2'");
        script.reply("HIRMS:2:2:3+0020::Auftrag ausgefuehrt.'HIKAZ:3:7:3+@6@page-3'");
    }

    let pages = dialog
        .fetch_with_touchdowns("HIKAZ", |touchdown| transactions_request(&reg, touchdown))
        .unwrap();
    let statements: Vec<_> = pages
        .iter()
        .filter_map(|s| s.get("statement_booked").ok().flatten())
        .filter_map(|v| v.as_bytes())
        .collect();
    assert_eq!(statements, [&b"page-1"[..], b"page-2", b"page-3"]);

    let script = script.lock().unwrap();
    let touchdowns: Vec<_> = script.requests()[1..]
        .iter()
        .map(|m| {
            m.find_segment_first("HKKAZ")
                .and_then(|s| s.text("touchdown_point"))
                .map(str::to_string)
        })
        .collect();
    assert_eq!(touchdowns, [None, Some("TD-1".to_string()), Some("TD-2".to_string())]);
}

#[test]
fn repeated_touchdown_stops_pagination() {
    init_tracing();
    let (bank, script) = MockBank::new("DLG-1");
    let mut client = client(bank, false);
    let reg = registry_of(&client);
    let mut dialog = client.dialog();
    dialog.init(vec![]).unwrap();
    {
        let mut script = script.lock().unwrap();
        script.reply("HIRMS:2:2:3+3040::Weitere Daten.:TD-1'HIKAZ:3:7:3+@1@a'");
        script.reply("HIRMS:2:2:3+3040::Weitere Daten.:TD-1'HIKAZ:3:7:3+@1@b'");
    }
    let pages = dialog
        .fetch_with_touchdowns("HIKAZ", |touchdown| transactions_request(&reg, touchdown))
        .unwrap();
    assert_eq!(pages.len(), 2);
    assert_eq!(script.lock().unwrap().requests().len(), 3);
}

// ==================== Two-step TAN ====================

const TAN_REQUIRED: &str = "HIRMG:2:2+3060::Bitte beachten Sie die enthaltenen Warnungen/Hinweise.'\
                            HIRMS:3:2:3+0030::Auftrag empfangen - Sicherheitsfreigabe erforderlich.'\
                            HITAN:4:6:4+4++ref-77+Bitte TAN eingeben'";

#[test]
fn two_step_task_needs_a_tan() {
    init_tracing();
    let (bank, script) = MockBank::new("DLG-TAN");
    script.lock().unwrap().reply(
        "HIRMG:2:2+3060::Bitte beachten Sie die enthaltenen Warnungen/Hinweise.'\
         HIRMS:3:2:5+3920::Zugelassene Zwei-Schritt-Verfahren fuer den Benutzer.:942:944'",
    );
    let mut client = client(bank, true);
    let reg = registry_of(&client);
    let mut dialog = client.dialog();
    dialog.init(vec![]).unwrap();
    assert_eq!(dialog.client().allowed_security_functions(), ["942", "944"]);

    script.lock().unwrap().reply(TAN_REQUIRED);
    let challenge = match dialog.send_task(balance_request(&reg)).unwrap() {
        TaskOutcome::NeedTan(challenge) => challenge,
        TaskOutcome::Done(response) => panic!("expected a TAN challenge, got {:?}", response),
    };
    assert_eq!(challenge.segment_type, "HKSAL");
    assert_eq!(challenge.task_reference, "ref-77");
    assert_eq!(challenge.challenge.as_deref(), Some("Bitte TAN eingeben"));

    let response = dialog.submit_tan(&challenge, Password::new("654321")).unwrap();
    assert!(response.responses().iter().all(|r| r.is_success()));

    let script = script.lock().unwrap();
    let requests = script.requests();
    let init_tan = requests[0].find_segment_first("HKTAN").unwrap();
    assert_eq!(init_tan.text("tan_process"), Some("4"));
    assert_eq!(init_tan.text("segment_type"), Some("HKIDN"));
    assert_eq!(
        requests[0].find_segment_first("HNSHK").and_then(|s| s.text("security_function")),
        Some("942")
    );

    let task_tan = requests[1].find_segment_first("HKTAN").unwrap();
    assert_eq!(task_tan.text("segment_type"), Some("HKSAL"));

    let release = requests[2].find_segment_first("HKTAN").unwrap();
    assert_eq!(release.text("tan_process"), Some("2"));
    assert_eq!(release.text("task_reference"), Some("ref-77"));
    let signed = format!("{}:654321", PIN);
    let raw = &script.raw_requests()[2];
    assert!(raw.windows(signed.len()).any(|w| w == signed.as_bytes()));
}

#[test]
fn one_step_dialog_rejects_tans() {
    init_tracing();
    let (bank, _script) = MockBank::new("DLG-1");
    let mut client = client(bank, false);
    let mut dialog = client.dialog();
    dialog.init(vec![]).unwrap();
    let challenge = fints3::TanChallenge {
        segment_type: "HKSAL".to_string(),
        task_reference: "ref-1".to_string(),
        challenge: None,
        challenge_hhduc: None,
    };
    assert!(matches!(
        dialog.submit_tan(&challenge, Password::new("111111")),
        Err(Error::Dialog(DialogError::TanNotSupported))
    ));
}

const INIT_TAN_REQUIRED: &str = "HIRMG:2:2+3060::Bitte beachten Sie die enthaltenen Warnungen/Hinweise.'\
                                 HIRMS:3:2:5+0030::Auftrag empfangen - Sicherheitsfreigabe erforderlich.'\
                                 HITAN:4:6:5+4++ref-init+Bitte TAN eingeben'";

#[test]
fn lazy_init_held_for_a_tan_does_not_send_the_task() {
    init_tracing();
    let (bank, script) = MockBank::new("DLG-TAN");
    script.lock().unwrap().reply(INIT_TAN_REQUIRED);
    let mut client = client(bank, true);
    let reg = registry_of(&client);
    let mut dialog = client.dialog();

    let challenge = match dialog.send_task(balance_request(&reg)).unwrap() {
        TaskOutcome::NeedTan(challenge) => challenge,
        TaskOutcome::Done(response) => panic!("expected the init challenge, got {:?}", response),
    };
    assert_eq!(challenge.segment_type, "HKIDN");
    assert_eq!(challenge.task_reference, "ref-init");
    assert_eq!(script.lock().unwrap().requests().len(), 1);
    assert!(dialog.is_open());

    dialog.submit_tan(&challenge, Password::new("112233")).unwrap();
    let TaskOutcome::Done(_) = dialog.send_task(balance_request(&reg)).unwrap() else {
        panic!("task should run once the dialog is released");
    };

    let script = script.lock().unwrap();
    let requests = script.requests();
    assert_eq!(requests.len(), 3);
    let release = requests[1].find_segment_first("HKTAN").unwrap();
    assert_eq!(release.text("tan_process"), Some("2"));
    assert_eq!(release.text("task_reference"), Some("ref-init"));
    assert!(requests[2].find_segment_first("HKSAL").is_some());
}

#[test]
fn plain_send_reports_a_held_lazy_init() {
    init_tracing();
    let (bank, script) = MockBank::new("DLG-TAN");
    script.lock().unwrap().reply(INIT_TAN_REQUIRED);
    let mut client = client(bank, true);
    let reg = registry_of(&client);
    let mut dialog = client.dialog();

    match dialog.send(vec![balance_request(&reg)]) {
        Err(Error::Dialog(DialogError::TanRequired(challenge))) => {
            assert_eq!(challenge.task_reference, "ref-init");
        }
        other => panic!("expected a held init, got {:?}", other.map(|m| m.message_number())),
    }
    assert_eq!(script.lock().unwrap().requests().len(), 1);
}

#[test]
fn tan_is_only_accepted_on_an_open_dialog() {
    init_tracing();
    let (bank, script) = MockBank::new("DLG-TAN");
    let mut client = client(bank, true);
    let mut dialog = client.dialog();
    let challenge = fints3::TanChallenge {
        segment_type: "HKSAL".to_string(),
        task_reference: "ref-77".to_string(),
        challenge: None,
        challenge_hhduc: None,
    };
    assert!(matches!(
        dialog.submit_tan(&challenge, Password::new("654321")),
        Err(Error::Dialog(DialogError::NotOpen))
    ));
    assert!(script.lock().unwrap().requests().is_empty());

    // The rejected TAN is not carried into the init message.
    dialog.init(vec![]).unwrap();
    let script = script.lock().unwrap();
    let signed = format!("{}:654321", PIN);
    let raw = &script.raw_requests()[0];
    assert!(!raw.windows(signed.len()).any(|w| w == signed.as_bytes()));
}

#[test]
fn failed_release_does_not_carry_the_tan_forward() {
    init_tracing();
    let (bank, script) = MockBank::new("DLG-TAN");
    let mut client = client(bank, true);
    let reg = registry_of(&client);
    let mut dialog = client.dialog();
    dialog.init(vec![]).unwrap();
    script.lock().unwrap().reply(TAN_REQUIRED);
    let TaskOutcome::NeedTan(challenge) = dialog.send_task(balance_request(&reg)).unwrap() else {
        panic!("expected a TAN challenge");
    };

    // An institute number out of sequence fails the release exchange.
    script.lock().unwrap().institute_number = 9;
    assert!(matches!(
        dialog.submit_tan(&challenge, Password::new("654321")),
        Err(Error::Dialog(DialogError::UnexpectedMessageNumber { expected: 3, got: Some(9) }))
    ));
    assert!(dialog.is_open());
    let sent = script.lock().unwrap().raw_requests().len();
    let signed = format!("{}:654321", PIN);
    assert!(script.lock().unwrap().raw_requests()[sent - 1]
        .windows(signed.len())
        .any(|w| w == signed.as_bytes()));

    // The next message is signed with the PIN alone.
    let _ = dialog.send(vec![balance_request(&reg)]);
    let script = script.lock().unwrap();
    let raw = &script.raw_requests()[sent];
    assert!(!raw.windows(signed.len()).any(|w| w == signed.as_bytes()));
}

// ==================== Secrets ====================

#[test]
fn journal_and_dumps_never_contain_secrets() {
    init_tracing();
    let (bank, script) = MockBank::new("DLG-TAN");
    let mut client = client(bank, true);
    let reg = registry_of(&client);
    let mut dialog = client.dialog();
    dialog.init(vec![]).unwrap();
    script.lock().unwrap().reply(TAN_REQUIRED);
    let TaskOutcome::NeedTan(challenge) = dialog.send_task(balance_request(&reg)).unwrap() else {
        panic!("expected a TAN challenge");
    };
    dialog.submit_tan(&challenge, Password::new("654321")).unwrap();

    // The secrets did go over the wire.
    let raw = script.lock().unwrap().raw_requests()[2].clone();
    assert!(raw.windows(PIN.len()).any(|w| w == PIN.as_bytes()));

    for (_, message) in dialog.journal(Direction::Customer) {
        let rendered = message.render().unwrap();
        assert!(!rendered.windows(PIN.len()).any(|w| w == PIN.as_bytes()));
        assert!(!rendered.windows(6).any(|w| w == b"654321"));
        let dump = format_message(message);
        assert!(!dump.contains(PIN));
        assert!(!dump.contains("654321"));
    }
    let debug = format!("{:?} {:?}", dialog, dialog.client());
    assert!(!debug.contains(PIN));
}

// ==================== Pause and resume ====================

#[test]
fn pause_and_resume_through_a_file() {
    init_tracing();
    let (bank, script) = MockBank::new("DLG-P");
    let mut client = client(bank, false);
    let reg = registry_of(&client);

    let mut dialog = client.dialog();
    dialog.init(vec![]).unwrap();
    dialog.send(vec![balance_request(&reg)]).unwrap();
    let blob = dialog.pause().unwrap();
    assert!(dialog.is_paused());
    assert!(matches!(dialog.send(vec![]), Err(Error::Dialog(DialogError::Paused))));
    assert!(matches!(dialog.end(), Err(Error::Dialog(DialogError::Paused))));
    assert!(matches!(dialog.pause(), Err(Error::Dialog(DialogError::Paused))));
    let dialog_id = dialog.dialog_id().to_string();
    let customer = dialog.next_message_number(Direction::Customer);
    let institute = dialog.next_message_number(Direction::Institute);
    drop(dialog);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&blob).unwrap();
    file.flush().unwrap();
    let stored = std::fs::read(file.path()).unwrap();

    let mut resumed = Dialog::resume(&mut client, &stored).unwrap();
    assert_eq!(resumed.dialog_id(), dialog_id);
    assert_eq!(resumed.next_message_number(Direction::Customer), customer);
    assert_eq!(resumed.next_message_number(Direction::Institute), institute);
    assert_eq!(resumed.state(), DialogState::Open);
    assert_eq!(resumed.journal(Direction::Customer).count(), 2);
    assert!(resumed.last_sent().unwrap().find_segment_first("HKSAL").is_some());

    resumed.send(vec![balance_request(&reg)]).unwrap();
    resumed.end().unwrap();
    let numbers: Vec<_> = script
        .lock()
        .unwrap()
        .requests()
        .iter()
        .map(|m| m.message_number())
        .collect();
    assert_eq!(numbers, [Some(1), Some(2), Some(3), Some(4)]);
}

#[test]
fn pause_blob_holds_no_secrets() {
    init_tracing();
    let (bank, _script) = MockBank::new("DLG-P");
    let mut client = client(bank, false);
    let mut dialog = client.dialog();
    dialog.init(vec![]).unwrap();
    let blob = dialog.pause().unwrap();

    let json: serde_json::Value = serde_json::from_slice(&blob).unwrap();
    assert_eq!(json["magic"], "fints3-dialog");
    assert_eq!(json["version"], BLOB_VERSION);
    assert_eq!(json["fields"]["client"]["$backref"], "client");
    assert_eq!(json["fields"]["auths"][0]["mechanism"], "pin_tan_one_step");
    let messages = json["fields"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    for entry in messages {
        let data = STANDARD.decode(entry["data"].as_str().unwrap()).unwrap();
        assert!(!data.windows(PIN.len()).any(|w| w == PIN.as_bytes()));
    }
    assert!(!String::from_utf8_lossy(&blob).contains(PIN));
}

#[test]
fn unknown_blob_version_is_rejected() {
    init_tracing();
    let (bank, _script) = MockBank::new("DLG-P");
    let mut client = client(bank, false);
    let mut dialog = client.dialog();
    dialog.init(vec![]).unwrap();
    let blob = dialog.pause().unwrap();
    drop(dialog);

    let mut json: serde_json::Value = serde_json::from_slice(&blob).unwrap();
    json["version"] = serde_json::json!(BLOB_VERSION + 1);
    let tampered = serde_json::to_vec(&json).unwrap();
    assert!(matches!(
        Dialog::resume(&mut client, &tampered),
        Err(Error::Dialog(DialogError::UnsupportedBlobVersion(v))) if v == BLOB_VERSION + 1
    ));
    assert!(matches!(
        Dialog::resume(&mut client, b"not json"),
        Err(Error::Dialog(DialogError::Blob(_)))
    ));
}
