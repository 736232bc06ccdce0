//! Wire fuzz target: feed arbitrary bytes to the message parser in both modes.
//! Parsing must not panic; any successfully parsed message must render again.
//! Build with: cargo fuzz run wire_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    for mode in [fints3::ParseMode::Lenient, fints3::ParseMode::Strict] {
        let parser = fints3::Parser::new(fints3::Registry::builtin(), mode);
        if let Ok(message) = parser.parse_message(data) {
            let _ = message.render();
        }
    }
    let _ = fints3::lint::lint(&String::from_utf8_lossy(data));
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run wire_fuzz");
}
