//! Decode raw FinTS messages and dump them as an indented tree.
//!
//! Usage:
//!   decode_message [OPTIONS] [FILE ...]
//!   decode_message < message.bin
//!
//! Options:
//!   --strict, -s         Abort on the first segment that does not match its schema
//!   --base64, -b         Input is base64, as carried by the PIN/TAN HTTP transport
//!   --schema=FILE        Extra catalogue source layered on top of the built-in one
//!
//! Passwords are always printed as `***`. Set `RUST_LOG=debug` for parser logging.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use fints3::dump::format_message;
use fints3::{ParseMode, Parser, Registry};
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn take_flag(args: &mut Vec<String>, long: &str, short: &str) -> bool {
    match args.iter().position(|a| a == long || a == short) {
        Some(pos) => {
            args.remove(pos);
            true
        }
        None => false,
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let mode = if take_flag(&mut args, "--strict", "-s") {
        ParseMode::Strict
    } else {
        ParseMode::Lenient
    };
    let base64 = take_flag(&mut args, "--base64", "-b");
    let schema_path: Option<PathBuf> = args
        .iter()
        .position(|a| a.starts_with("--schema="))
        .map(|pos| PathBuf::from(&args.remove(pos)["--schema=".len()..]));

    let registry = match schema_path {
        Some(path) => {
            let source = std::fs::read_to_string(&path)?;
            Arc::new(Registry::builder().with_builtin()?.source(&source)?.build()?)
        }
        None => Registry::builtin(),
    };
    let parser = Parser::new(registry, mode);

    let inputs: Vec<(String, Vec<u8>)> = if args.is_empty() {
        let mut raw = Vec::new();
        io::stdin().read_to_end(&mut raw)?;
        vec![("<stdin>".to_string(), raw)]
    } else {
        args.iter()
            .map(|p| -> anyhow::Result<(String, Vec<u8>)> { Ok((p.clone(), std::fs::read(p)?)) })
            .collect::<anyhow::Result<_>>()?
    };

    let mut failed = false;
    for (name, raw) in inputs {
        let raw = if base64 {
            let text: Vec<u8> = raw.into_iter().filter(|b| !b.is_ascii_whitespace()).collect();
            STANDARD.decode(text)?
        } else {
            raw
        };
        match parser.parse_message(&raw) {
            Ok(message) => {
                println!("== {} ({} segments)", name, message.segments.len());
                print!("{}", format_message(&message));
            }
            Err(e) => {
                eprintln!("{}: {}", name, e);
                failed = true;
            }
        }
    }
    if failed {
        std::process::exit(1);
    }
    Ok(())
}
