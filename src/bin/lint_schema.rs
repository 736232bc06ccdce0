//! Lint segment catalogue files: one tab per depth, one field per line, versioned segment
//! names, known field types, etc.
//!
//! Usage:
//!   lint_schema [OPTIONS] [FILE.schema ...]
//!   lint_schema < file.schema
//!
//! When given file(s), the linter rewrites them to satisfy the layout rules (fix), then
//! reports any remaining issues.
//!
//! Options:
//!   --fix, -f    With stdin: print fixed source to stdout.
//!   --human, -H  Human-readable output
//!
//! If no files are given, reads from stdin (lint only unless --fix).

use fints3::lint::{lint, lint_fix, LintMessage, LintRule, Severity};
use std::io::{self, Read, Write};
use std::path::Path;

fn rule_id(rule: LintRule) -> &'static str {
    match rule {
        LintRule::IndentationTabsOnly => "indentation-tabs-only",
        LintRule::IndentationDepth => "indentation-depth",
        LintRule::OneFieldPerLine => "one-field-per-line",
        LintRule::ClosingBraceAlone => "closing-brace-alone",
        LintRule::NoTrailingWhitespace => "no-trailing-whitespace",
        LintRule::SegmentVersionMissing => "segment-version-missing",
        LintRule::UnknownType => "unknown-type",
        LintRule::DuplicateDefinition => "duplicate-definition",
        LintRule::UnboundedRepeatNotLast => "unbounded-repeat-not-last",
        LintRule::Syntax => "syntax",
    }
}

#[derive(Clone, Copy)]
enum OutputStyle {
    Compact,
    Human,
}

fn print_message(path: &str, m: &LintMessage, style: OutputStyle) {
    let severity = match m.severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
    };
    match style {
        OutputStyle::Compact => println!(
            "{}:{}:{}: {}: {} [{}]",
            path,
            m.line,
            m.column,
            severity,
            m.message,
            rule_id(m.rule)
        ),
        OutputStyle::Human => {
            println!("  {} {}:{}: {}", path, m.line, m.column, m.message);
            println!("    rule: {}", rule_id(m.rule));
        }
    }
}

#[derive(Default)]
struct Totals {
    errors: usize,
    warnings: usize,
}

impl Totals {
    /// Print and count; returns true if any finding is an error.
    fn report(&mut self, path: &str, messages: &[LintMessage], style: OutputStyle) -> bool {
        for m in messages {
            match m.severity {
                Severity::Error => self.errors += 1,
                Severity::Warning => self.warnings += 1,
            }
            print_message(path, m, style);
        }
        messages.iter().any(|m| m.severity == Severity::Error)
    }
}

fn main() -> anyhow::Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let fix = match args.iter().position(|a| a == "--fix" || a == "-f") {
        Some(pos) => {
            args.remove(pos);
            true
        }
        None => false,
    };
    let style = match args.iter().position(|a| a == "--human" || a == "-H") {
        Some(pos) => {
            args.remove(pos);
            OutputStyle::Human
        }
        None => OutputStyle::Compact,
    };

    let mut has_error = false;
    let mut totals = Totals::default();

    if args.is_empty() {
        let mut src = String::new();
        io::stdin().read_to_string(&mut src)?;
        if fix {
            io::stdout().write_all(lint_fix(&src).as_bytes())?;
            return Ok(());
        }
        has_error |= totals.report("<stdin>", &lint(&src), style);
    } else {
        for path in &args {
            let path = Path::new(path);
            let src = match std::fs::read_to_string(path) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("{}: {}", path.display(), e);
                    has_error = true;
                    continue;
                }
            };
            let fixed = lint_fix(&src);
            if fixed != src {
                if let Err(e) = std::fs::write(path, &fixed) {
                    eprintln!("{}: write failed: {}", path.display(), e);
                    has_error = true;
                    continue;
                }
                eprintln!("{}: fixed", path.display());
            }
            has_error |= totals.report(&path.display().to_string(), &lint(&fixed), style);
        }
    }

    if totals.errors > 0 || totals.warnings > 0 {
        eprintln!("lint: {} error(s), {} warning(s)", totals.errors, totals.warnings);
    }
    if has_error {
        std::process::exit(1);
    }
    Ok(())
}
