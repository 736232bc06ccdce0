//! Linter for segment catalogue sources: layout and semantic rules.
//!
//! ## Layout rules
//!
//! - **Indentation**: exactly one tab per depth level (no spaces). Depth increases after `{`, decreases after `}`.
//! - **One field per line**: at most one `;` per line.
//! - **Closing brace alone**: a line containing `}` must not also contain a field.
//! - **No trailing whitespace**.
//!
//! ## Semantic rules
//!
//! - **Segment version**: segment names carry the version as numeric suffix (`HKIDN2`).
//! - **Unknown type**: a field type is neither a kind tag nor a group of the same source.
//! - **Duplicate definition**: a group or segment is defined twice in one source.
//! - **Unbounded repeat not last**: a repeated field without upper bound swallows every
//!   following cell, so it must be the last field of its container.
//!
//! Run via the `lint_schema` binary: `lint_schema file.schema` or `lint_schema < file.schema`.
//! Exit code 1 if any error-level findings.

use crate::ast::{Catalogue, CountSpec, FieldSpec};
use crate::catalogue;
use crate::field::FieldKind;
use crate::registry::HEADER_GROUP;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintRule {
    IndentationTabsOnly,
    IndentationDepth,
    OneFieldPerLine,
    ClosingBraceAlone,
    NoTrailingWhitespace,
    SegmentVersionMissing,
    UnknownType,
    DuplicateDefinition,
    UnboundedRepeatNotLast,
    /// The source does not parse; semantic rules were skipped.
    Syntax,
}

#[derive(Debug, Clone)]
pub struct LintMessage {
    pub line: usize,
    pub column: usize,
    pub rule: LintRule,
    pub severity: Severity,
    pub message: String,
}

impl LintMessage {
    fn error(line: usize, rule: LintRule, message: impl Into<String>) -> Self {
        LintMessage {
            line,
            column: 1,
            rule,
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

fn strip_comment(s: &str) -> &str {
    let end = [s.find("//"), s.find('#')].into_iter().flatten().min();
    match end {
        Some(i) => s[..i].trim_end(),
        None => s,
    }
}

fn brace_delta(content: &str) -> i32 {
    content.chars().fold(0, |d, c| match c {
        '{' => d + 1,
        '}' => d - 1,
        _ => d,
    })
}

/// Run all rules. Layout findings come first, in line order, then semantic findings.
pub fn lint(source: &str) -> Vec<LintMessage> {
    let mut out = lint_layout(source);
    out.extend(lint_semantics(source));
    out
}

fn lint_layout(source: &str) -> Vec<LintMessage> {
    let mut out = Vec::new();
    let mut depth: i32 = 0;

    for (i, line) in source.lines().enumerate() {
        let line_no = i + 1;

        if line != line.trim_end() {
            out.push(LintMessage {
                line: line_no,
                column: line.trim_end().len() + 1,
                rule: LintRule::NoTrailingWhitespace,
                severity: Severity::Warning,
                message: "trailing whitespace not allowed".to_string(),
            });
        }

        let trimmed = line.trim_start();
        let leading = &line[..line.len() - trimmed.len()];
        if leading.contains(' ') {
            out.push(LintMessage::error(
                line_no,
                LintRule::IndentationTabsOnly,
                "indentation must use tabs only (no spaces)",
            ));
        }

        let content = strip_comment(trimmed);
        if !content.is_empty() {
            // A closing brace sits one level out.
            let expected = if content.starts_with('}') { depth - 1 } else { depth }.max(0) as usize;
            let tabs = leading.chars().filter(|&c| c == '\t').count();
            if tabs != expected {
                out.push(LintMessage::error(
                    line_no,
                    LintRule::IndentationDepth,
                    format!("expected {} tab(s) (found {})", expected, tabs),
                ));
            }
        }

        let semicolons = content.matches(';').count();
        if semicolons > 1 {
            out.push(LintMessage::error(
                line_no,
                LintRule::OneFieldPerLine,
                format!("one field per line (found {} semicolons)", semicolons),
            ));
        }
        if content.contains('}') && content.contains(';') {
            out.push(LintMessage {
                line: line_no,
                column: 1,
                rule: LintRule::ClosingBraceAlone,
                severity: Severity::Warning,
                message: "closing `}` should be the only content on its line".to_string(),
            });
        }
        depth += brace_delta(content);
    }
    out
}

fn lint_semantics(source: &str) -> Vec<LintMessage> {
    let mut out = Vec::new();
    for (i, line) in source.lines().enumerate() {
        let content = strip_comment(line.trim());
        if let Some(rest) = content.strip_prefix("segment ") {
            let name = rest.trim_end_matches('{').trim();
            if !name.ends_with(|c: char| c.is_ascii_digit()) {
                out.push(LintMessage::error(
                    i + 1,
                    LintRule::SegmentVersionMissing,
                    format!("segment {} has no version suffix", name),
                ));
            }
        }
    }
    if !out.is_empty() {
        return out;
    }
    match catalogue::parse(source) {
        Ok(catalogue) => check_catalogue(&catalogue, &mut out),
        Err(e) => out.push(LintMessage::error(1, LintRule::Syntax, e.to_string())),
    }
    out
}

fn check_catalogue(catalogue: &Catalogue, out: &mut Vec<LintMessage>) {
    let mut groups = HashSet::new();
    for group in &catalogue.groups {
        if !groups.insert(group.name.as_str()) {
            out.push(LintMessage::error(
                group.line,
                LintRule::DuplicateDefinition,
                format!("group {} is defined twice", group.name),
            ));
        }
    }
    let mut segments = HashSet::new();
    for segment in &catalogue.segments {
        if !segments.insert(segment.name()) {
            out.push(LintMessage::error(
                segment.line,
                LintRule::DuplicateDefinition,
                format!("segment {} is defined twice", segment.name()),
            ));
        }
    }

    let containers = catalogue
        .groups
        .iter()
        .map(|g| (g.name.clone(), &g.fields))
        .chain(catalogue.segments.iter().map(|s| (s.name(), &s.fields)));
    for (name, fields) in containers {
        check_fields(&name, fields, &groups, out);
    }
}

fn check_fields(container: &str, fields: &[FieldSpec], groups: &HashSet<&str>, out: &mut Vec<LintMessage>) {
    for (i, field) in fields.iter().enumerate() {
        let known = FieldKind::from_tag(&field.type_name).is_some()
            || groups.contains(field.type_name.as_str())
            || field.type_name == HEADER_GROUP;
        if !known {
            out.push(LintMessage::error(
                field.line,
                LintRule::UnknownType,
                format!("{}.{}: unknown type {}", container, field.name, field.type_name),
            ));
        }
        let unbounded = matches!(field.count, Some(CountSpec::Range(_, None)));
        if unbounded && i + 1 < fields.len() {
            out.push(LintMessage {
                line: field.line,
                column: 1,
                rule: LintRule::UnboundedRepeatNotLast,
                severity: Severity::Warning,
                message: format!(
                    "{}.{}: unbounded repeated field is followed by {}",
                    container,
                    field.name,
                    fields[i + 1].name
                ),
            });
        }
    }
}

fn push_indented(depth: i32, text: &str, out: &mut Vec<String>) {
    let level = if text.starts_with('}') { depth - 1 } else { depth }.max(0) as usize;
    out.push(format!("{}{}", "\t".repeat(level), text));
}

/// Re-indent with tabs by depth, put every field and brace on its own line and strip
/// trailing whitespace.
pub fn lint_fix(source: &str) -> String {
    let mut depth: i32 = 0;
    let mut out_lines: Vec<String> = Vec::new();
    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            out_lines.push(String::new());
            continue;
        }
        let content = strip_comment(trimmed);
        if content.is_empty() {
            push_indented(depth, trimmed, &mut out_lines);
            continue;
        }
        let comment = trimmed[content.len()..].trim();
        let first = out_lines.len();
        let mut rest = content;
        while !rest.is_empty() {
            let cut = rest
                .find(|c| matches!(c, ';' | '{' | '}'))
                .map(|i| if rest.as_bytes()[i] == b'}' { i.max(1) } else { i + 1 })
                .unwrap_or(rest.len());
            let (piece, tail) = rest.split_at(cut);
            let piece = piece.trim();
            if !piece.is_empty() {
                push_indented(depth, piece, &mut out_lines);
                depth += brace_delta(piece);
            }
            rest = tail.trim_start();
        }
        if !comment.is_empty() && out_lines.len() > first {
            if let Some(last) = out_lines.last_mut() {
                last.push(' ');
                last.push_str(comment);
            }
        }
    }
    out_lines.join("\n") + "\n"
}
