//! Parse catalogue DSL source into AST using PEST.
//!
//! The built-in FinTS 3.0 catalogue ships as [`BUILTIN`]; additional sources can be
//! layered on top through [`RegistryBuilder`](crate::registry::RegistryBuilder).

use crate::ast::*;
use crate::error::SchemaError;
use pest::Parser;
use pest_derive::Parser as PestParser;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct CatalogueParser;

/// Segment and group definitions of the segments the core emits or interprets.
pub const BUILTIN: &str = include_str!("catalogue/fints3.schema");

type Pair<'i> = pest::iterators::Pair<'i, Rule>;

/// Parse catalogue source into AST.
pub fn parse(source: &str) -> Result<Catalogue, SchemaError> {
    let pairs = CatalogueParser::parse(Rule::catalogue, source)
        .map_err(|e| SchemaError::Syntax(format!("{}", e)))?;
    let pair = pairs
        .into_iter()
        .next()
        .ok_or_else(|| SchemaError::Syntax("empty parse".to_string()))?;
    build_catalogue(pair)
}

fn line_of(pair: &Pair<'_>) -> usize {
    pair.as_span().start_pos().line_col().0
}

fn syntax(pair: &Pair<'_>, reason: impl Into<String>) -> SchemaError {
    SchemaError::Resolve {
        line: line_of(pair),
        reason: reason.into(),
    }
}

fn build_catalogue(pair: Pair<'_>) -> Result<Catalogue, SchemaError> {
    let mut catalogue = Catalogue::default();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::group_section => catalogue.groups.push(build_group(inner)?),
            Rule::segment_section => catalogue.segments.push(build_segment(inner)?),
            _ => {}
        }
    }
    Ok(catalogue)
}

fn build_group(pair: Pair<'_>) -> Result<GroupSection, SchemaError> {
    let line = line_of(&pair);
    let mut name = String::new();
    let mut fields = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => name = inner.as_str().to_string(),
            Rule::field => fields.push(build_field(inner)?),
            _ => {}
        }
    }
    Ok(GroupSection { name, fields, line })
}

fn build_segment(pair: Pair<'_>) -> Result<SegmentSection, SchemaError> {
    let line = line_of(&pair);
    let mut kind = String::new();
    let mut version = 0;
    let mut fields = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::segment_name => {
                let text = inner.as_str();
                let split = text
                    .find(|c: char| c.is_ascii_digit())
                    .ok_or_else(|| syntax(&inner, "segment name without version"))?;
                kind = text[..split].to_string();
                version = text[split..]
                    .parse()
                    .map_err(|_| syntax(&inner, format!("bad segment version in {}", text)))?;
            }
            Rule::field => fields.push(build_field(inner)?),
            _ => {}
        }
    }
    Ok(SegmentSection {
        kind,
        version,
        fields,
        line,
    })
}

fn build_field(pair: Pair<'_>) -> Result<FieldSpec, SchemaError> {
    let line = line_of(&pair);
    let mut spec = FieldSpec {
        name: String::new(),
        type_name: String::new(),
        length: None,
        count: None,
        optional: false,
        codes: None,
        line,
    };
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => spec.name = inner.as_str().to_string(),
            Rule::type_name => spec.type_name = inner.as_str().to_string(),
            Rule::length_spec => spec.length = Some(build_length(inner)?),
            Rule::count_spec => spec.count = Some(build_count(inner)?),
            Rule::optional_marker => spec.optional = true,
            Rule::code_list => {
                spec.codes = Some(
                    inner
                        .into_inner()
                        .map(|s| s.as_str().trim_matches('"').to_string())
                        .collect(),
                )
            }
            _ => {}
        }
    }
    Ok(spec)
}

fn parse_num(pair: &Pair<'_>) -> Result<usize, SchemaError> {
    pair.as_str()
        .parse()
        .map_err(|_| syntax(pair, format!("number out of range: {}", pair.as_str())))
}

fn nums(pair: Pair<'_>) -> Result<Vec<usize>, SchemaError> {
    pair.into_inner().map(|p| parse_num(&p)).collect()
}

fn build_length(pair: Pair<'_>) -> Result<LengthSpec, SchemaError> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| SchemaError::Syntax("empty length".to_string()))?;
    let rule = inner.as_rule();
    let at = inner.clone();
    let n = nums(inner)?;
    let spec = match (rule, n.as_slice()) {
        (Rule::length_exact, [n]) => LengthSpec::Exact(*n),
        (Rule::length_max, [n]) => LengthSpec::Max(*n),
        (Rule::length_min, [n]) => LengthSpec::Min(*n),
        (Rule::length_range, [lo, hi]) if lo <= hi => LengthSpec::Range(*lo, *hi),
        (Rule::length_range, [lo, hi]) => {
            return Err(syntax(&at, format!("length range {}..{} is empty", lo, hi)))
        }
        _ => return Err(syntax(&at, "malformed length")),
    };
    Ok(spec)
}

fn build_count(pair: Pair<'_>) -> Result<CountSpec, SchemaError> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| SchemaError::Syntax("empty count".to_string()))?;
    match inner.as_rule() {
        Rule::count_exact => {
            let n = nums(inner.clone())?;
            match n.as_slice() {
                [n] => Ok(CountSpec::Exact(*n)),
                _ => Err(syntax(&inner, "malformed count")),
            }
        }
        Rule::count_range => {
            let at = inner.clone();
            let mut lower = None;
            let mut upper = None;
            for bound in inner.into_inner() {
                let value = bound
                    .clone()
                    .into_inner()
                    .next()
                    .map(|n| parse_num(&n))
                    .transpose()?;
                match bound.as_rule() {
                    Rule::count_lower => lower = value,
                    Rule::count_upper => upper = value,
                    _ => {}
                }
            }
            match (lower, upper) {
                (None, None) => Err(syntax(&at, "count range needs at least one bound")),
                (Some(lo), Some(hi)) if lo > hi => {
                    Err(syntax(&at, format!("count range {}..{} is empty", lo, hi)))
                }
                _ => Ok(CountSpec::Range(lower, upper)),
            }
        }
        _ => Err(syntax(&inner, "malformed count")),
    }
}
