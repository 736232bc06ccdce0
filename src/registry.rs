//! Resolved (type, version) to segment schema registry with a generic fallback.
//!
//! Catalogue sources are parsed into AST by [`crate::catalogue`] and resolved here once:
//! group references are linked, kind tags mapped to [`FieldKind`]s and every segment gets
//! the implicit `header` field. Lookups after that never fail; a (type, version) pair
//! without a definition resolves to the generic schema, which only knows the header.

use crate::ast::{Catalogue, CountSpec, FieldSpec, GroupSection, LengthSpec};
use crate::catalogue;
use crate::container::Segment;
use crate::error::SchemaError;
use crate::field::{Count, FieldKind, Length};
use crate::schema::{ContainerSchema, FieldDef, FieldType, SegmentSchema};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

/// Name of the group every segment starts with.
pub const HEADER_GROUP: &str = "SegmentHeader";
/// Name of the implicit first field of every segment.
pub const HEADER_FIELD: &str = "header";

#[derive(Debug)]
pub struct Registry {
    groups: HashMap<String, Arc<ContainerSchema>>,
    segments: HashMap<(String, u32), Vec<Arc<SegmentSchema>>>,
    header: Arc<ContainerSchema>,
    generic: Arc<SegmentSchema>,
}

impl Registry {
    /// Registry of the built-in FinTS 3.0 catalogue, resolved once per process.
    pub fn builtin() -> Arc<Registry> {
        static BUILTIN: OnceLock<Arc<Registry>> = OnceLock::new();
        BUILTIN
            .get_or_init(|| {
                let registry = RegistryBuilder::new()
                    .with_builtin()
                    .and_then(RegistryBuilder::build)
                    .expect("built-in catalogue resolves");
                Arc::new(registry)
            })
            .clone()
    }

    /// Registry built from a single catalogue source. The source must define `SegmentHeader`.
    pub fn from_source(source: &str) -> Result<Registry, SchemaError> {
        RegistryBuilder::new().source(source)?.build()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Most specific definition for (kind, version): most declared fields, later
    /// registration on a tie.
    pub fn lookup(&self, kind: &str, version: u32) -> Option<Arc<SegmentSchema>> {
        let candidates = self.segments.get(&(kind.to_string(), version))?;
        let mut best: Option<&Arc<SegmentSchema>> = None;
        for candidate in candidates {
            match best {
                Some(b) if b.declared_fields() > candidate.declared_fields() => {}
                _ => best = Some(candidate),
            }
        }
        best.cloned()
    }

    /// Like [`Registry::lookup`] but falls back to the generic schema.
    pub fn resolve(&self, kind: &str, version: u32) -> Arc<SegmentSchema> {
        self.lookup(kind, version)
            .unwrap_or_else(|| self.generic.clone())
    }

    pub fn group(&self, name: &str) -> Option<Arc<ContainerSchema>> {
        self.groups.get(name).cloned()
    }

    pub fn header(&self) -> &Arc<ContainerSchema> {
        &self.header
    }

    pub fn generic(&self) -> &Arc<SegmentSchema> {
        &self.generic
    }

    /// Fresh, unnumbered segment of a defined type with its header type and version set.
    pub fn new_segment(&self, kind: &str, version: u32) -> Result<Segment, SchemaError> {
        let schema = self
            .lookup(kind, version)
            .ok_or_else(|| SchemaError::UnknownSegment {
                kind: kind.to_string(),
                version,
            })?;
        Ok(Segment::new(schema))
    }

    /// Defined segment names (`HKIDN2`, ...), sorted.
    pub fn segment_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .segments
            .keys()
            .map(|(kind, version)| format!("{}{}", kind, version))
            .collect();
        names.sort();
        names
    }
}

/// Collects catalogue sources and resolves them into a [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    catalogues: Vec<Catalogue>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        RegistryBuilder::default()
    }

    pub fn with_builtin(self) -> Result<Self, SchemaError> {
        self.source(catalogue::BUILTIN)
    }

    pub fn source(mut self, source: &str) -> Result<Self, SchemaError> {
        self.catalogues.push(catalogue::parse(source)?);
        Ok(self)
    }

    pub fn build(self) -> Result<Registry, SchemaError> {
        let mut sections: HashMap<&str, &GroupSection> = HashMap::new();
        for group in self.catalogues.iter().flat_map(|c| &c.groups) {
            if sections.insert(&group.name, group).is_some() {
                return Err(SchemaError::Resolve {
                    line: group.line,
                    reason: format!("duplicate group {}", group.name),
                });
            }
        }

        let mut resolver = GroupResolver {
            sections,
            resolved: HashMap::new(),
            visiting: HashSet::new(),
        };
        let names: Vec<String> = resolver.sections.keys().map(|n| n.to_string()).collect();
        for name in &names {
            resolver.resolve(name, 0)?;
        }
        let header = resolver.resolve(HEADER_GROUP, 0)?;

        let mut segments: HashMap<(String, u32), Vec<Arc<SegmentSchema>>> = HashMap::new();
        for section in self.catalogues.iter().flat_map(|c| &c.segments) {
            let mut fields = vec![FieldDef::group(HEADER_FIELD, header.clone())];
            for spec in &section.fields {
                fields.push(resolver.field(spec)?);
            }
            check_unique(&fields, section.line)?;
            let schema = SegmentSchema {
                kind: section.kind.clone(),
                version: section.version,
                body: Arc::new(ContainerSchema::new(section.name(), fields)),
                generic: false,
            };
            segments
                .entry((section.kind.clone(), section.version))
                .or_default()
                .push(Arc::new(schema));
        }

        let generic = Arc::new(SegmentSchema {
            kind: String::new(),
            version: 0,
            body: Arc::new(ContainerSchema::new(
                "GenericSegment",
                vec![FieldDef::group(HEADER_FIELD, header.clone())],
            )),
            generic: true,
        });

        Ok(Registry {
            groups: resolver.resolved,
            segments,
            header,
            generic,
        })
    }
}

struct GroupResolver<'a> {
    sections: HashMap<&'a str, &'a GroupSection>,
    resolved: HashMap<String, Arc<ContainerSchema>>,
    visiting: HashSet<String>,
}

impl GroupResolver<'_> {
    fn resolve(&mut self, name: &str, line: usize) -> Result<Arc<ContainerSchema>, SchemaError> {
        if let Some(schema) = self.resolved.get(name) {
            return Ok(schema.clone());
        }
        let section = *self.sections.get(name).ok_or_else(|| SchemaError::Resolve {
            line,
            reason: format!("unknown group {}", name),
        })?;
        if !self.visiting.insert(name.to_string()) {
            return Err(SchemaError::Resolve {
                line: section.line,
                reason: format!("group {} contains itself", name),
            });
        }
        let mut fields = Vec::with_capacity(section.fields.len());
        for spec in &section.fields {
            fields.push(self.field(spec)?);
        }
        check_unique(&fields, section.line)?;
        self.visiting.remove(name);
        let schema = Arc::new(ContainerSchema::new(name, fields));
        self.resolved.insert(name.to_string(), schema.clone());
        Ok(schema)
    }

    fn field(&mut self, spec: &FieldSpec) -> Result<FieldDef, SchemaError> {
        let err = |reason: String| SchemaError::Resolve {
            line: spec.line,
            reason,
        };
        let mut def = match FieldKind::from_tag(&spec.type_name) {
            Some(kind) => {
                let mut def = FieldDef::scalar(&spec.name, kind);
                if let Some(length) = spec.length {
                    def.length = resolve_length(length);
                }
                def
            }
            None => {
                if spec.length.is_some() {
                    return Err(err(format!("group field {} cannot declare a length", spec.name)));
                }
                FieldDef::group(&spec.name, self.resolve(&spec.type_name, spec.line)?)
            }
        };
        if spec.codes.is_some() && matches!(def.ty, FieldType::Group(_)) {
            return Err(err(format!("group field {} cannot declare codes", spec.name)));
        }
        def.codes = spec.codes.clone();
        def.required = !spec.optional;
        if let Some(count) = spec.count {
            def.count = match count {
                CountSpec::Exact(0) => {
                    return Err(err(format!("field {} has a count of zero", spec.name)))
                }
                CountSpec::Exact(n) => Count::Exact(n),
                CountSpec::Range(min, max) => Count::Bounds {
                    min: min.unwrap_or(0),
                    max,
                },
            };
        }
        Ok(def)
    }
}

fn resolve_length(spec: LengthSpec) -> Length {
    match spec {
        LengthSpec::Exact(n) => Length::Exact(n),
        LengthSpec::Max(n) => Length::Bounds { min: None, max: Some(n) },
        LengthSpec::Min(n) => Length::Bounds { min: Some(n), max: None },
        LengthSpec::Range(lo, hi) => Length::Bounds {
            min: Some(lo),
            max: Some(hi),
        },
    }
}

fn check_unique(fields: &[FieldDef], line: usize) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert(field.name.as_str()) {
            return Err(SchemaError::Resolve {
                line,
                reason: format!("duplicate field {}", field.name),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "group SegmentHeader {\n\ttype: an(max 6);\n\tnumber: num(max 3);\n\tversion: num(max 3);\n\treference: num(max 3)?;\n}\n";

    #[test]
    fn builtin_resolves_envelope_segments() {
        let reg = Registry::builtin();
        for (kind, version) in [("HNHBK", 3), ("HNVSK", 3), ("HNVSD", 1), ("HNSHK", 4), ("HNSHA", 2)] {
            let schema = reg.lookup(kind, version).unwrap();
            assert!(!schema.generic);
            assert_eq!(schema.body.fields[0].name, HEADER_FIELD);
        }
        assert!(reg.segment_names().contains(&"HKTAN6".to_string()));
    }

    #[test]
    fn unknown_pair_resolves_to_generic() {
        let reg = Registry::builtin();
        assert!(reg.lookup("HKXYZ", 9).is_none());
        assert!(reg.resolve("HKXYZ", 9).generic);
        assert!(matches!(
            reg.new_segment("HKXYZ", 9),
            Err(SchemaError::UnknownSegment { .. })
        ));
    }

    #[test]
    fn most_fields_wins_and_later_wins_ties() {
        let src = format!(
            "{}segment HKTST1 {{ a: an; b: an?; }}\nsegment HKTST1 {{ a: an; }}\nsegment HKTST1 {{ x: an; y: num?; }}\n",
            HEADER
        );
        let reg = Registry::from_source(&src).unwrap();
        let schema = reg.lookup("HKTST", 1).unwrap();
        assert_eq!(schema.body.fields[1].name, "x");
    }

    #[test]
    fn recursive_groups_are_rejected() {
        let src = format!("{}group A {{ b: B; }}\ngroup B {{ a: A?; }}\n", HEADER);
        let err = Registry::from_source(&src).unwrap_err();
        assert!(err.to_string().contains("contains itself"));
    }

    #[test]
    fn unknown_group_reference_is_rejected() {
        let src = format!("{}segment HKTST1 {{ a: Missing; }}\n", HEADER);
        assert!(matches!(
            Registry::from_source(&src),
            Err(SchemaError::Resolve { line: 7, .. })
        ));
    }

    #[test]
    fn missing_header_group_is_rejected() {
        assert!(Registry::from_source("segment HKTST1 { a: an; }").is_err());
    }

    #[test]
    fn extension_sources_add_segments() {
        let reg = Registry::builder()
            .with_builtin()
            .and_then(|b| b.source("segment HKTST1 { account: KTI1; }"))
            .and_then(RegistryBuilder::build)
            .unwrap();
        let seg = reg.new_segment("HKTST", 1).unwrap();
        assert_eq!(seg.kind(), "HKTST");
        assert!(reg.lookup("HNHBK", 3).is_some());
    }
}
