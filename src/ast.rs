//! Abstract Syntax Tree for the segment catalogue DSL.

/// Root of one catalogue source: data element groups and segments, in source order.
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    pub groups: Vec<GroupSection>,
    pub segments: Vec<SegmentSection>,
}

#[derive(Debug, Clone)]
pub struct GroupSection {
    pub name: String,
    pub fields: Vec<FieldSpec>,
    pub line: usize,
}

/// `segment HKIDN2 { ... }`: mnemonic and version split from the section name.
#[derive(Debug, Clone)]
pub struct SegmentSection {
    pub kind: String,
    pub version: u32,
    pub fields: Vec<FieldSpec>,
    pub line: usize,
}

impl SegmentSection {
    pub fn name(&self) -> String {
        format!("{}{}", self.kind, self.version)
    }
}

/// One `name: type (length) [count] ? in (...)` line.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    /// Kind tag (`an`, `num`, ...) or a group name.
    pub type_name: String,
    pub length: Option<LengthSpec>,
    pub count: Option<CountSpec>,
    pub optional: bool,
    pub codes: Option<Vec<String>>,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthSpec {
    Exact(usize),
    Max(usize),
    Min(usize),
    Range(usize, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountSpec {
    Exact(usize),
    Range(Option<usize>, Option<usize>),
}
