//! Core data structures for the code graph

use serde::{Deserialize, Serialize};

/// Discriminates what kind of entity a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeLabel {
    Folder,
    File,
    Class,
    Function,
    Deleted,
}

impl NodeLabel {
    /// Label string used at the export boundary.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::Folder => "FOLDER",
            NodeLabel::File => "FILE",
            NodeLabel::Class => "CLASS",
            NodeLabel::Function => "FUNCTION",
            NodeLabel::Deleted => "DELETED",
        }
    }

    /// Class-like or function-like symbols extracted from source.
    pub fn is_definition(&self) -> bool {
        matches!(self, NodeLabel::Class | NodeLabel::Function)
    }
}

/// What kind of relationship an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipType {
    // ── Code hierarchy ──────────────────────────────────────
    Contains,
    FunctionDefinition,
    ClassDefinition,

    // ── Code references ─────────────────────────────────────
    Imports,
    Calls,
    Inherits,
    Instantiates,
    Types,
    Assigns,
    Uses,

    // ── Code diff ───────────────────────────────────────────
    Modified,
    Added,
    Deleted,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Contains => "CONTAINS",
            RelationshipType::FunctionDefinition => "FUNCTION_DEFINITION",
            RelationshipType::ClassDefinition => "CLASS_DEFINITION",
            RelationshipType::Imports => "IMPORTS",
            RelationshipType::Calls => "CALLS",
            RelationshipType::Inherits => "INHERITS",
            RelationshipType::Instantiates => "INSTANTIATES",
            RelationshipType::Types => "TYPES",
            RelationshipType::Assigns => "ASSIGNS",
            RelationshipType::Uses => "USES",
            RelationshipType::Modified => "MODIFIED",
            RelationshipType::Added => "ADDED",
            RelationshipType::Deleted => "DELETED",
        }
    }

    /// Hierarchy edges are owned by parent nodes; everything else lives in
    /// the reference-edge collection.
    pub fn is_hierarchy(&self) -> bool {
        matches!(
            self,
            RelationshipType::Contains
                | RelationshipType::FunctionDefinition
                | RelationshipType::ClassDefinition
        )
    }

    /// The hierarchy edge kind that attaches a definition to its parent.
    pub fn definition_edge_for(label: NodeLabel) -> Option<RelationshipType> {
        match label {
            NodeLabel::Class => Some(RelationshipType::ClassDefinition),
            NodeLabel::Function => Some(RelationshipType::FunctionDefinition),
            _ => None,
        }
    }
}

/// A zero-based source position. `character` counts UTF-16 code units,
/// matching the LSP convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub line: u32,
    pub character: u32,
}

impl Point {
    pub fn new(line: u32, character: u32) -> Self {
        Point { line, character }
    }
}

/// A source span carrying both byte offsets (for tree lookups) and
/// line/character points (for the LSP boundary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start: Point,
    pub end: Point,
}

impl Span {
    pub fn contains(&self, other: &Span) -> bool {
        self.start_byte <= other.start_byte && other.end_byte <= self.end_byte
    }

    pub fn contains_bytes(&self, start_byte: usize, end_byte: usize) -> bool {
        self.start_byte <= start_byte && end_byte <= self.end_byte
    }

    pub fn len(&self) -> usize {
        self.end_byte.saturating_sub(self.start_byte)
    }

    pub fn is_empty(&self) -> bool {
        self.end_byte <= self.start_byte
    }
}

/// A non-owning reference into a parsed syntax tree: the owning file's URI
/// plus the node's byte range. Only meaningful while the extraction context
/// retains the file's tree; never serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxHandle {
    pub uri: String,
    pub span: Span,
}

impl SyntaxHandle {
    pub fn new(uri: impl Into<String>, span: Span) -> Self {
        SyntaxHandle {
            uri: uri.into(),
            span,
        }
    }
}

/// Nesting statistics for a function body, derived from the language's
/// control-flow grammar types.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NestingStats {
    pub max_indentation: u32,
    pub min_indentation: u32,
    pub average_indentation: f64,
    pub sd: f64,
}

/// Complexity attributes attached to FUNCTION definitions at extraction
/// time and flattened into the export object.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FunctionStats {
    pub parameter_count: u32,
    pub nesting: NestingStats,
}
