//! Syntax extractor — turns parsed files into hierarchy nodes

use std::collections::HashMap;

use tree_sitter::{Node, Tree};

use graft_core::{GraphEnvironment, GraphNode, NodeLabel, Point, RelationshipType, Span, SyntaxHandle};

use crate::complexity;
use crate::languages::{LanguageRegistry, LanguageRules};
use crate::walker::SourceFile;

/// Byte offsets of line starts, for converting between tree-sitter byte
/// columns and the LSP's UTF-16 columns. Identical for ASCII sources;
/// decisive for anything else.
pub struct LineIndex {
    offsets: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut offsets = vec![0];
        for (at, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                offsets.push(at + 1);
            }
        }
        LineIndex { offsets }
    }

    fn line_text<'s>(&self, source: &'s str, line: usize) -> &'s str {
        let start = self.offsets.get(line).copied().unwrap_or(source.len());
        let end = self
            .offsets
            .get(line + 1)
            .copied()
            .unwrap_or(source.len());
        &source[start..end]
    }

    /// Convert a tree-sitter point (byte column) into an LSP point.
    pub fn point_from_ts(&self, source: &str, point: tree_sitter::Point) -> Point {
        let line_text = self.line_text(source, point.row);
        let byte_col = point.column.min(line_text.len());
        Point::new(point.row as u32, byte_col_to_utf16(line_text, byte_col))
    }

    /// Convert an LSP point into a byte offset into `source`.
    pub fn byte_of(&self, source: &str, point: Point) -> usize {
        let line = point.line as usize;
        let start = self.offsets.get(line).copied().unwrap_or(source.len());
        let line_text = self.line_text(source, line);
        start + utf16_col_to_byte(line_text, point.character)
    }

    /// Convert an LSP point into a tree-sitter point (byte column).
    pub fn ts_point_of(&self, source: &str, point: Point) -> tree_sitter::Point {
        let line = point.line as usize;
        let line_text = self.line_text(source, line);
        tree_sitter::Point {
            row: line,
            column: utf16_col_to_byte(line_text, point.character),
        }
    }
}

/// UTF-16 code units before `byte_col` on this line.
pub fn byte_col_to_utf16(line_text: &str, byte_col: usize) -> u32 {
    let mut boundary = byte_col.min(line_text.len());
    while boundary > 0 && !line_text.is_char_boundary(boundary) {
        boundary -= 1;
    }
    line_text[..boundary].encode_utf16().count() as u32
}

/// Byte offset on this line after `utf16_col` code units.
pub fn utf16_col_to_byte(line_text: &str, utf16_col: u32) -> usize {
    let mut units = 0u32;
    for (offset, ch) in line_text.char_indices() {
        if units >= utf16_col {
            return offset;
        }
        units += ch.len_utf16() as u32;
    }
    line_text.len()
}

/// The span of a syntax node with both byte offsets and UTF-16 points.
pub fn span_of(node: &Node<'_>, source: &str, index: &LineIndex) -> Span {
    Span {
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        start: index.point_from_ts(source, node.start_position()),
        end: index.point_from_ts(source, node.end_position()),
    }
}

/// One file's retained parse result. Lives in the [`ParseStore`] for the
/// duration of a run so syntax handles stay resolvable.
pub struct ParsedFile {
    pub source: String,
    pub tree: Tree,
    pub line_index: LineIndex,
}

impl ParsedFile {
    /// Re-locate the node a handle points at.
    pub fn node_for_handle(&self, handle: &SyntaxHandle) -> Option<Node<'_>> {
        self.tree
            .root_node()
            .descendant_for_byte_range(handle.span.start_byte, handle.span.end_byte)
    }

    /// Innermost node spanning an LSP range: the landing node.
    pub fn landing_node(&self, start: Point, end: Point) -> Option<Node<'_>> {
        let start = self.line_index.ts_point_of(&self.source, start);
        let end = self.line_index.ts_point_of(&self.source, end);
        self.tree.root_node().descendant_for_point_range(start, end)
    }
}

/// Retains `(source, tree)` per file between the extraction and resolver
/// passes. Dropping the store invalidates every syntax handle.
#[derive(Default)]
pub struct ParseStore {
    files: HashMap<String, ParsedFile>,
}

impl ParseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, uri: String, source: String, tree: Tree) {
        let line_index = LineIndex::new(&source);
        self.files.insert(
            uri,
            ParsedFile {
                source,
                tree,
                line_index,
            },
        );
    }

    pub fn get(&self, uri: &str) -> Option<&ParsedFile> {
        self.files.get(uri)
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.files.contains_key(uri)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Nodes and hierarchy edges produced from one file.
#[derive(Debug, Default)]
pub struct ExtractionResult {
    pub nodes: Vec<GraphNode>,
    /// `(parent_id, child_id, kind)` definition edges, in creation order.
    pub edges: Vec<(String, String, RelationshipType)>,
}

/// Parses one file at a time and distills the tree into a File node plus
/// Definition nodes, maintaining a context stack so each definition gets
/// exactly one structural parent.
pub struct SyntaxExtractor<'r> {
    registry: &'r LanguageRegistry,
    environment: GraphEnvironment,
}

impl<'r> SyntaxExtractor<'r> {
    pub fn new(registry: &'r LanguageRegistry, environment: GraphEnvironment) -> Self {
        SyntaxExtractor {
            registry,
            environment,
        }
    }

    /// Extract `file` under `parent_folder`. Unsupported extensions and
    /// undecodable content yield a single RAW-tagged File node; parsed
    /// files additionally land in `parse_store` for the resolver pass.
    pub fn extract_file(
        &self,
        file: &SourceFile,
        parent_folder: &GraphNode,
        parse_store: &mut ParseStore,
    ) -> ExtractionResult {
        let path = file.path();
        let uri = file.uri();

        let source = match std::fs::read(&path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Some(text),
                Err(_) => None,
            },
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "cannot read file");
                None
            }
        };

        // Decoding failures are treated as empty content and tagged RAW.
        let Some(source) = source else {
            return self.raw_file(file, parent_folder, String::new());
        };

        let extension = file.extension();
        if !self.registry.supports(&extension) {
            return self.raw_file(file, parent_folder, source);
        }
        let rules = self.registry.rules_for(&extension);
        let Some(tree) = rules.parse(&extension, source.as_bytes()) else {
            return self.raw_file(file, parent_folder, source);
        };

        let line_index = LineIndex::new(&source);
        let root = tree.root_node();
        let file_span = span_of(&root, &source, &line_index);
        let file_node = GraphNode::file(
            &self.environment,
            file.name.clone(),
            uri.clone(),
            file.level,
            parent_folder,
            source.clone(),
            Some(file_span),
            Some(SyntaxHandle::new(uri.clone(), file_span)),
        );

        let mut result = ExtractionResult {
            nodes: vec![file_node],
            edges: Vec::new(),
        };
        let mut context_stack = vec![0usize];
        self.traverse(
            root,
            rules.as_ref(),
            &source,
            &line_index,
            &uri,
            &mut result,
            &mut context_stack,
        );

        parse_store.insert(uri, source, tree);
        result
    }

    fn raw_file(
        &self,
        file: &SourceFile,
        parent_folder: &GraphNode,
        code_text: String,
    ) -> ExtractionResult {
        let mut node = GraphNode::file(
            &self.environment,
            file.name.clone(),
            file.uri(),
            file.level,
            parent_folder,
            code_text,
            None,
            None,
        );
        node.add_extra_label("RAW");
        ExtractionResult {
            nodes: vec![node],
            edges: Vec::new(),
        }
    }

    /// Pre-order traversal; definition nodes push themselves onto the
    /// context stack while their syntactic children are visited.
    #[allow(clippy::too_many_arguments)]
    fn traverse(
        &self,
        node: Node<'_>,
        rules: &dyn LanguageRules,
        source: &str,
        line_index: &LineIndex,
        uri: &str,
        result: &mut ExtractionResult,
        context_stack: &mut Vec<usize>,
    ) {
        let mut created = false;
        if rules.is_definition_node(&node) {
            let parent_index = *context_stack.last().expect("context stack never empty");
            let parent = &result.nodes[parent_index];
            if let Some(definition) = self.build_definition(&node, rules, source, line_index, uri, parent)
            {
                let edge_kind = RelationshipType::definition_edge_for(definition.label)
                    .expect("definitions always have an edge kind");
                result
                    .edges
                    .push((parent.id.clone(), definition.id.clone(), edge_kind));
                result.nodes.push(definition);
                context_stack.push(result.nodes.len() - 1);
                created = true;
            }
        }

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.traverse(child, rules, source, line_index, uri, result, context_stack);
        }

        if created {
            context_stack.pop();
        }
    }

    fn build_definition(
        &self,
        node: &Node<'_>,
        rules: &dyn LanguageRules,
        source: &str,
        line_index: &LineIndex,
        uri: &str,
        parent: &GraphNode,
    ) -> Option<GraphNode> {
        let label = rules.label_of(node)?;
        let Some(identifier) = rules.identifier_of(node) else {
            tracing::warn!(
                kind = node.kind(),
                start = node.start_byte(),
                uri,
                "definition without identifier skipped"
            );
            return None;
        };
        let name = identifier.utf8_text(source.as_bytes()).ok()?.to_string();

        let definition_range = span_of(&identifier, source, line_index);
        let node_range = span_of(node, source, line_index);
        let code_text = node
            .utf8_text(source.as_bytes())
            .unwrap_or_default()
            .to_string();
        let body = rules
            .body_of(node)
            .map(|body| SyntaxHandle::new(uri.to_string(), span_of(&body, source, line_index)));

        let mut definition = GraphNode::definition(
            &self.environment,
            label,
            name,
            uri.to_string(),
            parent,
            definition_range,
            node_range,
            code_text,
            body,
            SyntaxHandle::new(uri.to_string(), node_range),
        );
        if label == NodeLabel::Function {
            definition.function_stats = Some(complexity::function_stats(node, rules));
        }
        Some(definition)
    }
}

/// Spans of every bare identifier token in a parsed file. Diff mode uses
/// these to discover which files a changed file refers to.
pub fn collect_identifiers(parsed: &ParsedFile) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut stack = vec![parsed.tree.root_node()];
    while let Some(node) = stack.pop() {
        if node.kind() == "identifier" {
            spans.push(span_of(&node, &parsed.source, &parsed.line_index));
        }
        let mut cursor = node.walk();
        // Reverse keeps pre-order when popping from the stack's tail.
        let children: Vec<_> = node.named_children(&mut cursor).collect();
        for child in children.into_iter().rev() {
            stack.push(child);
        }
    }
    spans
}
