//! Language rules: per-language extraction and reference classification

pub mod javascript;
pub mod python;
pub mod typescript;

use std::collections::HashMap;
use std::sync::Arc;

use tree_sitter::{Language, Node, Parser, Tree};

use graft_core::{NodeLabel, RelationshipType};
use graft_lsp::ServerSpec;

/// Everything the extractor and resolver need to know about one language:
/// how to parse it, which grammar nodes produce definitions, and how a
/// reference site's syntactic context maps to an edge kind.
pub trait LanguageRules: Send + Sync {
    /// Language tag matching the LSP specification's `languageId`.
    fn language_name(&self) -> &'static str;

    /// Extensions this language claims, with leading dots.
    fn file_extensions(&self) -> &'static [&'static str];

    /// The tree-sitter grammar for one of this language's extensions.
    fn grammar_for(&self, extension: &str) -> Option<Language>;

    /// How to start the language server for this language.
    fn server_spec(&self) -> ServerSpec;

    /// Grammar nodes that produce a Definition in the graph.
    fn is_definition_node(&self, node: &Node<'_>) -> bool;

    /// CLASS or FUNCTION for a definition-producing node.
    fn label_of(&self, node: &Node<'_>) -> Option<NodeLabel>;

    /// The subnode carrying the symbol's name. `None` means the node is
    /// skipped with a warning.
    fn identifier_of<'t>(&self, node: &Node<'t>) -> Option<Node<'t>> {
        node.child_by_field_name("name")
    }

    /// The subnode spanning the declaration body. `None` for abstract or
    /// arrow-like forms without one; the definition is then created
    /// without a body handle.
    fn body_of<'t>(&self, node: &Node<'t>) -> Option<Node<'t>> {
        node.child_by_field_name("body")
    }

    /// Given the kind of the referenced definition and one ancestor of
    /// the landing node, decide the edge kind. The resolver walks
    /// ancestors innermost-first and the first non-`None` answer wins.
    fn classify_reference(
        &self,
        target: NodeLabel,
        ancestor: &Node<'_>,
    ) -> Option<RelationshipType>;

    /// Grammar types that open a control-flow construct; used by the
    /// nesting statistics.
    fn control_flow_types(&self) -> &'static [&'static str] {
        &[]
    }

    /// Grammar types holding a control-flow construct's consequence block.
    fn consequence_types(&self) -> &'static [&'static str] {
        &[]
    }

    /// Parse source for one of this language's extensions.
    fn parse(&self, extension: &str, source: &[u8]) -> Option<Tree> {
        let grammar = self.grammar_for(extension)?;
        let mut parser = Parser::new();
        parser.set_language(&grammar).ok()?;
        parser.parse(source, None)
    }
}

/// Rules applied to binary or unsupported files: nothing parses, nothing
/// defines, nothing classifies.
pub struct FallbackRules;

impl LanguageRules for FallbackRules {
    fn language_name(&self) -> &'static str {
        "plaintext"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &[]
    }

    fn grammar_for(&self, _extension: &str) -> Option<Language> {
        None
    }

    // Never queried: nothing here produces definitions to resolve.
    fn server_spec(&self) -> ServerSpec {
        ServerSpec::new("plaintext", "", &[])
    }

    fn is_definition_node(&self, _node: &Node<'_>) -> bool {
        false
    }

    fn label_of(&self, _node: &Node<'_>) -> Option<NodeLabel> {
        None
    }

    fn classify_reference(
        &self,
        _target: NodeLabel,
        _ancestor: &Node<'_>,
    ) -> Option<RelationshipType> {
        None
    }
}

/// Maps file extensions to language rules. Built once at startup and
/// injected into the extractor and resolver; each extension resolves to
/// exactly one language.
pub struct LanguageRegistry {
    by_extension: HashMap<&'static str, Arc<dyn LanguageRules>>,
    fallback: Arc<dyn LanguageRules>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        let mut registry = LanguageRegistry {
            by_extension: HashMap::new(),
            fallback: Arc::new(FallbackRules),
        };
        registry.register(Arc::new(python::PythonRules));
        registry.register(Arc::new(javascript::JavaScriptRules));
        registry.register(Arc::new(typescript::TypeScriptRules));
        registry
    }

    fn register(&mut self, rules: Arc<dyn LanguageRules>) {
        for extension in rules.file_extensions() {
            self.by_extension.insert(extension, Arc::clone(&rules));
        }
    }

    /// Rules for an extension, falling back to [`FallbackRules`].
    pub fn rules_for(&self, extension: &str) -> &Arc<dyn LanguageRules> {
        self.by_extension.get(extension).unwrap_or(&self.fallback)
    }

    pub fn supports(&self, extension: &str) -> bool {
        self.by_extension.contains_key(extension)
    }

    pub fn available_languages(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .by_extension
            .values()
            .map(|rules| rules.language_name())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
