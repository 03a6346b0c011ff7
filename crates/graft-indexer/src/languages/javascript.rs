//! JavaScript language rules

use tree_sitter::{Language, Node};

use graft_core::{NodeLabel, RelationshipType};
use graft_lsp::ServerSpec;

use super::LanguageRules;

pub struct JavaScriptRules;

/// A `const f = () => ...` declarator defines a function.
pub(crate) fn is_arrow_declarator(node: &Node<'_>) -> bool {
    node.kind() == "variable_declarator"
        && node
            .child_by_field_name("value")
            .is_some_and(|value| value.kind() == "arrow_function")
}

impl LanguageRules for JavaScriptRules {
    fn language_name(&self) -> &'static str {
        "javascript"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &[".js", ".jsx"]
    }

    fn grammar_for(&self, extension: &str) -> Option<Language> {
        matches!(extension, ".js" | ".jsx").then(|| tree_sitter_javascript::LANGUAGE.into())
    }

    fn server_spec(&self) -> ServerSpec {
        ServerSpec::new("javascript", "typescript-language-server", &["--stdio"])
    }

    fn is_definition_node(&self, node: &Node<'_>) -> bool {
        matches!(
            node.kind(),
            "class_declaration" | "function_declaration" | "method_definition"
        ) || is_arrow_declarator(node)
    }

    fn label_of(&self, node: &Node<'_>) -> Option<NodeLabel> {
        match node.kind() {
            "class_declaration" => Some(NodeLabel::Class),
            "function_declaration" | "method_definition" => Some(NodeLabel::Function),
            "variable_declarator" if is_arrow_declarator(node) => Some(NodeLabel::Function),
            _ => None,
        }
    }

    fn body_of<'t>(&self, node: &Node<'t>) -> Option<Node<'t>> {
        if is_arrow_declarator(node) {
            return node
                .child_by_field_name("value")
                .and_then(|value| value.child_by_field_name("body"));
        }
        node.child_by_field_name("body")
    }

    fn classify_reference(
        &self,
        target: NodeLabel,
        ancestor: &Node<'_>,
    ) -> Option<RelationshipType> {
        match target {
            NodeLabel::Class => match ancestor.kind() {
                "import_specifier" | "import_clause" => Some(RelationshipType::Imports),
                "new_expression" => Some(RelationshipType::Instantiates),
                "class_heritage" => Some(RelationshipType::Inherits),
                "variable_declarator" => Some(RelationshipType::Assigns),
                "type_annotation" => Some(RelationshipType::Types),
                _ => None,
            },
            NodeLabel::Function => match ancestor.kind() {
                "import_specifier" | "import_clause" => Some(RelationshipType::Imports),
                "call_expression" => Some(RelationshipType::Calls),
                "variable_declarator" => Some(RelationshipType::Assigns),
                _ => None,
            },
            _ => None,
        }
    }

    fn control_flow_types(&self) -> &'static [&'static str] {
        &["for_statement", "if_statement", "while_statement", "else_clause"]
    }

    fn consequence_types(&self) -> &'static [&'static str] {
        &["statement_block"]
    }
}
