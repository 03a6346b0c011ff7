//! TypeScript language rules

use tree_sitter::{Language, Node};

use graft_core::{NodeLabel, RelationshipType};
use graft_lsp::ServerSpec;

use super::javascript::is_arrow_declarator;
use super::LanguageRules;

pub struct TypeScriptRules;

impl LanguageRules for TypeScriptRules {
    fn language_name(&self) -> &'static str {
        "typescript"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &[".ts", ".tsx"]
    }

    /// `.ts` and `.tsx` are distinct grammar variants; each extension
    /// maps to exactly one.
    fn grammar_for(&self, extension: &str) -> Option<Language> {
        match extension {
            ".ts" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            ".tsx" => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            _ => None,
        }
    }

    fn server_spec(&self) -> ServerSpec {
        ServerSpec::new("typescript", "typescript-language-server", &["--stdio"])
    }

    fn is_definition_node(&self, node: &Node<'_>) -> bool {
        matches!(
            node.kind(),
            "class_declaration"
                | "abstract_class_declaration"
                | "function_declaration"
                | "method_definition"
                | "interface_declaration"
        ) || is_arrow_declarator(node)
    }

    fn label_of(&self, node: &Node<'_>) -> Option<NodeLabel> {
        match node.kind() {
            "class_declaration" | "abstract_class_declaration" | "interface_declaration" => {
                Some(NodeLabel::Class)
            }
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
                "extends_clause" | "implements_clause" | "class_heritage" => {
                    Some(RelationshipType::Inherits)
                }
                "type_annotation" => Some(RelationshipType::Types),
                "variable_declarator" => Some(RelationshipType::Assigns),
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
