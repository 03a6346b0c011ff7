//! Python language rules

use tree_sitter::{Language, Node};

use graft_core::{NodeLabel, RelationshipType};
use graft_lsp::ServerSpec;

use super::LanguageRules;

pub struct PythonRules;

impl LanguageRules for PythonRules {
    fn language_name(&self) -> &'static str {
        "python"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &[".py"]
    }

    fn grammar_for(&self, extension: &str) -> Option<Language> {
        (extension == ".py").then(|| tree_sitter_python::LANGUAGE.into())
    }

    fn server_spec(&self) -> ServerSpec {
        ServerSpec::new("python", "jedi-language-server", &[])
    }

    fn is_definition_node(&self, node: &Node<'_>) -> bool {
        matches!(node.kind(), "class_definition" | "function_definition")
    }

    fn label_of(&self, node: &Node<'_>) -> Option<NodeLabel> {
        match node.kind() {
            "class_definition" => Some(NodeLabel::Class),
            "function_definition" => Some(NodeLabel::Function),
            _ => None,
        }
    }

    fn classify_reference(
        &self,
        target: NodeLabel,
        ancestor: &Node<'_>,
    ) -> Option<RelationshipType> {
        match target {
            NodeLabel::Class => match ancestor.kind() {
                "import_from_statement" | "import_statement" => Some(RelationshipType::Imports),
                // The superclass list of a class definition.
                "argument_list"
                    if ancestor
                        .parent()
                        .is_some_and(|p| p.kind() == "class_definition") =>
                {
                    Some(RelationshipType::Inherits)
                }
                "call" => Some(RelationshipType::Instantiates),
                "type" => Some(RelationshipType::Types),
                "assignment" => Some(RelationshipType::Types),
                _ => None,
            },
            NodeLabel::Function => match ancestor.kind() {
                "call" | "interpolation" => Some(RelationshipType::Calls),
                "import_from_statement" | "import_statement" => Some(RelationshipType::Imports),
                "assignment" => Some(RelationshipType::Assigns),
                _ => None,
            },
            _ => None,
        }
    }

    fn control_flow_types(&self) -> &'static [&'static str] {
        &["if_statement", "while_statement", "for_statement"]
    }

    fn consequence_types(&self) -> &'static [&'static str] {
        &["block"]
    }
}
