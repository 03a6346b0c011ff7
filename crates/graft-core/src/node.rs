//! Graph nodes: folders, files, class/function definitions

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{json, Value};

use crate::environment::GraphEnvironment;
use crate::ident;
use crate::model::{FunctionStats, NodeLabel, Span, SyntaxHandle};

/// A single node in the code graph.
///
/// One struct covers every label; per-kind payload lives in optional
/// fields. The identifier is computed once at construction from the
/// parent chain, so two runs over identical source agree on every id.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub label: NodeLabel,
    pub extra_labels: Vec<String>,
    pub name: String,
    /// `file://` URI of the node's own path (folders and files) or of the
    /// containing file (definitions).
    pub path: String,
    /// Nesting level; the project root folder is 0.
    pub level: u32,
    /// Environment-prefixed identifier, unique per store.
    pub id: String,
    /// Identifier minus environment prefix and root fragment.
    pub relative_id: String,
    pub parent_id: Option<String>,
    /// Diff identifier of the owning environment, exported verbatim.
    pub diff_identifier: String,
    /// Full source text for files; declaration text for definitions.
    pub code_text: String,
    /// Whole-declaration span (definitions) or whole-file span (files).
    pub node_range: Option<Span>,
    /// Span of the identifier token itself.
    pub definition_range: Option<Span>,
    /// Handle to the declaration's body node, when the form has one.
    pub body: Option<SyntaxHandle>,
    /// Handle to the declaration node inside the owning file's tree.
    /// Absent for folders and RAW files.
    pub handle: Option<SyntaxHandle>,
    /// Accreted attributes (e.g. diff_text); exported verbatim.
    pub attributes: BTreeMap<String, String>,
    /// Complexity stats, functions only.
    pub function_stats: Option<FunctionStats>,
    /// Count of FUNCTION children, maintained by the store for classes.
    pub methods_defined: u32,
}

impl GraphNode {
    fn base(
        label: NodeLabel,
        name: String,
        path: String,
        level: u32,
        id: String,
        parent_id: Option<String>,
        environment: &GraphEnvironment,
    ) -> Self {
        let relative_id = ident::relative_id(&id);
        GraphNode {
            label,
            extra_labels: Vec::new(),
            name,
            path,
            level,
            id,
            relative_id,
            parent_id,
            diff_identifier: environment.diff_identifier.clone(),
            code_text: String::new(),
            node_range: None,
            definition_range: None,
            body: None,
            handle: None,
            attributes: BTreeMap::new(),
            function_stats: None,
            methods_defined: 0,
        }
    }

    /// A directory node. The root folder passes `parent = None`.
    pub fn folder(
        environment: &GraphEnvironment,
        name: impl Into<String>,
        path: impl Into<String>,
        level: u32,
        parent: Option<&GraphNode>,
    ) -> Self {
        let name = name.into();
        let id = match parent {
            Some(parent) => format!("{}{}", parent.id, ident::path_fragment(&name)),
            None => format!("{}{}", environment.prefix(), ident::path_fragment(&name)),
        };
        Self::base(
            NodeLabel::Folder,
            name,
            path.into(),
            level,
            id,
            parent.map(|p| p.id.clone()),
            environment,
        )
    }

    /// A source-file node contained in `parent` (a folder).
    #[allow(clippy::too_many_arguments)]
    pub fn file(
        environment: &GraphEnvironment,
        name: impl Into<String>,
        path: impl Into<String>,
        level: u32,
        parent: &GraphNode,
        code_text: String,
        node_range: Option<Span>,
        handle: Option<SyntaxHandle>,
    ) -> Self {
        let name = name.into();
        let id = format!("{}{}", parent.id, ident::path_fragment(&name));
        let mut node = Self::base(
            NodeLabel::File,
            name,
            path.into(),
            level,
            id,
            Some(parent.id.clone()),
            environment,
        );
        node.code_text = code_text;
        node.node_range = node_range;
        node.definition_range = node_range;
        node.handle = handle;
        node
    }

    /// A class or function definition contained in `parent` (a file or
    /// another definition).
    #[allow(clippy::too_many_arguments)]
    pub fn definition(
        environment: &GraphEnvironment,
        label: NodeLabel,
        name: impl Into<String>,
        path: impl Into<String>,
        parent: &GraphNode,
        definition_range: Span,
        node_range: Span,
        code_text: String,
        body: Option<SyntaxHandle>,
        handle: SyntaxHandle,
    ) -> Self {
        debug_assert!(label.is_definition());
        let name = name.into();
        let fragment = match label {
            NodeLabel::Class => ident::class_fragment(&name),
            _ => ident::function_fragment(&name),
        };
        let id = format!("{}{}", parent.id, fragment);
        let mut node = Self::base(
            label,
            name,
            path.into(),
            parent.level + 1,
            id,
            Some(parent.id.clone()),
            environment,
        );
        node.code_text = code_text;
        node.node_range = Some(node_range);
        node.definition_range = Some(definition_range);
        node.body = body;
        node.handle = Some(handle);
        node
    }

    /// A synthetic node standing in for a definition or file removed in a
    /// diff run. Lives at a unique path so several can coexist.
    pub fn deleted(environment: &GraphEnvironment) -> Self {
        let root = environment.root_path.to_string_lossy().replace('\\', "/");
        let marker = format!("DELETED-{}", uuid::Uuid::new_v4());
        let path = format!("{}{}/{}", ident::FILE_SCHEME, root, marker);
        let id = ident::stable_file_id(environment, &ident::uri_to_path(&path));
        Self::base(NodeLabel::Deleted, marker, path, 0, id, None, environment)
    }

    /// Filesystem path without the `file://` scheme.
    pub fn pure_path(&self) -> String {
        self.path
            .strip_prefix(ident::FILE_SCHEME)
            .unwrap_or(&self.path)
            .to_string()
    }

    /// Extension of the owning file, with the leading dot (e.g. `.py`).
    pub fn extension(&self) -> String {
        Path::new(&self.pure_path())
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default()
    }

    /// Content hash of the identifier; the compact key for external stores.
    pub fn hashed_id(&self) -> String {
        ident::content_hash(&self.id)
    }

    pub fn add_extra_label(&mut self, label: impl Into<String>) {
        let label = label.into();
        if !self.extra_labels.contains(&label) {
            self.extra_labels.push(label);
        }
    }

    pub fn has_extra_label(&self, label: &str) -> bool {
        self.extra_labels.iter().any(|l| l == label)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Files whose content could not be parsed (unsupported extension or
    /// decoding failure) carry no syntax handle.
    pub fn is_raw(&self) -> bool {
        self.label == NodeLabel::File && self.handle.is_none()
    }

    pub fn is_definition(&self) -> bool {
        self.label.is_definition()
    }

    /// Whether `code_text` matches a previous snapshot, used by diff mode.
    pub fn is_code_text_equivalent(&self, other: &str) -> bool {
        self.code_text == other
    }

    /// Serialize for bulk loading. Syntax handles are deliberately absent:
    /// they are only valid while the extraction context lives.
    pub fn as_object(&self) -> Value {
        let hashed = self.hashed_id();
        let mut attributes = serde_json::Map::new();
        attributes.insert("label".into(), json!(self.label.as_str()));
        attributes.insert("path".into(), json!(self.path));
        attributes.insert("node_id".into(), json!(hashed));
        attributes.insert("node_path".into(), json!(self.id));
        attributes.insert("name".into(), json!(self.name));
        attributes.insert("level".into(), json!(self.level));
        attributes.insert("hashed_id".into(), json!(hashed));
        attributes.insert("diff_identifier".into(), json!(self.diff_identifier));

        if matches!(self.label, NodeLabel::File | NodeLabel::Class | NodeLabel::Function) {
            attributes.insert("text".into(), json!(self.code_text));
        }
        if self.is_definition() {
            if let Some(range) = self.node_range {
                attributes.insert("start_line".into(), json!(range.start.line));
                attributes.insert("end_line".into(), json!(range.end.line));
            }
        }
        if self.label == NodeLabel::Class {
            attributes.insert("stats_methods_defined".into(), json!(self.methods_defined));
        }
        if let Some(stats) = self.function_stats {
            attributes.insert(
                "stats_parameter_count".into(),
                json!(stats.parameter_count),
            );
            attributes.insert(
                "stats_max_indentation".into(),
                json!(stats.nesting.max_indentation),
            );
            attributes.insert(
                "stats_min_indentation".into(),
                json!(stats.nesting.min_indentation),
            );
            attributes.insert(
                "stats_average_indentation".into(),
                json!(stats.nesting.average_indentation),
            );
            attributes.insert("stats_sd".into(), json!(stats.nesting.sd));
        }
        for (key, value) in &self.attributes {
            attributes.insert(key.clone(), json!(value));
        }

        json!({
            "type": self.label.as_str(),
            "extra_labels": self.extra_labels,
            "attributes": Value::Object(attributes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn env() -> GraphEnvironment {
        GraphEnvironment::new("repo", "main", PathBuf::from("/project"))
    }

    fn sample_span() -> Span {
        Span {
            start_byte: 0,
            end_byte: 10,
            ..Default::default()
        }
    }

    #[test]
    fn identifiers_follow_parent_chain() {
        let env = env();
        let root = GraphNode::folder(&env, "project", "file:///project", 0, None);
        let src = GraphNode::folder(&env, "src", "file:///project/src", 1, Some(&root));
        let file = GraphNode::file(
            &env,
            "main.py",
            "file:///project/src/main.py",
            2,
            &src,
            String::new(),
            None,
            None,
        );
        let class = GraphNode::definition(
            &env,
            NodeLabel::Class,
            "Greeter",
            "file:///project/src/main.py",
            &file,
            sample_span(),
            sample_span(),
            "class Greeter: ...".into(),
            None,
            SyntaxHandle::new("file:///project/src/main.py", sample_span()),
        );
        let method = GraphNode::definition(
            &env,
            NodeLabel::Function,
            "greet",
            "file:///project/src/main.py",
            &class,
            sample_span(),
            sample_span(),
            "def greet(self): ...".into(),
            None,
            SyntaxHandle::new("file:///project/src/main.py", sample_span()),
        );

        assert_eq!(root.id, "repo/main/project");
        assert_eq!(file.id, "repo/main/project/src/main.py");
        assert_eq!(class.id, "repo/main/project/src/main.py#Greeter");
        assert_eq!(method.id, "repo/main/project/src/main.py#Greeter.greet");
        assert_eq!(method.level, file.level + 2);
        assert_eq!(method.relative_id, "/src/main.py#Greeter.greet");
    }

    #[test]
    fn sibling_definitions_with_same_name_stay_distinct() {
        let env = env();
        let root = GraphNode::folder(&env, "project", "file:///project", 0, None);
        let file = GraphNode::file(
            &env,
            "main.py",
            "file:///project/main.py",
            1,
            &root,
            String::new(),
            None,
            None,
        );
        let outer = GraphNode::definition(
            &env,
            NodeLabel::Function,
            "greet",
            "file:///project/main.py",
            &file,
            sample_span(),
            sample_span(),
            String::new(),
            None,
            SyntaxHandle::new("file:///project/main.py", sample_span()),
        );
        let class = GraphNode::definition(
            &env,
            NodeLabel::Class,
            "Greeter",
            "file:///project/main.py",
            &file,
            sample_span(),
            sample_span(),
            String::new(),
            None,
            SyntaxHandle::new("file:///project/main.py", sample_span()),
        );
        let method = GraphNode::definition(
            &env,
            NodeLabel::Function,
            "greet",
            "file:///project/main.py",
            &class,
            sample_span(),
            sample_span(),
            String::new(),
            None,
            SyntaxHandle::new("file:///project/main.py", sample_span()),
        );
        assert_ne!(outer.id, method.id);
    }

    #[test]
    fn export_object_shape() {
        let env = env();
        let root = GraphNode::folder(&env, "project", "file:///project", 0, None);
        let mut file = GraphNode::file(
            &env,
            "data.bin",
            "file:///project/data.bin",
            1,
            &root,
            String::new(),
            None,
            None,
        );
        file.add_extra_label("RAW");

        let object = file.as_object();
        assert_eq!(object["type"], "FILE");
        assert_eq!(object["extra_labels"][0], "RAW");
        let attrs = &object["attributes"];
        assert_eq!(attrs["name"], "data.bin");
        assert_eq!(attrs["path"], "file:///project/data.bin");
        assert_eq!(attrs["node_path"], "repo/main/project/data.bin");
        assert_eq!(attrs["node_id"], attrs["hashed_id"]);
        assert!(attrs.get("start_line").is_none());
    }

    #[test]
    fn extension_includes_leading_dot() {
        let env = env();
        let root = GraphNode::folder(&env, "project", "file:///project", 0, None);
        let file = GraphNode::file(
            &env,
            "main.py",
            "file:///project/main.py",
            1,
            &root,
            String::new(),
            None,
            None,
        );
        assert_eq!(file.extension(), ".py");
        assert!(file.is_raw());
    }

    #[test]
    fn deleted_nodes_are_unique() {
        let env = env();
        let a = GraphNode::deleted(&env);
        let b = GraphNode::deleted(&env);
        assert_ne!(a.id, b.id);
        assert_eq!(a.label, NodeLabel::Deleted);
        assert!(a.path.starts_with("file:///project/DELETED-"));
    }
}
