//! End-to-end tests for the indexing pipeline, driven by a scripted
//! reference backend in place of real language servers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use graft_core::{ident, NodeLabel, Point, RelationshipType};
use graft_lsp::{ReferenceBackend, ReferenceLocation, ServerSpec};

use crate::config::ProjectConfig;
use crate::diff::{ChangeType, DiffGraphBuilder, FileDiff, PreviousNodeState};
use crate::orchestrator::{CancellationFlag, GraphBuilder};

/// Deterministic stand-in for the LSP pool: responses are keyed by
/// `(relative path, line, character)`.
#[derive(Default)]
struct StubBackend {
    references: HashMap<(String, u32, u32), Vec<ReferenceLocation>>,
    definitions: HashMap<(String, u32, u32), Vec<ReferenceLocation>>,
}

impl StubBackend {
    fn reference(
        &mut self,
        at: (&str, u32, u32),
        uri: &str,
        start: (u32, u32),
        end: (u32, u32),
    ) {
        self.references
            .entry((at.0.to_string(), at.1, at.2))
            .or_default()
            .push(ReferenceLocation {
                uri: uri.to_string(),
                start: Point::new(start.0, start.1),
                end: Point::new(end.0, end.1),
            });
    }
}

#[async_trait]
impl ReferenceBackend for StubBackend {
    async fn references(
        &mut self,
        _spec: &ServerSpec,
        relative_path: &str,
        position: Point,
    ) -> Vec<ReferenceLocation> {
        self.references
            .get(&(relative_path.to_string(), position.line, position.character))
            .cloned()
            .unwrap_or_default()
    }

    async fn definition(
        &mut self,
        _spec: &ServerSpec,
        relative_path: &str,
        position: Point,
    ) -> Vec<ReferenceLocation> {
        self.definitions
            .get(&(relative_path.to_string(), position.line, position.character))
            .cloned()
            .unwrap_or_default()
    }
}

const SAMPLE_MAIN_PY: &str = "\
def greet(name):
    return \"hi \" + name


class Greeter:
    def greet(self, name):
        return greet(name)
";

fn sample_project() -> (tempfile::TempDir, PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    std::fs::create_dir(root.join("src")).unwrap();
    std::fs::write(root.join("src/main.py"), SAMPLE_MAIN_PY).unwrap();
    (tmp, root)
}

fn root_name(root: &Path) -> String {
    root.file_name().unwrap().to_string_lossy().into_owned()
}

#[tokio::test]
async fn s1_minimal_hierarchy() {
    let (_tmp, root) = sample_project();
    let builder = GraphBuilder::new(ProjectConfig::new(&root)).unwrap();
    let (graph, parse_store) = builder.build_hierarchy();

    let prefix = builder.environment().prefix();
    let base = format!("{}/{}", prefix, root_name(&root));
    let uri = ident::path_to_uri(&root.join("src/main.py"));

    let outer = graph.node(&format!("{base}/src/main.py.greet")).unwrap();
    let class = graph.node(&format!("{base}/src/main.py#Greeter")).unwrap();
    let method = graph
        .node(&format!("{base}/src/main.py#Greeter.greet"))
        .unwrap();

    // Exactly 3 definitions with distinct identifiers.
    assert_eq!(
        graph.by_label(NodeLabel::Function).len() + graph.by_label(NodeLabel::Class).len(),
        3
    );
    assert_ne!(outer.id, method.id);
    assert_eq!(outer.label, NodeLabel::Function);
    assert_eq!(class.label, NodeLabel::Class);
    assert_eq!(method.level, class.level + 1);

    // Folder src -> File main.py -> definitions, each reachable by
    // exactly one hierarchy edge.
    let file = graph.file_at(&uri).unwrap();
    assert_eq!(file.name, "main.py");
    let src = graph.folder_at(&ident::path_to_uri(&root.join("src"))).unwrap();
    assert_eq!(src.level, 1);

    let export = graph.export();
    for target in [&outer.id, &class.id, &method.id] {
        let hashed = ident::content_hash(target);
        let hierarchy_edges = export
            .edges
            .iter()
            .filter(|edge| {
                edge["targetId"] == hashed
                    && (edge["type"] == "FUNCTION_DEFINITION" || edge["type"] == "CLASS_DEFINITION")
            })
            .count();
        assert_eq!(hierarchy_edges, 1, "one definition edge into {target}");
    }

    // Ranges are well-formed: identifier span inside declaration span.
    for definition in [outer, class, method] {
        let node_range = definition.node_range.unwrap();
        let definition_range = definition.definition_range.unwrap();
        assert!(node_range.contains(&definition_range));
        assert!(node_range.end_byte <= file.code_text.len());
    }

    // The parsed tree is retained for the resolver pass.
    assert!(parse_store.contains(&uri));

    // Complexity attributes surface on export.
    let class_object = class.as_object();
    assert_eq!(class_object["attributes"]["stats_methods_defined"], 1);
    let method_object = method.as_object();
    assert_eq!(method_object["attributes"]["stats_parameter_count"], 2);
}

#[tokio::test]
async fn s2_call_resolution() {
    let (_tmp, root) = sample_project();
    let builder = GraphBuilder::new(ProjectConfig::new(&root)).unwrap();
    let uri = ident::path_to_uri(&root.join("src/main.py"));

    let mut backend = StubBackend::default();
    // References of the outer `greet`: its own definition line (skipped as
    // a self-reference) and the call inside the method.
    backend.reference(("src/main.py", 0, 4), &uri, (0, 4), (0, 9));
    backend.reference(("src/main.py", 0, 4), &uri, (6, 15), (6, 20));

    let (graph, _) = builder.build(&mut backend).await;

    let prefix = builder.environment().prefix();
    let base = format!("{}/{}", prefix, root_name(&root));
    let edges = graph.reference_edges();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].source_id, format!("{base}/src/main.py#Greeter.greet"));
    assert_eq!(edges[0].target_id, format!("{base}/src/main.py.greet"));
    assert_eq!(edges[0].rel_type, RelationshipType::Calls);
    assert_eq!(edges[0].scope_text, "greet(name)");
}

#[tokio::test]
async fn s3_imports_and_inheritance() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    std::fs::create_dir(root.join("src")).unwrap();
    std::fs::write(root.join("src/a.py"), "class Base:\n    pass\n").unwrap();
    std::fs::write(
        root.join("src/b.py"),
        "from a import Base\n\n\nclass Child(Base):\n    pass\n",
    )
    .unwrap();

    let builder = GraphBuilder::new(ProjectConfig::new(&root)).unwrap();
    let b_uri = ident::path_to_uri(&root.join("src/b.py"));

    let mut backend = StubBackend::default();
    backend.reference(("src/a.py", 0, 6), &b_uri, (0, 14), (0, 18));
    backend.reference(("src/a.py", 0, 6), &b_uri, (3, 12), (3, 16));

    let (graph, _) = builder.build(&mut backend).await;

    let prefix = builder.environment().prefix();
    let base = format!("{}/{}", prefix, root_name(&root));
    let target = format!("{base}/src/a.py#Base");

    let edges = graph.reference_edges();
    assert_eq!(edges.len(), 2);

    let imports: Vec<_> = edges
        .iter()
        .filter(|e| e.rel_type == RelationshipType::Imports)
        .collect();
    assert_eq!(imports.len(), 1);
    // The import happens at file scope of b.py.
    assert_eq!(imports[0].source_id, format!("{base}/src/b.py"));
    assert_eq!(imports[0].target_id, target);

    let inherits: Vec<_> = edges
        .iter()
        .filter(|e| e.rel_type == RelationshipType::Inherits)
        .collect();
    assert_eq!(inherits.len(), 1);
    assert_eq!(inherits[0].source_id, format!("{base}/src/b.py#Child"));
    assert_eq!(inherits[0].target_id, target);
}

#[tokio::test]
async fn s4_ignore_files_are_honored() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    std::fs::write(root.join(".gitignore"), "node_modules/\n").unwrap();
    std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
    std::fs::write(root.join("node_modules/pkg/index.js"), "var x = 1;\n").unwrap();
    std::fs::write(root.join("app.py"), "x = 1\n").unwrap();

    let builder = GraphBuilder::new(ProjectConfig::new(&root)).unwrap();
    let (graph, _) = builder.build_hierarchy();

    assert!(graph
        .file_at(&ident::path_to_uri(&root.join("node_modules/pkg/index.js")))
        .is_none());
    assert!(!graph.has_folder_at(&ident::path_to_uri(&root.join("node_modules"))));
    assert!(graph.file_at(&ident::path_to_uri(&root.join("app.py"))).is_some());

    for file in graph.by_label(NodeLabel::File) {
        assert!(!file.path.contains("node_modules"));
    }
}

#[tokio::test]
async fn s5_unsupported_extension_yields_raw_file() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    std::fs::write(root.join("data.bin"), [0u8, 159, 146, 150]).unwrap();

    let builder = GraphBuilder::new(ProjectConfig::new(&root)).unwrap();
    let (graph, parse_store) = builder.build_hierarchy();

    let uri = ident::path_to_uri(&root.join("data.bin"));
    let file = graph.file_at(&uri).unwrap();
    assert!(file.has_extra_label("RAW"));
    assert!(file.is_raw());
    // Undecodable content is treated as empty.
    assert!(file.code_text.is_empty());
    // No definitions, no retained tree.
    assert_eq!(graph.nodes_at(&uri).len(), 1);
    assert!(!parse_store.contains(&uri));
}

#[tokio::test]
async fn raw_files_also_cover_supported_extensions_with_bad_encoding() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    std::fs::write(root.join("broken.py"), [0xffu8, 0xfe, 0x00]).unwrap();

    let builder = GraphBuilder::new(ProjectConfig::new(&root)).unwrap();
    let (graph, _) = builder.build_hierarchy();
    let file = graph
        .file_at(&ident::path_to_uri(&root.join("broken.py")))
        .unwrap();
    assert!(file.has_extra_label("RAW"));
}

#[tokio::test]
async fn identity_is_deterministic_across_runs() {
    let (_tmp, root) = sample_project();
    let builder = GraphBuilder::new(ProjectConfig::new(&root)).unwrap();

    let (first, _) = builder.build_hierarchy();
    let (second, _) = builder.build_hierarchy();

    let first_export = first.export();
    let second_export = second.export();
    assert_eq!(first_export.nodes, second_export.nodes);
    assert_eq!(first_export.edges, second_export.edges);
}

#[tokio::test]
async fn non_ascii_reference_sites_resolve() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    // Multi-byte characters before and inside identifiers exercise the
    // UTF-16/byte conversions at the resolver's landing-node step.
    std::fs::write(
        root.join("uni.py"),
        "émoji = \"😀\"\ndef café():\n    pass\ncafé()\n",
    )
    .unwrap();

    let builder = GraphBuilder::new(ProjectConfig::new(&root)).unwrap();
    let uri = ident::path_to_uri(&root.join("uni.py"));

    let mut backend = StubBackend::default();
    // `café` is defined at line 1, UTF-16 column 4; called at line 3,
    // UTF-16 columns 0..4.
    backend.reference(("uni.py", 1, 4), &uri, (3, 0), (3, 4));

    let (graph, _) = builder.build(&mut backend).await;
    let edges = graph.reference_edges();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].rel_type, RelationshipType::Calls);
    assert_eq!(edges[0].scope_text, "café()");
}

#[tokio::test]
async fn references_from_unknown_files_are_dropped() {
    let (_tmp, root) = sample_project();
    let builder = GraphBuilder::new(ProjectConfig::new(&root)).unwrap();

    let mut backend = StubBackend::default();
    backend.reference(
        ("src/main.py", 0, 4),
        "file:///somewhere/else/entirely.py",
        (0, 0),
        (0, 5),
    );

    let (graph, _) = builder.build(&mut backend).await;
    assert!(graph.reference_edges().is_empty());
}

/// Backend that flips the cancellation flag on its first call, the way
/// an interrupt arriving mid-request would.
struct CancellingBackend {
    flag: CancellationFlag,
    calls: usize,
}

#[async_trait]
impl ReferenceBackend for CancellingBackend {
    async fn references(
        &mut self,
        _spec: &ServerSpec,
        _relative_path: &str,
        _position: Point,
    ) -> Vec<ReferenceLocation> {
        self.calls += 1;
        self.flag.cancel();
        Vec::new()
    }

    async fn definition(
        &mut self,
        _spec: &ServerSpec,
        _relative_path: &str,
        _position: Point,
    ) -> Vec<ReferenceLocation> {
        Vec::new()
    }
}

#[tokio::test]
async fn cancellation_mid_resolution_returns_partial_graph() {
    let (_tmp, root) = sample_project();
    let builder = GraphBuilder::new(ProjectConfig::new(&root)).unwrap();
    let mut backend = CancellingBackend {
        flag: builder.cancellation(),
        calls: 0,
    };

    let (graph, _) = builder.build(&mut backend).await;

    // The hierarchy is complete; resolution stopped after the first
    // definition's query instead of visiting all three.
    assert_eq!(graph.node_count(), 6);
    assert_eq!(backend.calls, 1);
    assert!(graph.reference_edges().is_empty());
}

#[tokio::test]
async fn cancellation_before_the_walk_yields_an_empty_graph() {
    let (_tmp, root) = sample_project();
    let builder = GraphBuilder::new(ProjectConfig::new(&root)).unwrap();
    builder.cancellation().cancel();

    let mut backend = StubBackend::default();
    let (graph, _) = builder.build(&mut backend).await;
    assert_eq!(graph.node_count(), 0);
    assert!(graph.reference_edges().is_empty());
}

#[tokio::test]
async fn s6_diff_mode_marks_modified_nodes() {
    let (_tmp, root) = sample_project();
    let mut config = ProjectConfig::new(&root);
    config.diff_identifier = "pr-1".to_string();
    config.hierarchy_only = true;

    let uri = ident::path_to_uri(&root.join("src/main.py"));
    let diffs = vec![FileDiff {
        path: uri.clone(),
        diff_text: "@@ -6 +6 @@".to_string(),
        change_type: ChangeType::Modified,
    }];
    let builder = DiffGraphBuilder::new(config.clone(), diffs).unwrap();

    // The previous method had different code text; the previous outer
    // function is unchanged.
    let base_environment = config.clone().validated().unwrap().base_environment();
    let file_id = ident::stable_file_id(&base_environment, &root.join("src/main.py"));
    let previous = vec![
        PreviousNodeState {
            node_path: format!("{file_id}#Greeter.greet"),
            code_text: "def greet(self):\n        return \"hello\"".to_string(),
        },
        PreviousNodeState {
            node_path: format!("{file_id}.greet"),
            code_text: SAMPLE_MAIN_PY[..SAMPLE_MAIN_PY.find("\n\n").unwrap()]
                .to_string(),
        },
    ];

    let mut backend = StubBackend::default();
    let update = builder.build(&mut backend, &previous).await;

    // The current method is tagged MODIFIED (plus DIFF with the diff
    // text), and an external MODIFIED edge links current -> previous by
    // content hash.
    let method = update
        .graph
        .by_relative_id("/src/main.py#Greeter.greet")
        .unwrap();
    assert!(method.has_extra_label("MODIFIED"));
    assert!(method.has_extra_label("DIFF"));
    assert_eq!(method.attributes.get("diff_text").unwrap(), "@@ -6 +6 @@");

    let modified: Vec<_> = update
        .external
        .relationships()
        .iter()
        .filter(|edge| edge.rel_type == RelationshipType::Modified)
        .collect();
    assert_eq!(modified.len(), 1);
    assert_eq!(modified[0].source_hash, method.hashed_id());
    assert_eq!(
        modified[0].target_hash,
        ident::content_hash(&format!("{file_id}#Greeter.greet"))
    );

    // The unchanged outer function is neither MODIFIED nor ADDED; the
    // class (absent from previous states) is ADDED.
    let outer = update.graph.by_relative_id("/src/main.py.greet").unwrap();
    assert!(!outer.has_extra_label("MODIFIED"));
    assert!(!outer.has_extra_label("ADDED"));
    let class = update.graph.by_relative_id("/src/main.py#Greeter").unwrap();
    assert!(class.has_extra_label("ADDED"));
}

#[tokio::test]
async fn diff_mode_filters_to_changed_paths_and_ancestors() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    std::fs::create_dir(root.join("src")).unwrap();
    std::fs::write(root.join("src/main.py"), SAMPLE_MAIN_PY).unwrap();
    std::fs::write(root.join("src/other.py"), "def other():\n    pass\n").unwrap();

    let mut config = ProjectConfig::new(&root);
    config.hierarchy_only = true;

    let main_uri = ident::path_to_uri(&root.join("src/main.py"));
    let diffs = vec![FileDiff {
        path: main_uri.clone(),
        diff_text: String::new(),
        change_type: ChangeType::Modified,
    }];
    let builder = DiffGraphBuilder::new(config, diffs).unwrap();
    let mut backend = StubBackend::default();
    let update = builder.build(&mut backend, &[]).await;

    // Changed file and its ancestor folders survive; siblings do not.
    assert!(update.graph.file_at(&main_uri).is_some());
    assert!(update
        .graph
        .file_at(&ident::path_to_uri(&root.join("src/other.py")))
        .is_none());
    assert!(update.graph.has_folder_at(&ident::path_to_uri(&root.join("src"))));
    assert!(update.graph.has_folder_at(&ident::path_to_uri(&root)));
}

#[tokio::test]
async fn diff_mode_with_empty_previous_matches_filtered_full_build() {
    let (_tmp, root) = sample_project();
    let mut config = ProjectConfig::new(&root);
    config.hierarchy_only = true;

    let main_uri = ident::path_to_uri(&root.join("src/main.py"));
    let builder = DiffGraphBuilder::new(
        config.clone(),
        vec![FileDiff {
            path: main_uri.clone(),
            diff_text: String::new(),
            change_type: ChangeType::Modified,
        }],
    )
    .unwrap();
    let mut backend = StubBackend::default();
    let update = builder.build(&mut backend, &[]).await;

    let full_builder = GraphBuilder::new(config).unwrap();
    let (full, _) = full_builder.build_hierarchy();
    let keep: std::collections::HashSet<String> = [
        ident::path_to_uri(&root),
        ident::path_to_uri(&root.join("src")),
        main_uri,
    ]
    .into();
    let filtered = full.filter_by_paths(&keep);

    let diff_ids: std::collections::BTreeSet<String> =
        update.graph.all_nodes().map(|n| n.id.clone()).collect();
    let filtered_ids: std::collections::BTreeSet<String> =
        filtered.all_nodes().map(|n| n.id.clone()).collect();
    assert_eq!(diff_ids, filtered_ids);
}

#[tokio::test]
async fn deleted_files_get_synthetic_nodes_and_edges() {
    let (_tmp, root) = sample_project();
    let mut config = ProjectConfig::new(&root);
    config.hierarchy_only = true;
    config.diff_identifier = "pr-2".to_string();

    let gone = root.join("src/gone.py");
    let builder = DiffGraphBuilder::new(
        config.clone(),
        vec![FileDiff {
            path: ident::path_to_uri(&gone),
            diff_text: String::new(),
            change_type: ChangeType::Deleted,
        }],
    )
    .unwrap();
    let mut backend = StubBackend::default();
    let update = builder.build(&mut backend, &[]).await;

    let deleted_nodes = update.graph.by_label(NodeLabel::Deleted);
    assert_eq!(deleted_nodes.len(), 1);

    let deleted_edges: Vec<_> = update
        .external
        .relationships()
        .iter()
        .filter(|edge| edge.rel_type == RelationshipType::Deleted)
        .collect();
    assert_eq!(deleted_edges.len(), 1);

    // The edge source is the stable file id under the base environment.
    let base_environment = config.validated().unwrap().base_environment();
    let expected = ident::content_hash(&ident::stable_file_id(&base_environment, &gone));
    assert_eq!(deleted_edges[0].source_hash, expected);
    assert_eq!(deleted_edges[0].target_hash, deleted_nodes[0].hashed_id());
}

#[tokio::test]
async fn deleted_definitions_get_synthetic_nodes() {
    let (_tmp, root) = sample_project();
    let mut config = ProjectConfig::new(&root);
    config.hierarchy_only = true;

    let uri = ident::path_to_uri(&root.join("src/main.py"));
    let builder = DiffGraphBuilder::new(
        config.clone(),
        vec![FileDiff {
            path: uri,
            diff_text: String::new(),
            change_type: ChangeType::Modified,
        }],
    )
    .unwrap();

    let previous = vec![PreviousNodeState {
        node_path: format!(
            "{}#Vanished",
            ident::stable_file_id(
                &config.clone().validated().unwrap().base_environment(),
                &root.join("src/main.py")
            )
        ),
        code_text: "class Vanished:\n    pass".to_string(),
    }];
    let mut backend = StubBackend::default();
    let update = builder.build(&mut backend, &previous).await;

    // The synthetic node survives path filtering and the DELETED edge
    // points from the previous node's hash to it.
    let deleted_nodes = update.graph.by_label(NodeLabel::Deleted);
    assert_eq!(deleted_nodes.len(), 1);
    let edges = update.external.relationships();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].rel_type, RelationshipType::Deleted);
    assert_eq!(edges[0].target_hash, deleted_nodes[0].hashed_id());
}

#[tokio::test]
async fn diff_resolution_set_follows_definition_queries() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    std::fs::create_dir(root.join("src")).unwrap();
    std::fs::write(root.join("src/a.py"), "class Base:\n    pass\n").unwrap();
    std::fs::write(
        root.join("src/b.py"),
        "from a import Base\n\n\nclass Child(Base):\n    pass\n",
    )
    .unwrap();

    let config = ProjectConfig::new(&root);
    let a_uri = ident::path_to_uri(&root.join("src/a.py"));
    let b_uri = ident::path_to_uri(&root.join("src/b.py"));

    let builder = DiffGraphBuilder::new(
        config,
        vec![FileDiff {
            path: b_uri.clone(),
            diff_text: String::new(),
            change_type: ChangeType::Modified,
        }],
    )
    .unwrap();

    let mut backend = StubBackend::default();
    // Identifier `Base` in b.py resolves to a definition in a.py, pulling
    // a.py into the resolution set; Base's references then come back.
    for (line, character) in [(0u32, 14u32), (3, 12)] {
        backend
            .definitions
            .entry(("src/b.py".to_string(), line, character))
            .or_default()
            .push(ReferenceLocation {
                uri: a_uri.clone(),
                start: Point::new(0, 6),
                end: Point::new(0, 10),
            });
    }
    backend.reference(("src/a.py", 0, 6), &b_uri, (3, 12), (3, 16));

    let update = builder.build(&mut backend, &[]).await;
    let inherits: Vec<_> = update
        .graph
        .reference_edges()
        .iter()
        .filter(|edge| edge.rel_type == RelationshipType::Inherits)
        .collect();
    assert_eq!(inherits.len(), 1);
}
