//! Integration tests for Graft
//!
//! These drive the full pipeline through the public crate surfaces the
//! way the CLI does, against projects written to disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use graft_core::{ident, Point};
use graft_indexer::{ChangeType, DiffGraphBuilder, FileDiff, GraphBuilder, ProjectConfig};
use graft_lsp::{ReferenceBackend, ReferenceLocation, ServerSpec};

/// Scripted backend keyed by `(relative path, line, character)`.
#[derive(Default)]
struct ScriptedBackend {
    references: HashMap<(String, u32, u32), Vec<ReferenceLocation>>,
}

#[async_trait]
impl ReferenceBackend for ScriptedBackend {
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
        _relative_path: &str,
        _position: Point,
    ) -> Vec<ReferenceLocation> {
        Vec::new()
    }
}

/// A polyglot sample project: python, javascript, a binary blob, and an
/// ignored directory.
fn write_sample_project(root: &Path) {
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::create_dir_all(root.join("web")).unwrap();
    std::fs::create_dir_all(root.join("logs")).unwrap();
    std::fs::write(root.join(".gitignore"), "logs/\n").unwrap();
    std::fs::write(
        root.join("src/main.py"),
        "def greet(name):\n    return \"hi \" + name\n\n\nclass Greeter:\n    def greet(self, name):\n        return greet(name)\n",
    )
    .unwrap();
    std::fs::write(
        root.join("web/app.js"),
        "class App {\n  run() {\n    return 1;\n  }\n}\n\nconst start = () => new App();\n",
    )
    .unwrap();
    std::fs::write(root.join("assets.bin"), [0u8, 250, 251]).unwrap();
    std::fs::write(root.join("logs/build.log"), "noise\n").unwrap();
}

fn sample_root() -> (tempfile::TempDir, PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    write_sample_project(&root);
    (tmp, root)
}

#[tokio::test]
async fn full_pipeline_produces_a_loadable_export() {
    let (_tmp, root) = sample_root();
    let builder = GraphBuilder::new(ProjectConfig::new(&root)).unwrap();
    let main_uri = ident::path_to_uri(&root.join("src/main.py"));

    let mut backend = ScriptedBackend::default();
    backend.references.insert(
        ("src/main.py".to_string(), 0, 4),
        vec![ReferenceLocation {
            uri: main_uri.clone(),
            start: Point::new(6, 15),
            end: Point::new(6, 20),
        }],
    );

    let (graph, _parse_store) = builder.build(&mut backend).await;
    let export = graph.export();

    // Folders, files and definitions from both languages are present.
    let types: Vec<&str> = export
        .nodes
        .iter()
        .map(|node| node["type"].as_str().unwrap())
        .collect();
    assert!(types.contains(&"FOLDER"));
    assert!(types.contains(&"FILE"));
    assert!(types.contains(&"CLASS"));
    assert!(types.contains(&"FUNCTION"));

    // The ignored logs/ directory never made it in.
    for node in &export.nodes {
        let path = node["attributes"]["path"].as_str().unwrap();
        assert!(!path.contains("/logs"), "ignored path exported: {path}");
    }

    // The binary file is a RAW leaf.
    let raw: Vec<_> = export
        .nodes
        .iter()
        .filter(|node| {
            node["extra_labels"]
                .as_array()
                .unwrap()
                .iter()
                .any(|label| label == "RAW")
        })
        .collect();
    assert_eq!(raw.len(), 2); // assets.bin and .gitignore
    assert!(raw
        .iter()
        .any(|node| node["attributes"]["name"] == "assets.bin"));

    // The scripted CALLS reference survives to the edge list with hashed
    // endpoint ids.
    let calls: Vec<_> = export
        .edges
        .iter()
        .filter(|edge| edge["type"] == "CALLS")
        .collect();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["scopeText"], "greet(name)");
    let ids: Vec<&str> = export
        .nodes
        .iter()
        .map(|node| node["attributes"]["node_id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&calls[0]["sourceId"].as_str().unwrap()));
    assert!(ids.contains(&calls[0]["targetId"].as_str().unwrap()));

    // Javascript definitions made it: the class, its method, and the
    // arrow-function declarator.
    let js_names: Vec<&str> = export
        .nodes
        .iter()
        .filter(|node| {
            node["attributes"]["path"]
                .as_str()
                .unwrap()
                .ends_with("app.js")
                && node["type"] != "FILE"
        })
        .map(|node| node["attributes"]["name"].as_str().unwrap())
        .collect();
    assert!(js_names.contains(&"App"));
    assert!(js_names.contains(&"run"));
    assert!(js_names.contains(&"start"));
}

#[tokio::test]
async fn export_to_disk_writes_both_lists() {
    let (_tmp, root) = sample_root();
    let mut config = ProjectConfig::new(&root);
    config.hierarchy_only = true;

    let builder = GraphBuilder::new(config).unwrap();
    let (graph, _) = builder.build_hierarchy();

    let out = tempfile::tempdir().unwrap();
    graph.export().write_to(out.path()).unwrap();

    let nodes: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.path().join("nodes.json")).unwrap())
            .unwrap();
    let edges: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.path().join("edges.json")).unwrap())
            .unwrap();
    assert!(nodes.as_array().unwrap().len() > 5);
    assert!(edges.as_array().unwrap().iter().all(|edge| {
        edge.get("sourceId").is_some() && edge.get("targetId").is_some() && edge.get("type").is_some()
    }));
}

#[tokio::test]
async fn diff_pipeline_exports_external_edges() {
    let (_tmp, root) = sample_root();
    let mut config = ProjectConfig::new(&root);
    config.hierarchy_only = true;
    config.diff_identifier = "pr-9".to_string();

    let gone_uri = ident::path_to_uri(&root.join("src/removed.py"));
    let builder = DiffGraphBuilder::new(
        config,
        vec![
            FileDiff {
                path: ident::path_to_uri(&root.join("src/main.py")),
                diff_text: "@@ -1 +1 @@".to_string(),
                change_type: ChangeType::Modified,
            },
            FileDiff {
                path: gone_uri,
                diff_text: String::new(),
                change_type: ChangeType::Deleted,
            },
        ],
    )
    .unwrap();

    let mut backend = ScriptedBackend::default();
    let update = builder.build(&mut backend, &[]).await;
    let export = update.export();

    // The web/ sibling is filtered out; the changed file's nodes are
    // DIFF-tagged; the deleted file produced an external DELETED edge.
    assert!(export
        .nodes
        .iter()
        .all(|node| !node["attributes"]["path"].as_str().unwrap().contains("/web")));
    assert!(export.nodes.iter().any(|node| {
        node["extra_labels"]
            .as_array()
            .unwrap()
            .iter()
            .any(|label| label == "DIFF")
    }));
    assert_eq!(
        export
            .edges
            .iter()
            .filter(|edge| edge["type"] == "DELETED")
            .count(),
        1
    );
}
