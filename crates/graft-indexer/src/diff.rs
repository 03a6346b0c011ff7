//! Diff orchestrator — partial rebuild for a set of changed files

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use graft_core::{
    ident, ExternalRelationshipStore, GraphNode, GraphStore, GraphUpdate, RelationshipType,
};
use graft_lsp::ReferenceBackend;

use crate::config::{ConfigError, ProjectConfig};
use crate::extractor::{collect_identifiers, ParseStore};
use crate::orchestrator::{CancellationFlag, GraphBuilder};
use crate::resolver::ReferenceResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

impl ChangeType {
    pub fn label(&self) -> &'static str {
        match self {
            ChangeType::Added => "ADDED",
            ChangeType::Modified => "MODIFIED",
            ChangeType::Deleted => "DELETED",
        }
    }
}

/// One changed file in the working tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDiff {
    /// `file://` URI of the changed file.
    pub path: String,
    /// Unified diff text, carried onto the affected nodes.
    #[serde(default)]
    pub diff_text: String,
    pub change_type: ChangeType,
}

/// A definition as it existed before the change, for MODIFIED/DELETED
/// detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviousNodeState {
    /// Full identifier of the previous node (any environment).
    pub node_path: String,
    pub code_text: String,
}

impl PreviousNodeState {
    pub fn relative_id(&self) -> String {
        ident::relative_id(&self.node_path)
    }

    pub fn hashed_id(&self) -> String {
        ident::content_hash(&self.node_path)
    }
}

/// Wraps the full pipeline for incremental runs: rebuilds the hierarchy,
/// labels changed nodes, diffs against previous node states, restricts
/// resolution to the changed neighborhood, then filters the graph down to
/// the changed paths.
pub struct DiffGraphBuilder {
    builder: GraphBuilder,
    file_diffs: Vec<FileDiff>,
}

impl DiffGraphBuilder {
    /// `config.diff_identifier` names the diff environment; comparisons
    /// against the stable graph use [`ProjectConfig::base_environment`].
    pub fn new(config: ProjectConfig, file_diffs: Vec<FileDiff>) -> Result<Self, ConfigError> {
        Ok(DiffGraphBuilder {
            builder: GraphBuilder::new(config)?,
            file_diffs,
        })
    }

    /// Observe cancellation through `flag` instead of a private one.
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.builder = self.builder.with_cancellation(flag);
        self
    }

    pub fn config(&self) -> &ProjectConfig {
        self.builder.config()
    }

    fn added_and_modified(&self) -> Vec<&FileDiff> {
        self.file_diffs
            .iter()
            .filter(|diff| {
                matches!(diff.change_type, ChangeType::Added | ChangeType::Modified)
            })
            .collect()
    }

    pub async fn build(
        &self,
        backend: &mut (dyn ReferenceBackend + Send),
        previous_node_states: &[PreviousNodeState],
    ) -> GraphUpdate {
        let (mut graph, parse_store) = self.builder.build_hierarchy();
        let mut external = ExternalRelationshipStore::new();
        let mut deleted_node_paths = Vec::new();

        self.mark_changed_nodes(&mut graph);
        if !previous_node_states.is_empty() {
            self.apply_previous_states(
                &mut graph,
                &mut external,
                &mut deleted_node_paths,
                previous_node_states,
            );
        }

        if !self.builder.config().hierarchy_only {
            let cancellation = self.builder.cancellation();
            let file_uris = self.resolution_set(&graph, &parse_store, backend).await;
            let resolver = ReferenceResolver::new(self.builder.registry());
            resolver
                .resolve(
                    &mut graph,
                    &parse_store,
                    backend,
                    &self.builder.config().root_path,
                    Some(file_uris),
                    &cancellation,
                )
                .await;
        }

        let mut graph = self.filter_to_changed(graph, &deleted_node_paths);
        self.add_deleted_file_edges(&mut graph, &mut external);
        GraphUpdate::new(graph, external)
    }

    /// Tag every node under added/modified paths with DIFF and carry the
    /// diff text down as an attribute.
    fn mark_changed_nodes(&self, graph: &mut GraphStore) {
        let diff_by_path: HashMap<&str, &str> = self
            .added_and_modified()
            .iter()
            .map(|diff| (diff.path.as_str(), diff.diff_text.as_str()))
            .collect();

        for (path, diff_text) in diff_by_path {
            let ids: Vec<String> = graph.nodes_at(path).iter().map(|n| n.id.clone()).collect();
            if ids.is_empty() {
                tracing::warn!(path, "changed path not present in rebuilt graph");
            }
            for id in ids {
                if let Some(node) = graph.node_mut(&id) {
                    node.add_extra_label("DIFF");
                    node.set_attribute("diff_text", diff_text);
                }
            }
        }
    }

    /// MODIFIED edges for changed definitions, ADDED labels for new ones,
    /// synthetic deleted nodes for definitions that vanished.
    fn apply_previous_states(
        &self,
        graph: &mut GraphStore,
        external: &mut ExternalRelationshipStore,
        deleted_node_paths: &mut Vec<String>,
        previous_node_states: &[PreviousNodeState],
    ) {
        for previous in previous_node_states {
            match graph.by_relative_id(&previous.relative_id()) {
                Some(node) if !node.is_code_text_equivalent(&previous.code_text) => {
                    let id = node.id.clone();
                    let hashed = node.hashed_id();
                    external.create_and_add(hashed, previous.hashed_id(), RelationshipType::Modified);
                    if let Some(node) = graph.node_mut(&id) {
                        node.add_extra_label(ChangeType::Modified.label());
                    }
                }
                Some(_) => {}
                None => {
                    let deleted = GraphNode::deleted(self.builder.environment());
                    deleted_node_paths.push(deleted.path.clone());
                    external.create_and_add(
                        previous.hashed_id(),
                        deleted.hashed_id(),
                        RelationshipType::Deleted,
                    );
                    graph.insert(deleted);
                }
            }
        }

        let previous_ids: HashSet<String> = previous_node_states
            .iter()
            .map(|previous| previous.relative_id())
            .collect();
        for diff in self.added_and_modified() {
            let fresh: Vec<String> = graph
                .nodes_at(&diff.path)
                .iter()
                .filter(|node| node.is_definition() && !previous_ids.contains(&node.relative_id))
                .map(|node| node.id.clone())
                .collect();
            for id in fresh {
                if let Some(node) = graph.node_mut(&id) {
                    node.add_extra_label(ChangeType::Added.label());
                }
            }
        }
    }

    /// Changed files plus the files they reference, found by running each
    /// changed file's identifiers through the backend's definition query.
    async fn resolution_set(
        &self,
        graph: &GraphStore,
        parse_store: &ParseStore,
        backend: &mut (dyn ReferenceBackend + Send),
    ) -> Vec<String> {
        let changed: Vec<String> = self
            .added_and_modified()
            .iter()
            .filter(|diff| graph.file_at(&diff.path).is_some())
            .map(|diff| diff.path.clone())
            .collect();

        let registry = self.builder.registry();
        let root = &self.builder.config().root_path;
        let cancellation = self.builder.cancellation();
        let mut referenced = BTreeSet::new();

        for uri in &changed {
            if cancellation.is_cancelled() {
                break;
            }
            // Raw files cannot be parsed, so they reference nothing.
            let Some(parsed) = parse_store.get(uri) else {
                continue;
            };
            let Some(file) = graph.file_at(uri) else {
                continue;
            };
            let extension = file.extension();
            if !registry.supports(&extension) {
                continue;
            }
            let spec = registry.rules_for(&extension).server_spec();
            let relative = ident::relative_path_from_root(root, &ident::uri_to_path(uri));

            let definition_ranges: HashSet<(usize, usize)> = graph
                .nodes_at(uri)
                .iter()
                .filter(|node| node.is_definition())
                .filter_map(|node| node.definition_range)
                .map(|range| (range.start_byte, range.end_byte))
                .collect();

            for span in collect_identifiers(parsed) {
                if definition_ranges.contains(&(span.start_byte, span.end_byte)) {
                    continue;
                }
                for location in backend.definition(&spec, &relative, span.start).await {
                    referenced.insert(location.uri);
                }
            }
        }

        let mut file_uris = changed.clone();
        file_uris.extend(
            referenced
                .into_iter()
                .filter(|uri| !changed.contains(uri)),
        );
        file_uris
    }

    /// Keep changed paths, their ancestor folders, and synthetic deleted
    /// nodes.
    fn filter_to_changed(&self, graph: GraphStore, deleted_node_paths: &[String]) -> GraphStore {
        let root_uri = ident::path_to_uri(&self.builder.config().root_path);
        let mut keep: HashSet<String> = HashSet::new();
        for diff in self.added_and_modified() {
            keep.insert(diff.path.clone());
            let mut current = diff.path.clone();
            while let Some(parent) = ident::parent_folder_uri(&current) {
                if !parent.starts_with(root_uri.as_str()) {
                    break;
                }
                keep.insert(parent.clone());
                current = parent;
            }
        }
        keep.extend(deleted_node_paths.iter().cloned());
        graph.filter_by_paths(&keep)
    }

    /// A DELETED edge from each removed file's stable identifier to a
    /// fresh synthetic node in the diff environment.
    fn add_deleted_file_edges(
        &self,
        graph: &mut GraphStore,
        external: &mut ExternalRelationshipStore,
    ) {
        let base_environment = self.builder.config().base_environment();
        for diff in &self.file_diffs {
            if diff.change_type != ChangeType::Deleted {
                continue;
            }
            let deleted = GraphNode::deleted(self.builder.environment());
            let original_path = ident::uri_to_path(&diff.path);
            let original_id = ident::stable_file_id(&base_environment, &original_path);
            external.create_and_add(
                ident::content_hash(&original_id),
                deleted.hashed_id(),
                RelationshipType::Deleted,
            );
            graph.insert(deleted);
        }
    }
}
