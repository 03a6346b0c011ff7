//! Orchestrator — sequences walk, extraction and resolution

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use graft_core::{ident, GraphEnvironment, GraphNode, GraphStore, RelationshipType};
use graft_lsp::ReferenceBackend;

use crate::config::{ConfigError, ProjectConfig};
use crate::extractor::{ParseStore, SyntaxExtractor};
use crate::ignore_rules::IgnoreEngine;
use crate::languages::LanguageRegistry;
use crate::resolver::ReferenceResolver;
use crate::walker::{FolderRecord, ProjectWalker};

/// Cooperatively checked stop signal for an orchestration run, flipped
/// from an interrupt handler. The pipeline stops at the next file or
/// definition boundary and returns whatever the graph holds so far;
/// callers then shut the LSP pool down and export the partial result.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Drives one full run: walk the project, extract the hierarchy into the
/// store, then resolve references through the backend. The whole pipeline
/// is single-writer; the only suspension points are backend requests.
pub struct GraphBuilder {
    config: ProjectConfig,
    registry: LanguageRegistry,
    environment: GraphEnvironment,
    cancellation: CancellationFlag,
}

impl GraphBuilder {
    pub fn new(config: ProjectConfig) -> Result<Self, ConfigError> {
        let config = config.validated()?;
        let environment = config.environment();
        tracing::info!(
            root = %config.root_path.display(),
            environment = %environment,
            "graph builder initialized"
        );
        Ok(GraphBuilder {
            registry: LanguageRegistry::new(),
            environment,
            config,
            cancellation: CancellationFlag::new(),
        })
    }

    /// Observe cancellation through `flag` instead of a private one.
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = flag;
        self
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub fn environment(&self) -> &GraphEnvironment {
        &self.environment
    }

    pub fn cancellation(&self) -> CancellationFlag {
        self.cancellation.clone()
    }

    /// Full pipeline. With `hierarchy_only` set the backend is never
    /// touched.
    pub async fn build(
        &self,
        backend: &mut (dyn ReferenceBackend + Send),
    ) -> (GraphStore, ParseStore) {
        let (mut graph, parse_store) = self.build_hierarchy();
        if self.config.hierarchy_only {
            tracing::info!("hierarchy-only run, skipping reference resolution");
            return (graph, parse_store);
        }

        let resolver = ReferenceResolver::new(&self.registry);
        resolver
            .resolve(
                &mut graph,
                &parse_store,
                backend,
                &self.config.root_path,
                None,
                &self.cancellation,
            )
            .await;
        (graph, parse_store)
    }

    /// Folders, files and definitions only. The returned [`ParseStore`]
    /// keeps each parsed file's tree alive for a later resolver pass.
    pub fn build_hierarchy(&self) -> (GraphStore, ParseStore) {
        let started = Instant::now();
        let ignore = IgnoreEngine::new(&self.config);
        let extractor = SyntaxExtractor::new(&self.registry, self.environment.clone());
        let mut graph = GraphStore::new();
        let mut parse_store = ParseStore::new();

        for record in ProjectWalker::new(&ignore) {
            if self.cancellation.is_cancelled() {
                tracing::warn!("cancellation requested, stopping hierarchy extraction");
                break;
            }
            self.process_folder(&record, &extractor, &mut graph, &mut parse_store);
        }

        tracing::info!(
            nodes = graph.node_count(),
            files = parse_store.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "code hierarchy built"
        );
        (graph, parse_store)
    }

    fn process_folder(
        &self,
        record: &FolderRecord,
        extractor: &SyntaxExtractor<'_>,
        graph: &mut GraphStore,
        parse_store: &mut ParseStore,
    ) {
        let folder_id = self.ensure_folder_chain(graph, &record.path);

        for subfolder in &record.subfolders {
            let uri = subfolder.uri();
            if graph.has_folder_at(&uri) {
                continue;
            }
            let parent = graph.node(&folder_id).expect("chain ensured").clone();
            let node = GraphNode::folder(
                &self.environment,
                subfolder.name.clone(),
                uri,
                subfolder.level,
                Some(&parent),
            );
            let id = node.id.clone();
            graph.insert(node);
            graph.add_hierarchy_edge(&parent.id, &id, RelationshipType::Contains);
        }

        let parent = graph.node(&folder_id).expect("chain ensured").clone();
        for file in &record.files {
            let result = extractor.extract_file(file, &parent, parse_store);
            let file_id = result.nodes[0].id.clone();
            for node in result.nodes {
                graph.insert(node);
            }
            graph.add_hierarchy_edge(&parent.id, &file_id, RelationshipType::Contains);
            for (parent_id, child_id, kind) in result.edges {
                graph.add_hierarchy_edge(&parent_id, &child_id, kind);
            }
        }
    }

    /// Get-or-create folder nodes from the root down to `path`, returning
    /// the deepest one's identifier. Creates intermediate folders that the
    /// walker never emitted (e.g. ignored parents of rescued files).
    fn ensure_folder_chain(&self, graph: &mut GraphStore, path: &Path) -> String {
        let root = &self.config.root_path;
        let root_uri = ident::path_to_uri(root);
        let root_name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root_uri.clone());

        let mut current_id = match graph.folder_at(&root_uri) {
            Some(node) => node.id.clone(),
            None => {
                let node = GraphNode::folder(&self.environment, root_name, root_uri.clone(), 0, None);
                let id = node.id.clone();
                graph.insert(node);
                id
            }
        };

        let Ok(relative) = path.strip_prefix(root) else {
            return current_id;
        };
        let mut current_path = root.to_path_buf();
        let mut level = 0u32;
        for component in relative.components() {
            current_path.push(component);
            level += 1;
            let uri = ident::path_to_uri(&current_path);
            current_id = match graph.folder_at(&uri) {
                Some(node) => node.id.clone(),
                None => {
                    let parent = graph.node(&current_id).expect("parent exists").clone();
                    let name = component.as_os_str().to_string_lossy().into_owned();
                    let node =
                        GraphNode::folder(&self.environment, name, uri, level, Some(&parent));
                    let id = node.id.clone();
                    graph.insert(node);
                    graph.add_hierarchy_edge(&parent.id, &id, RelationshipType::Contains);
                    id
                }
            };
        }
        current_id
    }
}
