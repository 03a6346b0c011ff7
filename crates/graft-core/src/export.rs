//! Serialized graph output for bulk loading

use std::path::Path;

use serde_json::Value;

use crate::graph::GraphStore;
use crate::relationship::ExternalRelationshipStore;

/// The two lists consumed by database bulk-loading adapters.
#[derive(Debug, Clone, Default)]
pub struct GraphExport {
    pub nodes: Vec<Value>,
    pub edges: Vec<Value>,
}

impl GraphExport {
    /// Write `nodes.json` and `edges.json` under `dir`.
    pub fn write_to(&self, dir: &Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(dir)?;
        let nodes_path = dir.join("nodes.json");
        let edges_path = dir.join("edges.json");
        std::fs::write(&nodes_path, serde_json::to_string_pretty(&self.nodes)?)?;
        std::fs::write(&edges_path, serde_json::to_string_pretty(&self.edges)?)?;
        tracing::info!(
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            dir = %dir.display(),
            "graph export written"
        );
        Ok(())
    }
}

/// Result of a diff-mode run: the filtered graph plus the external
/// MODIFIED/DELETED edges that reference nodes from other environments.
#[derive(Debug)]
pub struct GraphUpdate {
    pub graph: GraphStore,
    pub external: ExternalRelationshipStore,
}

impl GraphUpdate {
    pub fn new(graph: GraphStore, external: ExternalRelationshipStore) -> Self {
        GraphUpdate { graph, external }
    }

    /// Export the graph with external relationships appended to the edge
    /// list.
    pub fn export(&self) -> GraphExport {
        let mut export = self.graph.export();
        for edge in self.external.relationships() {
            export.edges.push(edge.as_object());
        }
        export
    }
}
