//! Graph store — node arena with identity, path and label indices

use std::collections::{HashMap, HashSet};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::export::GraphExport;
use crate::model::{NodeLabel, RelationshipType};
use crate::node::GraphNode;
use crate::relationship::Relationship;

/// The code graph. Hierarchy edges (CONTAINS, *_DEFINITION) live in the
/// petgraph arena and are owned by parent nodes; resolver-derived
/// reference edges live in a dedicated collection keyed by identifier.
///
/// Accessed from a single writer; no internal locking.
#[derive(Default)]
pub struct GraphStore {
    inner: StableDiGraph<GraphNode, RelationshipType>,
    by_id: HashMap<String, NodeIndex>,
    by_relative_id: HashMap<String, NodeIndex>,
    /// All nodes sharing a `file://` path, in insertion (pre-order) order.
    by_path: HashMap<String, Vec<NodeIndex>>,
    folders_by_path: HashMap<String, NodeIndex>,
    files_by_path: HashMap<String, NodeIndex>,
    by_label: HashMap<NodeLabel, Vec<NodeIndex>>,
    references: Vec<Relationship>,
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("node_count", &self.inner.node_count())
            .field("hierarchy_edge_count", &self.inner.edge_count())
            .field("reference_edge_count", &self.references.len())
            .finish()
    }
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, idempotent by identifier. Re-insertion replaces the
    /// node's attributes but preserves hierarchy edges and indices.
    pub fn insert(&mut self, node: GraphNode) -> NodeIndex {
        if let Some(&idx) = self.by_id.get(&node.id) {
            let old_label = self.inner[idx].label;
            if old_label != node.label {
                if let Some(entries) = self.by_label.get_mut(&old_label) {
                    entries.retain(|&e| e != idx);
                }
                self.by_label.entry(node.label).or_default().push(idx);
            }
            self.inner[idx] = node;
            return idx;
        }

        let id = node.id.clone();
        let relative = node.relative_id.clone();
        let path = node.path.clone();
        let label = node.label;
        let idx = self.inner.add_node(node);

        self.by_id.insert(id, idx);
        self.by_relative_id.insert(relative, idx);
        self.by_path.entry(path.clone()).or_default().push(idx);
        match label {
            NodeLabel::Folder => {
                self.folders_by_path.insert(path, idx);
            }
            NodeLabel::File => {
                self.files_by_path.insert(path, idx);
            }
            _ => {}
        }
        self.by_label.entry(label).or_default().push(idx);
        idx
    }

    /// Attach a hierarchy edge from parent to child. Both endpoints must
    /// already be in the store.
    pub fn add_hierarchy_edge(
        &mut self,
        parent_id: &str,
        child_id: &str,
        rel_type: RelationshipType,
    ) -> bool {
        debug_assert!(rel_type.is_hierarchy());
        let (Some(&parent), Some(&child)) = (self.by_id.get(parent_id), self.by_id.get(child_id))
        else {
            tracing::warn!(parent_id, child_id, "hierarchy edge endpoint missing, dropped");
            return false;
        };
        let duplicate = self
            .inner
            .edges_directed(parent, Direction::Outgoing)
            .any(|edge| edge.target() == child && *edge.weight() == rel_type);
        if duplicate {
            return true;
        }
        self.inner.add_edge(parent, child, rel_type);
        if rel_type == RelationshipType::FunctionDefinition
            && self.inner[parent].label == NodeLabel::Class
        {
            self.inner[parent].methods_defined += 1;
        }
        true
    }

    /// Store resolver-derived edges. Self-loops and edges with endpoints
    /// missing from the store are discarded.
    pub fn add_reference_edges(&mut self, edges: Vec<Relationship>) {
        for edge in edges {
            if edge.source_id == edge.target_id {
                continue;
            }
            if !self.by_id.contains_key(&edge.source_id) || !self.by_id.contains_key(&edge.target_id)
            {
                tracing::warn!(
                    source = %edge.source_id,
                    target = %edge.target_id,
                    "reference edge endpoint not in graph, dropped"
                );
                continue;
            }
            self.references.push(edge);
        }
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.by_id.get(id).map(|&idx| &self.inner[idx])
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut GraphNode> {
        let idx = self.by_id.get(id).copied()?;
        self.inner.node_weight_mut(idx)
    }

    pub fn by_relative_id(&self, relative_id: &str) -> Option<&GraphNode> {
        self.by_relative_id.get(relative_id).map(|&idx| &self.inner[idx])
    }

    pub fn has_folder_at(&self, path: &str) -> bool {
        self.folders_by_path.contains_key(path)
    }

    pub fn folder_at(&self, path: &str) -> Option<&GraphNode> {
        self.folders_by_path.get(path).map(|&idx| &self.inner[idx])
    }

    pub fn file_at(&self, path: &str) -> Option<&GraphNode> {
        self.files_by_path.get(path).map(|&idx| &self.inner[idx])
    }

    /// All nodes whose path equals `path`, in insertion order (the file
    /// first, then its definitions in pre-order).
    pub fn nodes_at(&self, path: &str) -> Vec<&GraphNode> {
        self.by_path
            .get(path)
            .map(|indices| indices.iter().map(|&idx| &self.inner[idx]).collect())
            .unwrap_or_default()
    }

    /// Nodes carrying `label`, in insertion order.
    pub fn by_label(&self, label: NodeLabel) -> Vec<&GraphNode> {
        self.by_label
            .get(&label)
            .map(|indices| indices.iter().map(|&idx| &self.inner[idx]).collect())
            .unwrap_or_default()
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.inner.node_indices().map(|idx| &self.inner[idx])
    }

    /// The smallest definition at `path` whose node range contains the
    /// byte range, or the file itself when no definition does.
    pub fn node_enclosing(&self, path: &str, start_byte: usize, end_byte: usize) -> Option<&GraphNode> {
        let mut best: Option<&GraphNode> = None;
        for node in self.nodes_at(path) {
            if !node.is_definition() && node.label != NodeLabel::File {
                continue;
            }
            let Some(range) = node.node_range else {
                if node.label == NodeLabel::File && best.is_none() {
                    best = Some(node);
                }
                continue;
            };
            if range.contains_bytes(start_byte, end_byte) {
                let better = match best.and_then(|b| b.node_range) {
                    Some(current) => range.len() <= current.len(),
                    None => true,
                };
                if better {
                    best = Some(node);
                }
            } else if node.label == NodeLabel::File && best.is_none() {
                best = Some(node);
            }
        }
        best
    }

    /// Identifiers of a node's hierarchy children, in edge insertion order.
    pub fn children_of(&self, id: &str) -> Vec<&GraphNode> {
        let Some(&idx) = self.by_id.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<_> = self
            .inner
            .edges_directed(idx, Direction::Outgoing)
            .map(|edge| (edge.id().index(), edge.target()))
            .collect();
        edges.sort_by_key(|&(order, _)| order);
        edges.into_iter().map(|(_, target)| &self.inner[target]).collect()
    }

    pub fn reference_edges(&self) -> &[Relationship] {
        &self.references
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn hierarchy_edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Serialize nodes and all edges into the uniform object
    /// representation. Hierarchy edges always have live endpoints;
    /// reference edges whose target left the graph are dropped with a
    /// warning while the source survives.
    pub fn export(&self) -> GraphExport {
        let nodes = self
            .inner
            .node_indices()
            .map(|idx| self.inner[idx].as_object())
            .collect();

        let mut edges = Vec::new();
        for edge_id in self.inner.edge_indices() {
            let Some((source, target)) = self.inner.edge_endpoints(edge_id) else {
                continue;
            };
            let kind = *self.inner.edge_weight(edge_id).expect("edge exists");
            let source = &self.inner[source];
            let target = &self.inner[target];
            edges.push(Relationship::new(source.id.clone(), target.id.clone(), kind).as_object());
        }
        for edge in &self.references {
            if !self.by_id.contains_key(&edge.source_id) {
                tracing::warn!(source = %edge.source_id, "dropping edge without source node");
                continue;
            }
            if !self.by_id.contains_key(&edge.target_id) {
                tracing::warn!(target = %edge.target_id, "dropping edge without target node");
                continue;
            }
            edges.push(edge.as_object());
        }

        GraphExport { nodes, edges }
    }

    /// A new store retaining only nodes whose path is in `keep`.
    /// Hierarchy edges are pruned to surviving endpoints; reference edges
    /// survive when at least one endpoint's path is kept.
    pub fn filter_by_paths(&self, keep: &HashSet<String>) -> GraphStore {
        let mut filtered = GraphStore::new();

        for idx in self.inner.node_indices() {
            let node = &self.inner[idx];
            if keep.contains(&node.path) {
                let mut node = node.clone();
                // Recounted as surviving definition edges are re-added.
                node.methods_defined = 0;
                filtered.insert(node);
            }
        }

        for edge_id in self.inner.edge_indices() {
            let Some((source, target)) = self.inner.edge_endpoints(edge_id) else {
                continue;
            };
            let kind = *self.inner.edge_weight(edge_id).expect("edge exists");
            let source = &self.inner[source];
            let target = &self.inner[target];
            if keep.contains(&source.path) && keep.contains(&target.path) {
                filtered.add_hierarchy_edge(&source.id, &target.id, kind);
            }
        }

        for edge in &self.references {
            let source_kept = self
                .node(&edge.source_id)
                .map(|n| keep.contains(&n.path))
                .unwrap_or(false);
            let target_kept = self
                .node(&edge.target_id)
                .map(|n| keep.contains(&n.path))
                .unwrap_or(false);
            if source_kept || target_kept {
                filtered.references.push(edge.clone());
            }
        }

        filtered
    }
}
