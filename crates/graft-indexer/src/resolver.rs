//! Reference resolver — typed edges from LSP reference sites

use std::path::Path;

use graft_core::{ident, GraphStore, NodeLabel, Point, Relationship, RelationshipType};
use graft_lsp::{ReferenceBackend, ReferenceLocation};

use crate::extractor::ParseStore;
use crate::languages::{LanguageRegistry, LanguageRules};
use crate::orchestrator::CancellationFlag;

/// Snapshot of one definition taken before querying the backend, so the
/// store stays borrowable while edges accumulate.
#[derive(Debug, Clone)]
struct DefinitionSite {
    id: String,
    label: NodeLabel,
    uri: String,
    extension: String,
    /// Start of the identifier token, zero-based line / UTF-16 column.
    position: Point,
}

/// For every definition in the graph, asks the backend for its reference
/// sites and reclassifies each back-edge by the syntactic context at the
/// referring site.
pub struct ReferenceResolver<'r> {
    registry: &'r LanguageRegistry,
}

impl<'r> ReferenceResolver<'r> {
    pub fn new(registry: &'r LanguageRegistry) -> Self {
        ReferenceResolver { registry }
    }

    /// Resolve references for `file_uris` (or every file in the graph)
    /// and insert the resulting edges. One definition at a time; the
    /// backend owns all concurrency. Cancellation stops the loop at the
    /// next definition and keeps the edges gathered so far.
    #[allow(clippy::too_many_arguments)]
    pub async fn resolve(
        &self,
        graph: &mut GraphStore,
        parse_store: &ParseStore,
        backend: &mut (dyn ReferenceBackend + Send),
        root: &Path,
        file_uris: Option<Vec<String>>,
        cancellation: &CancellationFlag,
    ) {
        let files: Vec<(String, String)> = match file_uris {
            Some(uris) => uris
                .into_iter()
                .filter_map(|uri| graph.file_at(&uri).map(|node| (uri, node.name.clone())))
                .collect(),
            None => graph
                .by_label(NodeLabel::File)
                .iter()
                .map(|node| (node.path.clone(), node.name.clone()))
                .collect(),
        };

        let total = files.len();
        let log_interval = (total / 10).max(1);
        let mut relationships = Vec::new();

        'files: for (index, (uri, name)) in files.iter().enumerate() {
            if index % log_interval == 0 {
                tracing::info!(
                    "processing file {}: {}/{} -- {:.2}%",
                    name,
                    index + 1,
                    total,
                    100.0 * index as f64 / total.max(1) as f64
                );
            }

            let definitions: Vec<DefinitionSite> = graph
                .nodes_at(uri)
                .iter()
                .filter(|node| node.is_definition())
                .filter_map(|node| {
                    let range = node.definition_range?;
                    Some(DefinitionSite {
                        id: node.id.clone(),
                        label: node.label,
                        uri: node.path.clone(),
                        extension: node.extension(),
                        position: range.start,
                    })
                })
                .collect();

            for definition in definitions {
                if cancellation.is_cancelled() {
                    tracing::warn!("cancellation requested, stopping reference resolution");
                    break 'files;
                }
                if !self.registry.supports(&definition.extension) {
                    continue;
                }
                let rules = self.registry.rules_for(&definition.extension).clone();
                let spec = rules.server_spec();
                let relative = ident::relative_path_from_root(root, &ident::uri_to_path(&definition.uri));

                tracing::debug!(definition = %definition.id, "resolving references");
                let references = backend.references(&spec, &relative, definition.position).await;
                for reference in references {
                    if let Some(edge) =
                        classify_reference_site(graph, parse_store, &definition, &reference, rules.as_ref())
                    {
                        relationships.push(edge);
                    }
                }
            }
        }

        tracing::info!(count = relationships.len(), "reference edges resolved");
        graph.add_reference_edges(relationships);
    }
}

/// Turn one reference site into a typed edge, or nothing when the site
/// is outside the graph, is a self-reference, or cannot be located.
fn classify_reference_site(
    graph: &GraphStore,
    parse_store: &ParseStore,
    definition: &DefinitionSite,
    reference: &ReferenceLocation,
    rules: &dyn LanguageRules,
) -> Option<Relationship> {
    // Referring sites in files outside the graph are dropped silently.
    graph.file_at(&reference.uri)?;
    let parsed = parse_store.get(&reference.uri)?;

    let start_byte = parsed.line_index.byte_of(&parsed.source, reference.start);
    let end_byte = parsed.line_index.byte_of(&parsed.source, reference.end);

    let referrer = graph.node_enclosing(&reference.uri, start_byte, end_byte)?;
    if referrer.id == definition.id {
        return None;
    }

    let landing = parsed.landing_node(reference.start, reference.end)?;
    let mut scope = None;
    let mut kind = None;
    let mut current = Some(landing);
    while let Some(node) = current {
        if let Some(found) = rules.classify_reference(definition.label, &node) {
            kind = Some(found);
            scope = Some(node);
            break;
        }
        current = node.parent();
    }

    let scope_text = scope
        .and_then(|node| node.utf8_text(parsed.source.as_bytes()).ok())
        .unwrap_or_default()
        .to_string();

    Some(
        Relationship::new(
            referrer.id.clone(),
            definition.id.clone(),
            kind.unwrap_or(RelationshipType::Uses),
        )
        .with_scope(scope_text),
    )
}
