//! Typed edges between graph nodes

use serde_json::{json, Value};

use crate::ident;
use crate::model::RelationshipType;

/// A directed, typed edge keyed by the endpoints' identifiers. Used for
/// the reference graph (CALLS, IMPORTS, ...); hierarchy edges live inside
/// the store's arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub source_id: String,
    pub target_id: String,
    pub rel_type: RelationshipType,
    /// Text of the syntax node that determined the edge kind, empty when
    /// classification fell through to USES.
    pub scope_text: String,
}

impl Relationship {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        rel_type: RelationshipType,
    ) -> Self {
        Relationship {
            source_id: source_id.into(),
            target_id: target_id.into(),
            rel_type,
            scope_text: String::new(),
        }
    }

    pub fn with_scope(mut self, scope_text: impl Into<String>) -> Self {
        self.scope_text = scope_text.into();
        self
    }

    /// Export object; ids become content hashes of the identifiers.
    pub fn as_object(&self) -> Value {
        json!({
            "sourceId": ident::content_hash(&self.source_id),
            "targetId": ident::content_hash(&self.target_id),
            "type": self.rel_type.as_str(),
            "scopeText": self.scope_text,
        })
    }
}

/// An edge whose endpoints are already content hashes, possibly pointing
/// at nodes that exist only in another environment (diff MODIFIED/DELETED
/// edges).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRelationship {
    pub source_hash: String,
    pub target_hash: String,
    pub rel_type: RelationshipType,
}

impl ExternalRelationship {
    pub fn as_object(&self) -> Value {
        json!({
            "sourceId": self.source_hash,
            "targetId": self.target_hash,
            "type": self.rel_type.as_str(),
            "scopeText": "",
        })
    }
}

/// Collects diff-mode edges that cannot be resolved against the current
/// graph's node set.
#[derive(Debug, Clone, Default)]
pub struct ExternalRelationshipStore {
    relationships: Vec<ExternalRelationship>,
}

impl ExternalRelationshipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_and_add(
        &mut self,
        source_hash: impl Into<String>,
        target_hash: impl Into<String>,
        rel_type: RelationshipType,
    ) {
        self.relationships.push(ExternalRelationship {
            source_hash: source_hash.into(),
            target_hash: target_hash.into(),
            rel_type,
        });
    }

    pub fn relationships(&self) -> &[ExternalRelationship] {
        &self.relationships
    }

    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }
}
