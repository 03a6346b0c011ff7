//! Graft Core — graph data model, node identity, and the graph store

pub mod environment;
pub mod export;
pub mod graph;
pub mod ident;
pub mod model;
pub mod node;
pub mod relationship;


pub use environment::GraphEnvironment;
pub use export::{GraphExport, GraphUpdate};
pub use graph::GraphStore;
pub use model::{FunctionStats, NestingStats, NodeLabel, Point, RelationshipType, Span, SyntaxHandle};
pub use node::GraphNode;
pub use relationship::{ExternalRelationship, ExternalRelationshipStore, Relationship};
