//! Graft Indexer — project walking, syntax extraction, reference
//! resolution, and the orchestrators tying them together

pub mod complexity;
pub mod config;
pub mod diff;
pub mod extractor;
pub mod ignore_rules;
pub mod languages;
pub mod orchestrator;
pub mod resolver;
pub mod walker;

#[cfg(test)]
pub mod tests;

pub use config::{ConfigError, ProjectConfig};
pub use diff::{ChangeType, DiffGraphBuilder, FileDiff, PreviousNodeState};
pub use extractor::{ParseStore, SyntaxExtractor};
pub use ignore_rules::IgnoreEngine;
pub use languages::{LanguageRegistry, LanguageRules};
pub use orchestrator::{CancellationFlag, GraphBuilder};
pub use resolver::ReferenceResolver;
pub use walker::{FolderRecord, ProjectWalker, SourceFile};
