//! Graft LSP — language-server pool behind a references/definition seam

pub mod client;
pub mod pool;
pub mod protocol;

pub use client::LspClient;
pub use pool::{LspPool, ReferenceBackend, ReferenceLocation, ServerSpec};
pub use protocol::LspError;
