//! LSP pool — per-language server lifecycle and request retries

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use graft_core::{ident, Point};

use crate::client::LspClient;

/// How to start the language server for one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    /// Language tag matching the LSP `languageId`.
    pub language: String,
    pub command: String,
    pub args: Vec<String>,
}

impl ServerSpec {
    pub fn new(language: &str, command: &str, args: &[&str]) -> Self {
        ServerSpec {
            language: language.to_string(),
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// A reference or definition site reported by a language server.
/// Coordinates are zero-based lines and UTF-16 columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceLocation {
    /// `file://` URI, normalized to the graph's path form.
    pub uri: String,
    pub start: Point,
    pub end: Point,
}

/// The only surface the resolver sees. Tests substitute a scripted
/// backend; production uses [`LspPool`].
#[async_trait]
pub trait ReferenceBackend {
    /// All reference sites of the symbol at the position, or empty when
    /// the backend gave up.
    async fn references(
        &mut self,
        spec: &ServerSpec,
        relative_path: &str,
        position: Point,
    ) -> Vec<ReferenceLocation>;

    /// Definition sites for the symbol at the position.
    async fn definition(
        &mut self,
        spec: &ServerSpec,
        relative_path: &str,
        position: Point,
    ) -> Vec<ReferenceLocation>;
}

/// Owns one language-server child process per language, created on first
/// demand. Transient failures restart the server with a doubled timeout;
/// after two attempts the query yields an empty list and the pipeline
/// moves on.
pub struct LspPool {
    root_path: PathBuf,
    base_timeout: Duration,
    servers: HashMap<String, LspClient>,
}

const RETRY_ATTEMPTS: u32 = 2;

impl LspPool {
    pub fn new(root_path: PathBuf) -> Self {
        Self::with_timeout(root_path, Duration::from_secs(10))
    }

    pub fn with_timeout(root_path: PathBuf, base_timeout: Duration) -> Self {
        LspPool {
            root_path,
            base_timeout,
            servers: HashMap::new(),
        }
    }

    async fn get_or_create(
        &mut self,
        spec: &ServerSpec,
        timeout: Duration,
    ) -> Result<&mut LspClient, crate::protocol::LspError> {
        if !self.servers.contains_key(&spec.language) {
            let client = LspClient::spawn(
                &spec.language,
                &spec.command,
                &spec.args,
                &self.root_path,
                timeout,
            )
            .await?;
            tracing::debug!(language = %spec.language, "language server started");
            self.servers.insert(spec.language.clone(), client);
        }
        Ok(self.servers.get_mut(&spec.language).expect("just inserted"))
    }

    async fn restart(&mut self, spec: &ServerSpec) {
        tracing::warn!(language = %spec.language, "restarting language server");
        if let Some(client) = self.servers.remove(&spec.language) {
            client.shutdown().await;
        }
    }

    /// Shut every server down: bounded shutdown request, exit, then kill.
    pub async fn shutdown_all(&mut self) {
        for (language, client) in self.servers.drain() {
            tracing::debug!(%language, "shutting down language server");
            client.shutdown().await;
        }
    }

    fn absolute(&self, relative_path: &str) -> PathBuf {
        self.root_path.join(relative_path)
    }
}

fn convert(locations: Vec<lsp_types::Location>) -> Vec<ReferenceLocation> {
    locations
        .into_iter()
        .map(|location| {
            let uri = match location.uri.to_file_path() {
                Ok(path) => ident::path_to_uri(&path),
                Err(_) => location.uri.to_string(),
            };
            ReferenceLocation {
                uri,
                start: Point::new(location.range.start.line, location.range.start.character),
                end: Point::new(location.range.end.line, location.range.end.character),
            }
        })
        .collect()
}

#[async_trait]
impl ReferenceBackend for LspPool {
    async fn references(
        &mut self,
        spec: &ServerSpec,
        relative_path: &str,
        position: Point,
    ) -> Vec<ReferenceLocation> {
        let path = self.absolute(relative_path);
        let mut timeout = self.base_timeout;

        for _ in 0..RETRY_ATTEMPTS {
            let client = match self.get_or_create(spec, timeout).await {
                Ok(client) => client,
                Err(err) => {
                    tracing::warn!(language = %spec.language, error = %err, "language server unavailable");
                    return Vec::new();
                }
            };
            match client.references(&path, position.line, position.character).await {
                Ok(locations) => return convert(locations),
                Err(err) if err.is_transient() => {
                    timeout *= 2;
                    tracing::warn!(
                        path = relative_path,
                        error = %err,
                        next_timeout_secs = timeout.as_secs(),
                        "references request failed, restarting language server"
                    );
                    self.restart(spec).await;
                }
                Err(err) => {
                    tracing::error!(error = %err, "references request failed");
                    return Vec::new();
                }
            }
        }

        tracing::error!(path = relative_path, "failed to get references, returning empty list");
        Vec::new()
    }

    async fn definition(
        &mut self,
        spec: &ServerSpec,
        relative_path: &str,
        position: Point,
    ) -> Vec<ReferenceLocation> {
        let path = self.absolute(relative_path);
        let mut timeout = self.base_timeout;

        for _ in 0..RETRY_ATTEMPTS {
            let client = match self.get_or_create(spec, timeout).await {
                Ok(client) => client,
                Err(err) => {
                    tracing::warn!(language = %spec.language, error = %err, "language server unavailable");
                    return Vec::new();
                }
            };
            match client.definition(&path, position.line, position.character).await {
                Ok(locations) => return convert(locations),
                Err(err) if err.is_transient() => {
                    timeout *= 2;
                    tracing::warn!(
                        path = relative_path,
                        error = %err,
                        next_timeout_secs = timeout.as_secs(),
                        "definition request failed, restarting language server"
                    );
                    self.restart(spec).await;
                }
                Err(err) => {
                    tracing::error!(error = %err, "definition request failed");
                    return Vec::new();
                }
            }
        }

        tracing::error!(path = relative_path, "failed to get definitions, returning empty list");
        Vec::new()
    }
}
