//! A single language-server child process

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::oneshot;

use graft_core::ident;

use crate::protocol::{read_message, write_message, LspError};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, LspError>>>>>;

/// Owns one language server: the child process, a background task reading
/// its stdout, and the table of in-flight requests. Tree-sitter parsing
/// stays on the orchestrator; only LSP round-trips go through here.
pub struct LspClient {
    language: String,
    stdin: Arc<tokio::sync::Mutex<ChildStdin>>,
    child: Child,
    pending: PendingMap,
    next_id: u64,
    open_documents: HashSet<PathBuf>,
    request_timeout: Duration,
    reader: tokio::task::JoinHandle<()>,
}

impl LspClient {
    /// Spawn `command args...` in `root` and run the initialize handshake.
    pub async fn spawn(
        language: &str,
        command: &str,
        args: &[String],
        root: &Path,
        request_timeout: Duration,
    ) -> Result<LspClient, LspError> {
        let mut process = Command::new(command);
        process
            .args(args)
            .current_dir(root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        // Own process group, so termination signals reach any helper
        // processes the server spawns.
        #[cfg(unix)]
        process.process_group(0);
        let mut child = process.spawn().map_err(|source| LspError::Spawn {
            command: command.to_string(),
            source,
        })?;

        let stdin = child.stdin.take().expect("child stdin piped");
        let stdout = child.stdout.take().expect("child stdout piped");
        let stdin = Arc::new(tokio::sync::Mutex::new(stdin));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let reader = tokio::spawn(Self::read_loop(
            BufReader::new(stdout),
            Arc::clone(&pending),
            Arc::clone(&stdin),
        ));

        let mut client = LspClient {
            language: language.to_string(),
            stdin,
            child,
            pending,
            next_id: 0,
            open_documents: HashSet::new(),
            request_timeout,
            reader,
        };
        client.initialize(root).await?;
        Ok(client)
    }

    /// Route responses to their waiting requests; answer server-initiated
    /// requests with an empty result so the server never stalls on us.
    async fn read_loop(
        mut stdout: BufReader<tokio::process::ChildStdout>,
        pending: PendingMap,
        stdin: Arc<tokio::sync::Mutex<ChildStdin>>,
    ) {
        loop {
            let message = match read_message(&mut stdout).await {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(err) => {
                    tracing::debug!(error = %err, "language server stream closed");
                    break;
                }
            };

            if message.get("method").is_some() {
                if let Some(id) = message.get("id").cloned() {
                    let reply = json!({"jsonrpc": "2.0", "id": id, "result": null});
                    let mut stdin = stdin.lock().await;
                    if write_message(&mut *stdin, &reply).await.is_err() {
                        break;
                    }
                }
                continue;
            }

            let Some(id) = message.get("id").and_then(Value::as_u64) else {
                continue;
            };
            let sender = pending.lock().expect("pending lock").remove(&id);
            if let Some(sender) = sender {
                let outcome = match message.get("error") {
                    Some(error) => Err(LspError::Protocol(error.to_string())),
                    None => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
                };
                let _ = sender.send(outcome);
            }
        }
        // Wake any requests still in flight; their servers are gone.
        pending.lock().expect("pending lock").clear();
    }

    async fn initialize(&mut self, root: &Path) -> Result<(), LspError> {
        let root_uri = ident::path_to_uri(root);
        let root_name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.request(
            "initialize",
            json!({
                "processId": Value::Null,
                "rootUri": root_uri,
                "capabilities": {},
                "workspaceFolders": [{"uri": root_uri, "name": root_name}],
            }),
        )
        .await?;
        self.notify("initialized", json!({})).await?;
        Ok(())
    }

    async fn request(&mut self, method: &str, params: Value) -> Result<Value, LspError> {
        self.next_id += 1;
        let id = self.next_id;
        let (sender, receiver) = oneshot::channel();
        self.pending.lock().expect("pending lock").insert(id, sender);

        let message = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        {
            let mut stdin = self.stdin.lock().await;
            write_message(&mut *stdin, &message).await?;
        }

        match tokio::time::timeout(self.request_timeout, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(LspError::ConnectionReset),
            Err(_) => {
                self.pending.lock().expect("pending lock").remove(&id);
                Err(LspError::Timeout)
            }
        }
    }

    async fn notify(&mut self, method: &str, params: Value) -> Result<(), LspError> {
        let message = json!({"jsonrpc": "2.0", "method": method, "params": params});
        let mut stdin = self.stdin.lock().await;
        write_message(&mut *stdin, &message).await
    }

    /// Stateless servers only index documents they have been handed; open
    /// each file once before querying positions inside it.
    async fn ensure_open(&mut self, path: &Path) -> Result<(), LspError> {
        if self.open_documents.contains(path) {
            return Ok(());
        }
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "didOpen skipped");
                return Ok(());
            }
        };
        self.open_documents.insert(path.to_path_buf());
        self.notify(
            "textDocument/didOpen",
            json!({
                "textDocument": {
                    "uri": ident::path_to_uri(path),
                    "languageId": self.language,
                    "version": 0,
                    "text": text,
                }
            }),
        )
        .await
    }

    /// All reference sites of the symbol at the given position.
    /// Zero-based line, UTF-16 column.
    pub async fn references(
        &mut self,
        path: &Path,
        line: u32,
        character: u32,
    ) -> Result<Vec<lsp_types::Location>, LspError> {
        self.ensure_open(path).await?;
        let result = self
            .request(
                "textDocument/references",
                json!({
                    "textDocument": {"uri": ident::path_to_uri(path)},
                    "position": {"line": line, "character": character},
                    "context": {"includeDeclaration": false},
                }),
            )
            .await?;
        locations_from_value(result)
    }

    /// Definition sites of the symbol at the given position.
    pub async fn definition(
        &mut self,
        path: &Path,
        line: u32,
        character: u32,
    ) -> Result<Vec<lsp_types::Location>, LspError> {
        self.ensure_open(path).await?;
        let result = self
            .request(
                "textDocument/definition",
                json!({
                    "textDocument": {"uri": ident::path_to_uri(path)},
                    "position": {"line": line, "character": character},
                }),
            )
            .await?;
        locations_from_value(result)
    }

    /// Orderly shutdown, escalating in order: bounded `shutdown` request
    /// and `exit` notification, SIGTERM to the child and its descendants,
    /// and a forced kill only when the deadline passes. The reader task
    /// is released last.
    pub async fn shutdown(mut self) {
        const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

        self.request_timeout = SHUTDOWN_WAIT;
        if let Err(err) = self.request("shutdown", Value::Null).await {
            tracing::debug!(language = %self.language, error = %err, "shutdown request failed");
        }
        let _ = self.notify("exit", Value::Null).await;

        self.terminate_tree();
        match tokio::time::timeout(SHUTDOWN_WAIT, self.child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                tracing::warn!(language = %self.language, "language server ignored SIGTERM, killing");
                let _ = self.child.start_kill();
                let _ = self.child.wait().await;
            }
        }
        self.reader.abort();
    }

    /// SIGTERM to the whole process group the server was spawned into,
    /// falling back to signalling the child alone.
    #[cfg(unix)]
    fn terminate_tree(&self) {
        use nix::sys::signal::{kill, killpg, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return;
        };
        let pid = Pid::from_raw(pid as i32);
        if killpg(pid, Signal::SIGTERM).is_err() {
            let _ = kill(pid, Signal::SIGTERM);
        }
    }

    #[cfg(not(unix))]
    fn terminate_tree(&self) {}
}

/// Accept the shapes servers return for location results: null, a single
/// `Location`, an array of `Location`s, or an array of `LocationLink`s.
fn locations_from_value(value: Value) -> Result<Vec<lsp_types::Location>, LspError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(_) => {
            let location = serde_json::from_value(value)
                .map_err(|err| LspError::Protocol(format!("bad location: {err}")))?;
            Ok(vec![location])
        }
        Value::Array(items) => {
            let mut locations = Vec::with_capacity(items.len());
            for item in items {
                if item.get("targetUri").is_some() {
                    let link: lsp_types::LocationLink = serde_json::from_value(item)
                        .map_err(|err| LspError::Protocol(format!("bad location link: {err}")))?;
                    locations.push(lsp_types::Location {
                        uri: link.target_uri,
                        range: link.target_selection_range,
                    });
                } else {
                    let location = serde_json::from_value(item)
                        .map_err(|err| LspError::Protocol(format!("bad location: {err}")))?;
                    locations.push(location);
                }
            }
            Ok(locations)
        }
        other => Err(LspError::Protocol(format!("unexpected location payload: {other}"))),
    }
}
