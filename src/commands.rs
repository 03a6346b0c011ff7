//! CLI command implementations

use std::path::PathBuf;

use anyhow::Context;

use graft_indexer::{
    CancellationFlag, DiffGraphBuilder, FileDiff, GraphBuilder, PreviousNodeState, ProjectConfig,
};
use graft_lsp::LspPool;

/// Full pipeline: hierarchy extraction plus LSP-backed reference
/// resolution, exported as nodes.json / edges.json.
pub async fn build(
    root: PathBuf,
    config: Option<PathBuf>,
    out: PathBuf,
    environment: Option<String>,
) -> anyhow::Result<()> {
    let mut config = load_config(root, config)?;
    if let Some(environment) = environment {
        config.environment_tag = environment;
    }

    let cancellation = interrupt_flag();
    let builder = GraphBuilder::new(config)?.with_cancellation(cancellation.clone());
    let mut pool = LspPool::new(builder.config().root_path.clone());
    let (graph, _parse_store) = builder.build(&mut pool).await;
    pool.shutdown_all().await;

    if cancellation.is_cancelled() {
        tracing::warn!("run interrupted, exporting partial graph");
    }
    tracing::info!(
        nodes = graph.node_count(),
        reference_edges = graph.reference_edges().len(),
        "index complete"
    );
    graph.export().write_to(&out)
}

/// Hierarchy only; never touches a language server.
pub async fn hierarchy(
    root: PathBuf,
    config: Option<PathBuf>,
    out: PathBuf,
) -> anyhow::Result<()> {
    let mut config = load_config(root, config)?;
    config.hierarchy_only = true;

    let cancellation = interrupt_flag();
    let builder = GraphBuilder::new(config)?.with_cancellation(cancellation.clone());
    let (graph, _parse_store) = builder.build_hierarchy();

    if cancellation.is_cancelled() {
        tracing::warn!("run interrupted, exporting partial graph");
    }
    tracing::info!(nodes = graph.node_count(), "hierarchy complete");
    graph.export().write_to(&out)
}

/// Partial rebuild for a set of changed files.
pub async fn diff(
    root: PathBuf,
    config: Option<PathBuf>,
    out: PathBuf,
    diffs: PathBuf,
    previous: Option<PathBuf>,
    diff_identifier: String,
) -> anyhow::Result<()> {
    let mut config = load_config(root, config)?;
    config.diff_identifier = diff_identifier;

    let file_diffs: Vec<FileDiff> = read_json(&diffs).context("reading file diffs")?;
    let previous_states: Vec<PreviousNodeState> = match previous {
        Some(path) => read_json(&path).context("reading previous node states")?,
        None => Vec::new(),
    };

    let cancellation = interrupt_flag();
    let builder =
        DiffGraphBuilder::new(config, file_diffs)?.with_cancellation(cancellation.clone());
    let mut pool = LspPool::new(builder.config().root_path.clone());
    let update = builder.build(&mut pool, &previous_states).await;
    pool.shutdown_all().await;

    if cancellation.is_cancelled() {
        tracing::warn!("run interrupted, exporting partial graph");
    }
    tracing::info!(
        nodes = update.graph.node_count(),
        external_edges = update.external.len(),
        "diff index complete"
    );
    update.export().write_to(&out)
}

/// A flag flipped by ctrl-c. The pipeline drains at the next file or
/// definition boundary and the command exports partial results; the pool
/// shutdown that follows terminates the language-server children.
fn interrupt_flag() -> CancellationFlag {
    let flag = CancellationFlag::new();
    let handler = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, draining in-flight work");
            handler.cancel();
        }
    });
    flag
}

fn load_config(root: PathBuf, config: Option<PathBuf>) -> anyhow::Result<ProjectConfig> {
    let mut config = match config {
        Some(path) => ProjectConfig::from_file(&path)?,
        None => ProjectConfig::default(),
    };
    if config.root_path.as_os_str().is_empty() {
        config.root_path = root;
    }
    Ok(config)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("cannot parse {}", path.display()))
}
