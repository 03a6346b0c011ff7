//! Ignore engine — gitignore semantics, deny lists, size threshold

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::config::ProjectConfig;

/// Directory names skipped at walk time regardless of pattern files:
/// compiled caches, vendored dependencies, virtualenvs, build output.
const DENY_LIST: &[&str] = &[
    "__pycache__",
    "node_modules",
    "vendor",
    "venv",
    "dist",
    "build",
    "target",
];

/// Answers "should this path be in the graph?". Combines discovered
/// `.gitignore` files (each scoped to its own subtree), an optional
/// auxiliary ignore file, configured name/extension skips, and the file
/// size threshold.
pub struct IgnoreEngine {
    root: PathBuf,
    gitignores: Vec<(PathBuf, Gitignore)>,
    auxiliary: Option<Gitignore>,
    names_to_skip: HashSet<String>,
    extensions_to_skip: Vec<String>,
    max_file_size_bytes: u64,
}

impl IgnoreEngine {
    pub fn new(config: &ProjectConfig) -> Self {
        let root = config.root_path.clone();

        let mut gitignores = Vec::new();
        if config.use_gitignore {
            let mut dirs = Vec::new();
            discover_gitignore_dirs(&root, &mut dirs);
            for dir in dirs {
                match compile_gitignore(&dir) {
                    Some(matcher) => gitignores.push((dir, matcher)),
                    None => tracing::warn!(dir = %dir.display(), "failed to parse .gitignore"),
                }
            }
        }

        let auxiliary_path = config
            .auxiliary_ignore_path
            .clone()
            .or_else(|| {
                let default = root.join(".graftignore");
                default.is_file().then_some(default)
            })
            .filter(|path| path.is_file());
        let auxiliary = auxiliary_path.and_then(|path| compile_auxiliary(&root, &path));

        IgnoreEngine {
            root,
            gitignores,
            auxiliary,
            names_to_skip: config.names_to_skip.iter().cloned().collect(),
            extensions_to_skip: config.extensions_to_skip.clone(),
            max_file_size_bytes: config.max_file_size_bytes(),
        }
    }

    /// Whole-subtree skips: hidden directories, the deny list, and
    /// configured basenames. Gitignore patterns deliberately do not prune
    /// here so negated descendants stay reachable.
    pub fn should_prune(&self, dir: &Path) -> bool {
        let Some(name) = dir.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };
        name.starts_with('.')
            || DENY_LIST.contains(&name.as_ref())
            || self.names_to_skip.contains(name.as_ref())
    }

    /// Per-path decision for files and for folder-node emission.
    pub fn should_ignore(&self, path: &Path, is_dir: bool) -> bool {
        for (dir, matcher) in &self.gitignores {
            if path.starts_with(dir)
                && matcher
                    .matched_path_or_any_parents(path, is_dir)
                    .is_ignore()
            {
                return true;
            }
        }
        if let Some(auxiliary) = &self.auxiliary {
            if auxiliary
                .matched_path_or_any_parents(path, is_dir)
                .is_ignore()
            {
                return true;
            }
        }

        if let Some(name) = path.file_name().map(|n| n.to_string_lossy()) {
            if self.names_to_skip.contains(name.as_ref()) {
                return true;
            }
        }
        let text = path.to_string_lossy();
        if self.extensions_to_skip.iter().any(|ext| text.ends_with(ext.as_str())) {
            return true;
        }
        if !is_dir {
            if let Ok(metadata) = path.metadata() {
                if metadata.len() > self.max_file_size_bytes {
                    tracing::debug!(path = %path.display(), size = metadata.len(), "file over size threshold");
                    return true;
                }
            }
        }
        false
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Find every directory holding a `.gitignore`, skipping subtrees the
/// walker would never enter anyway.
fn discover_gitignore_dirs(dir: &Path, found: &mut Vec<PathBuf>) {
    if dir.join(".gitignore").is_file() {
        found.push(dir.to_path_buf());
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut children: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    children.sort();
    for child in children {
        let name = child
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.starts_with('.') || DENY_LIST.contains(&name.as_str()) {
            continue;
        }
        discover_gitignore_dirs(&child, found);
    }
}

fn compile_gitignore(dir: &Path) -> Option<Gitignore> {
    let mut builder = GitignoreBuilder::new(dir);
    if let Some(err) = builder.add(dir.join(".gitignore")) {
        tracing::warn!(dir = %dir.display(), error = %err, "errors in .gitignore");
    }
    builder.build().ok()
}

/// The auxiliary ignore file scopes to the project root, wherever the
/// file itself lives.
fn compile_auxiliary(root: &Path, path: &Path) -> Option<Gitignore> {
    let text = std::fs::read_to_string(path).ok()?;
    let mut builder = GitignoreBuilder::new(root);
    for line in text.lines() {
        if let Err(err) = builder.add_line(None, line) {
            tracing::warn!(line, error = %err, "bad pattern in auxiliary ignore file");
        }
    }
    builder.build().ok()
}
