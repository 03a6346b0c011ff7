//! Project walker — top-down enumeration of folders and files

use std::path::{Path, PathBuf};

use graft_core::ident;

use crate::ignore_rules::IgnoreEngine;

/// A candidate source file found by the walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub directory: PathBuf,
    /// Level of the file node (its folder's level + 1).
    pub level: u32,
}

impl SourceFile {
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.name)
    }

    pub fn uri(&self) -> String {
        ident::path_to_uri(&self.path())
    }

    /// Extension with the leading dot, or empty when there is none.
    pub fn extension(&self) -> String {
        Path::new(&self.name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default()
    }
}

/// One visited directory: its immediate files plus empty placeholders for
/// its immediate subfolders. The walker emits records top-down, so levels
/// increase monotonically along any path.
#[derive(Debug, Clone)]
pub struct FolderRecord {
    pub name: String,
    pub path: PathBuf,
    pub level: u32,
    pub files: Vec<SourceFile>,
    pub subfolders: Vec<FolderRecord>,
}

impl FolderRecord {
    pub fn uri(&self) -> String {
        ident::path_to_uri(&self.path)
    }

    fn placeholder(path: PathBuf, level: u32) -> Self {
        FolderRecord {
            name: basename(&path),
            path,
            level,
            files: Vec::new(),
            subfolders: Vec::new(),
        }
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Lazy depth-first enumerator over the project tree. Directory entries
/// are visited in lexicographic order; deny-listed subtrees are skipped
/// entirely, while gitignore-matched directories are still descended so
/// negation patterns can rescue descendants.
pub struct ProjectWalker<'a> {
    ignore: &'a IgnoreEngine,
    /// Directories still to visit, most recently discovered last.
    stack: Vec<(PathBuf, u32)>,
}

impl<'a> ProjectWalker<'a> {
    pub fn new(ignore: &'a IgnoreEngine) -> Self {
        ProjectWalker {
            ignore,
            stack: vec![(ignore.root().to_path_buf(), 0)],
        }
    }
}

impl<'a> Iterator for ProjectWalker<'a> {
    type Item = FolderRecord;

    fn next(&mut self) -> Option<FolderRecord> {
        while let Some((path, level)) = self.stack.pop() {
            let entries = match std::fs::read_dir(&path) {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "cannot read directory");
                    continue;
                }
            };

            let mut names: Vec<(PathBuf, bool)> = entries
                .filter_map(|entry| entry.ok())
                .map(|entry| {
                    let child = entry.path();
                    let is_dir = child.is_dir();
                    (child, is_dir)
                })
                .collect();
            names.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));

            let mut files = Vec::new();
            let mut subfolders = Vec::new();
            let mut descend = Vec::new();
            for (child, is_dir) in names {
                if is_dir {
                    if self.ignore.should_prune(&child) {
                        tracing::debug!(path = %child.display(), "subtree skipped");
                        continue;
                    }
                    if !self.ignore.should_ignore(&child, true) {
                        subfolders.push(FolderRecord::placeholder(child.clone(), level + 1));
                    }
                    descend.push(child);
                } else if !self.ignore.should_ignore(&child, false) {
                    files.push(SourceFile {
                        name: basename(&child),
                        directory: path.clone(),
                        level: level + 1,
                    });
                }
            }

            // Reverse so the lexicographically first child is popped first.
            for child in descend.into_iter().rev() {
                self.stack.push((child, level + 1));
            }

            // An ignored folder is still emitted when negation patterns
            // rescued content inside it, so parents exist for that content.
            if self.ignore.should_ignore(&path, true) && files.is_empty() && subfolders.is_empty() {
                continue;
            }
            return Some(FolderRecord {
                name: basename(&path),
                path,
                level,
                files,
                subfolders,
            });
        }
        None
    }
}
