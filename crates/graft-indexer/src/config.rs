//! Project configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use graft_core::GraphEnvironment;

/// Diff identifier of the stable (non-diff) environment. Diff-mode runs
/// compare against identifiers minted under this label.
pub const BASE_DIFF_IDENTIFIER: &str = "repo";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("root path is required")]
    MissingRoot,
    #[error("root path `{0}` does not exist or is not a directory")]
    InvalidRoot(PathBuf),
    #[error("failed to read config file `{path}`: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file `{path}`: {source}")]
    Unparsable {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Everything a run can be configured with. All fields have defaults
/// except `root_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Absolute path of the project to index.
    pub root_path: PathBuf,
    /// Extensions excluded from the walk, with leading dots (`.lock`).
    pub extensions_to_skip: Vec<String>,
    /// File/folder basenames excluded from the walk.
    pub names_to_skip: Vec<String>,
    /// Files larger than this are skipped.
    pub max_file_size_mib: f64,
    /// Honor `.gitignore` files discovered in the tree.
    pub use_gitignore: bool,
    /// Extra ignore file; defaults to `<root>/.graftignore` when present.
    pub auxiliary_ignore_path: Option<PathBuf>,
    /// Skip the reference-resolution pass.
    pub hierarchy_only: bool,
    /// Opaque label prefixed to all identifiers.
    pub environment_tag: String,
    /// Secondary identifier label for diff-mode runs.
    pub diff_identifier: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        ProjectConfig {
            root_path: PathBuf::new(),
            extensions_to_skip: Vec::new(),
            names_to_skip: Vec::new(),
            max_file_size_mib: 0.8,
            use_gitignore: true,
            auxiliary_ignore_path: None,
            hierarchy_only: false,
            environment_tag: "graft".to_string(),
            diff_identifier: BASE_DIFF_IDENTIFIER.to_string(),
        }
    }
}

impl ProjectConfig {
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        ProjectConfig {
            root_path: root_path.into(),
            ..Default::default()
        }
    }

    /// Load from a TOML file; fields not present fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Unparsable {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate and normalize; configuration errors are fatal at startup.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if self.root_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingRoot);
        }
        if !self.root_path.is_dir() {
            return Err(ConfigError::InvalidRoot(self.root_path));
        }
        self.root_path = self
            .root_path
            .canonicalize()
            .map_err(|_| ConfigError::InvalidRoot(self.root_path.clone()))?;
        Ok(self)
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        (self.max_file_size_mib * 1024.0 * 1024.0) as u64
    }

    /// The environment identifiers are minted under for this run.
    pub fn environment(&self) -> GraphEnvironment {
        GraphEnvironment::new(
            &self.environment_tag,
            &self.diff_identifier,
            self.root_path.clone(),
        )
    }

    /// The stable environment a diff run compares against.
    pub fn base_environment(&self) -> GraphEnvironment {
        GraphEnvironment::new(
            &self.environment_tag,
            BASE_DIFF_IDENTIFIER,
            self.root_path.clone(),
        )
    }
}
