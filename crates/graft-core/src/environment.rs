//! Graph environment — the identifier namespace for one logical graph

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A string pair prefixed to every node identifier, isolating multiple
/// logical graphs (e.g. a base graph and a pull-request overlay) inside
/// one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEnvironment {
    /// Opaque environment tag, e.g. `"repo"`.
    pub environment: String,
    /// Secondary label distinguishing diff-mode runs, e.g. a PR id.
    pub diff_identifier: String,
    /// Absolute root of the indexed project.
    pub root_path: PathBuf,
}

impl GraphEnvironment {
    pub fn new(
        environment: impl Into<String>,
        diff_identifier: impl Into<String>,
        root_path: PathBuf,
    ) -> Self {
        GraphEnvironment {
            environment: environment.into(),
            diff_identifier: diff_identifier.into(),
            root_path,
        }
    }

    /// Identifier prefix: `<environment>/<diff_identifier>`. Node
    /// identifiers append `/folder`, `#class` and `.function` fragments
    /// to this.
    pub fn prefix(&self) -> String {
        format!("{}/{}", self.environment, self.diff_identifier)
    }
}

impl fmt::Display for GraphEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}
