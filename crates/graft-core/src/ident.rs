//! Path normalization and stable node identity

use std::path::{Path, PathBuf};

use crate::environment::GraphEnvironment;

/// Scheme prefix carried by every node path.
pub const FILE_SCHEME: &str = "file://";

/// Convert an absolute filesystem path to a `file://` URI with forward
/// slashes after the scheme.
pub fn path_to_uri(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    format!("{FILE_SCHEME}{text}")
}

/// Strip the `file://` scheme from a URI, yielding a filesystem path.
pub fn uri_to_path(uri: &str) -> PathBuf {
    PathBuf::from(uri.strip_prefix(FILE_SCHEME).unwrap_or(uri))
}

/// Path of `path` relative to `root`, forward-slashed, without a leading
/// separator. Returns the full path when `path` is not under `root`.
pub fn relative_path_from_root(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
        Err(_) => path.to_string_lossy().replace('\\', "/"),
    }
}

/// URI of the folder containing `uri`, or `None` at the filesystem root.
pub fn parent_folder_uri(uri: &str) -> Option<String> {
    let path = uri.strip_prefix(FILE_SCHEME).unwrap_or(uri);
    let trimmed = path.trim_end_matches('/');
    let cut = trimmed.rfind('/')?;
    if cut == 0 {
        return None;
    }
    Some(format!("{FILE_SCHEME}{}", &trimmed[..cut]))
}

/// Identifier fragment contributed by a folder or file node.
pub fn path_fragment(name: &str) -> String {
    format!("/{name}")
}

/// Identifier fragment contributed by a class node.
pub fn class_fragment(name: &str) -> String {
    format!("#{name}")
}

/// Identifier fragment contributed by a function node.
pub fn function_fragment(name: &str) -> String {
    format!(".{name}")
}

/// Stable cryptographic digest of an identifier, used as the compact node
/// key in exported objects.
pub fn content_hash(identifier: &str) -> String {
    blake3::hash(identifier.as_bytes()).to_hex().to_string()
}

/// The identifier without its graph-environment prefix or the root folder
/// fragment. Identifiers are `<environment>/<diff>/<root>/...`, so this
/// skips the first three `/`-separated segments, letting diff mode match
/// nodes across environments.
pub fn relative_id(identifier: &str) -> String {
    let mut cut = 0;
    for _ in 0..3 {
        match identifier[cut..].find('/') {
            Some(offset) => cut += offset + 1,
            None => return identifier.to_string(),
        }
    }
    format!("/{}", &identifier[cut..])
}

/// The identifier a File node at `path` would receive, built from the
/// environment prefix plus one `/name` fragment per ancestor. Diff mode
/// uses this to reference files deleted from the working tree.
pub fn stable_file_id(environment: &GraphEnvironment, path: &Path) -> String {
    let root = &environment.root_path;
    let root_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let rel = relative_path_from_root(root, path);
    format!("{}/{}/{}", environment.prefix(), root_name, rel)
}
