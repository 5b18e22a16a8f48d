//! Path normalization utilities.
//!
//! Source paths arrive from several directions (CLI argv, IPC bodies from
//! the child, watcher events) and are used as cache keys, so they must all
//! collapse to one canonical spelling.

use std::path::{Component, Path, PathBuf};

/// Absolute, symlink-free form of `path`, suitable as a cache key.
///
/// Relative input is anchored at the current directory before anything
/// else. Canonicalization then resolves symlinks; when the file does not
/// exist yet (a compile request can race a fresh write), the anchored form
/// is cleaned lexically instead, so `.` and `..` spellings still collapse
/// to the same key.
pub fn normalize_path(path: &Path) -> PathBuf {
    let anchored = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    anchored
        .canonicalize()
        .unwrap_or_else(|_| lexical_clean(&anchored))
}

/// Fold `.` and `..` components away without touching the filesystem.
fn lexical_clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other),
        }
    }
    cleaned
}

/// Check whether any component of `path` is a `node_modules` directory.
///
/// Dependency trees are never watched or compiled.
pub fn is_under_node_modules(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str() == "node_modules")
}
