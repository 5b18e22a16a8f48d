//! Group candidate enumeration and ignored-file diagnostics.
//!
//! A group build considers every file under the group root matching the
//! configured extensions, minus `node_modules`, declaration files, and the
//! configured ignore patterns. When a requested file is absent from a built
//! group, the diagnostic must say *why*: which ignore pattern filtered it,
//! or that the file is outside the project tree entirely.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::errors::RunnerError;
use crate::utils::path::is_under_node_modules;

/// Why a requested file is not in its group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingReason {
    /// A configured ignore pattern filtered the file out.
    Ignored(String),
    /// No extension glob under this root ever matched the file.
    Outside,
    /// The file is a valid, un-ignored candidate the build has not seen yet
    /// (created after the group was built).
    FreshCandidate,
}

impl MissingReason {
    /// Convert into the user-facing error for `path`.
    pub fn into_error(self, path: &Path) -> RunnerError {
        match self {
            Self::Ignored(pattern) => RunnerError::Ignored {
                path: path.to_path_buf(),
                pattern,
            },
            Self::Outside | Self::FreshCandidate => RunnerError::OutsideProject {
                path: path.to_path_buf(),
            },
        }
    }
}

/// Enumerate group candidates under `root`: extension matches, minus ignore
/// patterns, `node_modules`, and `**/*.d.ts`.
pub fn enumerate(
    root: &Path,
    extensions: &[String],
    ignore: &[String],
) -> Result<Vec<PathBuf>, RunnerError> {
    let ignore_set = build_globset(ignore)?;
    Ok(candidates(root, extensions)?
        .into_iter()
        .filter(|path| {
            let rel = path.strip_prefix(root).unwrap_or(path);
            !ignore_set.is_match(rel)
        })
        .collect())
}

/// Explain why `path` has no group output.
///
/// The responsible ignore rule is found by leave-one-out matching: the rule
/// whose removal from the configured list would admit the file again. Rules
/// that happen to match the file but whose removal changes nothing (another
/// rule still blocks it) are never reported alone.
pub fn why_missing(
    root: &Path,
    extensions: &[String],
    ignore: &[String],
    path: &Path,
) -> MissingReason {
    let in_candidates = candidates(root, extensions)
        .map(|files| files.iter().any(|f| f == path))
        .unwrap_or(false);
    if !in_candidates {
        return MissingReason::Outside;
    }

    let rel = path.strip_prefix(root).unwrap_or(path);
    let fully_ignored = build_globset(ignore)
        .map(|set| set.is_match(rel))
        .unwrap_or(false);
    if !fully_ignored {
        return MissingReason::FreshCandidate;
    }

    for (i, pattern) in ignore.iter().enumerate() {
        let without: Vec<String> = ignore
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, p)| p.clone())
            .collect();
        if let Ok(set) = build_globset(&without)
            && !set.is_match(rel)
        {
            return MissingReason::Ignored(pattern.clone());
        }
    }

    // Overlapping rules: no single removal admits the file. Name every rule
    // that matches it on its own.
    let mut matching: Vec<String> = ignore
        .iter()
        .filter(|p| {
            build_globset(std::slice::from_ref(*p))
                .map(|set| set.is_match(rel))
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    matching.dedup();
    MissingReason::Ignored(matching.join(", "))
}

/// All extension-matching files under `root`, before ignore filtering.
fn candidates(root: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, RunnerError> {
    let include = extension_globset(extensions)?;
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.file_name() != "node_modules")
        .filter_map(|entry| entry.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if is_declaration_file(path) || is_under_node_modules(path) {
            continue;
        }
        let rel = match path.strip_prefix(root) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        if include.is_match(rel) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// One alternation glob over the extension list: `**/*{.ts,.tsx,...}`.
fn extension_globset(extensions: &[String]) -> Result<GlobSet, RunnerError> {
    let pattern = format!("**/*{{{}}}", extensions.join(","));
    build_globset(std::slice::from_ref(&pattern))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, RunnerError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| RunnerError::Compile {
            path: PathBuf::from(pattern),
            message: format!("invalid glob pattern `{pattern}`: {e}"),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| RunnerError::Compile {
        path: PathBuf::new(),
        message: format!("failed to build glob matcher: {e}"),
    })
}

fn is_declaration_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(".d.ts"))
}
