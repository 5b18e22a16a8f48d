//! Transpiler backends.
//!
//! Two interchangeable implementations behind one contract:
//!
//! - [`group::GroupBackend`] — on first reference, enumerates and builds the
//!   whole package (the *build group*) in one batch.
//! - [`perfile::PerFileBackend`] — transforms exactly the requested file;
//!   groups grow by accretion.
//!
//! The backend is chosen once at boot and held behind `Arc<dyn
//! TranspilerBackend>`, so call sites never branch on the variant.

pub mod group;
mod ignore;
pub mod perfile;
pub mod transform;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::errors::RunnerError;

/// What a successful compile reports back: the group that now covers the
/// requested file.
#[derive(Debug, Clone)]
pub struct GroupSnapshot {
    /// Package root identifying the build group.
    pub root: PathBuf,
    /// Member source paths after the build.
    pub sources: Vec<PathBuf>,
}

impl GroupSnapshot {
    pub(crate) fn of(group: &crate::buildset::BuildGroup) -> Self {
        Self {
            root: group.root().to_path_buf(),
            sources: group.sources().cloned().collect(),
        }
    }
}

/// Capability set every backend provides.
pub trait TranspilerBackend: Send + Sync {
    /// Ensure `source` and its group peers have current compiled output.
    fn compile(&self, source: &Path) -> Result<GroupSnapshot, RunnerError>;

    /// In-memory output bodies for every file of the group containing
    /// `source`. The group must already be built.
    fn file_group(&self, source: &Path) -> Result<FxHashMap<PathBuf, String>, RunnerError>;

    /// Drop all cached groups.
    fn invalidate_build_set(&self);

    /// Re-run compilation for every group currently in the build set,
    /// refreshing outputs whose sources have been touched. Per-file
    /// transform failures are logged, not fatal: the stale entry stays and
    /// the child surfaces the error at its next load.
    fn rebuild(&self);
}

/// Backend selection, decided by the `--swc` flag at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Whole-group pre-build (default).
    Group,
    /// On-demand per-file transform.
    PerFile,
}

/// Construct the boot-selected backend.
pub fn create_backend(kind: BackendKind, staging_root: PathBuf) -> Arc<dyn TranspilerBackend> {
    match kind {
        BackendKind::Group => Arc::new(group::GroupBackend::new(staging_root)),
        BackendKind::PerFile => Arc::new(perfile::PerFileBackend::new(staging_root)),
    }
}

// =============================================================================
// Shared backend plumbing
// =============================================================================

use std::hash::{Hash, Hasher};
use std::time::SystemTime;

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::buildset::{BuildSet, CompiledFile};
use crate::config::find_package_root;
use crate::utils::fs::atomic_write;
use crate::utils::path::{is_under_node_modules, normalize_path};

/// Resolve a requested source to its normalized path and enclosing package
/// root. Dependency trees and manifest-less files are outside the project.
pub(crate) fn resolve_source(source: &Path) -> Result<(PathBuf, PathBuf), RunnerError> {
    let source = normalize_path(source);
    if is_under_node_modules(&source) {
        return Err(RunnerError::OutsideProject { path: source });
    }
    match find_package_root(&source) {
        Some(root) => Ok((source, root)),
        None => Err(RunnerError::OutsideProject { path: source }),
    }
}

/// Output bodies of the built group containing `source`.
pub(crate) fn bodies_of(
    build_set: &Mutex<BuildSet>,
    source: &Path,
) -> Result<FxHashMap<PathBuf, String>, RunnerError> {
    let source = normalize_path(source);
    let set = build_set.lock();
    set.group_of(&source)
        .map(|group| group.bodies())
        .ok_or(RunnerError::OutsideProject { path: source })
}

/// Refresh every touched member of every cached group.
///
/// Stale members are collected under the lock and transformed outside it so
/// IPC readers are never blocked behind a batch. Transform failures are
/// logged and the stale entry stays; the child sees the error at its next
/// load.
pub(crate) fn rebuild_stale(staging_root: &Path, build_set: &Mutex<BuildSet>) {
    let stale: Vec<(PathBuf, Vec<PathBuf>)> = {
        let set = build_set.lock();
        set.groups()
            .map(|g| (g.root().to_path_buf(), g.stale_sources()))
            .filter(|(_, sources)| !sources.is_empty())
            .collect()
    };

    for (root, sources) in stale {
        let refreshed: Vec<CompiledFile> = sources
            .par_iter()
            .filter_map(|source| match compile_to_staging(staging_root, &root, source) {
                Ok(file) => Some(file),
                Err(e) => {
                    crate::logger::status_error(
                        &format!("compile error in {}", source.display()),
                        &e.to_string(),
                    );
                    None
                }
            })
            .collect();

        let mut set = build_set.lock();
        for file in refreshed {
            set.insert_file(&root, file);
        }
    }
}

/// Staged output location for `source`: the path relative to the group root,
/// mirrored under a per-group staging directory, with a uniform `.js` suffix
/// appended (`src/app.ts` → `<staging>/app-1a2b3c4d/src/app.ts.js`).
pub(crate) fn staged_output_path(staging_root: &Path, group_root: &Path, source: &Path) -> PathBuf {
    let rel = source.strip_prefix(group_root).unwrap_or(source);
    let mut staged = staging_root.join(group_dir_name(group_root)).join(rel);
    let file_name = staged
        .file_name()
        .map(|n| {
            let mut name = n.to_os_string();
            name.push(".js");
            name
        })
        .unwrap_or_default();
    staged.set_file_name(file_name);
    staged
}

/// Stable directory name for a group's staging subtree.
fn group_dir_name(group_root: &Path) -> String {
    let mut hasher = rustc_hash::FxHasher::default();
    group_root.hash(&mut hasher);
    let base = group_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string());
    format!("{base}-{:08x}", hasher.finish() as u32)
}

/// Transform `source` and write its output through to the staging tree.
pub(crate) fn compile_to_staging(
    staging_root: &Path,
    group_root: &Path,
    source: &Path,
) -> Result<CompiledFile, RunnerError> {
    // Timestamp taken before the read: a write racing the transform leaves
    // the entry stale and it gets picked up again.
    let compiled_at = SystemTime::now();
    let code = transform::transform_file(source)?;
    let output_path = staged_output_path(staging_root, group_root, source);
    atomic_write(&output_path, code.as_bytes()).map_err(|e| RunnerError::Compile {
        path: source.to_path_buf(),
        message: format!("failed to stage output: {e}"),
    })?;
    Ok(CompiledFile {
        source: source.to_path_buf(),
        code,
        compiled_at,
    })
}
