//! The compiled-file cache: build groups keyed by package root.
//!
//! - [`CompiledFile`]: one transformed source file's latest output.
//! - [`BuildGroup`]: all compiled files under one package root.
//! - [`BuildSet`]: every live group in the session.
//!
//! # Invariants
//! - Every file in a group shares the group's root.
//! - A source path belongs to at most one group at a time, so lookup by
//!   source path is unambiguous. The set maintains a source → root index and
//!   evicts stale memberships on insert.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rustc_hash::FxHashMap;

/// One source file's latest compiled output, retained until the file is
/// recompiled in place or its group is invalidated.
#[derive(Debug, Clone)]
pub struct CompiledFile {
    /// Absolute path of the authored source file.
    pub source: PathBuf,
    /// Output body, including the inline source map trailer.
    pub code: String,
    /// When the transform ran; compared against the source mtime to decide
    /// whether an in-place recompile is needed.
    pub compiled_at: SystemTime,
}

impl CompiledFile {
    /// True if the source has been touched since this output was produced.
    pub fn is_stale(&self) -> bool {
        self.source
            .metadata()
            .and_then(|m| m.modified())
            .map(|mtime| mtime > self.compiled_at)
            .unwrap_or(true)
    }
}

/// Compiled files under one package root, built together.
#[derive(Debug)]
pub struct BuildGroup {
    root: PathBuf,
    files: FxHashMap<PathBuf, CompiledFile>,
}

impl BuildGroup {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, source: &Path) -> Option<&CompiledFile> {
        self.files.get(source)
    }

    pub fn sources(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.keys()
    }

    /// In-memory output bodies for every file of the group.
    pub fn bodies(&self) -> FxHashMap<PathBuf, String> {
        self.files
            .iter()
            .map(|(source, file)| (source.clone(), file.code.clone()))
            .collect()
    }

    /// Sources whose outputs are older than the file on disk.
    pub fn stale_sources(&self) -> Vec<PathBuf> {
        self.files
            .values()
            .filter(|f| f.is_stale())
            .map(|f| f.source.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

/// The complete cache: every live build group, indexed both by group root
/// and by member source path.
#[derive(Debug, Default)]
pub struct BuildSet {
    /// Group root → group.
    groups: FxHashMap<PathBuf, BuildGroup>,
    /// Source path → owning group root.
    index: FxHashMap<PathBuf, PathBuf>,
}

impl BuildSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group that owns `source`, if any.
    pub fn group_of(&self, source: &Path) -> Option<&BuildGroup> {
        self.groups.get(self.index.get(source)?)
    }

    /// Group registered under `root`, if any.
    pub fn group_by_root(&self, root: &Path) -> Option<&BuildGroup> {
        self.groups.get(root)
    }

    /// Add or refresh a file in the group for `root`, creating the group if
    /// needed. A previous membership under another root is evicted first,
    /// preserving at-most-one-group membership.
    pub fn insert_file(&mut self, root: &Path, file: CompiledFile) {
        debug_assert!(file.source.starts_with(root));
        if let Some(old_root) = self.index.remove(&file.source)
            && old_root != root
            && let Some(group) = self.groups.get_mut(&old_root)
        {
            group.files.remove(&file.source);
            if group.files.is_empty() {
                self.groups.remove(&old_root);
            }
        }
        self.index.insert(file.source.clone(), root.to_path_buf());
        self.groups
            .entry(root.to_path_buf())
            .or_insert_with(|| BuildGroup {
                root: root.to_path_buf(),
                files: FxHashMap::default(),
            })
            .files
            .insert(file.source.clone(), file);
    }

    /// Drop all cached groups.
    pub fn invalidate(&mut self) {
        self.groups.clear();
        self.index.clear();
    }

    pub fn groups(&self) -> impl Iterator<Item = &BuildGroup> {
        self.groups.values()
    }
}
