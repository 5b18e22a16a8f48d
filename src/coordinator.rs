//! Compile coordinator.
//!
//! Thin, cloneable owner around the boot-selected transpiler backend. IPC
//! handlers and the reload controller both hold a handle; the backend itself
//! guards the build set, so no coordination happens here beyond dispatch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::errors::RunnerError;
use crate::transpile::{BackendKind, GroupSnapshot, TranspilerBackend, create_backend};

#[derive(Clone)]
pub struct CompileCoordinator {
    backend: Arc<dyn TranspilerBackend>,
}

impl CompileCoordinator {
    pub fn new(kind: BackendKind, staging_root: PathBuf) -> Self {
        Self {
            backend: create_backend(kind, staging_root),
        }
    }

    /// Ensure `source` and its group peers have current compiled output.
    pub fn compile(&self, source: &Path) -> Result<GroupSnapshot, RunnerError> {
        self.backend.compile(source)
    }

    /// In-memory output bodies for every file of the group containing
    /// `source`.
    pub fn file_group(&self, source: &Path) -> Result<FxHashMap<PathBuf, String>, RunnerError> {
        self.backend.file_group(source)
    }

    /// Drop all cached groups; the next compile rebuilds from scratch.
    pub fn invalidate_build_set(&self) {
        self.backend.invalidate_build_set();
    }

    /// Refresh outputs for every group currently in the build set.
    pub fn rebuild(&self) {
        self.backend.rebuild();
    }
}
