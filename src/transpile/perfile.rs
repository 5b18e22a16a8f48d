//! Per-file backend.
//!
//! Skips group enumeration entirely: transforms exactly the requested file
//! and records it as a member of the group keyed by its package root. Groups
//! grow by accretion as the child loads more files. Outputs are still staged
//! on disk so the child's loader reads both backends the same way.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::{
    GroupSnapshot, TranspilerBackend, bodies_of, compile_to_staging, rebuild_stale, resolve_source,
};
use crate::buildset::BuildSet;
use crate::errors::RunnerError;

pub struct PerFileBackend {
    staging_root: PathBuf,
    build_set: Mutex<BuildSet>,
}

impl PerFileBackend {
    pub fn new(staging_root: PathBuf) -> Self {
        Self {
            staging_root,
            build_set: Mutex::new(BuildSet::new()),
        }
    }
}

impl TranspilerBackend for PerFileBackend {
    fn compile(&self, source: &Path) -> Result<GroupSnapshot, RunnerError> {
        let (source, root) = resolve_source(source)?;

        {
            let set = self.build_set.lock();
            if let Some(group) = set.group_of(&source)
                && group.get(&source).is_some_and(|f| !f.is_stale())
            {
                return Ok(GroupSnapshot::of(group));
            }
        }

        let file = compile_to_staging(&self.staging_root, &root, &source)?;
        let mut set = self.build_set.lock();
        set.insert_file(&root, file);
        let group = set.group_of(&source).expect("inserted under this lock");
        Ok(GroupSnapshot::of(group))
    }

    fn file_group(&self, source: &Path) -> Result<FxHashMap<PathBuf, String>, RunnerError> {
        bodies_of(&self.build_set, source)
    }

    fn invalidate_build_set(&self) {
        self.build_set.lock().invalidate();
    }

    fn rebuild(&self) {
        rebuild_stale(&self.staging_root, &self.build_set);
    }
}
