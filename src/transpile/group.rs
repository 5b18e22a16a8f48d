//! Group-build backend.
//!
//! On first reference to a source file, locates the enclosing package root,
//! enumerates every candidate under it, and transforms them all in one
//! parallel batch. Subsequent references serve from the cache, recompiling a
//! touched file in place. The staging directory is a write-through cache:
//! the child's loader reads from it, not from parent memory.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use super::{
    GroupSnapshot, TranspilerBackend, bodies_of, compile_to_staging, ignore, rebuild_stale,
    resolve_source,
};
use crate::buildset::{BuildSet, CompiledFile};
use crate::config::ProjectConfig;
use crate::errors::RunnerError;

pub struct GroupBackend {
    staging_root: PathBuf,
    build_set: Mutex<BuildSet>,
}

impl GroupBackend {
    pub fn new(staging_root: PathBuf) -> Self {
        Self {
            staging_root,
            build_set: Mutex::new(BuildSet::new()),
        }
    }

    /// The root's own manifest config, re-read on every group assembly so
    /// manifest edits take effect with the next invalidation.
    fn config_for(&self, root: &Path, source: &Path) -> Result<ProjectConfig, RunnerError> {
        ProjectConfig::load(root).map_err(|e| RunnerError::Compile {
            path: source.to_path_buf(),
            message: format!("{e:#}"),
        })
    }

    /// Build the whole group for `root`, requested via `source`.
    fn build_group(&self, root: &Path, source: &Path) -> Result<GroupSnapshot, RunnerError> {
        let config = self.config_for(root, source)?;
        let extensions = config.enumeration_extensions();
        let members = ignore::enumerate(root, &extensions, &config.ignore)?;

        if !members.iter().any(|m| m == source) {
            return Err(
                ignore::why_missing(root, &extensions, &config.ignore, source).into_error(source),
            );
        }

        crate::debug!("build"; "group {} ({} files)", root.display(), members.len());

        let compiled: Vec<CompiledFile> = members
            .par_iter()
            .map(|member| compile_to_staging(&self.staging_root, root, member))
            .collect::<Result<_, _>>()?;

        let mut set = self.build_set.lock();
        for file in compiled {
            set.insert_file(root, file);
        }
        let group = set.group_of(source).expect("inserted under this lock");
        Ok(GroupSnapshot::of(group))
    }
}

impl TranspilerBackend for GroupBackend {
    fn compile(&self, source: &Path) -> Result<GroupSnapshot, RunnerError> {
        let (source, root) = resolve_source(source)?;

        // Cached membership: serve, refreshing a touched file in place.
        let cached_stale = {
            let set = self.build_set.lock();
            set.group_of(&source)
                .and_then(|g| g.get(&source))
                .map(|f| f.is_stale())
        };
        if let Some(stale) = cached_stale {
            if stale {
                let file = compile_to_staging(&self.staging_root, &root, &source)?;
                self.build_set.lock().insert_file(&root, file);
            }
            let set = self.build_set.lock();
            if let Some(group) = set.group_of(&source) {
                return Ok(GroupSnapshot::of(group));
            }
            // Invalidated while we were refreshing; rebuild below.
        }

        // Group already built but the file is not a member: either filtered
        // (report which pattern) or created after the build (accrete).
        if self.build_set.lock().group_by_root(&root).is_some() {
            let config = self.config_for(&root, &source)?;
            let extensions = config.enumeration_extensions();
            match ignore::why_missing(&root, &extensions, &config.ignore, &source) {
                ignore::MissingReason::FreshCandidate => {
                    let file = compile_to_staging(&self.staging_root, &root, &source)?;
                    let mut set = self.build_set.lock();
                    set.insert_file(&root, file);
                    let group = set.group_of(&source).expect("inserted under this lock");
                    return Ok(GroupSnapshot::of(group));
                }
                reason => return Err(reason.into_error(&source)),
            }
        }

        self.build_group(&root, &source)
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
