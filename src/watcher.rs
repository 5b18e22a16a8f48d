//! Filesystem watcher with a dynamically growing path set.
//!
//! Starts empty; paths are registered as the child reports required files
//! over IPC and as `/compile` requests are served. Registering a file also
//! attaches a non-recursive watch on its parent directory, so files added or
//! removed next to tracked sources are observed as structural changes.
//!
//! Classification rule:
//! - content change on a tracked file → reload, `invalidate = false`
//! - create/remove of a recognized source file → reload, `invalidate = true`
//!   (group membership may have shifted; the whole build set is recomputed)
//!
//! Paths under `node_modules` are never registered and never produce events.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::utils::path::{is_under_node_modules, normalize_path};

/// One actionable filesystem change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadRequest {
    pub path: PathBuf,
    /// Structural change: drop the build set before rebuilding.
    pub invalidate: bool,
}

pub struct Watcher {
    /// Watcher handle (must be kept alive; `watch` needs `&mut`)
    inner: Mutex<RecommendedWatcher>,
    /// Files explicitly registered via IPC
    tracked_files: Mutex<FxHashSet<PathBuf>>,
    /// Parent directories with an active non-recursive watch
    watched_dirs: Mutex<FxHashSet<PathBuf>>,
    /// Source extensions that make an untracked path interesting
    extensions: Vec<String>,
}

impl Watcher {
    /// Create the watcher and the channel raw events arrive on.
    ///
    /// notify delivers on its own thread; a forwarder thread bridges into
    /// the async loop (the controller classifies there, so no business logic
    /// lives on the notify callback).
    pub fn new(
        extensions: Vec<String>,
    ) -> notify::Result<(Arc<Self>, tokio::sync::mpsc::Receiver<notify::Event>)> {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel::<notify::Result<notify::Event>>();
        let watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;

        let (async_tx, async_rx) = tokio::sync::mpsc::channel::<notify::Event>(64);
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Err(e) => crate::log!("watch"; "notify error: {}", e),
                }
            }
        });

        Ok((
            Arc::new(Self {
                inner: Mutex::new(watcher),
                tracked_files: Mutex::new(FxHashSet::default()),
                watched_dirs: Mutex::new(FxHashSet::default()),
                extensions,
            }),
            async_rx,
        ))
    }

    /// Register a file. Best-effort: watch errors are logged, not fatal.
    ///
    /// The set is additive for the whole session; invalidation never removes
    /// paths.
    pub fn track(&self, path: &Path) {
        let path = normalize_path(path);
        if is_under_node_modules(&path) {
            return;
        }
        if !self.tracked_files.lock().insert(path.clone()) {
            return;
        }
        crate::debug!("watch"; "tracking {}", path.display());

        let Some(parent) = path.parent().map(Path::to_path_buf) else {
            return;
        };
        if !self.watched_dirs.lock().insert(parent.clone()) {
            return;
        }
        if let Err(e) = self
            .inner
            .lock()
            .watch(&parent, RecursiveMode::NonRecursive)
        {
            crate::log!("watch"; "failed to watch {}: {}", parent.display(), e);
        }
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.tracked_files.lock().contains(path)
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked_files.lock().len()
    }

    /// Turn a raw notify event into actionable reload requests.
    pub fn classify(&self, event: &notify::Event) -> Vec<ReloadRequest> {
        use notify::EventKind;

        let invalidate = match event.kind {
            // Structural: group membership may have changed
            EventKind::Create(_) | EventKind::Remove(_) => true,
            EventKind::Modify(modify) => {
                // mtime/chmod noise would cause endless reload loops
                if matches!(modify, notify::event::ModifyKind::Metadata(_)) {
                    return Vec::new();
                }
                false
            }
            _ => return Vec::new(),
        };

        let mut requests = Vec::new();
        for path in &event.paths {
            if is_temp_file(path) || is_under_node_modules(path) {
                continue;
            }
            let interesting = if invalidate {
                // New or removed source file anywhere we look
                self.has_source_extension(path) || self.is_tracked(path)
            } else {
                // Content changes only matter for files the child loaded
                self.is_tracked(path)
            };
            if !interesting {
                continue;
            }
            requests.push(ReloadRequest {
                path: path.clone(),
                invalidate,
            });
        }
        requests
    }

    fn has_source_extension(&self, path: &Path) -> bool {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return false,
        };
        self.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
    }
}

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

// ============================================================================
// Tests
// ============================================================================
