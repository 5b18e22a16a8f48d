//! Per-run session state.
//!
//! A session owns the temporary work directory (IPC socket + staging tree of
//! compiled outputs), the ordered shutdown-cleanup list, and the global
//! shutdown flag. Nothing in the work directory survives across runs.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tempfile::TempDir;

type CleanupFn = Box<dyn FnOnce() + Send>;

/// Channel used to wake the reload controller on shutdown
static SHUTDOWN_TX: OnceLock<tokio::sync::mpsc::Sender<()>> = OnceLock::new();

/// Setup the global Ctrl+C handler. Call once at program start, before any
/// blocking operations.
///
/// Before the controller registers its channel the handler exits directly;
/// afterwards it only wakes the controller, which performs orderly shutdown.
pub fn setup_shutdown_handler() -> Result<()> {
    ctrlc::set_handler(|| match SHUTDOWN_TX.get() {
        Some(tx) => {
            let _ = tx.try_send(());
        }
        None => std::process::exit(0),
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))
}

/// Register the controller's shutdown channel with the signal handler.
pub fn register_shutdown_channel(tx: tokio::sync::mpsc::Sender<()>) {
    let _ = SHUTDOWN_TX.set(tx);
}

// ============================================================================
// Session
// ============================================================================

/// One run of the tool: workspace root, work directory, cleanup list.
pub struct Session {
    /// Workspace root (the directory whose manifest was found first).
    root: PathBuf,
    /// Temporary work directory under the OS temp dir.
    work_dir: TempDir,
    /// Cleanup callbacks, run in registration order on shutdown.
    cleanups: Mutex<Vec<CleanupFn>>,
}

impl Session {
    /// Create a session with a fresh `tsrun-` prefixed work directory.
    pub fn new(root: &Path) -> Result<Self> {
        let work_dir = tempfile::Builder::new()
            .prefix("tsrun-")
            .tempdir()
            .context("failed to create work directory")?;

        Ok(Self {
            root: root.to_path_buf(),
            work_dir,
            cleanups: Mutex::new(Vec::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    /// Path of the IPC endpoint inside the work directory.
    pub fn socket_path(&self) -> PathBuf {
        self.work_dir.path().join("ipc.sock")
    }

    /// Root of the staging tree of compiled outputs.
    pub fn staging_dir(&self) -> PathBuf {
        self.work_dir.path().join("build")
    }

    /// Register a cleanup callback. Callbacks run in registration order.
    pub fn on_cleanup(&self, f: impl FnOnce() + Send + 'static) {
        self.cleanups.lock().push(Box::new(f));
    }

    /// Run all cleanup callbacks and remove the work directory.
    ///
    /// Explicit because shutdown ends in `process::exit`, where destructors
    /// do not run.
    pub fn cleanup(&self) {
        let callbacks: Vec<CleanupFn> = std::mem::take(&mut *self.cleanups.lock());
        for f in callbacks {
            f();
        }
        let _ = std::fs::remove_dir_all(self.work_dir.path());
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_dir_layout() {
        let session = Session::new(Path::new("/tmp")).unwrap();
        assert!(session.work_dir().exists());
        assert!(session.socket_path().starts_with(session.work_dir()));
        assert!(session.staging_dir().starts_with(session.work_dir()));
        assert_eq!(session.socket_path().file_name().unwrap(), "ipc.sock");
    }

    #[test]
    fn test_work_dir_prefix() {
        let session = Session::new(Path::new("/tmp")).unwrap();
        let name = session
            .work_dir()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .to_string();
        assert!(name.starts_with("tsrun-"));
    }

    #[test]
    fn test_cleanups_run_in_registration_order() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let session = Session::new(Path::new("/tmp")).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        let counter = Arc::new(AtomicUsize::new(0));

        for i in 0..3 {
            let order = Arc::clone(&order);
            let counter = Arc::clone(&counter);
            session.on_cleanup(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                order.lock().push(i);
            });
        }

        let work_dir = session.work_dir().to_path_buf();
        session.cleanup();

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert!(!work_dir.exists());
    }
}
