//! Reload controller.
//!
//! The controller is the single cooperative loop of the parent. It owns the
//! supervisor, the compile coordinator, a handle to the watcher, and the
//! session, and it turns raw watcher events into debounced reload batches:
//!
//! ```text
//! watcher/stdin → batch (15 ms trailing debounce) → [invalidate] → rebuild → restart
//! ```
//!
//! Invalidate → rebuild → restart is strictly sequenced inside the loop, so
//! a restart never observes a partially compiled build set.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::mpsc;

use crate::coordinator::CompileCoordinator;
use crate::session::Session;
use crate::supervisor::{ChildExit, Supervisor};
use crate::watcher::Watcher;

/// Trailing-edge debounce for change batches.
pub const DEBOUNCE: Duration = Duration::from_millis(15);

// =============================================================================
// ReloadBatch
// =============================================================================

/// Pending work between debounce flushes.
///
/// `invalidate` is monotonic within a batch: once a structural change is
/// seen, the flush recomputes the whole build set. Cleared on every flush.
#[derive(Debug, Default)]
pub struct ReloadBatch {
    paths: Vec<PathBuf>,
    invalidate: bool,
    last_event: Option<Instant>,
}

impl ReloadBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a change, extending the debounce window.
    pub fn enqueue(&mut self, path: PathBuf, invalidate: bool) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
        self.invalidate |= invalidate;
        self.last_event = Some(Instant::now());
    }

    pub fn is_ready(&self) -> bool {
        match self.last_event {
            Some(last) => last.elapsed() >= DEBOUNCE && !self.paths.is_empty(),
            None => false,
        }
    }

    /// Precise sleep until the batch could next be ready.
    pub fn sleep_duration(&self) -> Duration {
        match self.last_event {
            Some(last) => DEBOUNCE
                .saturating_sub(last.elapsed())
                .max(Duration::from_millis(1)),
            None => Duration::from_secs(86400),
        }
    }

    /// Snapshot and clear. Changes enqueued after this call land in the
    /// next batch; none are lost.
    pub fn take(&mut self) -> Option<(Vec<PathBuf>, bool)> {
        self.last_event = None;
        if self.paths.is_empty() {
            return None;
        }
        let paths = std::mem::take(&mut self.paths);
        let invalidate = std::mem::replace(&mut self.invalidate, false);
        Some((paths, invalidate))
    }
}

/// User-visible one-liner for a flushed batch.
fn summary(paths: &[PathBuf], invalidate: bool, root: &std::path::Path) -> String {
    let first = paths
        .first()
        .map(|p| p.strip_prefix(root).unwrap_or(p).display().to_string())
        .unwrap_or_default();
    let action = if invalidate {
        "reinitializing and restarting"
    } else {
        "restarting"
    };
    match paths.len() {
        0 | 1 => format!("{first} changed, {action}..."),
        n => format!("{first} and {} others changed, {action}...", n - 1),
    }
}

/// Parent exit code for a finished child.
fn exit_code_for(child_code: Option<i32>) -> i32 {
    child_code.unwrap_or(1)
}

// =============================================================================
// Project
// =============================================================================

/// Boot options carried from the CLI.
#[derive(Debug, Clone, Copy)]
pub struct ProjectOptions {
    /// Restart on source changes.
    pub watch: bool,
    /// Read stdin control commands (`rs` = restart).
    pub commands: bool,
    /// Keep the parent alive after child exit.
    pub supervise: bool,
}

pub struct Project {
    session: Arc<Session>,
    coordinator: CompileCoordinator,
    watcher: Arc<Watcher>,
    supervisor: Supervisor,
    batch: ReloadBatch,
    options: ProjectOptions,
}

impl Project {
    pub fn new(
        session: Arc<Session>,
        coordinator: CompileCoordinator,
        watcher: Arc<Watcher>,
        supervisor: Supervisor,
        options: ProjectOptions,
    ) -> Self {
        Self {
            session,
            coordinator,
            watcher,
            supervisor,
            batch: ReloadBatch::new(),
            options,
        }
    }

    /// Run until shutdown. Consumes the event channels wired at boot.
    pub async fn run(
        mut self,
        mut fs_events: mpsc::Receiver<notify::Event>,
        mut child_exits: mpsc::Receiver<ChildExit>,
    ) -> Result<()> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        crate::session::register_shutdown_channel(shutdown_tx);

        let mut stdin_lines = self.options.commands.then(spawn_stdin_reader);

        // Initial boot goes through the same path as a manual restart.
        self.invalidate_build_set_and_reload();

        loop {
            // Disabled arms (no stdin task) must not poll a dead channel.
            let stdin_recv = async {
                match stdin_lines.as_mut() {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;
                Some(()) = shutdown_rx.recv() => {
                    self.shutdown(0).await;
                }
                Some(exit) = child_exits.recv() => {
                    self.on_child_exit(exit).await;
                }
                Some(line) = stdin_recv => {
                    self.on_command(&line);
                }
                Some(event) = fs_events.recv() => {
                    if self.options.watch {
                        for request in self.watcher.classify(&event) {
                            self.enqueue_reload(request.path, request.invalidate);
                        }
                    }
                }
                _ = tokio::time::sleep(self.batch.sleep_duration()) => {
                    if self.batch.is_ready() {
                        self.reload_now();
                    }
                }
            }
        }
    }

    /// Append a change to the pending batch.
    pub fn enqueue_reload(&mut self, path: PathBuf, invalidate: bool) {
        crate::debug!("watch"; "queued {} (invalidate: {})", path.display(), invalidate);
        self.batch.enqueue(path, invalidate);
    }

    /// Flush the pending batch: log, snapshot, then invalidate → rebuild →
    /// restart in order.
    fn reload_now(&mut self) {
        let Some((paths, invalidate)) = self.batch.take() else {
            return;
        };
        crate::logger::status_restart(&summary(&paths, invalidate, self.session.root()));

        if invalidate {
            self.coordinator.invalidate_build_set();
        }
        self.coordinator.rebuild();
        if let Err(e) = self.supervisor.restart() {
            crate::log!("error"; "restart failed: {:#}", e);
        }
    }

    /// Unconditional invalidate → rebuild → restart. Initial boot and the
    /// stdin `rs` command.
    fn invalidate_build_set_and_reload(&mut self) {
        self.coordinator.invalidate_build_set();
        self.coordinator.rebuild();
        if let Err(e) = self.supervisor.restart() {
            crate::log!("error"; "failed to start child: {:#}", e);
        }
    }

    fn on_command(&mut self, line: &str) {
        match line.trim() {
            "rs" => {
                crate::logger::status_restart("reinitializing and restarting...");
                self.invalidate_build_set_and_reload();
            }
            "" => {}
            other => crate::log!("watch"; "unknown command `{}` (try `rs`)", other),
        }
    }

    async fn on_child_exit(&mut self, exit: ChildExit) {
        if !self.supervisor.notify_exit(exit.generation) {
            // A generation we already killed and replaced
            return;
        }

        if self.options.supervise {
            match exit.code {
                Some(code) => crate::log!("child"; "exited with code {}; waiting for changes", code),
                None => crate::log!("child"; "was killed; waiting for changes"),
            }
            return;
        }
        self.shutdown(exit_code_for(exit.code)).await;
    }

    /// Stop the supervisor, run cleanups in registration order, terminate.
    async fn shutdown(&mut self, code: i32) {
        crate::debug!("watch"; "shutting down (code {})", code);
        self.supervisor.stop().await;
        self.session.cleanup();
        std::process::exit(code);
    }
}

/// Forward stdin lines into the controller loop.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    use tokio::io::AsyncBufReadExt;

    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
    rx
}

// =============================================================================
// Tests
// =============================================================================
