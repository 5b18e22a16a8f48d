//! Child process supervision.
//!
//! At most one live child. `restart()` hard-kills any running child and
//! spawns a fresh one: dev-loop responsiveness wins over draining buffered
//! output. Graceful SIGTERM-then-SIGKILL escalation is reserved for
//! `stop()` on shutdown.
//!
//! Exit reporting: every spawn gets a generation number, and a monitor task
//! sends `ChildExit { generation, code }` to the controller when the child
//! reaps. The controller drops events from older generations, so a kill
//! during restart never masquerades as the live child exiting.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::sync::mpsc;

use crate::loader;

/// How long `stop()` waits after SIGTERM before escalating.
pub const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// A child exit observed by the monitor task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildExit {
    /// Spawn generation the exit belongs to.
    pub generation: u64,
    /// Process exit code; `None` when killed by a signal.
    pub code: Option<i32>,
}

pub struct Supervisor {
    /// Runtime program (`node` unless overridden).
    program: String,
    /// Hook-registration arguments prepended to the user argv.
    hook_args: Vec<String>,
    /// The user's command and arguments, passed through untouched.
    user_argv: Vec<String>,
    /// IPC endpoint the child reports back to.
    socket_path: PathBuf,
    /// Comma-joined extension list for the loader hook.
    extensions: String,
    /// Live child pid, if any.
    pid: Option<u32>,
    /// Incremented per spawn; tags exit events.
    generation: u64,
    exit_tx: mpsc::Sender<ChildExit>,
}

impl Supervisor {
    pub fn new(
        user_argv: Vec<String>,
        socket_path: PathBuf,
        extensions: String,
        exit_tx: mpsc::Sender<ChildExit>,
    ) -> Self {
        Self {
            program: loader::DEFAULT_RUNTIME.to_string(),
            hook_args: loader::hook_args(),
            user_argv,
            socket_path,
            extensions,
            pid: None,
            generation: 0,
            exit_tx,
        }
    }

    /// Override the runtime program and hook args (tests, exotic runtimes).
    pub fn with_program(mut self, program: impl Into<String>, hook_args: Vec<String>) -> Self {
        self.program = program.into();
        self.hook_args = hook_args;
        self
    }

    /// Generation of the most recent spawn.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Record an observed exit. Returns true if it belongs to the current
    /// child (stale events from killed generations return false).
    pub fn notify_exit(&mut self, generation: u64) -> bool {
        if generation == self.generation {
            self.pid = None;
            true
        } else {
            false
        }
    }

    pub fn has_child(&self) -> bool {
        self.pid.is_some()
    }

    /// Kill any live child immediately, then spawn a fresh one.
    pub fn restart(&mut self) -> Result<()> {
        self.kill();
        self.spawn_child()
    }

    /// Hard-kill the live child, if any.
    pub fn kill(&mut self) {
        if let Some(pid) = self.pid.take() {
            crate::debug!("child"; "killing pid {}", pid);
            send_signal(pid, Signal::SIGKILL);
        }
    }

    /// Graceful stop: SIGTERM, then SIGKILL after 5 s.
    pub async fn stop(&mut self) {
        let Some(pid) = self.pid.take() else {
            return;
        };
        send_signal(pid, Signal::SIGTERM);

        let deadline = Instant::now() + GRACEFUL_STOP_TIMEOUT;
        while Instant::now() < deadline {
            if !is_alive(pid) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        crate::log!("child"; "did not exit within {}s, killing", GRACEFUL_STOP_TIMEOUT.as_secs());
        send_signal(pid, Signal::SIGKILL);
    }

    fn spawn_child(&mut self) -> Result<()> {
        self.generation += 1;

        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.hook_args)
            .args(&self.user_argv)
            .env(loader::SOCKET_PATH_ENV, &self.socket_path)
            .env(loader::EXTENSIONS_ENV, &self.extensions)
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", self.program))?;
        self.pid = child.id();
        crate::debug!("child"; "spawned pid {:?} (generation {})", self.pid, self.generation);

        let generation = self.generation;
        let exit_tx = self.exit_tx.clone();
        tokio::spawn(async move {
            let code = child.wait().await.ok().and_then(|status| status.code());
            let _ = exit_tx.send(ChildExit { generation, code }).await;
        });
        Ok(())
    }
}

/// Null-signal liveness probe. EPERM still means the process exists.
fn is_alive(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(pid), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

fn send_signal(pid: u32, signal: Signal) {
    if let Ok(pid) = i32::try_from(pid) {
        let _ = kill(Pid::from_raw(pid), signal);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn make_supervisor(
        argv: Vec<&str>,
    ) -> (Supervisor, mpsc::Receiver<ChildExit>) {
        let (tx, rx) = mpsc::channel(8);
        let supervisor = Supervisor::new(
            argv.into_iter().map(String::from).collect(),
            PathBuf::from("/tmp/ipc.sock"),
            ".ts,.js".to_string(),
            tx,
        )
        .with_program("sh", Vec::new());
        (supervisor, rx)
    }

    #[tokio::test]
    async fn test_exit_code_reported() {
        let (mut supervisor, mut rx) = make_supervisor(vec!["-c", "exit 2"]);
        supervisor.restart().unwrap();

        let exit = rx.recv().await.unwrap();
        assert_eq!(exit.generation, 1);
        assert_eq!(exit.code, Some(2));
    }

    #[tokio::test]
    async fn test_restart_generation_distinguishes_stale_exits() {
        let (mut supervisor, mut rx) = make_supervisor(vec!["-c", "sleep 30"]);
        supervisor.restart().unwrap();
        assert_eq!(supervisor.generation(), 1);

        // Restart kills generation 1; its exit event must carry the old tag
        supervisor.restart().unwrap();
        assert_eq!(supervisor.generation(), 2);

        let stale = rx.recv().await.unwrap();
        assert_eq!(stale.generation, 1);
        // Killed by signal: no exit code
        assert_eq!(stale.code, None);

        supervisor.kill();
        let current = rx.recv().await.unwrap();
        assert_eq!(current.generation, 2);
    }

    #[tokio::test]
    async fn test_stop_terminates_promptly() {
        let (mut supervisor, mut rx) = make_supervisor(vec!["-c", "sleep 30"]);
        supervisor.restart().unwrap();

        let start = Instant::now();
        supervisor.stop().await;
        // sh exits on SIGTERM well inside the escalation window
        assert!(start.elapsed() < GRACEFUL_STOP_TIMEOUT);
        assert!(!supervisor.has_child());

        let exit = rx.recv().await.unwrap();
        assert_eq!(exit.code, None);
    }

    #[tokio::test]
    async fn test_child_env_carries_socket_and_extensions() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut supervisor = Supervisor::new(
            vec![
                "-c".to_string(),
                "test \"$SOCKET_PATH\" = /tmp/ipc.sock -a \"$EXTENSIONS\" = .ts,.js".to_string(),
            ],
            PathBuf::from("/tmp/ipc.sock"),
            ".ts,.js".to_string(),
            tx,
        )
        .with_program("sh", Vec::new());
        supervisor.restart().unwrap();

        let exit = rx.recv().await.unwrap();
        assert_eq!(exit.code, Some(0), "env vars missing in child");
    }
}
