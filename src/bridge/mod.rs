//! Synchronous-over-asynchronous bridge.
//!
//! The child's module-load hook is entered synchronously by the host
//! runtime, but the compiled output lives behind the parent's asynchronous
//! IPC service. The bridge lets the hook block its thread while an auxiliary
//! worker performs the call:
//!
//! 1. The caller allocates a fresh one-word shared slot, posts
//!    `{ id, call, slot }` to the worker, and parks on the slot with a
//!    60 s timeout.
//! 2. The worker runs the blocking IPC call, posts `{ id, result }` on the
//!    reply channel, **then** increments the slot, **then** wakes waiters.
//! 3. The caller resumes, receives the reply synchronously, verifies the id,
//!    and returns the result or propagates the error.
//!
//! A fresh slot per call makes stale wakeups impossible; the
//! store-then-notify order turns the "worker finished before the caller
//! parked" race into a fast `NotEqual` return instead of a lost wakeup.

mod futex;
mod worker;


use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::time::Duration;

use crate::errors::RunnerError;
use crate::ipc::IpcClient;

use futex::WaitStatus;
use worker::{BridgeReply, BridgeRequest, spawn_worker};
pub use worker::{BridgeCall, BridgeOutcome, BridgeTransport};

/// Hard limit on one bridge call. The parent answers compiles in
/// milliseconds; hitting this means the runner is wedged, so the child dies
/// loudly rather than hanging module loads forever.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Child-side handle performing blocking calls against the parent.
///
/// Calls take `&mut self`: the host loader is single-threaded, so calls are
/// naturally serialized and replies always match the most recent request.
pub struct SyncBridge {
    requests: Sender<BridgeRequest>,
    replies: Receiver<BridgeReply>,
    next_id: u64,
    timeout: Duration,
}

impl SyncBridge {
    /// Connect to the parent's socket (from the `SOCKET_PATH` environment
    /// the supervisor set).
    pub fn connect(socket_path: PathBuf) -> Self {
        Self::with_transport(IpcClient::new(socket_path), CALL_TIMEOUT)
    }

    /// Build a bridge over any transport. Tests use this with fakes.
    pub fn with_transport<T: BridgeTransport>(transport: T, timeout: Duration) -> Self {
        let (request_tx, request_rx) = channel();
        let (reply_tx, reply_rx) = channel();
        spawn_worker(transport, request_rx, reply_tx);
        Self {
            requests: request_tx,
            replies: reply_rx,
            next_id: 0,
            timeout,
        }
    }

    /// Compile `source` in the parent; returns its group's output bodies.
    pub fn compile(&mut self, source: &Path) -> Result<HashMap<PathBuf, String>, RunnerError> {
        match self.call(BridgeCall::Compile(source.to_path_buf()))? {
            BridgeOutcome::Files(files) => Ok(files),
            BridgeOutcome::Done => Err(RunnerError::BridgeProtocol(
                "compile reply carried no files".into(),
            )),
        }
    }

    /// Register loaded paths with the parent's watcher.
    pub fn file_required(&mut self, paths: Vec<PathBuf>) -> Result<(), RunnerError> {
        match self.call(BridgeCall::FileRequired(paths))? {
            BridgeOutcome::Done => Ok(()),
            BridgeOutcome::Files(_) => Err(RunnerError::BridgeProtocol(
                "file-required reply carried files".into(),
            )),
        }
    }

    fn call(&mut self, call: BridgeCall) -> Result<BridgeOutcome, RunnerError> {
        let id = self.next_id;
        self.next_id += 1;

        // Fresh slot per call: wakeups cannot leak across calls.
        let slot = Arc::new(AtomicU32::new(0));
        self.requests
            .send(BridgeRequest {
                id,
                call,
                slot: Arc::clone(&slot),
            })
            .map_err(|_| RunnerError::BridgeProtocol("worker thread is gone".into()))?;

        match futex::wait(&slot, 0, self.timeout) {
            WaitStatus::Ok | WaitStatus::NotEqual => {}
            WaitStatus::TimedOut => {
                return Err(RunnerError::BridgeTimeout(self.timeout.as_millis() as u64));
            }
        }

        let reply = self
            .replies
            .recv()
            .map_err(|_| RunnerError::BridgeProtocol("reply channel closed".into()))?;
        if reply.id != id {
            return Err(RunnerError::BridgeProtocol(format!(
                "reply id {} does not match request id {id}",
                reply.id
            )));
        }
        reply.result
    }
}
