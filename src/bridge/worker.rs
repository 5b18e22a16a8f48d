//! The bridge's auxiliary worker thread.
//!
//! Executes blocking IPC calls on behalf of a caller that cannot yield.
//! Completion order is load-bearing: the reply is posted on the channel
//! first, then the shared slot is incremented, then waiters are woken. A
//! caller whose wait begins after all three observes the changed slot and
//! fails fast to the channel instead of sleeping.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{Receiver, Sender};

use crate::errors::RunnerError;
use crate::ipc::IpcClient;

use super::futex;

/// What the worker can do for the caller.
#[derive(Debug)]
pub enum BridgeCall {
    Compile(PathBuf),
    FileRequired(Vec<PathBuf>),
}

/// Successful call results.
#[derive(Debug)]
pub enum BridgeOutcome {
    Files(HashMap<PathBuf, String>),
    Done,
}

/// One queued call: id, payload, and the fresh per-call slot.
pub(super) struct BridgeRequest {
    pub id: u64,
    pub call: BridgeCall,
    pub slot: Arc<AtomicU32>,
}

/// One completed call, posted back on the reply channel.
pub(super) struct BridgeReply {
    pub id: u64,
    pub result: Result<BridgeOutcome, RunnerError>,
}

/// How the worker reaches the parent. Production uses [`IpcClient`]; tests
/// inject fakes.
pub trait BridgeTransport: Send + 'static {
    fn compile(&self, source: &Path) -> Result<HashMap<PathBuf, String>, RunnerError>;
    fn file_required(&self, paths: &[PathBuf]) -> Result<(), RunnerError>;
}

impl BridgeTransport for IpcClient {
    fn compile(&self, source: &Path) -> Result<HashMap<PathBuf, String>, RunnerError> {
        IpcClient::compile(self, source)
    }

    fn file_required(&self, paths: &[PathBuf]) -> Result<(), RunnerError> {
        IpcClient::file_required(self, paths)
    }
}

/// Spawn the worker thread.
///
/// The join handle is dropped on purpose: the worker must never keep the
/// process alive on its own. It exits when the request channel closes.
pub(super) fn spawn_worker<T: BridgeTransport>(
    transport: T,
    requests: Receiver<BridgeRequest>,
    replies: Sender<BridgeReply>,
) {
    std::thread::Builder::new()
        .name("bridge-worker".into())
        .spawn(move || {
            while let Ok(request) = requests.recv() {
                let result = match &request.call {
                    BridgeCall::Compile(source) => {
                        transport.compile(source).map(BridgeOutcome::Files)
                    }
                    BridgeCall::FileRequired(paths) => {
                        transport.file_required(paths).map(|()| BridgeOutcome::Done)
                    }
                };

                if replies
                    .send(BridgeReply {
                        id: request.id,
                        result,
                    })
                    .is_err()
                {
                    break; // Caller gone
                }
                // Reply first, then slot, then wake: see module docs.
                request.slot.fetch_add(1, Ordering::SeqCst);
                futex::wake_all(&request.slot);
            }
        })
        .expect("failed to spawn bridge worker");
}
