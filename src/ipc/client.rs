//! Blocking IPC client.
//!
//! Used by the child side: the sync-bridge worker thread drives these calls
//! while the child's main thread is parked. One connection per request;
//! replies are single-shot.

use std::collections::HashMap;
use std::io::BufReader;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::http;
use super::protocol::{CompileReply, ErrorBody, ROUTE_COMPILE, ROUTE_FILE_REQUIRED, StatusReply};
use crate::errors::RunnerError;

/// Per-request socket timeout. The bridge enforces its own overall limit;
/// this only prevents a dead parent from hanging the worker forever.
const SOCKET_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Ask the parent to compile `source`; returns the output bodies of its
    /// whole group.
    pub fn compile(&self, source: &Path) -> Result<HashMap<PathBuf, String>, RunnerError> {
        let reply: CompileReply = self.post(ROUTE_COMPILE, &source)?;
        Ok(reply.filenames)
    }

    /// Report paths the child has loaded so the parent watches them.
    pub fn file_required(&self, paths: &[PathBuf]) -> Result<(), RunnerError> {
        let reply: StatusReply = self.post(ROUTE_FILE_REQUIRED, &paths)?;
        if reply.status != "ok" {
            return Err(RunnerError::Ipc(format!(
                "unexpected file-required status: {}",
                reply.status
            )));
        }
        Ok(())
    }

    fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        route: &str,
        body: &B,
    ) -> Result<R, RunnerError> {
        let body = serde_json::to_vec(body)
            .map_err(|e| RunnerError::Ipc(format!("failed to encode request: {e}")))?;

        let stream = UnixStream::connect(&self.socket_path).map_err(|e| {
            RunnerError::Ipc(format!(
                "failed to connect to `{}`: {e}",
                self.socket_path.display()
            ))
        })?;
        stream
            .set_read_timeout(Some(SOCKET_TIMEOUT))
            .and_then(|()| stream.set_write_timeout(Some(SOCKET_TIMEOUT)))
            .map_err(|e| RunnerError::Ipc(format!("failed to set socket timeout: {e}")))?;

        let mut writer = stream
            .try_clone()
            .map_err(|e| RunnerError::Ipc(format!("failed to clone stream: {e}")))?;
        http::blocking::write_request(&mut writer, route, &body)
            .map_err(|e| RunnerError::Ipc(format!("{e:#}")))?;

        let mut reader = BufReader::new(stream);
        let (status, reply) = http::blocking::read_response(&mut reader)
            .map_err(|e| RunnerError::Ipc(format!("{e:#}")))?;

        if status != 200 {
            let error: ErrorBody = serde_json::from_slice(&reply).map_err(|e| {
                RunnerError::Ipc(format!("unreadable error reply (status {status}): {e}"))
            })?;
            return Err(RunnerError::Server {
                kind: error.kind,
                message: error.message,
            });
        }

        serde_json::from_slice(&reply)
            .map_err(|e| RunnerError::Ipc(format!("failed to decode reply: {e}")))
    }
}
