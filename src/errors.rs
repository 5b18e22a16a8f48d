//! Runner error types.
//!
//! Typed errors for everything that crosses a subsystem boundary: compile
//! failures travel through the IPC server to the child, bridge failures are
//! fatal to the child side, and the rest is logged by the parent. `anyhow`
//! is used at orchestration seams; these kinds exist where the error's
//! identity matters on the wire or in control flow.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the compile pipeline, the IPC layer, and the sync
/// bridge.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Transpilation failed for a specific file. Not fatal to the parent;
    /// the child receives it at the load site.
    #[error("failed to compile `{}`: {message}", .path.display())]
    Compile { path: PathBuf, message: String },

    /// A referenced file has no compiled output because a configured ignore
    /// pattern filtered it out of its group.
    #[error("`{}` has no compiled output: ignored by pattern `{pattern}`", .path.display())]
    Ignored { path: PathBuf, pattern: String },

    /// A referenced file is not under the project tree at all.
    #[error("`{}` is outside the project", .path.display())]
    OutsideProject { path: PathBuf },

    /// Socket connect/read/write failure.
    #[error("ipc failure: {0}")]
    Ipc(String),

    /// The sync-bridge wait exceeded its hard timeout. Fatal to the child:
    /// the parent should always answer well within the limit.
    #[error("sync bridge timed out after {0} ms; this is likely a runner bug")]
    BridgeTimeout(u64),

    /// The sync bridge received a reply whose id does not match the request.
    #[error("sync bridge protocol violation: {0}")]
    BridgeProtocol(String),

    /// Error reported by the parent over IPC, reconstructed client-side.
    #[error("{message}")]
    Server { kind: String, message: String },
}

impl RunnerError {
    /// Stable kind tag carried in IPC error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Compile { .. } => "compile-error",
            Self::Ignored { .. } => "missing-destination",
            Self::OutsideProject { .. } => "outside-project",
            Self::Ipc(_) => "ipc-failure",
            Self::BridgeTimeout(_) => "bridge-timeout",
            Self::BridgeProtocol(_) => "bridge-protocol",
            Self::Server { .. } => "server-reported",
        }
    }
}
