//! Wire body types for the IPC routes.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::RunnerError;

/// Route: ensure a file's group is built, reply with output bodies.
pub const ROUTE_COMPILE: &str = "/compile";

/// Route: register paths with the filesystem watcher.
pub const ROUTE_FILE_REQUIRED: &str = "/file-required";

/// Reply to `POST /compile`: output bodies for every file of the group.
#[derive(Debug, Serialize, Deserialize)]
pub struct CompileReply {
    pub filenames: HashMap<PathBuf, String>,
}

/// Reply to `POST /file-required`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: String,
}

/// Error reply body: kind tag plus human-readable message.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl From<&RunnerError> for ErrorBody {
    fn from(err: &RunnerError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}
