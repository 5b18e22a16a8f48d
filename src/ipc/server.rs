//! IPC server: accepts loader-hook requests on the session socket.
//!
//! Each connection carries exactly one request. Compiles run on the blocking
//! pool so the accept loop and the reload controller stay responsive. The
//! server never retries a failed compile; the error travels to the child,
//! which throws at the load site.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};

use super::http;
use super::protocol::{CompileReply, ErrorBody, ROUTE_COMPILE, ROUTE_FILE_REQUIRED, StatusReply};
use crate::coordinator::CompileCoordinator;
use crate::errors::RunnerError;
use crate::watcher::Watcher;

/// Bind the session socket and spawn the accept loop.
pub fn start_ipc_server(
    socket_path: &std::path::Path,
    coordinator: CompileCoordinator,
    watcher: Arc<Watcher>,
) -> Result<tokio::task::JoinHandle<()>> {
    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("failed to bind `{}`", socket_path.display()))?;
    crate::debug!("ipc"; "listening on {}", socket_path.display());

    Ok(tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let coordinator = coordinator.clone();
                    let watcher = Arc::clone(&watcher);
                    tokio::spawn(async move {
                        handle_connection(stream, coordinator, watcher).await;
                    });
                }
                Err(e) => {
                    crate::log!("ipc"; "accept error: {}", e);
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
        }
    }))
}

async fn handle_connection(
    stream: UnixStream,
    coordinator: CompileCoordinator,
    watcher: Arc<Watcher>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let request = match http::aio::request(&mut reader).await {
        Ok(request) => request,
        Err(e) => {
            crate::debug!("ipc"; "bad request: {:#}", e);
            return;
        }
    };

    let (status, body) = route(&request, &coordinator, &watcher).await;
    if let Err(e) = http::aio::response(&mut write_half, status, &body).await {
        crate::debug!("ipc"; "failed to reply: {:#}", e);
    }
}

async fn route(
    request: &http::Request,
    coordinator: &CompileCoordinator,
    watcher: &Arc<Watcher>,
) -> (u16, Vec<u8>) {
    match request.path.as_str() {
        ROUTE_COMPILE => handle_compile(&request.body, coordinator, watcher).await,
        ROUTE_FILE_REQUIRED => handle_file_required(&request.body, watcher),
        other => error_reply(404, "not-found", &format!("unknown route `{other}`")),
    }
}

/// `POST /compile` — body is a single source path. Ensures the file's group
/// is built, registers the path with the watcher, replies with the group's
/// output bodies.
async fn handle_compile(
    body: &[u8],
    coordinator: &CompileCoordinator,
    watcher: &Arc<Watcher>,
) -> (u16, Vec<u8>) {
    let source: PathBuf = match serde_json::from_slice(body) {
        Ok(source) => source,
        Err(e) => return error_reply(500, "ipc-failure", &format!("bad compile body: {e}")),
    };
    crate::debug!("ipc"; "compile {}", source.display());

    let task = {
        let coordinator = coordinator.clone();
        let source = source.clone();
        tokio::task::spawn_blocking(move || {
            coordinator
                .compile(&source)
                .and_then(|_| coordinator.file_group(&source))
        })
    };

    match task.await {
        Ok(Ok(bodies)) => {
            watcher.track(&source);
            let reply = CompileReply {
                filenames: bodies.into_iter().collect(),
            };
            json_reply(200, &reply)
        }
        Ok(Err(e)) => {
            match &e {
                RunnerError::Compile { path, message } => crate::logger::status_error(
                    &format!("compile error in {}", path.display()),
                    message,
                ),
                other => crate::log!("ipc"; "{}", other),
            }
            json_reply(500, &ErrorBody::from(&e))
        }
        Err(e) => error_reply(500, "ipc-failure", &format!("compile task failed: {e}")),
    }
}

/// `POST /file-required` — body is an array of source paths. Registers each
/// with the watcher (best-effort; `node_modules` is skipped inside `track`).
fn handle_file_required(body: &[u8], watcher: &Arc<Watcher>) -> (u16, Vec<u8>) {
    let paths: Vec<PathBuf> = match serde_json::from_slice(body) {
        Ok(paths) => paths,
        Err(e) => return error_reply(500, "ipc-failure", &format!("bad file-required body: {e}")),
    };
    crate::debug!("ipc"; "file-required: {} paths", paths.len());

    for path in &paths {
        watcher.track(path);
    }
    json_reply(
        200,
        &StatusReply {
            status: "ok".into(),
        },
    )
}

fn json_reply<T: serde::Serialize>(status: u16, body: &T) -> (u16, Vec<u8>) {
    (status, serde_json::to_vec(body).unwrap_or_default())
}

fn error_reply(status: u16, kind: &str, message: &str) -> (u16, Vec<u8>) {
    json_reply(
        status,
        &ErrorBody {
            kind: kind.to_string(),
            message: message.to_string(),
        },
    )
}

// ============================================================================
// Tests
// ============================================================================
