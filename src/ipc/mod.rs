//! IPC between the parent and the child's loader hook.
//!
//! A minimal request/response endpoint on a Unix-domain socket inside the
//! session work directory. Each request is a single-shot HTTP/1.1 POST with
//! a JSON body; each reply is a single-shot JSON body. Two routes:
//!
//! - `POST /compile` — "compile this file", replying with the output bodies
//!   of its whole group
//! - `POST /file-required` — "register these paths as required", growing the
//!   watcher set
//!
//! The server side is async (parent); the client side is blocking (driven by
//! the child's sync-bridge worker thread).

pub mod client;
pub mod http;
pub mod protocol;
pub mod server;

pub use client::IpcClient;
pub use server::start_ipc_server;
