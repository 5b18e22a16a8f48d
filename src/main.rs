//! tsrun - development-mode runner for TypeScript/JavaScript workspaces.
//!
//! Compiles every source file the child program loads, on demand, and
//! restarts the child when sources change.

#![allow(dead_code)]

mod bridge;
mod buildset;
mod cli;
mod config;
mod coordinator;
mod errors;
mod ipc;
mod loader;
mod logger;
mod project;
mod session;
mod supervisor;
mod transpile;
mod utils;
mod watcher;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use cli::Cli;
use config::ProjectConfig;
use coordinator::CompileCoordinator;
use project::Project;
use session::Session;
use supervisor::Supervisor;
use watcher::Watcher;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    session::setup_shutdown_handler()?;

    let cli = Cli::parse();
    logger::set_verbose(cli.verbose);

    let root = config::find_workspace_root()?;
    let workspace_config = ProjectConfig::load(&root)
        .with_context(|| format!("failed to load config for `{}`", root.display()))?;
    let session = Arc::new(Session::new(&root)?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;
    runtime.block_on(boot(cli, workspace_config, session))
}

/// Wire the subsystems together and hand control to the reload loop.
///
/// The controller holds the only owning handles; the IPC server and the
/// supervisor's monitor tasks get channels and `Arc` clones, so nothing
/// here forms a reference cycle.
async fn boot(cli: Cli, config: ProjectConfig, session: Arc<Session>) -> Result<()> {
    let extensions = config.effective_extensions();

    let coordinator = CompileCoordinator::new(cli.backend_kind(), session.staging_dir());
    let (watcher, fs_events) =
        Watcher::new(extensions.clone()).map_err(|e| anyhow::anyhow!("watcher failed: {e}"))?;

    let socket_path = session.socket_path();
    ipc::start_ipc_server(&socket_path, coordinator.clone(), Arc::clone(&watcher))?;
    session.on_cleanup(move || {
        let _ = std::fs::remove_file(&socket_path);
    });

    let (exit_tx, exit_rx) = tokio::sync::mpsc::channel(8);
    let supervisor = Supervisor::new(
        cli.argv.clone(),
        session.socket_path(),
        loader::extensions_value(&extensions),
        exit_tx,
    );

    crate::debug!("watch"; "workspace {}", session.root().display());
    let project = Project::new(session, coordinator, watcher, supervisor, cli.options());
    project.run(fs_events, exit_rx).await
}
