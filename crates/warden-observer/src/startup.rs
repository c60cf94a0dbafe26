//! Observer server startup helper for embedding in the Warden daemon.
//!
//! Provides [`spawn_observer`] which launches the Observer HTTP server
//! on a background Tokio task. The daemon calls this during startup so
//! the API runs concurrently with the supervisor's maintenance loop.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use warden_observer::startup::spawn_observer;
//! use warden_observer::{AppState, ServerConfig};
//!
//! let state = Arc::new(AppState::new(supervisor.clone()));
//! let handle = spawn_observer(ServerConfig::default(), state)?;
//! // The server is now running. Abort the handle on shutdown.
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::{ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the Observer server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Spawn the Observer HTTP server on a background Tokio task.
///
/// Returns a [`JoinHandle`] so the caller can manage the server's
/// lifecycle alongside the supervisor. The server runs until the Tokio
/// runtime is shut down or the task is aborted; the caller should hold
/// the returned handle and abort it during clean shutdown.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the configured address does not
/// parse. Bind failures surface from the background task as an error
/// log, since the listener is opened after the spawn.
pub fn spawn_observer(
    config: ServerConfig,
    state: Arc<AppState>,
) -> Result<JoinHandle<()>, StartupError> {
    // Verify the address is parseable before spawning the background task.
    // The actual bind happens inside start_server, but we catch obvious
    // misconfigurations early.
    let addr_str = format!("{}:{}", config.host, config.port);
    let _: std::net::SocketAddr = addr_str.parse().map_err(|e| {
        StartupError::Server(ServerError::Bind(format!(
            "invalid address {addr_str}: {e}"
        )))
    })?;

    let port = config.port;
    let handle = tokio::spawn(async move {
        if let Err(e) = crate::server::start_server(&config, state).await {
            tracing::error!(error = %e, "Observer server exited with error");
        }
    });

    tracing::info!(port, "Observer server spawned on background task");

    Ok(handle)
}
