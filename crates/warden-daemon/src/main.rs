//! Warden daemon binary.
//!
//! This is the entry point that wires together the containment
//! supervisor, the platform firewall backend, the maintenance ticker,
//! and the Observer API server. It loads configuration, initializes
//! all subsystems, and runs until the process receives Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `warden-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Build the firewall backend for this platform
//! 4. Build the supervisor and spawn the maintenance ticker
//! 5. Start the Observer API server
//! 6. Wait for Ctrl-C, then shut down cleanly

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use warden_core::config::WardenConfig;
use warden_kill::firewall::backend_for;
use warden_observer::{AppState, ServerConfig, spawn_observer};
use warden_supervisor::supervisor::Supervisor;

/// Application entry point for the Warden daemon.
///
/// Initializes all subsystems and parks on the shutdown signal. The
/// supervisor itself is driven by the embedding integration (check and
/// record calls arrive through the library API or the observer).
///
/// # Errors
///
/// Returns an error if configuration loading or observer startup fails.
#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration.
    let (config, config_source) = load_config()?;

    // 2. Initialize structured logging. RUST_LOG wins when set; the
    //    configured level is the fallback.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("warden-daemon starting");
    info!(
        source = %config_source,
        fail_mode = ?config.fail_mode.mode,
        firewall = %config.firewall.backend,
        thresholds = config.thresholds.custom.len(),
        "Configuration loaded"
    );

    // 3. Build the firewall backend.
    let firewall = backend_for(&config.firewall.backend);
    info!(platform = firewall.platform(), "Firewall backend selected");

    // 4. Build the supervisor and spawn the maintenance ticker.
    let supervisor = Supervisor::new(&config, firewall);
    let maintenance = supervisor.spawn_maintenance();
    info!(
        interval_seconds = config.supervisor.maintenance_interval_seconds,
        "Supervisor initialized, maintenance ticker running"
    );

    // 5. Start the Observer API server.
    let observer = if config.observer.enabled {
        let server_config = ServerConfig {
            host: config.observer.host.clone(),
            port: config.observer.port,
        };
        let state = Arc::new(AppState::new(supervisor.clone()));
        let handle = spawn_observer(server_config, state)
            .context("failed to start the observer server")?;
        Some(handle)
    } else {
        info!("Observer API disabled by configuration");
        None
    };

    // 6. Wait for a shutdown signal, then stop cleanly: the ticker's
    //    final pass persists the policy cache before the observer drops.
    wait_for_shutdown().await;

    supervisor.shutdown();
    maintenance
        .await
        .context("maintenance task panicked during shutdown")?;
    if let Some(handle) = observer {
        handle.abort();
    }

    info!("warden-daemon shutdown complete");
    Ok(())
}

/// Park until SIGINT or, on Unix, SIGTERM arrives.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let Ok(mut term) = signal(SignalKind::terminate()) else {
            error!("failed to install the SIGTERM handler, listening for Ctrl-C only");
            wait_for_ctrl_c().await;
            return;
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down"),
            _ = term.recv() => info!("Received SIGTERM, shutting down"),
        }
    }
    #[cfg(not(unix))]
    {
        wait_for_ctrl_c().await;
        info!("Received Ctrl-C, shutting down");
    }
}

/// Ctrl-C alone, swallowing listener errors: at this point giving up on
/// the signal would leave the daemon unreachable, so a broken listener is
/// logged and treated as an immediate shutdown request.
async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "shutdown signal listener failed");
    }
}

/// Load the daemon configuration.
///
/// The path comes from the `WARDEN_CONFIG` environment variable when
/// set, otherwise `warden-config.yaml` in the working directory. A
/// missing file is not an error: defaults apply, with environment
/// overrides still honored.
fn load_config() -> Result<(WardenConfig, String)> {
    let path = std::env::var("WARDEN_CONFIG")
        .map_or_else(|_| PathBuf::from("warden-config.yaml"), PathBuf::from);

    if path.exists() {
        let config = WardenConfig::from_file(&path)
            .with_context(|| format!("loading configuration from {}", path.display()))?;
        Ok((config, path.display().to_string()))
    } else {
        let mut config = WardenConfig::default();
        config.apply_env_overrides();
        Ok((config, String::from("defaults")))
    }
}
