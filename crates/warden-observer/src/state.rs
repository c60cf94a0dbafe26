//! Shared application state for the Observer API server.
//!
//! [`AppState`] hands every request handler the live containment
//! [`Supervisor`]. The supervisor is internally synchronized and cheap
//! to clone, so the observer serves from the same instance the daemon
//! drives; there is no snapshotting layer between the API and the
//! detection state.

use chrono::{DateTime, Utc};
use warden_supervisor::supervisor::Supervisor;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`](std::sync::Arc) and injected via Axum's `State`
/// extractor.
#[derive(Clone)]
pub struct AppState {
    /// The live containment supervisor.
    pub supervisor: Supervisor,
    /// When the observer came up. `/api/status` reports uptime from this.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wrap a supervisor for serving.
    pub fn new(supervisor: Supervisor) -> Self {
        Self {
            supervisor,
            started_at: Utc::now(),
        }
    }
}
