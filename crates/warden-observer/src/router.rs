//! Axum router construction for the Observer API.
//!
//! Assembles all routes into a single [`Router`] with CORS middleware
//! enabled for cross-origin dashboard access.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router for the Observer server.
///
/// The router includes:
/// - `GET /` -- minimal HTML status page
/// - `GET /api/status` -- fleet-wide containment summary
/// - `GET /api/agents` -- list registered agents
/// - `GET /api/agents/:id` -- single agent detail
/// - `POST /api/agents/:id/kill` -- trigger containment
/// - `POST /api/agents/:id/restore` -- lift network containment
/// - `GET /api/breaches` -- query breach findings
/// - `GET /api/kills` -- query containment reports
///
/// CORS is configured to allow any origin for development. In
/// production this should be restricted.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Status page
        .route("/", get(handlers::index))
        // REST API
        .route("/api/status", get(handlers::get_status))
        .route("/api/agents", get(handlers::list_agents))
        .route("/api/agents/{id}", get(handlers::get_agent))
        .route("/api/agents/{id}/kill", post(handlers::kill_agent))
        .route("/api/agents/{id}/restore", post(handlers::restore_agent))
        .route("/api/breaches", get(handlers::list_breaches))
        .route("/api/kills", get(handlers::list_kills))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
