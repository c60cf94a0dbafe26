//! Observer API server for the Warden containment layer.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **REST endpoints** for querying containment state (fleet status,
//!   registered agents, breach findings, containment reports)
//! - **Operation endpoints** for triggering containment and lifting
//!   network blocks on individual agents
//! - **Minimal HTML dashboard** (`GET /`) showing fleet counters and
//!   links to API endpoints
//!
//! # Architecture
//!
//! The observer holds a clone of the live
//! [`Supervisor`](warden_supervisor::supervisor::Supervisor) handle, the
//! same one the embedding process drives through its check calls. All
//! reads go straight to the supervisor's internal state; kill and
//! restore requests share the supervisor's single-flight containment
//! machinery with every other caller.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use startup::{StartupError, spawn_observer};
pub use state::AppState;
