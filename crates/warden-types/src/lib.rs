//! Shared type definitions for the Warden containment layer.
//!
//! This crate is the single source of truth for the types that cross crate
//! boundaries in the Warden workspace: agent identifiers, breach and kill
//! records, cached policies, and the broadcast event payloads alerting
//! systems consume.
//!
//! # Modules
//!
//! - [`ids`] -- the [`AgentId`] newtype over caller-assigned names
//! - [`enums`] -- dispositions, spans, metrics, fail modes, result codes
//! - [`records`] -- breach records, kill reports, registry entries, decisions
//! - [`events`] -- broadcast payloads published by the supervisor

pub mod enums;
pub mod events;
pub mod ids;
pub mod records;

// Re-export all public types at crate root for convenience.
pub use enums::{
    ContainmentOutcome, ContainmentStatus, FailMode, KillResult, NetworkKillResult, RiskLevel,
    ThresholdAction, WindowAction, WindowMetric, WindowSpan,
};
pub use events::ContainmentEvent;
pub use ids::AgentId;
pub use records::{
    ActionEvent, AgentRecord, CachedPolicy, ContainmentReport, Decision, KillReport,
    NetworkKillReport, ThresholdBreach, ThresholdConfig, Verdict, WindowBreach,
    WindowMetricThreshold, action_types,
};
