//! Detection and resilience primitives for the Warden containment layer.
//!
//! This crate owns everything the supervisor consults before letting an
//! agent action proceed: configuration, rate thresholds, exfiltration
//! accumulation, multi-horizon windows, and the fail-mode machinery that
//! keeps decisions deliberate when the validator is down.
//!
//! # Modules
//!
//! - [`cache`] -- TTL'd, integrity-hashed [`PolicyCache`] of validator
//!   decisions, persisted across restarts.
//! - [`config`] -- Configuration loading from `warden-config.yaml` into
//!   strongly-typed structs.
//! - [`exfiltration`] -- Short-window byte-volume and target fan-out
//!   accumulator.
//! - [`failmode`] -- [`FailModeHandler`] turning validator failures into
//!   deliberate closed, cached, or open decisions.
//! - [`thresholds`] -- Per-agent action-rate [`ThresholdEngine`] with
//!   cooldowns and kill escalation.
//! - [`window`] -- Multi-horizon sliding accumulators catching activity
//!   paced below the per-minute limits.
//!
//! [`PolicyCache`]: cache::PolicyCache
//! [`FailModeHandler`]: failmode::FailModeHandler
//! [`ThresholdEngine`]: thresholds::ThresholdEngine

pub mod cache;
pub mod config;
pub mod exfiltration;
pub mod failmode;
pub mod thresholds;
pub mod window;
