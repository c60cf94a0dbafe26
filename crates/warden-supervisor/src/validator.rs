//! The authoritative-validator seam.
//!
//! Warden never decides alone whether an action is a threat; it enforces
//! limits locally and defers risk judgment to an external validator when
//! one is wired in. [`Validator`] is that seam: implementations wrap
//! whatever transport the deployment uses (an HTTP sidecar, a local
//! model, a rules process) behind one async call.
//!
//! The supervisor treats every validator failure identically: the
//! configured fail mode resolves the action and the failure is published
//! as an event. Implementations should therefore map transport details
//! into [`ValidatorError`] rather than papering over them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use warden_types::Verdict;

/// Why a validation call failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidatorError {
    /// The validator could not be reached or did not answer.
    #[error("validator unavailable: {0}")]
    Unavailable(String),
    /// The validator answered with something unusable.
    #[error("validator error: {0}")]
    Internal(String),
}

/// An external risk judge for agent actions.
///
/// `validate` is called on the supervisor's check path under a deadline;
/// implementations must not retry internally past it. Returning an `Err`
/// is safe and expected: the fail-mode handler decides what happens next.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Score one action. Higher `risk_score` means more dangerous;
    /// the supervisor blocks at its configured risk threshold.
    async fn validate(
        &self,
        action_type: &str,
        target: &str,
        metadata: &BTreeMap<String, serde_json::Value>,
    ) -> Result<Verdict, ValidatorError>;
}
