//! Broadcast event payloads.
//!
//! Every consequential moment in the containment layer — a breach, an
//! exfiltration finding, a fail-mode activation, a kill — is published as a
//! [`ContainmentEvent`] on the supervisor's broadcast channel. Alerting and
//! notification systems subscribe and format these however they like; this
//! crate never delivers anything itself. Delivery is best-effort: a lagging
//! subscriber skips missed events rather than slowing the containment path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::FailMode;
use crate::ids::AgentId;
use crate::records::{ContainmentReport, ThresholdBreach, WindowBreach};

/// One event on the containment broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ContainmentEvent {
    /// An action-rate threshold was breached.
    ThresholdBreached(ThresholdBreach),
    /// A windowed metric exceeded its limit.
    WindowBreached(WindowBreach),
    /// The short-window exfiltration check fired.
    ExfiltrationDetected {
        /// The agent that tripped the check.
        agent_id: AgentId,
        /// Which cap was exceeded and by how much.
        reason: String,
        /// When the check fired.
        timestamp: DateTime<Utc>,
    },
    /// The validator failed and the fail-mode handler decided in its place.
    FailModeActivated {
        /// The active mode.
        mode: FailMode,
        /// The action type that was being validated.
        action: String,
        /// The target that was being validated.
        target: String,
        /// The validator error that triggered the handler.
        error: String,
        /// When the handler decided.
        timestamp: DateTime<Utc>,
    },
    /// Containment of an agent has started.
    KillStarted {
        /// The targeted agent.
        agent_id: AgentId,
        /// When containment started.
        timestamp: DateTime<Utc>,
    },
    /// Containment of an agent has finished, in any outcome.
    KillCompleted(ContainmentReport),
    /// Network containment was lifted from an agent.
    NetworkRestored {
        /// The restored agent.
        agent_id: AgentId,
        /// When the rules were removed.
        timestamp: DateTime<Utc>,
    },
}

impl ContainmentEvent {
    /// The agent the event concerns, when it concerns one.
    ///
    /// Fail-mode activations are about an (action, target) pair rather
    /// than an agent, so they return `None`.
    pub const fn agent_id(&self) -> Option<&AgentId> {
        match self {
            Self::ThresholdBreached(breach) => Some(&breach.agent_id),
            Self::WindowBreached(breach) => Some(&breach.agent_id),
            Self::ExfiltrationDetected { agent_id, .. }
            | Self::KillStarted { agent_id, .. }
            | Self::NetworkRestored { agent_id, .. } => Some(agent_id),
            Self::KillCompleted(report) => Some(&report.agent_id),
            Self::FailModeActivated { .. } => None,
        }
    }
}
