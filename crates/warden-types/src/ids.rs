//! Type-safe identifier wrapper for monitored agents.
//!
//! Agent identifiers are caller-assigned strings: the supervising process
//! names each agent when it registers it (e.g. `"scraper-7"` or a UUID it
//! minted itself). Wrapping the string in a newtype prevents accidental
//! mixing with action types, targets, and other free-form strings at call
//! sites that take several `&str` parameters.

use serde::{Deserialize, Serialize};

/// Unique identifier for a monitored agent.
///
/// Assigned by the caller at registration time and used as the key for all
/// per-agent state: threshold counters, sliding windows, kill history, and
/// network block rules.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Create an identifier from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper and return the inner [`String`].
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl core::fmt::Display for AgentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AgentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for AgentId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_roundtrip_serde() {
        let original = AgentId::new("agent-7");
        let json = serde_json::to_string(&original).ok();
        // Transparent serde: the wrapper serializes as a bare string.
        assert_eq!(json.as_deref(), Some("\"agent-7\""));
        let restored: Result<AgentId, _> =
            serde_json::from_str(json.as_deref().unwrap_or(""));
        assert_eq!(restored.ok(), Some(original));
    }

    #[test]
    fn id_display_matches_inner() {
        let id = AgentId::new("scraper-1");
        assert_eq!(id.to_string(), "scraper-1");
        assert_eq!(id.as_str(), "scraper-1");
    }

    #[test]
    fn ids_order_lexically() {
        // BTreeMap keys rely on string ordering.
        let a = AgentId::new("alpha");
        let b = AgentId::new("beta");
        assert!(a < b);
    }
}
