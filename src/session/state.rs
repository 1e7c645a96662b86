//! Verification phases — where a session is in the conversation.

use serde::{Deserialize, Serialize};

/// The phases of one verification conversation.
///
/// Initiating → IdentityPending ⇄ Fetching → Evaluated → ReputationPending
/// (pass only) → Notifying → Closed. `Escalated` and `TimedOut` end a session
/// early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Initiating,
    IdentityPending,
    Fetching,
    Evaluated { passed: bool },
    ReputationPending,
    Notifying,
    Closed,
    Escalated,
    TimedOut,
}

impl SessionPhase {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, target),
            // Auto identity goes straight to a fetch.
            (Initiating, IdentityPending)
                | (Initiating, Fetching)
                | (IdentityPending, Fetching)
                | (IdentityPending, TimedOut)
                | (Fetching, IdentityPending)
                | (Fetching, Evaluated { .. })
                | (Fetching, Escalated)
                | (Evaluated { passed: true }, ReputationPending)
                | (Evaluated { passed: false }, Notifying)
                | (ReputationPending, Notifying)
                | (Notifying, Closed)
        )
    }

    /// Whether the session is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Escalated | Self::TimedOut)
    }
}

impl Default for SessionPhase {
    fn default() -> Self {
        Self::Initiating
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initiating => "initiating",
            Self::IdentityPending => "identity_pending",
            Self::Fetching => "fetching",
            Self::Evaluated { passed: true } => "evaluated_pass",
            Self::Evaluated { passed: false } => "evaluated_fail",
            Self::ReputationPending => "reputation_pending",
            Self::Notifying => "notifying",
            Self::Closed => "closed",
            Self::Escalated => "escalated",
            Self::TimedOut => "timed_out",
        };
        write!(f, "{s}")
    }
}
