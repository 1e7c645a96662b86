//! Verification sessions.
//!
//! - `trigger` — decides which posts start a session
//! - `state` — phase graph
//! - `workflow` — the conversation itself
//! - `audit` — per-session trail for the moderation channel
//! - `prompts` — everything the bot says

pub mod audit;
pub mod prompts;
pub mod state;
pub mod trigger;
pub mod workflow;

pub use audit::AuditLog;
pub use state::SessionPhase;
pub use trigger::{IgnoreReason, Trigger, screen};
pub use workflow::{MAX_IDENTITY_ATTEMPTS, SessionOutcome, VerificationSession, Verifier};
