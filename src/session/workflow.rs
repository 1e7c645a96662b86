//! Verification workflow — one conversation per screenshot post.
//!
//! identify → fetch → evaluate → reputation (pass only) → notify. Every
//! ending sends the requester exactly one closing message and flushes the
//! audit trail exactly once.

use std::sync::Arc;

use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::audit::AuditLog;
use super::prompts;
use super::state::SessionPhase;
use super::trigger::Trigger;
use crate::channels::{ChatPlatform, OutgoingMessage, ReplyCollector};
use crate::config::BotConfig;
use crate::error::{FetchError, SessionError};
use crate::hiscores::{ProgressRecord, RecordFetcher};
use crate::reputation::{ReputationChecker, ReputationResult};
use crate::requirements::{VerificationVerdict, evaluate};

/// Typed identities allowed per session. The display-name attempt is free.
pub const MAX_IDENTITY_ATTEMPTS: u32 = 2;

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Passed { name: String, flagged: bool },
    Failed { name: String, unmet: Vec<String> },
    Escalated { reason: String },
    TimedOut,
}

/// Mutable state of one conversation.
pub struct VerificationSession {
    pub id: Uuid,
    pub trigger: Trigger,
    /// Thread (or fallback channel) the conversation happens in.
    pub surface: String,
    attempts: u32,
    phase: SessionPhase,
    audit: AuditLog,
}

impl VerificationSession {
    pub fn new(trigger: Trigger) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            surface: trigger.channel_id.clone(),
            trigger,
            attempts: 0,
            phase: SessionPhase::default(),
            audit: AuditLog::new(id),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn attempts_remaining(&self) -> u32 {
        MAX_IDENTITY_ATTEMPTS.saturating_sub(self.attempts)
    }

    /// Move to `next`, rejecting transitions the phase graph doesn't allow.
    pub fn enter(&mut self, next: SessionPhase) -> Result<(), SessionError> {
        if !self.phase.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                id: self.id,
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        debug!(from = %self.phase, to = %next, "Phase change");
        self.phase = next;
        Ok(())
    }

    /// Count one typed identity. Fails once the budget is spent.
    pub fn record_attempt(&mut self) -> Result<u32, SessionError> {
        if self.attempts >= MAX_IDENTITY_ATTEMPTS {
            return Err(SessionError::AttemptsExhausted {
                max: MAX_IDENTITY_ATTEMPTS,
            });
        }
        self.attempts += 1;
        Ok(self.attempts)
    }

    fn requester(&self) -> String {
        prompts::user_mention(&self.trigger.author_id)
    }
}

/// Where `drive` stopped.
enum Ending {
    Verdict {
        verdict: VerificationVerdict,
        reputation: Option<ReputationResult>,
    },
    Escalated {
        reason: String,
        error: FetchError,
    },
    TimedOut,
}

/// Runs verification sessions. Cheap to share; one per bot.
pub struct Verifier {
    platform: Arc<dyn ChatPlatform>,
    collector: Arc<ReplyCollector>,
    fetcher: RecordFetcher,
    reputation: Arc<dyn ReputationChecker>,
    config: Arc<BotConfig>,
}

impl Verifier {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        collector: Arc<ReplyCollector>,
        fetcher: RecordFetcher,
        reputation: Arc<dyn ReputationChecker>,
        config: Arc<BotConfig>,
    ) -> Self {
        Self {
            platform,
            collector,
            fetcher,
            reputation,
            config,
        }
    }

    /// Run one session to completion.
    pub async fn run(&self, trigger: Trigger) -> SessionOutcome {
        let mut session = VerificationSession::new(trigger);
        let span = info_span!(
            "verification",
            session_id = %session.id,
            requester = %session.trigger.author_name,
        );

        async move {
            info!("Verification started");
            let ending = match self.drive(&mut session).await {
                Ok(ending) => ending,
                Err(e) => {
                    error!(error = %e, "Verification aborted");
                    Ending::Escalated {
                        reason: e.to_string(),
                        error: FetchError::Unknown {
                            reason: e.to_string(),
                        },
                    }
                }
            };
            self.finish(session, ending).await
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, session: &mut VerificationSession) -> Result<Ending, SessionError> {
        self.open_surface(session).await;
        let display_name = session.trigger.author_name.clone();
        self.say(&session.surface, prompts::verifying_notice(&display_name))
            .await;

        let mention = session.requester();
        let mut prompt = prompts::identity_prompt(&mention, None);

        if self.config.flow.auto_identity {
            session.enter(SessionPhase::Fetching)?;
            session
                .audit
                .record(format!("Trying display name **{display_name}**"));
            match self.fetcher.fetch(&display_name).await {
                Ok(record) => return self.conclude(session, record).await,
                Err(e) if e.is_retryable_by_user() => {
                    session.audit.record(format!("Display name lookup failed: {e}"));
                    prompt = match e {
                        FetchError::NotFound { .. } => {
                            prompts::identity_prompt(&mention, Some(&display_name))
                        }
                        other => prompts::retry_prompt(&mention, &other),
                    };
                }
                Err(e) => return Ok(Self::escalate(session, e)),
            }
        }

        loop {
            session.enter(SessionPhase::IdentityPending)?;

            // Register before prompting so a fast reply isn't missed.
            let pending = self
                .collector
                .expect_reply(&session.surface, &session.trigger.author_id);
            self.say(&session.surface, OutgoingMessage::text(prompt)).await;

            let Some(reply) = pending.wait(self.config.flow.identity_wait()).await else {
                info!("No identity reply before the deadline");
                session.audit.record("No identity reply before the deadline");
                return Ok(Ending::TimedOut);
            };

            let identity = reply.content.trim().to_string();
            let attempt = session.record_attempt()?;
            session.enter(SessionPhase::Fetching)?;
            info!(%identity, attempt, "Identity received");
            session.audit.record(format!(
                "Attempt {attempt}/{MAX_IDENTITY_ATTEMPTS}: **{identity}**"
            ));

            match self.fetcher.fetch(&identity).await {
                Ok(record) => return self.conclude(session, record).await,
                Err(e) if e.is_retryable_by_user() && session.attempts_remaining() > 0 => {
                    session.audit.record(format!("Lookup failed: {e}"));
                    prompt = prompts::retry_prompt(&mention, &e);
                }
                Err(e) => return Ok(Self::escalate(session, e)),
            }
        }
    }

    fn escalate(session: &mut VerificationSession, error: FetchError) -> Ending {
        let reason = if error.is_retryable_by_user() {
            SessionError::AttemptsExhausted {
                max: MAX_IDENTITY_ATTEMPTS,
            }
            .to_string()
        } else {
            error.to_string()
        };
        warn!(%reason, last_error = %error, "Escalating verification");
        session.audit.record(format!("Lookup failed: {error}"));
        Ending::Escalated { reason, error }
    }

    /// Rename, evaluate and, for a pass, check reputation.
    async fn conclude(
        &self,
        session: &mut VerificationSession,
        record: ProgressRecord,
    ) -> Result<Ending, SessionError> {
        session.audit.record(format!(
            "Fetched **{}** ({} account)",
            record.name, record.mode
        ));
        self.rename(session, &record.name).await;

        let verdict = evaluate(&record, &self.config.requirements);
        session.enter(SessionPhase::Evaluated {
            passed: verdict.passed,
        })?;
        info!(
            name = %verdict.name,
            passed = verdict.passed,
            kill_count = verdict.combined_kill_count,
            "Requirements evaluated"
        );

        if !verdict.passed {
            session
                .audit
                .record(format!("Failed: {}", verdict.unmet.join(", ")));
            return Ok(Ending::Verdict {
                verdict,
                reputation: None,
            });
        }

        session.audit.record(format!(
            "Passed with {} combined KC",
            verdict.combined_kill_count
        ));
        session.enter(SessionPhase::ReputationPending)?;
        let reputation = self.reputation.check(&verdict.name).await;
        session.audit.record(format!(
            "RuneWatch ({}): {}",
            self.reputation.strategy(),
            if reputation.flagged { "flagged" } else { "clean" }
        ));

        Ok(Ending::Verdict {
            verdict,
            reputation: Some(reputation),
        })
    }

    /// Set the requester's nickname to the canonical name. Never fatal.
    async fn rename(&self, session: &mut VerificationSession, name: &str) {
        if session.trigger.author_name == name {
            return;
        }
        match self
            .platform
            .set_nickname(&session.trigger.guild_id, &session.trigger.author_id, name)
            .await
        {
            Ok(()) => {
                session.audit.record(format!("Nickname set to **{name}**"));
                session.trigger.author_name = name.to_string();
            }
            Err(e) => {
                warn!(error = %e, "Could not update nickname");
                session.audit.warn(format!("Could not set nickname to {name}: {e}"));
            }
        }
    }

    /// Send the closing message and flush the audit trail.
    async fn finish(&self, mut session: VerificationSession, ending: Ending) -> SessionOutcome {
        let requester = session.requester();
        let moderator = prompts::role_mention(&self.config.roles.moderator);
        let helper = prompts::role_mention(&self.config.roles.helper);

        let (outcome, closing, report) = match ending {
            Ending::Verdict {
                verdict,
                reputation,
            } => {
                self.transition(&mut session, SessionPhase::Notifying);
                let closing = prompts::verdict_message(&verdict, &requester, helper.as_deref());
                let (outcome, report) = match reputation {
                    Some(reputation) => (
                        SessionOutcome::Passed {
                            name: verdict.name.clone(),
                            flagged: reputation.flagged,
                        },
                        prompts::pass_report(&verdict, &requester, &reputation, moderator.as_deref()),
                    ),
                    None => (
                        SessionOutcome::Failed {
                            name: verdict.name.clone(),
                            unmet: verdict.unmet.clone(),
                        },
                        prompts::fail_report(&verdict, &requester),
                    ),
                };
                self.say(&session.surface, closing).await;
                self.transition(&mut session, SessionPhase::Closed);
                (outcome, None, report)
            }
            Ending::Escalated { reason, error } => {
                self.transition(&mut session, SessionPhase::Escalated);
                let closing = prompts::escalation_notice(&error, moderator.as_deref());
                let report = prompts::escalation_report(&requester, &reason, moderator.as_deref());
                (SessionOutcome::Escalated { reason }, Some(closing), report)
            }
            Ending::TimedOut => {
                self.transition(&mut session, SessionPhase::TimedOut);
                (
                    SessionOutcome::TimedOut,
                    Some(prompts::timeout_notice()),
                    prompts::timeout_report(&requester),
                )
            }
        };

        if let Some(closing) = closing {
            self.say(&session.surface, closing).await;
        }

        info!(phase = %session.phase, attempts = session.attempts, "Verification finished");
        let VerificationSession { audit, .. } = session;
        if let Err(e) = audit
            .flush(self.platform.as_ref(), &self.config.channels.audit, report)
            .await
        {
            warn!(error = %e, "Failed to flush audit log");
        }

        outcome
    }

    /// Enter a closing phase. An aborted session may not have a legal edge
    /// into it, so it is forced after logging.
    fn transition(&self, session: &mut VerificationSession, next: SessionPhase) {
        if let Err(e) = session.enter(next) {
            error!(error = %e, "Forcing phase change");
            session.phase = next;
        }
    }

    /// Open the conversation thread, falling back to the trigger channel.
    async fn open_surface(&self, session: &mut VerificationSession) {
        let title = prompts::thread_title(&session.trigger.author_name);
        match self
            .platform
            .start_thread(&session.trigger.channel_id, &session.trigger.message_id, &title)
            .await
        {
            Ok(thread_id) => {
                debug!(%thread_id, "Opened verification thread");
                session.surface = thread_id;
            }
            Err(e) => {
                warn!(error = %e, "Could not open thread, replying in channel");
                session.audit.warn(format!("Thread creation failed: {e}"));
            }
        }
    }

    async fn say(&self, channel_id: &str, message: OutgoingMessage) {
        if let Err(e) = self.platform.send(channel_id, message).await {
            warn!(channel_id, error = %e, "Failed to send message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger() -> Trigger {
        Trigger {
            message_id: "m".into(),
            channel_id: "verify".into(),
            guild_id: "g".into(),
            author_id: "u".into(),
            author_name: "Lil Bloat".into(),
        }
    }

    #[test]
    fn attempts_are_capped() {
        let mut session = VerificationSession::new(trigger());
        assert_eq!(session.record_attempt().unwrap(), 1);
        assert_eq!(session.record_attempt().unwrap(), 2);
        assert_eq!(session.attempts_remaining(), 0);
        assert!(matches!(
            session.record_attempt(),
            Err(SessionError::AttemptsExhausted { max: 2 })
        ));
        assert_eq!(session.attempts(), 2);
    }

    #[test]
    fn enter_rejects_illegal_edges() {
        let mut session = VerificationSession::new(trigger());
        assert!(session.enter(SessionPhase::Closed).is_err());
        assert_eq!(session.phase(), SessionPhase::Initiating);
        session.enter(SessionPhase::IdentityPending).unwrap();
        session.enter(SessionPhase::TimedOut).unwrap();
        assert!(session.phase().is_terminal());
        assert!(session.enter(SessionPhase::Fetching).is_err());
    }

    #[test]
    fn surface_defaults_to_trigger_channel() {
        let session = VerificationSession::new(trigger());
        assert_eq!(session.surface, "verify");
    }
}
