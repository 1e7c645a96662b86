//! Text commands: `/stats <name>` and `/verify <name>`.
//!
//! Both are one-shot lookups answered in the channel they were typed in. No
//! session, no prompts, no rename.

use std::sync::Arc;

use tracing::info;

use crate::channels::OutgoingMessage;
use crate::hiscores::RecordFetcher;
use crate::requirements::{RequirementSet, evaluate};
use crate::session::prompts;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Stats { username: String },
    Verify { username: String },
    Help,
    /// A known command missing its argument.
    Usage(&'static str),
}

impl Command {
    /// Parse message content. `None` for anything that isn't a command.
    pub fn parse(content: &str) -> Option<Command> {
        let trimmed = content.trim();
        if !trimmed.starts_with('/') {
            return None;
        }
        let (name, rest) = trimmed
            .split_once(char::is_whitespace)
            .unwrap_or((trimmed, ""));
        let username = rest.trim().to_string();

        match name.to_lowercase().as_str() {
            "/stats" if username.is_empty() => Some(Command::Usage("/stats <username>")),
            "/stats" => Some(Command::Stats { username }),
            "/verify" if username.is_empty() => Some(Command::Usage("/verify <username>")),
            "/verify" => Some(Command::Verify { username }),
            "/help" | "/?" => Some(Command::Help),
            _ => None,
        }
    }
}

/// Answers commands.
pub struct CommandHandler {
    fetcher: RecordFetcher,
    requirements: Arc<RequirementSet>,
}

impl CommandHandler {
    pub fn new(fetcher: RecordFetcher, requirements: Arc<RequirementSet>) -> Self {
        Self {
            fetcher,
            requirements,
        }
    }

    pub async fn handle(&self, command: Command) -> OutgoingMessage {
        match command {
            Command::Stats { username } => self.stats(&username).await,
            Command::Verify { username } => self.verify(&username).await,
            Command::Help => OutgoingMessage::text(HELP),
            Command::Usage(usage) => OutgoingMessage::text(format!("Usage: `{usage}`")),
        }
    }

    /// Mode, total level and total XP.
    async fn stats(&self, username: &str) -> OutgoingMessage {
        info!(username, "Stats command");
        match self.fetcher.fetch(username).await {
            Ok(record) => OutgoingMessage::embed(prompts::stats_embed(&record)),
            Err(e) => OutgoingMessage::text(prompts::fetch_error_text(&e)),
        }
    }

    /// Requirement check without a session.
    async fn verify(&self, username: &str) -> OutgoingMessage {
        info!(username, "Verify command");
        match self.fetcher.fetch(username).await {
            Ok(record) => {
                let verdict = evaluate(&record, &self.requirements);
                OutgoingMessage::embed(prompts::verdict_embed(&verdict))
            }
            Err(e) => OutgoingMessage::text(prompts::fetch_error_text(&e)),
        }
    }
}

const HELP: &str = "\
**Bloat-Flies**
Post a screenshot in the verification channel to be checked for the HMT Learner Hub.
`/stats <username>`: mode, total level and XP
`/verify <username>`: check HMT requirements";

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;

    use super::*;
    use crate::error::LookupError;
    use crate::hiscores::{GameMode, ProgressRecord, ProgressSource, RetryPolicy};

    struct OneRecord(ProgressRecord);

    #[async_trait]
    impl ProgressSource for OneRecord {
        async fn lookup(&self, identity: &str) -> Result<ProgressRecord, LookupError> {
            if identity.eq_ignore_ascii_case(&self.0.name) {
                Ok(self.0.clone())
            } else {
                Err(LookupError::NotFound {
                    identity: identity.to_string(),
                })
            }
        }
    }

    fn handler() -> CommandHandler {
        let record = ProgressRecord {
            name: "Zezima".into(),
            mode: GameMode::Main,
            skills: BTreeMap::from([("overall".to_string(), 2277), ("prayer".to_string(), 99)]),
            bosses: BTreeMap::new(),
            total_xp: Some(1_000),
        };
        let fetcher = RecordFetcher::new(Arc::new(OneRecord(record)), RetryPolicy::default());
        CommandHandler::new(fetcher, Arc::new(RequirementSet::hmt()))
    }

    #[test]
    fn parse_commands() {
        assert_eq!(
            Command::parse("/stats Lil Bloat"),
            Some(Command::Stats {
                username: "Lil Bloat".into()
            })
        );
        assert_eq!(
            Command::parse("  /VERIFY zezima "),
            Some(Command::Verify {
                username: "zezima".into()
            })
        );
        assert_eq!(Command::parse("/stats"), Some(Command::Usage("/stats <username>")));
        assert_eq!(Command::parse("/help"), Some(Command::Help));
        assert_eq!(Command::parse("/dance"), None);
        assert_eq!(Command::parse("Zezima"), None);
    }

    #[tokio::test]
    async fn stats_renders_card() {
        let reply = handler()
            .handle(Command::Stats {
                username: "zezima".into(),
            })
            .await;
        let embed = &reply.embeds[0];
        assert_eq!(embed.field_value("Total Level"), Some("2277"));
        assert_eq!(embed.field_value("Total XP"), Some("1,000"));
    }

    #[tokio::test]
    async fn verify_renders_failing_verdict() {
        let reply = handler()
            .handle(Command::Verify {
                username: "Zezima".into(),
            })
            .await;
        let embed = &reply.embeds[0];
        assert_eq!(embed.title.as_deref(), Some("Zezima Verification"));
        assert_eq!(embed.field_value("Status"), Some("❌ Failed"));
    }

    #[tokio::test]
    async fn unknown_player_is_reported() {
        let reply = handler()
            .handle(Command::Verify {
                username: "Nobody".into(),
            })
            .await;
        assert_eq!(reply.content, "❌ Player **Nobody** not found on OSRS hiscores.");
        assert!(reply.embeds.is_empty());
    }
}
