//! Reputation check through a companion bot.
//!
//! Sends `{prefix} {name}` to the companion's channel and waits for its reply
//! about that player. Replies that never name the player belong to some other
//! check and are left alone. A case embed means flagged; silence or a reply
//! without one means clean.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{CaseDetails, ReputationChecker, ReputationResult};
use crate::channels::{ChatPlatform, Embed, IncomingMessage, OutgoingMessage, ReplyCollector};

pub struct CompanionChecker {
    platform: Arc<dyn ChatPlatform>,
    collector: Arc<ReplyCollector>,
    channel_id: String,
    responder_id: String,
    command_prefix: String,
    wait: Duration,
}

impl CompanionChecker {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        collector: Arc<ReplyCollector>,
        channel_id: impl Into<String>,
        responder_id: impl Into<String>,
        command_prefix: impl Into<String>,
        wait: Duration,
    ) -> Self {
        Self {
            platform,
            collector,
            channel_id: channel_id.into(),
            responder_id: responder_id.into(),
            command_prefix: command_prefix.into(),
            wait,
        }
    }
}

/// Field names the companion uses for the accused player.
const NAME_FIELDS: [&str; 4] = ["Accused", "Player", "RSN", "Name"];

/// Whether `name` occurs in `text` as a whole word, ignoring case.
fn names_player(text: &str, name: &str) -> bool {
    let text = text.to_lowercase();
    let name = name.to_lowercase();
    if name.is_empty() {
        return false;
    }
    let is_word = |c: Option<char>| c.is_some_and(char::is_alphanumeric);
    text.match_indices(&name).any(|(at, _)| {
        !is_word(text[..at].chars().next_back()) && !is_word(text[at + name.len()..].chars().next())
    })
}

/// A case embed names the player in its title or in an accused-name field.
fn is_case_embed(embed: &Embed, name: &str) -> bool {
    if embed.title.as_deref().is_some_and(|title| names_player(title, name)) {
        return true;
    }
    NAME_FIELDS
        .iter()
        .filter_map(|field| embed.field_value(field))
        .any(|value| value.trim().eq_ignore_ascii_case(name.trim()))
}

/// Whether a companion message is an answer about `name`.
fn is_reply_about(msg: &IncomingMessage, name: &str) -> bool {
    names_player(&msg.content, name)
        || msg.embeds.iter().any(|embed| {
            is_case_embed(embed, name)
                || embed.description.as_deref().is_some_and(|d| names_player(d, name))
        })
}

fn case_from_reply(reply: &IncomingMessage, name: &str) -> Option<CaseDetails> {
    let embed = reply.embeds.iter().find(|e| is_case_embed(e, name))?;
    Some(CaseDetails {
        accused: name.to_string(),
        reason: embed.field_value("Reason").map(str::to_string),
        evidence_rating: embed.field_value("Evidence Rating").map(str::to_string),
    })
}

#[async_trait]
impl ReputationChecker for CompanionChecker {
    fn strategy(&self) -> &str {
        "companion"
    }

    async fn check(&self, name: &str) -> ReputationResult {
        let queried = name.to_string();
        let pending = self.collector.expect_reply_matching(
            &self.channel_id,
            &self.responder_id,
            move |msg| is_reply_about(msg, &queried),
        );

        let command = format!("{} {}", self.command_prefix, name);
        if let Err(e) = self
            .platform
            .send(&self.channel_id, OutgoingMessage::text(command))
            .await
        {
            warn!(name, error = %e, "Could not ask companion bot, treating as clean");
            return ReputationResult::clean();
        }

        let Some(reply) = pending.wait(self.wait).await else {
            debug!(name, "Companion bot stayed silent, treating as clean");
            return ReputationResult::clean();
        };

        match case_from_reply(&reply, name) {
            Some(case) => {
                info!(name, reason = ?case.reason, "Companion bot reported a case");
                ReputationResult::flagged(case)
            }
            None => ReputationResult::clean(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::channels::MessageStream;
    use crate::error::PlatformError;

    /// Answers commands in the companion channel from a script keyed by the
    /// command text. Unscripted commands get no answer.
    struct Companion {
        collector: Arc<ReplyCollector>,
        replies: HashMap<String, IncomingMessage>,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatPlatform for Companion {
        fn name(&self) -> &str {
            "companion-stub"
        }

        async fn start(&self) -> Result<MessageStream, PlatformError> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn send(&self, _channel_id: &str, message: OutgoingMessage) -> Result<(), PlatformError> {
            let reply = self.replies.get(&message.content).cloned();
            self.sent.lock().unwrap().push(message.content);
            if let Some(reply) = reply {
                // Let the other concurrent checks register before answering.
                tokio::task::yield_now().await;
                self.collector.offer(reply);
            }
            Ok(())
        }

        async fn start_thread(&self, _: &str, _: &str, _: &str) -> Result<String, PlatformError> {
            Ok("thread".into())
        }

        async fn set_nickname(&self, _: &str, _: &str, _: &str) -> Result<(), PlatformError> {
            Ok(())
        }
    }

    fn checker(replies: &[(&str, IncomingMessage)]) -> (CompanionChecker, Arc<Companion>) {
        let collector = ReplyCollector::new();
        let platform = Arc::new(Companion {
            collector: Arc::clone(&collector),
            replies: replies
                .iter()
                .map(|(command, reply)| (command.to_string(), reply.clone()))
                .collect(),
            sent: Mutex::new(Vec::new()),
        });
        let checker = CompanionChecker::new(
            platform.clone(),
            collector,
            "rw-channel",
            "rw-bot",
            "!rw",
            Duration::from_secs(5),
        );
        (checker, platform)
    }

    #[tokio::test]
    async fn case_embed_flags_player() {
        let reply = IncomingMessage::new("rw-channel", "rw-bot", "").from_bot().with_embed(
            Embed::new("Scammer Joe", 0xff0000)
                .field("Reason", "Trade scam", false)
                .field("Evidence Rating", "5/5", true),
        );
        let (checker, platform) = checker(&[("!rw Scammer Joe", reply)]);

        let result = checker.check("Scammer Joe").await;
        assert!(result.flagged);
        let case = result.case.unwrap();
        assert_eq!(case.reason.as_deref(), Some("Trade scam"));
        assert_eq!(case.evidence_rating.as_deref(), Some("5/5"));
        assert_eq!(platform.sent.lock().unwrap().as_slice(), ["!rw Scammer Joe"]);
    }

    #[tokio::test]
    async fn plain_reply_is_clean() {
        let reply = IncomingMessage::new("rw-channel", "rw-bot", "No cases found for Zezima").from_bot();
        let (checker, _) = checker(&[("!rw Zezima", reply)]);
        assert!(!checker.check("Zezima").await.flagged);
        assert_eq!(checker.collector.waiting(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn silence_is_clean() {
        let (checker, _) = checker(&[]);
        assert_eq!(checker.check("Zezima").await, ReputationResult::clean());
        assert_eq!(checker.collector.waiting(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reply_for_another_player_is_not_consumed() {
        let bob_case = IncomingMessage::new("rw-channel", "rw-bot", "")
            .from_bot()
            .with_embed(Embed::new("Bob", 0xff0000).field("Reason", "Scamming", false));
        let (checker, platform) = checker(&[("!rw Bob", bob_case)]);

        let (alice, bob) = tokio::join!(checker.check("Alice"), checker.check("Bob"));

        assert_eq!(alice, ReputationResult::clean());
        assert!(bob.flagged);
        assert_eq!(bob.case.unwrap().reason.as_deref(), Some("Scamming"));
        assert_eq!(platform.sent.lock().unwrap().len(), 2);
        assert_eq!(checker.collector.waiting(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn case_embed_for_someone_else_is_ignored() {
        let other = IncomingMessage::new("rw-channel", "rw-bot", "")
            .from_bot()
            .with_embed(Embed::new("Case #12", 0xff0000).field("Reason", "Luring", false));
        let (checker, _) = checker(&[("!rw Zezima", other)]);
        assert_eq!(checker.check("Zezima").await, ReputationResult::clean());
    }

    #[test]
    fn title_match_counts_as_case() {
        let embed = Embed::new("RuneWatch: zezima", 0);
        assert!(is_case_embed(&embed, "Zezima"));
        assert!(!is_case_embed(&Embed::new("Help", 0), "Zezima"));
        assert!(!is_case_embed(&Embed::new("Bobby", 0), "Bob"));
    }

    #[test]
    fn accused_field_counts_as_case() {
        let embed = Embed::new("Case #12", 0).field("Accused", "lil bloat", true);
        assert!(is_case_embed(&embed, "Lil Bloat"));
        assert!(!is_case_embed(&embed, "Bloat"));
    }
}
