//! Discord platform — REST v10 for outbound calls.
//!
//! The gateway connection is run by a separate relay process that writes
//! MESSAGE_CREATE payloads to our stdin, one JSON document per line. Both the
//! full dispatch envelope (`{"t": "MESSAGE_CREATE", "d": {...}}`) and a bare
//! message object are accepted.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{
    Attachment, ChatPlatform, Embed, IncomingMessage, MessageStream, OutgoingMessage,
    split_message,
};
use crate::error::PlatformError;

/// Default REST API root.
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Maximum message length for Discord's create-message endpoint.
const DISCORD_MAX_MESSAGE_LENGTH: usize = 2000;

/// Maximum thread name length.
const DISCORD_MAX_THREAD_NAME: usize = 100;

/// Threads archive after a day of inactivity.
const THREAD_AUTO_ARCHIVE_MINUTES: u32 = 1440;

/// Discord platform adapter.
pub struct DiscordChannel {
    token: SecretString,
    api_base: String,
    client: reqwest::Client,
}

impl DiscordChannel {
    pub fn new(token: SecretString) -> Self {
        Self::with_api_base(token, DISCORD_API_BASE)
    }

    pub fn with_api_base(token: SecretString, api_base: impl Into<String>) -> Self {
        Self {
            token,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token.expose_secret())
    }

    async fn post_message(
        &self,
        channel_id: &str,
        body: serde_json::Value,
    ) -> Result<(), PlatformError> {
        let resp = self
            .client
            .post(self.api_url(&format!("channels/{channel_id}/messages")))
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::SendFailed {
                name: "discord".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(PlatformError::SendFailed {
                name: "discord".into(),
                reason: format!("create message returned {status}: {err}"),
            });
        }
        Ok(())
    }
}

/// Build the create-message bodies for `message`, splitting long text.
/// Embeds ride on the last chunk.
fn message_bodies(message: &OutgoingMessage) -> Vec<serde_json::Value> {
    let chunks = if message.content.is_empty() {
        vec![String::new()]
    } else {
        split_message(&message.content, DISCORD_MAX_MESSAGE_LENGTH)
    };
    let last = chunks.len() - 1;

    chunks
        .into_iter()
        .enumerate()
        .map(|(i, content)| {
            let mut body = serde_json::json!({
                "content": content,
                "allowed_mentions": { "parse": ["users", "roles"] },
            });
            if i == last && !message.embeds.is_empty() {
                body["embeds"] = serde_json::json!(message.embeds);
            }
            body
        })
        .collect()
}

#[async_trait]
impl ChatPlatform for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn start(&self) -> Result<MessageStream, PlatformError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            tracing::info!("Discord relay listening on stdin...");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match parse_gateway_line(line) {
                            Ok(Some(msg)) => {
                                if tx.send(msg).is_err() {
                                    tracing::info!("Discord listener channel closed");
                                    return;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => tracing::warn!("Discord relay parse error: {e}"),
                        }
                    }
                    Ok(None) => {
                        tracing::info!("Discord relay closed stdin");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Error reading relay input: {e}");
                        break;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send(&self, channel_id: &str, message: OutgoingMessage) -> Result<(), PlatformError> {
        for body in message_bodies(&message) {
            self.post_message(channel_id, body).await?;
        }
        Ok(())
    }

    async fn start_thread(
        &self,
        channel_id: &str,
        message_id: &str,
        title: &str,
    ) -> Result<String, PlatformError> {
        let name: String = title.chars().take(DISCORD_MAX_THREAD_NAME).collect();
        let resp = self
            .client
            .post(self.api_url(&format!(
                "channels/{channel_id}/messages/{message_id}/threads"
            )))
            .header("Authorization", self.auth_header())
            .json(&serde_json::json!({
                "name": name,
                "auto_archive_duration": THREAD_AUTO_ARCHIVE_MINUTES,
            }))
            .send()
            .await
            .map_err(|e| PlatformError::ThreadFailed {
                name: "discord".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(PlatformError::ThreadFailed {
                name: "discord".into(),
                reason: format!("start thread returned {}", resp.status()),
            });
        }

        let data: serde_json::Value = resp.json().await.map_err(|e| PlatformError::Http(e.to_string()))?;
        data.get("id")
            .and_then(serde_json::Value::as_str)
            .map(String::from)
            .ok_or_else(|| PlatformError::ThreadFailed {
                name: "discord".into(),
                reason: "thread response missing id".into(),
            })
    }

    async fn set_nickname(
        &self,
        guild_id: &str,
        user_id: &str,
        nickname: &str,
    ) -> Result<(), PlatformError> {
        let resp = self
            .client
            .patch(self.api_url(&format!("guilds/{guild_id}/members/{user_id}")))
            .header("Authorization", self.auth_header())
            .json(&serde_json::json!({ "nick": nickname }))
            .send()
            .await
            .map_err(|e| PlatformError::Http(e.to_string()))?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::FORBIDDEN => Err(PlatformError::PermissionDenied {
                name: "discord".into(),
                reason: format!("cannot change nickname of {user_id}"),
            }),
            s => Err(PlatformError::Http(format!("modify member returned {s}"))),
        }
    }

    async fn health_check(&self) -> Result<(), PlatformError> {
        let resp = self
            .client
            .get(self.api_url("users/@me"))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| PlatformError::StartupFailed {
                name: "discord".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(PlatformError::StartupFailed {
                name: "discord".into(),
                reason: format!("users/@me returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), PlatformError> {
        tracing::info!("Discord channel shutting down");
        Ok(())
    }
}

// ── Inbound payloads ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DiscordMessage {
    id: String,
    channel_id: String,
    #[serde(default)]
    guild_id: Option<String>,
    author: DiscordUser,
    #[serde(default)]
    member: Option<DiscordMember>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    attachments: Vec<Attachment>,
    #[serde(default)]
    embeds: Vec<Embed>,
}

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
    username: String,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct DiscordMember {
    #[serde(default)]
    nick: Option<String>,
}

impl From<DiscordMessage> for IncomingMessage {
    fn from(m: DiscordMessage) -> Self {
        let author_name = m
            .member
            .and_then(|mb| mb.nick)
            .or(m.author.global_name)
            .unwrap_or(m.author.username);

        IncomingMessage {
            id: m.id,
            channel_id: m.channel_id,
            guild_id: m.guild_id,
            author_id: m.author.id,
            author_name,
            author_is_bot: m.author.bot,
            content: m.content,
            attachments: m.attachments,
            embeds: m.embeds,
        }
    }
}

/// Parse one relay line. `Ok(None)` for dispatches other than MESSAGE_CREATE.
pub fn parse_gateway_line(line: &str) -> Result<Option<IncomingMessage>, PlatformError> {
    let value: serde_json::Value =
        serde_json::from_str(line).map_err(|e| PlatformError::InvalidMessage(e.to_string()))?;

    let payload = match value.get("t") {
        Some(t) if t.as_str() == Some("MESSAGE_CREATE") => value
            .get("d")
            .cloned()
            .ok_or_else(|| PlatformError::InvalidMessage("dispatch missing d".into()))?,
        Some(_) => return Ok(None),
        None => value,
    };

    let msg: DiscordMessage = serde_json::from_value(payload)
        .map_err(|e| PlatformError::InvalidMessage(e.to_string()))?;
    Ok(Some(msg.into()))
}
