//! Platform trait and the message types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

/// Inbound message stream produced by [`ChatPlatform::start`].
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A file attached to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub url: String,
}

impl Attachment {
    pub fn image(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content_type: Some("image/png".to_string()),
            url: String::new(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
    }
}

/// One name/value row of an embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// Rich message card. Serializes to the Discord embed shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

impl Embed {
    pub fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: Some(title.into()),
            color: Some(color),
            ..Default::default()
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    /// Value of the first field named `name` (case-insensitive).
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value.as_str())
    }
}

/// A message received from the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Platform message id.
    pub id: String,
    /// Channel or thread the message was posted in.
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub author_id: String,
    /// Server nickname, falling back to the account name.
    pub author_name: String,
    pub author_is_bot: bool,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub embeds: Vec<Embed>,
}

impl IncomingMessage {
    pub fn new(
        channel_id: impl Into<String>,
        author_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let author_id = author_id.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel_id: channel_id.into(),
            guild_id: None,
            author_name: author_id.clone(),
            author_id,
            author_is_bot: false,
            content: content.into(),
            attachments: Vec::new(),
            embeds: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_guild(mut self, guild_id: impl Into<String>) -> Self {
        self.guild_id = Some(guild_id.into());
        self
    }

    pub fn with_author_name(mut self, name: impl Into<String>) -> Self {
        self.author_name = name.into();
        self
    }

    pub fn from_bot(mut self) -> Self {
        self.author_is_bot = true;
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn has_image(&self) -> bool {
        self.attachments.iter().any(Attachment::is_image)
    }
}

/// A message to post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: String,
    pub embeds: Vec<Embed>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            embeds: Vec::new(),
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            content: String::new(),
            embeds: vec![embed],
        }
    }

    pub fn with_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }
}

/// A chat platform the bot runs on.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Short platform name for logs.
    fn name(&self) -> &str;

    /// Begin receiving messages.
    async fn start(&self) -> Result<MessageStream, PlatformError>;

    /// Post a message to a channel or thread.
    async fn send(&self, channel_id: &str, message: OutgoingMessage) -> Result<(), PlatformError>;

    /// Open a thread on `message_id`, returning the thread's channel id.
    async fn start_thread(
        &self,
        channel_id: &str,
        message_id: &str,
        title: &str,
    ) -> Result<String, PlatformError>;

    /// Change a member's server nickname.
    async fn set_nickname(
        &self,
        guild_id: &str,
        user_id: &str,
        nickname: &str,
    ) -> Result<(), PlatformError>;

    async fn health_check(&self) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), PlatformError> {
        Ok(())
    }
}

/// Split a message into chunks of at most `max_len` characters.
/// Tries to split on newlines, then spaces, then hard-cuts.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.chars().count() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let cut = remaining
            .char_indices()
            .nth(max_len)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        let chunk = &remaining[..cut];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(cut);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}
