//! Trigger screening — decides whether a message starts a verification.

use crate::channels::IncomingMessage;

/// An accepted screenshot post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub message_id: String,
    pub channel_id: String,
    pub guild_id: String,
    pub author_id: String,
    pub author_name: String,
}

/// Why a message was not a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    AutomatedAuthor,
    NotInGuild,
    ChannelNotAllowed,
    NoImage,
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AutomatedAuthor => "automated author",
            Self::NotInGuild => "not in a server",
            Self::ChannelNotAllowed => "channel not allowed",
            Self::NoImage => "no image attachment",
        };
        write!(f, "{s}")
    }
}

/// Screen `msg` against the channel allow-list.
pub fn screen(msg: &IncomingMessage, allowed_channels: &[&str]) -> Result<Trigger, IgnoreReason> {
    if msg.author_is_bot {
        return Err(IgnoreReason::AutomatedAuthor);
    }
    let Some(guild_id) = msg.guild_id.as_deref() else {
        return Err(IgnoreReason::NotInGuild);
    };
    if !allowed_channels.contains(&msg.channel_id.as_str()) {
        return Err(IgnoreReason::ChannelNotAllowed);
    }
    if !msg.has_image() {
        return Err(IgnoreReason::NoImage);
    }

    Ok(Trigger {
        message_id: msg.id.clone(),
        channel_id: msg.channel_id.clone(),
        guild_id: guild_id.to_string(),
        author_id: msg.author_id.clone(),
        author_name: msg.author_name.clone(),
    })
}
