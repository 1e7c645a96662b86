//! CLI channel — stdin/stdout REPL for local testing.
//!
//! - `post <name>` posts a screenshot to the verify channel as `<name>`
//! - `/stats <name>` and `/verify <name>` run the commands
//! - any other line is a reply in the most recent verification thread

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Attachment, ChatPlatform, IncomingMessage, MessageStream, OutgoingMessage};
use crate::error::PlatformError;

/// User id for everything typed at the prompt.
pub const CLI_USER: &str = "local-user";

/// Channel id used for command lines.
const CLI_COMMAND_CHANNEL: &str = "cli";

/// A simple CLI platform that reads from stdin and writes to stdout.
pub struct CliChannel {
    verify_channel: String,
    threads: std::sync::Arc<Mutex<Option<String>>>,
    next_thread: AtomicU32,
}

impl CliChannel {
    pub fn new(verify_channel: impl Into<String>) -> Self {
        Self {
            verify_channel: verify_channel.into(),
            threads: std::sync::Arc::new(Mutex::new(None)),
            next_thread: AtomicU32::new(1),
        }
    }
}

/// Turn one typed line into an inbound message.
fn parse_line(line: &str, verify_channel: &str, thread: Option<&str>) -> IncomingMessage {
    if let Some(name) = line.strip_prefix("post ") {
        return IncomingMessage::new(verify_channel, CLI_USER, "")
            .with_guild("cli-guild")
            .with_author_name(name.trim())
            .with_attachment(Attachment::image("screenshot.png"));
    }
    if line.starts_with('/') {
        return IncomingMessage::new(CLI_COMMAND_CHANNEL, CLI_USER, line);
    }
    IncomingMessage::new(thread.unwrap_or(CLI_COMMAND_CHANNEL), CLI_USER, line)
}

fn render(channel_id: &str, message: &OutgoingMessage) -> String {
    let mut out = String::new();
    if !message.content.is_empty() {
        out.push_str(&format!("[#{channel_id}] {}\n", message.content));
    }
    for embed in &message.embeds {
        out.push_str(&format!(
            "[#{channel_id}] ┌ {}\n",
            embed.title.as_deref().unwrap_or("")
        ));
        if let Some(desc) = &embed.description {
            out.push_str(&format!("[#{channel_id}] │ {desc}\n"));
        }
        for field in &embed.fields {
            out.push_str(&format!("[#{channel_id}] │ {}: {}\n", field.name, field.value));
        }
    }
    out
}

#[async_trait]
impl ChatPlatform for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, PlatformError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let verify_channel = self.verify_channel.clone();
        let threads = std::sync::Arc::clone(&self.threads);

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        let thread = threads.lock().unwrap_or_else(|e| e.into_inner()).clone();
                        let msg = parse_line(&line, &verify_channel, thread.as_deref());
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send(&self, channel_id: &str, message: OutgoingMessage) -> Result<(), PlatformError> {
        print!("{}", render(channel_id, &message));
        eprint!("> ");
        Ok(())
    }

    async fn start_thread(
        &self,
        _channel_id: &str,
        _message_id: &str,
        title: &str,
    ) -> Result<String, PlatformError> {
        let id = format!("thread-{}", self.next_thread.fetch_add(1, Ordering::Relaxed));
        *self.threads.lock().unwrap_or_else(|e| e.into_inner()) = Some(id.clone());
        eprintln!("🧵 {title} ({id})");
        Ok(id)
    }

    async fn set_nickname(
        &self,
        _guild_id: &str,
        user_id: &str,
        nickname: &str,
    ) -> Result<(), PlatformError> {
        eprintln!("✏️  {user_id} is now known as {nickname}");
        Ok(())
    }
}
