//! Per-session audit trail.
//!
//! Lines are buffered for the life of a session and posted to the moderation
//! channel in one go. `flush` takes the log by value, so a session can only
//! flush once.

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::channels::{ChatPlatform, OutgoingMessage};
use crate::error::PlatformError;

pub struct AuditLog {
    session_id: Uuid,
    lines: Vec<String>,
    flushed: bool,
}

impl AuditLog {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            lines: Vec::new(),
            flushed: false,
        }
    }

    /// Append a timestamped line.
    pub fn record(&mut self, line: impl AsRef<str>) {
        let line = line.as_ref();
        debug!(session_id = %self.session_id, "{line}");
        self.lines
            .push(format!("`{}` {line}", Utc::now().format("%H:%M:%S")));
    }

    /// Append a timestamped warning.
    pub fn warn(&mut self, line: impl AsRef<str>) {
        self.record(format!("⚠️ {}", line.as_ref()));
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Post `summary` followed by the buffered lines to `channel_id`.
    pub async fn flush(
        mut self,
        platform: &dyn ChatPlatform,
        channel_id: &str,
        summary: OutgoingMessage,
    ) -> Result<(), PlatformError> {
        self.flushed = true;

        let mut message = summary;
        let trail = self.render();
        message.content = if message.content.is_empty() {
            trail
        } else {
            format!("{}\n{trail}", message.content)
        };
        platform.send(channel_id, message).await
    }

    fn render(&self) -> String {
        let mut out = format!("Session `{}`", self.session_id);
        for line in &self.lines {
            out.push('\n');
            out.push_str(line);
        }
        out
    }
}

impl Drop for AuditLog {
    fn drop(&mut self) {
        if !self.flushed && !self.lines.is_empty() {
            warn!(
                session_id = %self.session_id,
                lines = self.lines.len(),
                "Audit log dropped without flushing"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::channels::MessageStream;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, OutgoingMessage)>>,
    }

    #[async_trait]
    impl ChatPlatform for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn start(&self) -> Result<MessageStream, PlatformError> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn send(&self, channel_id: &str, message: OutgoingMessage) -> Result<(), PlatformError> {
            self.sent
                .lock()
                .unwrap()
                .push((channel_id.to_string(), message));
            Ok(())
        }

        async fn start_thread(&self, _: &str, _: &str, _: &str) -> Result<String, PlatformError> {
            Ok("thread".into())
        }

        async fn set_nickname(&self, _: &str, _: &str, _: &str) -> Result<(), PlatformError> {
            Ok(())
        }
    }

    #[test]
    fn lines_are_timestamped_in_order() {
        let mut log = AuditLog::new(Uuid::new_v4());
        log.record("first");
        log.warn("second");
        assert_eq!(log.lines().len(), 2);
        assert!(log.lines()[0].ends_with(" first"));
        assert!(log.lines()[1].ends_with("⚠️ second"));
        assert!(log.lines()[0].starts_with('`'));
    }

    #[tokio::test]
    async fn flush_posts_summary_then_trail() {
        let platform = Recorder::default();
        let id = Uuid::new_v4();
        let mut log = AuditLog::new(id);
        log.record("Attempt 1/2: Zezima");

        log.flush(&platform, "audit", OutgoingMessage::text("✅ passed"))
            .await
            .unwrap();

        let sent = platform.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (channel, message) = &sent[0];
        assert_eq!(channel, "audit");
        assert!(message.content.starts_with("✅ passed\nSession `"));
        assert!(message.content.contains(&id.to_string()));
        assert!(message.content.ends_with("Attempt 1/2: Zezima"));
    }
}
