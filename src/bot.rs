//! Dispatch loop — routes inbound messages to waits, commands and sessions.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::channels::{ChatPlatform, IncomingMessage, MessageStream, ReplyCollector};
use crate::commands::{Command, CommandHandler};
use crate::config::BotConfig;
use crate::error::Error;
use crate::hiscores::{HiscoresClient, ProgressSource, RecordFetcher};
use crate::reputation::{self, ReputationChecker};
use crate::session::{IgnoreReason, SessionOutcome, Verifier, screen};

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Answered a pending wait.
    Delivered,
    Command,
    SessionStarted,
    Ignored(IgnoreReason),
}

pub struct Bot {
    platform: Arc<dyn ChatPlatform>,
    collector: Arc<ReplyCollector>,
    verifier: Arc<Verifier>,
    commands: Arc<CommandHandler>,
    config: Arc<BotConfig>,
}

impl Bot {
    /// Wire the live hiscores client and the configured reputation strategy.
    pub fn new(platform: Arc<dyn ChatPlatform>, config: Arc<BotConfig>) -> Self {
        let collector = ReplyCollector::new();
        let source: Arc<dyn ProgressSource> = Arc::new(HiscoresClient::new(
            config.flow.hiscores_url.clone(),
            config.flow.detect_mode,
        ));
        let reputation = reputation::from_config(
            &config.flow.reputation,
            Arc::clone(&platform),
            Arc::clone(&collector),
        );
        Self::with_parts(platform, collector, source, reputation, config)
    }

    pub fn with_parts(
        platform: Arc<dyn ChatPlatform>,
        collector: Arc<ReplyCollector>,
        source: Arc<dyn ProgressSource>,
        reputation: Arc<dyn ReputationChecker>,
        config: Arc<BotConfig>,
    ) -> Self {
        let fetcher = RecordFetcher::new(source, config.flow.retry_policy());
        let verifier = Arc::new(Verifier::new(
            Arc::clone(&platform),
            Arc::clone(&collector),
            fetcher.clone(),
            reputation,
            Arc::clone(&config),
        ));
        let commands = Arc::new(CommandHandler::new(
            fetcher,
            Arc::new(config.requirements.clone()),
        ));

        Self {
            platform,
            collector,
            verifier,
            commands,
            config,
        }
    }

    pub fn collector(&self) -> &Arc<ReplyCollector> {
        &self.collector
    }

    /// Start the platform and serve until Ctrl+C or the stream ends.
    pub async fn run(&self) -> Result<(), Error> {
        self.config.validate()?;
        if let Err(e) = self.platform.health_check().await {
            warn!(platform = self.platform.name(), error = %e, "Platform health check failed");
        }
        let stream = self.platform.start().await?;
        info!(
            platform = self.platform.name(),
            channels = ?self.config.allowed_channels(),
            "Bot ready and listening"
        );

        self.serve(stream).await;
        self.platform.shutdown().await?;
        Ok(())
    }

    /// Consume `stream`. When it ends, in-flight sessions run to completion.
    pub async fn serve(&self, mut stream: MessageStream) {
        let mut tasks = JoinSet::new();

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl+C received, shutting down...");
                    tasks.abort_all();
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    log_join(joined);
                    continue;
                }
                msg = stream.next() => match msg {
                    Some(m) => m,
                    None => {
                        info!("Message stream ended, waiting for open sessions");
                        break;
                    }
                },
            };

            self.dispatch(message, &mut tasks);
        }

        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }
    }

    /// Route one message. Spawned work lands in `tasks`.
    pub fn dispatch(&self, message: IncomingMessage, tasks: &mut JoinSet<()>) -> Dispatch {
        // Pending waits see every message first, including other bots'.
        let Some(message) = self.collector.offer(message) else {
            return Dispatch::Delivered;
        };

        if !message.author_is_bot
            && let Some(command) = Command::parse(&message.content)
        {
            let commands = Arc::clone(&self.commands);
            let platform = Arc::clone(&self.platform);
            tasks.spawn(async move {
                let reply = commands.handle(command).await;
                if let Err(e) = platform.send(&message.channel_id, reply).await {
                    warn!(error = %e, "Failed to answer command");
                }
            });
            return Dispatch::Command;
        }

        match screen(&message, &self.config.allowed_channels()) {
            Ok(trigger) => {
                let verifier = Arc::clone(&self.verifier);
                tasks.spawn(async move {
                    match verifier.run(trigger).await {
                        SessionOutcome::Passed { name, flagged } => {
                            info!(%name, flagged, "Session passed")
                        }
                        SessionOutcome::Failed { name, unmet } => {
                            info!(%name, unmet = unmet.len(), "Session failed")
                        }
                        SessionOutcome::Escalated { reason } => {
                            warn!(%reason, "Session escalated")
                        }
                        SessionOutcome::TimedOut => info!("Session timed out"),
                    }
                });
                Dispatch::SessionStarted
            }
            Err(reason) => {
                debug!(
                    channel_id = %message.channel_id,
                    author_id = %message.author_id,
                    %reason,
                    "Ignoring message"
                );
                Dispatch::Ignored(reason)
            }
        }
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined
        && e.is_panic()
    {
        error!(error = %e, "Task panicked");
    }
}
