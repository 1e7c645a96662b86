use std::sync::Arc;

use anyhow::Context;
use secrecy::SecretString;

use bloat_flies::bot::Bot;
use bloat_flies::channels::{ChatPlatform, CliChannel, DiscordChannel};
use bloat_flies::config::BotConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Arc::new(BotConfig::load().context("loading configuration")?);

    let platform_name = std::env::var("BLOAT_PLATFORM").unwrap_or_else(|_| "cli".to_string());
    let platform: Arc<dyn ChatPlatform> = match platform_name.as_str() {
        "discord" => {
            let token = std::env::var("DISCORD_TOKEN")
                .context("DISCORD_TOKEN must be set for the discord platform")?;
            Arc::new(DiscordChannel::new(SecretString::from(token)))
        }
        "cli" => Arc::new(CliChannel::new(config.channels.verify.clone())),
        other => anyhow::bail!("unknown BLOAT_PLATFORM {other:?} (expected cli or discord)"),
    };

    eprintln!("🪰 Bloat-Flies v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Platform: {}", platform.name());
    eprintln!("   Verify channels: {}", config.allowed_channels().join(", "));
    eprintln!("   Auto identity: {}", config.flow.auto_identity);
    if platform.name() == "cli" {
        eprintln!("   `post <name>` to post a screenshot, /stats or /verify <name>, /help.\n");
    }

    Bot::new(platform, config).run().await?;
    Ok(())
}
