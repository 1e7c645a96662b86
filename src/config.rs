//! Configuration types.
//!
//! Loaded once at startup and shared read-only as `Arc<BotConfig>`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::hiscores::RetryPolicy;
use crate::hiscores::client::DEFAULT_BASE_URL as HISCORES_BASE_URL;
use crate::requirements::RequirementSet;

/// Default config file path, overridable with `BLOAT_CONFIG`.
pub const DEFAULT_CONFIG_PATH: &str = "./config.json";

/// Public RuneWatch host.
pub const RUNEWATCH_BASE_URL: &str = "https://runewatch.com";

/// Role ids mentioned in notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleIds {
    /// Pinged on reputation flags and escalations.
    #[serde(default)]
    pub moderator: String,
    /// Pinged when a requester passes.
    #[serde(default)]
    pub helper: String,
}

/// Channel ids the bot reads from or writes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelIds {
    /// Screenshot channel.
    pub verify: String,
    /// Optional second screenshot channel for testing.
    #[serde(default)]
    pub test: Option<String>,
    /// Moderation surface for audit flushes and notifications.
    #[serde(alias = "log")]
    pub audit: String,
}

/// How to cross-check passing players against RuneWatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ReputationConfig {
    /// Query the public case list directly.
    Api {
        #[serde(default = "default_runewatch_url")]
        base_url: String,
    },
    /// Ask a companion bot and wait for its reply.
    Companion {
        channel_id: String,
        responder_id: String,
        #[serde(default = "default_command_prefix")]
        command_prefix: String,
        #[serde(default = "default_companion_wait_secs")]
        wait_secs: u64,
    },
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self::Api {
            base_url: default_runewatch_url(),
        }
    }
}

/// Knobs for the verification conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Try the requester's display name before prompting.
    #[serde(default = "default_true")]
    pub auto_identity: bool,
    /// How long to wait for the requester to reply with a name.
    #[serde(default = "default_identity_wait_secs")]
    pub identity_wait_secs: u64,
    /// Total hiscores attempts per fetch when the service is degraded.
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,
    #[serde(default = "default_fetch_retry_delay_secs")]
    pub fetch_retry_delay_secs: u64,
    /// Probe the ironman boards to tag the account type.
    #[serde(default = "default_true")]
    pub detect_mode: bool,
    #[serde(default = "default_hiscores_url")]
    pub hiscores_url: String,
    #[serde(default)]
    pub reputation: ReputationConfig,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            auto_identity: true,
            identity_wait_secs: default_identity_wait_secs(),
            fetch_attempts: default_fetch_attempts(),
            fetch_retry_delay_secs: default_fetch_retry_delay_secs(),
            detect_mode: true,
            hiscores_url: default_hiscores_url(),
            reputation: ReputationConfig::default(),
        }
    }
}

impl FlowConfig {
    pub fn identity_wait(&self) -> Duration {
        Duration::from_secs(self.identity_wait_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.fetch_attempts,
            delay: Duration::from_secs(self.fetch_retry_delay_secs),
        }
    }
}

/// Bot configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotConfig {
    pub roles: RoleIds,
    pub channels: ChannelIds,
    #[serde(default)]
    pub requirements: RequirementSet,
    #[serde(default)]
    pub flow: FlowConfig,
}

impl BotConfig {
    /// Minimal config for the given channels, everything else defaulted.
    pub fn new(verify: impl Into<String>, audit: impl Into<String>) -> Self {
        Self {
            roles: RoleIds {
                moderator: String::new(),
                helper: String::new(),
            },
            channels: ChannelIds {
                verify: verify.into(),
                test: None,
                audit: audit.into(),
            },
            requirements: RequirementSet::default(),
            flow: FlowConfig::default(),
        }
    }

    /// Load from `BLOAT_CONFIG` (or `./config.json`) when present, else from
    /// environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("BLOAT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        if Path::new(&path).exists() {
            Self::from_file(Path::new(&path))
        } else {
            Self::from_env()
        }
    }

    /// Parse a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Build from `BLOAT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let verify = std::env::var("BLOAT_VERIFY_CHANNEL")
            .map_err(|_| ConfigError::MissingEnvVar("BLOAT_VERIFY_CHANNEL".into()))?;
        let audit = std::env::var("BLOAT_AUDIT_CHANNEL")
            .map_err(|_| ConfigError::MissingEnvVar("BLOAT_AUDIT_CHANNEL".into()))?;

        let mut config = Self::new(verify, audit);
        config.channels.test = std::env::var("BLOAT_TEST_CHANNEL").ok();
        config.roles.moderator = std::env::var("BLOAT_MODERATOR_ROLE").unwrap_or_default();
        config.roles.helper = std::env::var("BLOAT_HELPER_ROLE").unwrap_or_default();

        if let Ok(v) = std::env::var("BLOAT_AUTO_IDENTITY") {
            config.flow.auto_identity = parse_bool("BLOAT_AUTO_IDENTITY", &v)?;
        }
        if let Ok(url) = std::env::var("BLOAT_HISCORES_URL") {
            config.flow.hiscores_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels.verify.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "channels.verify".into(),
                hint: "Set the screenshot channel id.".into(),
            });
        }
        if self.channels.audit.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "channels.audit".into(),
                hint: "Set the moderation log channel id.".into(),
            });
        }
        if self.flow.fetch_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "flow.fetch_attempts".into(),
                message: "must be at least 1".into(),
            });
        }
        if let ReputationConfig::Companion {
            channel_id,
            responder_id,
            ..
        } = &self.flow.reputation
            && (channel_id.is_empty() || responder_id.is_empty())
        {
            return Err(ConfigError::InvalidValue {
                key: "flow.reputation".into(),
                message: "companion strategy needs channel_id and responder_id".into(),
            });
        }
        Ok(())
    }

    /// Channels where screenshots start a verification.
    pub fn allowed_channels(&self) -> Vec<&str> {
        let mut channels = vec![self.channels.verify.as_str()];
        if let Some(test) = self.channels.test.as_deref() {
            channels.push(test);
        }
        channels
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}

fn default_true() -> bool {
    true
}

fn default_identity_wait_secs() -> u64 {
    60
}

fn default_fetch_attempts() -> u32 {
    2
}

fn default_fetch_retry_delay_secs() -> u64 {
    2
}

fn default_hiscores_url() -> String {
    HISCORES_BASE_URL.to_string()
}

fn default_runewatch_url() -> String {
    RUNEWATCH_BASE_URL.to_string()
}

fn default_command_prefix() -> String {
    "!rw".to_string()
}

fn default_companion_wait_secs() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let json = r#"{
            "roles": { "helper": "111" },
            "channels": { "verify": "222", "test": "333", "log": "444" }
        }"#;
        let config: BotConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.roles.helper, "111");
        assert_eq!(config.roles.moderator, "");
        assert_eq!(config.channels.audit, "444");
        assert_eq!(config.allowed_channels(), vec!["222", "333"]);
        assert_eq!(config.requirements, RequirementSet::hmt());
        assert_eq!(config.flow, FlowConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn flow_defaults() {
        let flow = FlowConfig::default();
        assert!(flow.auto_identity);
        assert_eq!(flow.identity_wait(), Duration::from_secs(60));
        assert_eq!(flow.retry_policy(), RetryPolicy::default());
        assert!(matches!(flow.reputation, ReputationConfig::Api { .. }));
    }

    #[test]
    fn companion_strategy_parses() {
        let json = r#"{
            "roles": {}, "channels": { "verify": "v", "audit": "a" },
            "flow": { "auto_identity": false, "reputation": {
                "strategy": "companion", "channel_id": "c", "responder_id": "bot"
            } }
        }"#;
        let config: BotConfig = serde_json::from_str(json).unwrap();
        assert!(!config.flow.auto_identity);
        match &config.flow.reputation {
            ReputationConfig::Companion {
                command_prefix,
                wait_secs,
                ..
            } => {
                assert_eq!(command_prefix, "!rw");
                assert_eq!(*wait_secs, 5);
            }
            other => panic!("expected companion, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_empty_channels_and_zero_attempts() {
        let config = BotConfig::new("", "a");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired { .. })
        ));

        let mut config = BotConfig::new("v", "a");
        config.flow.fetch_attempts = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn validate_rejects_incomplete_companion() {
        let mut config = BotConfig::new("v", "a");
        config.flow.reputation = ReputationConfig::Companion {
            channel_id: String::new(),
            responder_id: "bot".into(),
            command_prefix: "!rw".into(),
            wait_secs: 5,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_reads_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"roles": {{"moderator": "m"}}, "channels": {{"verify": "v", "audit": "a"}}}}"#
        )
        .unwrap();

        let config = BotConfig::from_file(file.path()).unwrap();
        assert_eq!(config.roles.moderator, "m");
        assert_eq!(config.allowed_channels(), ["v"]);
    }

    #[test]
    fn from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            BotConfig::from_file(file.path()),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn parse_bool_values() {
        assert!(parse_bool("k", "Yes").unwrap());
        assert!(!parse_bool("k", "0").unwrap());
        assert!(parse_bool("k", "maybe").is_err());
    }
}
