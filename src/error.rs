//! Error types for the verification bot.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Chat platform errors (sending, threads, member edits).
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Platform {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send message on {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to open thread on {name}: {reason}")]
    ThreadFailed { name: String, reason: String },

    #[error("Missing permission on {name}: {reason}")]
    PermissionDenied { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Failure reported by a progress-record upstream for a single request.
///
/// Only `Transient` is retried by the fetcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("No record for {identity}")]
    NotFound { identity: String },

    #[error("Record for {identity} is malformed: {reason}")]
    Malformed { identity: String, reason: String },

    #[error("Upstream degraded: {reason}")]
    Transient { reason: String },

    #[error("Unexpected upstream failure: {reason}")]
    Unexpected { reason: String },
}

/// Failure surfaced by the progress-record fetcher after its retry policy ran.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Player {identity} not found")]
    NotFound { identity: String },

    #[error("Could not read stats for {identity}: {reason}")]
    Unreadable { identity: String, reason: String },

    #[error("Hiscores temporarily unavailable after {attempts} attempts")]
    TemporarilyUnavailable { attempts: u32 },

    #[error("Unknown fetch failure: {reason}")]
    Unknown { reason: String },
}

impl FetchError {
    /// Whether the session may ask the requester for another identity.
    pub fn is_retryable_by_user(&self) -> bool {
        !matches!(self, Self::Unknown { .. })
    }
}

/// Session state machine errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session {id} cannot transition from {from} to {to}")]
    InvalidTransition {
        id: uuid::Uuid,
        from: String,
        to: String,
    },

    #[error("Identity attempts exhausted ({max})")]
    AttemptsExhausted { max: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;
