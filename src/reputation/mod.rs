//! RuneWatch reputation checks.
//!
//! Checks are best-effort: any failure reads as "not flagged" so a flaky
//! upstream never blocks a verification.

pub mod api;
pub mod companion;

pub use api::RuneWatchApi;
pub use companion::CompanionChecker;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::channels::{ChatPlatform, ReplyCollector};
use crate::config::ReputationConfig;

/// What the reputation list says about a case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseDetails {
    /// Name the case was filed under.
    pub accused: String,
    pub reason: Option<String>,
    pub evidence_rating: Option<String>,
}

/// Outcome of one reputation lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationResult {
    pub flagged: bool,
    pub case: Option<CaseDetails>,
}

impl ReputationResult {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn flagged(case: CaseDetails) -> Self {
        Self {
            flagged: true,
            case: Some(case),
        }
    }
}

/// A reputation lookup strategy.
#[async_trait]
pub trait ReputationChecker: Send + Sync {
    /// Strategy name for logs.
    fn strategy(&self) -> &str;

    /// Look up `name`. Never fails; upstream problems read as clean.
    async fn check(&self, name: &str) -> ReputationResult;
}

/// Build the configured strategy.
pub fn from_config(
    config: &ReputationConfig,
    platform: Arc<dyn ChatPlatform>,
    collector: Arc<ReplyCollector>,
) -> Arc<dyn ReputationChecker> {
    match config {
        ReputationConfig::Api { base_url } => Arc::new(RuneWatchApi::new(base_url.clone())),
        ReputationConfig::Companion {
            channel_id,
            responder_id,
            command_prefix,
            wait_secs,
        } => Arc::new(CompanionChecker::new(
            platform,
            collector,
            channel_id.clone(),
            responder_id.clone(),
            command_prefix.clone(),
            Duration::from_secs(*wait_secs),
        )),
    }
}
