//! Progress records from the OSRS hiscores.
//!
//! - `client` — HTTP lookup against the hiscores JSON boards
//! - `fetcher` — transient-retry policy wrapped around any [`ProgressSource`]

pub mod client;
pub mod fetcher;

pub use client::HiscoresClient;
pub use fetcher::{RecordFetcher, RetryPolicy};

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LookupError;

/// Account type a record was retrieved under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Main,
    Ironman,
    Hardcore,
    Ultimate,
}

impl GameMode {
    /// Hiscores board path segment for this mode.
    pub fn board(&self) -> &'static str {
        match self {
            Self::Main => "hiscore_oldschool",
            Self::Ironman => "hiscore_oldschool_ironman",
            Self::Hardcore => "hiscore_oldschool_hardcore_ironman",
            Self::Ultimate => "hiscore_oldschool_ultimate",
        }
    }
}

impl std::fmt::Display for GameMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Main => "main",
            Self::Ironman => "ironman",
            Self::Hardcore => "hardcore",
            Self::Ultimate => "ultimate",
        };
        write!(f, "{s}")
    }
}

/// Snapshot of one player's hiscores entry.
///
/// Keys are camelCase hiscore names (`"prayer"`, `"theatreOfBloodHardMode"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Canonical display name.
    pub name: String,
    pub mode: GameMode,
    pub skills: BTreeMap<String, u32>,
    pub bosses: BTreeMap<String, u32>,
    /// Overall XP, when the board reports it.
    pub total_xp: Option<u64>,
}

impl ProgressRecord {
    /// Level for `skill`, zero when absent.
    pub fn skill_level(&self, skill: &str) -> u32 {
        self.skills.get(skill).copied().unwrap_or(0)
    }

    /// Score for `boss`, zero when absent.
    pub fn boss_score(&self, boss: &str) -> u32 {
        self.bosses.get(boss).copied().unwrap_or(0)
    }

    /// Overall level, when the board reports it.
    pub fn total_level(&self) -> Option<u32> {
        self.skills.get("overall").copied()
    }
}

/// Upstream that resolves an identity to a progress record in one request.
#[async_trait]
pub trait ProgressSource: Send + Sync {
    async fn lookup(&self, identity: &str) -> Result<ProgressRecord, LookupError>;
}
