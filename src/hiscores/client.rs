//! OSRS hiscores client — reads the `index_lite.json` boards.
//!
//! One lookup hits the main board first. With mode detection on, the ironman
//! boards are then probed and the deepest board whose overall XP matches the
//! main board wins, so a hardcore ironman resolves to `Hardcore`.
//!
//! The boards carry no display name, so the player's casing is read from their
//! row on the overall ranking page. If that page can't be read the cleaned
//! input is used as-is.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{GameMode, ProgressRecord, ProgressSource};
use crate::error::LookupError;

/// Public hiscores host.
pub const DEFAULT_BASE_URL: &str = "https://secure.runescape.com";

/// Per-request timeout. A timed-out request counts as transient.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Names are 1–12 letters, digits, spaces, hyphens or underscores.
static VALID_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9 _\-]{1,12}$").unwrap());

/// Player links on the ranking page point at `hiscorepersonal?user1=…`.
static RANKING_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*href=["'][^"']*user1=[^"']*["'][^>]*>\s*([^<]+?)\s*</a>"#).unwrap()
});

/// HTTP client for the hiscores boards.
pub struct HiscoresClient {
    base_url: String,
    detect_mode: bool,
    client: reqwest::Client,
}

impl HiscoresClient {
    pub fn new(base_url: impl Into<String>, detect_mode: bool) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            detect_mode,
            client,
        }
    }

    fn board_url(&self, mode: GameMode) -> String {
        format!("{}/m={}/index_lite.json", self.base_url, mode.board())
    }

    fn ranking_url(&self, mode: GameMode) -> String {
        format!("{}/m={}/overall", self.base_url, mode.board())
    }

    /// Fetch and parse one board for `identity`.
    async fn fetch_board(&self, mode: GameMode, identity: &str) -> Result<RawBoard, LookupError> {
        let resp = self
            .client
            .get(self.board_url(mode))
            .query(&[("player", identity)])
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    LookupError::Unexpected {
                        reason: e.to_string(),
                    }
                } else {
                    LookupError::Transient {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(LookupError::NotFound {
                identity: identity.to_string(),
            });
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(LookupError::Transient {
                reason: format!("{} board returned {status}", mode),
            });
        }
        if !status.is_success() {
            return Err(LookupError::Unexpected {
                reason: format!("{} board returned {status}", mode),
            });
        }

        let body = resp.text().await.map_err(|e| LookupError::Transient {
            reason: format!("reading body: {e}"),
        })?;

        serde_json::from_str::<RawBoard>(&body).map_err(|e| LookupError::Malformed {
            identity: identity.to_string(),
            reason: format!("invalid JSON: {e}"),
        })
    }

    /// Fetch `mode`'s board and keep it only if its overall XP equals `xp`.
    async fn matching_board(
        &self,
        mode: GameMode,
        identity: &str,
        xp: Option<u64>,
    ) -> Option<RawBoard> {
        match self.fetch_board(mode, identity).await {
            Ok(board) if board.overall_xp() == xp => Some(board),
            Ok(_) => None,
            Err(e) => {
                debug!(identity, %mode, error = %e, "Mode probe did not match");
                None
            }
        }
    }

    /// The player's name as the ranking page prints it, if it can be read.
    async fn ranked_name(&self, name: &str) -> Option<String> {
        let resp = self
            .client
            .get(self.ranking_url(GameMode::Main))
            .query(&[("table", "0"), ("user", name)])
            .send()
            .await
            .inspect_err(|e| debug!(name, error = %e, "Ranking page request failed"))
            .ok()?;
        if !resp.status().is_success() {
            debug!(name, status = %resp.status(), "Ranking page unavailable");
            return None;
        }
        let html = resp.text().await.ok()?;
        find_ranked_name(&html, name)
    }

    async fn resolve_mode(&self, identity: &str, main: RawBoard) -> (GameMode, RawBoard) {
        let xp = main.overall_xp();
        let Some(iron) = self.matching_board(GameMode::Ironman, identity, xp).await else {
            return (GameMode::Main, main);
        };
        for variant in [GameMode::Hardcore, GameMode::Ultimate] {
            if let Some(board) = self.matching_board(variant, identity, xp).await {
                return (variant, board);
            }
        }
        (GameMode::Ironman, iron)
    }
}

#[async_trait]
impl ProgressSource for HiscoresClient {
    async fn lookup(&self, identity: &str) -> Result<ProgressRecord, LookupError> {
        let name = canonical_name(identity);
        if !is_valid_name(&name) {
            debug!(identity, "Rejected invalid player name without lookup");
            return Err(LookupError::NotFound { identity: name });
        }

        let main = self.fetch_board(GameMode::Main, &name).await?;
        let (mode, board) = if self.detect_mode {
            self.resolve_mode(&name, main).await
        } else {
            (GameMode::Main, main)
        };

        let name = match self.ranked_name(&name).await {
            Some(display) => display,
            None => {
                debug!(identity = %name, "Keeping cleaned name, no ranking entry");
                name
            }
        };

        info!(identity = %name, %mode, "Fetched hiscores record");
        board.into_record(name, mode).inspect_err(|e| {
            warn!(error = %e, "Hiscores record missing sections");
        })
    }
}

// ── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawBoard {
    skills: Option<Vec<RawSkill>>,
    activities: Option<Vec<RawActivity>>,
}

#[derive(Debug, Deserialize)]
struct RawSkill {
    name: String,
    #[serde(default)]
    level: i64,
    #[serde(default)]
    xp: i64,
}

#[derive(Debug, Deserialize)]
struct RawActivity {
    name: String,
    #[serde(default)]
    score: i64,
}

impl RawBoard {
    fn overall_xp(&self) -> Option<u64> {
        self.skills
            .as_ref()?
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case("overall"))
            .map(|s| clamp_u64(s.xp))
    }

    fn into_record(self, name: String, mode: GameMode) -> Result<ProgressRecord, LookupError> {
        let total_xp = self.overall_xp();
        let (Some(skills), Some(activities)) = (self.skills, self.activities) else {
            return Err(LookupError::Malformed {
                identity: name,
                reason: "missing skills or activities section".into(),
            });
        };

        Ok(ProgressRecord {
            name,
            mode,
            skills: skills
                .into_iter()
                .map(|s| (camel_key(&s.name), clamp_u32(s.level)))
                .collect(),
            bosses: activities
                .into_iter()
                .map(|a| (camel_key(&a.name), clamp_u32(a.score)))
                .collect(),
            total_xp,
        })
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Unranked entries are reported as -1.
fn clamp_u32(v: i64) -> u32 {
    v.clamp(0, u32::MAX as i64) as u32
}

fn clamp_u64(v: i64) -> u64 {
    v.max(0) as u64
}

/// Trim and collapse inner whitespace; underscores and non-breaking spaces
/// read as spaces on the hiscores.
pub fn canonical_name(identity: &str) -> String {
    identity
        .replace(['_', '\u{a0}'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First ranking-page link whose text is `name`, ignoring case.
fn find_ranked_name(html: &str, name: &str) -> Option<String> {
    RANKING_NAME
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|text| {
            canonical_name(
                &text
                    .as_str()
                    .replace("&nbsp;", " ")
                    .replace("&#160;", " ")
                    .replace("&#xa0;", " "),
            )
        })
        .find(|text| text.eq_ignore_ascii_case(name))
}

pub fn is_valid_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

/// `"Theatre of Blood: Hard Mode"` → `"theatreOfBloodHardMode"`.
pub fn camel_key(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let words = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty());
    for (i, word) in words.enumerate() {
        let mut chars = word.chars();
        let Some(first) = chars.next() else { continue };
        if i == 0 {
            out.extend(first.to_lowercase());
        } else {
            out.extend(first.to_uppercase());
        }
        out.push_str(chars.as_str());
    }
    out
}
