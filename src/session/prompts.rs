//! User-facing text and embeds for verification conversations.

use crate::channels::{Embed, OutgoingMessage};
use crate::error::FetchError;
use crate::hiscores::ProgressRecord;
use crate::reputation::ReputationResult;
use crate::requirements::VerificationVerdict;

pub const COLOR_PASS: u32 = 0x57f287;
pub const COLOR_FAIL: u32 = 0xed4245;
pub const COLOR_STATS: u32 = 0x1abc9c;
pub const COLOR_FLAGGED: u32 = 0xe67e22;

pub fn user_mention(user_id: &str) -> String {
    format!("<@{user_id}>")
}

/// `None` when no role is configured.
pub fn role_mention(role_id: &str) -> Option<String> {
    (!role_id.trim().is_empty()).then(|| format!("<@&{role_id}>"))
}

pub fn thread_title(display_name: &str) -> String {
    format!("Verifying {display_name}")
}

pub fn verifying_notice(display_name: &str) -> OutgoingMessage {
    OutgoingMessage::text(format!("⏳ Verifying **{display_name}**..."))
}

/// First request for an in-game name. `tried` is the display name that
/// already failed, if one was tried.
pub fn identity_prompt(mention: &str, tried: Option<&str>) -> String {
    match tried {
        Some(name) => format!(
            "{mention} Could not find your stats as **{name}**. Please reply with your OSRS IGN:"
        ),
        None => format!("{mention} Please reply with your OSRS IGN:"),
    }
}

/// Error and follow-up prompt, sent as one message.
pub fn retry_prompt(mention: &str, error: &FetchError) -> String {
    format!(
        "{}\n{mention} Please reply with your OSRS IGN:",
        fetch_error_text(error)
    )
}

/// What a requester sees for a failed fetch.
pub fn fetch_error_text(error: &FetchError) -> String {
    match error {
        FetchError::NotFound { identity } => {
            format!("❌ Player **{identity}** not found on OSRS hiscores.")
        }
        FetchError::Unreadable { identity, .. } => format!("⚠️ Could not read stats for **{identity}**"),
        FetchError::TemporarilyUnavailable { .. } => {
            "⏳ OSRS hiscores are temporarily unavailable. Please try again later.".to_string()
        }
        FetchError::Unknown { .. } => "💀 Failed to fetch stats for this player.".to_string(),
    }
}

pub fn timeout_notice() -> OutgoingMessage {
    OutgoingMessage::text("⏱️ Verification timed out. Please try again by posting another message.")
}

/// Final requester message when the bot gives up.
pub fn escalation_notice(error: &FetchError, moderator: Option<&str>) -> OutgoingMessage {
    let handoff = match moderator {
        Some(role) => format!("{role} will take a look."),
        None => "A moderator will take a look.".to_string(),
    };
    OutgoingMessage::text(format!(
        "{}\n🚩 I couldn't verify you automatically. {handoff}",
        fetch_error_text(error)
    ))
}

/// `"{name} Verification"` card. Passing cards show the kill counts, failing
/// cards list what is missing.
pub fn verdict_embed(verdict: &VerificationVerdict) -> Embed {
    let embed = Embed::new(
        format!("{} Verification", verdict.name),
        if verdict.passed { COLOR_PASS } else { COLOR_FAIL },
    );
    if verdict.passed {
        embed
            .field("Status", "✅ HMT Ready", false)
            .field("ToB KC", verdict.normal_kill_count.to_string(), true)
            .field("HMT KC", verdict.hard_kill_count.to_string(), true)
    } else {
        embed
            .field("Status", "❌ Failed", false)
            .field("Missing", verdict.unmet.join("\n"), false)
    }
}

/// Verdict card for the requester, with the helper ping on a pass.
pub fn verdict_message(
    verdict: &VerificationVerdict,
    requester: &str,
    helper: Option<&str>,
) -> OutgoingMessage {
    let embed = verdict_embed(verdict);
    if !verdict.passed {
        return OutgoingMessage::embed(embed);
    }
    let content = match helper {
        Some(role) => format!("{role} - {requester} is ready for HMT!"),
        None => format!("{requester} is ready for HMT! A helper will be with you shortly."),
    };
    OutgoingMessage::text(content).with_embed(embed)
}

/// Moderation summary for a pass, flagged or clean.
pub fn pass_report(
    verdict: &VerificationVerdict,
    requester: &str,
    reputation: &ReputationResult,
    moderator: Option<&str>,
) -> OutgoingMessage {
    if !reputation.flagged {
        return OutgoingMessage::text(format!(
            "✅ {requester} passed as **{}** (RuneWatch clean)",
            verdict.name
        ));
    }

    let mut embed = Embed::new(format!("{} is on RuneWatch", verdict.name), COLOR_FLAGGED);
    if let Some(case) = &reputation.case {
        embed = embed.field("Accused", case.accused.clone(), true);
        if let Some(reason) = &case.reason {
            embed = embed.field("Reason", reason.clone(), false);
        }
        if let Some(rating) = &case.evidence_rating {
            embed = embed.field("Evidence Rating", rating.clone(), true);
        }
    }
    let ping = moderator.map(|m| format!("{m} ")).unwrap_or_default();
    OutgoingMessage::text(format!(
        "{ping}🚩 {requester} passed as **{}** but is flagged on RuneWatch",
        verdict.name
    ))
    .with_embed(embed)
}

pub fn fail_report(verdict: &VerificationVerdict, requester: &str) -> OutgoingMessage {
    OutgoingMessage::text(format!(
        "❌ {requester} did not meet requirements as **{}**: {}",
        verdict.name,
        verdict.unmet.join(", ")
    ))
}

pub fn escalation_report(requester: &str, reason: &str, moderator: Option<&str>) -> OutgoingMessage {
    let ping = moderator.map(|m| format!("{m} ")).unwrap_or_default();
    OutgoingMessage::text(format!(
        "{ping}🚩 Verification for {requester} needs a moderator: {reason}"
    ))
}

pub fn timeout_report(requester: &str) -> OutgoingMessage {
    OutgoingMessage::text(format!("⏱️ Verification for {requester} timed out"))
}

/// `/stats` card.
pub fn stats_embed(record: &ProgressRecord) -> Embed {
    let level = record
        .total_level()
        .map_or_else(|| "N/A".to_string(), |l| l.to_string());
    let xp = record
        .total_xp
        .map_or_else(|| "N/A".to_string(), group_thousands);
    Embed::new(format!("📊 Stats for {}", record.name), COLOR_STATS)
        .field("Mode", record.mode.to_string(), true)
        .field("Total Level", level, true)
        .field("Total XP", xp, true)
}

/// `1234567` → `"1,234,567"`.
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::hiscores::GameMode;
    use crate::reputation::CaseDetails;

    fn verdict(passed: bool) -> VerificationVerdict {
        VerificationVerdict {
            passed,
            name: "Lil Bloat".into(),
            unmet: if passed {
                vec![]
            } else {
                vec!["Prayer (70 / 77)".into(), "ToB/HMT KC (40 / 100)".into()]
            },
            normal_kill_count: 60,
            hard_kill_count: 45,
            combined_kill_count: 105,
        }
    }

    #[test]
    fn passing_embed_shows_kill_counts() {
        let embed = verdict_embed(&verdict(true));
        assert_eq!(embed.title.as_deref(), Some("Lil Bloat Verification"));
        assert_eq!(embed.color, Some(COLOR_PASS));
        assert_eq!(embed.field_value("Status"), Some("✅ HMT Ready"));
        assert_eq!(embed.field_value("ToB KC"), Some("60"));
        assert_eq!(embed.field_value("HMT KC"), Some("45"));
    }

    #[test]
    fn failing_embed_lists_unmet() {
        let embed = verdict_embed(&verdict(false));
        assert_eq!(embed.color, Some(COLOR_FAIL));
        assert_eq!(embed.field_value("Status"), Some("❌ Failed"));
        assert_eq!(
            embed.field_value("Missing"),
            Some("Prayer (70 / 77)\nToB/HMT KC (40 / 100)")
        );
    }

    #[test]
    fn helper_ping_on_pass_only() {
        let msg = verdict_message(&verdict(true), "<@u1>", Some("<@&h>"));
        assert_eq!(msg.content, "<@&h> - <@u1> is ready for HMT!");
        assert_eq!(msg.embeds.len(), 1);

        let msg = verdict_message(&verdict(false), "<@u1>", Some("<@&h>"));
        assert!(msg.content.is_empty());
    }

    #[test]
    fn error_texts() {
        let not_found = FetchError::NotFound {
            identity: "Zezima123".into(),
        };
        assert_eq!(
            fetch_error_text(&not_found),
            "❌ Player **Zezima123** not found on OSRS hiscores."
        );
        assert_eq!(
            retry_prompt("<@u1>", &not_found),
            "❌ Player **Zezima123** not found on OSRS hiscores.\n<@u1> Please reply with your OSRS IGN:"
        );
        assert!(
            fetch_error_text(&FetchError::TemporarilyUnavailable { attempts: 2 })
                .contains("temporarily unavailable")
        );
    }

    #[test]
    fn prompts_name_the_tried_display_name() {
        assert_eq!(
            identity_prompt("<@u1>", Some("Bloaty")),
            "<@u1> Could not find your stats as **Bloaty**. Please reply with your OSRS IGN:"
        );
        assert_eq!(identity_prompt("<@u1>", None), "<@u1> Please reply with your OSRS IGN:");
    }

    #[test]
    fn role_mentions_skip_blank_ids() {
        assert_eq!(role_mention("42").as_deref(), Some("<@&42>"));
        assert!(role_mention("  ").is_none());
    }

    #[test]
    fn flagged_report_pings_moderators_with_case() {
        let reputation = ReputationResult::flagged(CaseDetails {
            accused: "Lil Bloat".into(),
            reason: Some("Trade scam".into()),
            evidence_rating: None,
        });
        let msg = pass_report(&verdict(true), "<@u1>", &reputation, Some("<@&m>"));
        assert!(msg.content.starts_with("<@&m> 🚩"));
        assert_eq!(msg.embeds[0].field_value("Reason"), Some("Trade scam"));

        let clean = pass_report(&verdict(true), "<@u1>", &ReputationResult::clean(), Some("<@&m>"));
        assert!(!clean.content.contains("<@&m>"));
        assert!(clean.embeds.is_empty());
    }

    #[test]
    fn stats_card() {
        let record = ProgressRecord {
            name: "Zezima".into(),
            mode: GameMode::Ironman,
            skills: BTreeMap::from([("overall".to_string(), 2277)]),
            bosses: BTreeMap::new(),
            total_xp: Some(4_600_000_000),
        };
        let embed = stats_embed(&record);
        assert_eq!(embed.title.as_deref(), Some("📊 Stats for Zezima"));
        assert_eq!(embed.field_value("Mode"), Some("ironman"));
        assert_eq!(embed.field_value("Total Level"), Some("2277"));
        assert_eq!(embed.field_value("Total XP"), Some("4,600,000,000"));
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(13_034_431), "13,034,431");
    }
}
