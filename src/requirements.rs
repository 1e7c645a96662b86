//! Requirement table and the pure evaluator that checks a record against it.
//!
//! Evaluation never touches the network. A record reaching this module always
//! has both its skill and boss sections; records missing either are rejected
//! as unreadable by the hiscores layer before they get here.

use serde::{Deserialize, Serialize};

use crate::hiscores::ProgressRecord;

/// Minimum level for one skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillRequirement {
    /// Hiscores key, e.g. `"prayer"`.
    pub skill: String,
    pub minimum: u32,
}

/// Combined kill-count threshold over the normal and hard variants of one
/// encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillCountRequirement {
    /// Label used when the requirement is unmet, e.g. `"ToB/HMT KC"`.
    pub label: String,
    /// Boss key of the normal-mode counter.
    pub normal: String,
    /// Boss key of the hard-mode counter.
    pub hard: String,
    pub minimum: u32,
}

/// The full requirement table. Skills are checked in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementSet {
    pub skills: Vec<SkillRequirement>,
    pub kill_count: KillCountRequirement,
}

impl RequirementSet {
    /// HMT Learner Hub requirements.
    pub fn hmt() -> Self {
        let skills = [
            ("attack", 80),
            ("defence", 80),
            ("strength", 99),
            ("ranged", 99),
            ("magic", 99),
            ("prayer", 77),
        ]
        .into_iter()
        .map(|(skill, minimum)| SkillRequirement {
            skill: skill.to_string(),
            minimum,
        })
        .collect();

        Self {
            skills,
            kill_count: KillCountRequirement {
                label: "ToB/HMT KC".to_string(),
                normal: "theatreOfBlood".to_string(),
                hard: "theatreOfBloodHardMode".to_string(),
                minimum: 100,
            },
        }
    }
}

impl Default for RequirementSet {
    fn default() -> Self {
        Self::hmt()
    }
}

/// Result of checking one record against a [`RequirementSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationVerdict {
    pub passed: bool,
    /// Canonical name from the record.
    pub name: String,
    /// Human-readable unmet items, empty iff `passed`.
    pub unmet: Vec<String>,
    pub normal_kill_count: u32,
    pub hard_kill_count: u32,
    pub combined_kill_count: u32,
}

/// Check `record` against `requirements`.
///
/// Missing skills and boss counters count as zero.
pub fn evaluate(record: &ProgressRecord, requirements: &RequirementSet) -> VerificationVerdict {
    let mut unmet = Vec::new();

    for req in &requirements.skills {
        let level = record.skill_level(&req.skill);
        if level < req.minimum {
            tracing::debug!(skill = %req.skill, level, required = req.minimum, "Skill below minimum");
            unmet.push(format!(
                "{} ({} / {})",
                display_skill(&req.skill),
                level,
                req.minimum
            ));
        }
    }

    let kc = &requirements.kill_count;
    let normal = record.boss_score(&kc.normal);
    let hard = record.boss_score(&kc.hard);
    let combined = normal.saturating_add(hard);
    if combined < kc.minimum {
        unmet.push(format!("{} ({} / {})", kc.label, combined, kc.minimum));
    }

    VerificationVerdict {
        passed: unmet.is_empty(),
        name: record.name.clone(),
        unmet,
        normal_kill_count: normal,
        hard_kill_count: hard,
        combined_kill_count: combined,
    }
}

/// `"prayer"` → `"Prayer"`.
pub fn display_skill(skill: &str) -> String {
    let mut chars = skill.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
