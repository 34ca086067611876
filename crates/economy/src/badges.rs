//! Badge definitions and earned badges.
//!
//! A [`BadgeDefinition`] describes an achievement; a [`Badge`] is the
//! immutable record of a child having earned it. A child holds at most one
//! badge per definition.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EconomyError,
    util::{from_millis, parse_uuid, to_millis},
};

/// Display rarity. The derived order is the total order used for sorting:
/// `Common < Uncommon < Rare < Epic < Legendary`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeRarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl BadgeRarity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Uncommon => "uncommon",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
        }
    }
}

impl TryFrom<&str> for BadgeRarity {
    type Error = EconomyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "common" => Ok(Self::Common),
            "uncommon" => Ok(Self::Uncommon),
            "rare" => Ok(Self::Rare),
            "epic" => Ok(Self::Epic),
            "legendary" => Ok(Self::Legendary),
            other => Err(EconomyError::Validation(format!(
                "invalid badge rarity: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeCategory {
    TaskCompletion,
    Streak,
    SubjectMastery,
    TimeManagement,
    Exploration,
    Social,
    Milestone,
    SpecialEvent,
}

impl BadgeCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskCompletion => "task_completion",
            Self::Streak => "streak",
            Self::SubjectMastery => "subject_mastery",
            Self::TimeManagement => "time_management",
            Self::Exploration => "exploration",
            Self::Social => "social",
            Self::Milestone => "milestone",
            Self::SpecialEvent => "special_event",
        }
    }
}

impl TryFrom<&str> for BadgeCategory {
    type Error = EconomyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "task_completion" => Ok(Self::TaskCompletion),
            "streak" => Ok(Self::Streak),
            "subject_mastery" => Ok(Self::SubjectMastery),
            "time_management" => Ok(Self::TimeManagement),
            "exploration" => Ok(Self::Exploration),
            "social" => Ok(Self::Social),
            "milestone" => Ok(Self::Milestone),
            "special_event" => Ok(Self::SpecialEvent),
            other => Err(EconomyError::Validation(format!(
                "invalid badge category: {other}"
            ))),
        }
    }
}

/// What moves a badge forward when the orchestrator processes activity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BadgeTrigger {
    /// One step per successful task, optionally restricted to a subject.
    TaskSucceeded { subject: Option<String> },
    /// A task graded 100.
    PerfectGrade,
    /// One step per level gained.
    LevelGained,
    /// Only awarded through explicit calls.
    Manual,
}

impl BadgeTrigger {
    pub fn matches_task(&self, subject: &str, success: bool) -> bool {
        match self {
            Self::TaskSucceeded { subject: None } => success,
            Self::TaskSucceeded {
                subject: Some(wanted),
            } => success && wanted.eq_ignore_ascii_case(subject),
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeRewards {
    pub xp: i64,
    pub coins: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: BadgeCategory,
    pub rarity: BadgeRarity,
    /// Steps to completion; `None` for badges earned by a single event.
    pub target: Option<u32>,
    pub trigger: BadgeTrigger,
    pub rewards: BadgeRewards,
}

impl BadgeDefinition {
    pub fn is_progressive(&self) -> bool {
        self.target.is_some()
    }

    /// Permanent benefits recorded on the earned badge.
    pub fn benefits(&self) -> BTreeMap<String, String> {
        let mut benefits = BTreeMap::new();
        if self.rewards.xp > 0 {
            benefits.insert("xp".to_string(), self.rewards.xp.to_string());
        }
        if self.rewards.coins > 0 {
            benefits.insert("coins".to_string(), self.rewards.coins.to_string());
        }
        benefits
    }
}

/// The catalog shipped with the engine.
pub fn default_catalog() -> Vec<BadgeDefinition> {
    vec![
        BadgeDefinition {
            id: "math_whiz".to_string(),
            name: "Math Whiz".to_string(),
            description: "Complete 10 math challenges.".to_string(),
            category: BadgeCategory::SubjectMastery,
            rarity: BadgeRarity::Common,
            target: Some(10),
            trigger: BadgeTrigger::TaskSucceeded {
                subject: Some("math".to_string()),
            },
            rewards: BadgeRewards { xp: 100, coins: 50 },
        },
        BadgeDefinition {
            id: "bookworm".to_string(),
            name: "Bookworm".to_string(),
            description: "Read 5 stories.".to_string(),
            category: BadgeCategory::Exploration,
            rarity: BadgeRarity::Common,
            target: Some(5),
            trigger: BadgeTrigger::TaskSucceeded {
                subject: Some("reading".to_string()),
            },
            rewards: BadgeRewards { xp: 100, coins: 50 },
        },
        BadgeDefinition {
            id: "task_master".to_string(),
            name: "Task Master".to_string(),
            description: "Complete 25 challenges in any subject.".to_string(),
            category: BadgeCategory::TaskCompletion,
            rarity: BadgeRarity::Rare,
            target: Some(25),
            trigger: BadgeTrigger::TaskSucceeded { subject: None },
            rewards: BadgeRewards {
                xp: 150,
                coins: 100,
            },
        },
        BadgeDefinition {
            id: "perfect_score".to_string(),
            name: "Perfect Score".to_string(),
            description: "Finish a challenge with a perfect grade.".to_string(),
            category: BadgeCategory::Milestone,
            rarity: BadgeRarity::Uncommon,
            target: None,
            trigger: BadgeTrigger::PerfectGrade,
            rewards: BadgeRewards { xp: 50, coins: 0 },
        },
        BadgeDefinition {
            id: "rising_star".to_string(),
            name: "Rising Star".to_string(),
            description: "Gain 4 levels.".to_string(),
            category: BadgeCategory::Milestone,
            rarity: BadgeRarity::Epic,
            target: Some(4),
            trigger: BadgeTrigger::LevelGained,
            rewards: BadgeRewards { xp: 0, coins: 100 },
        },
    ]
}

/// An earned badge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub id: Uuid,
    pub child_id: String,
    pub definition_id: String,
    pub name: String,
    pub category: BadgeCategory,
    pub earned_at: DateTime<Utc>,
    pub rarity: BadgeRarity,
    pub benefits: BTreeMap<String, String>,
}

impl Badge {
    pub fn mint(child_id: &str, definition: &BadgeDefinition, earned_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            child_id: child_id.to_string(),
            definition_id: definition.id.clone(),
            name: definition.name.clone(),
            category: definition.category,
            earned_at,
            rarity: definition.rarity,
            benefits: definition.benefits(),
        }
    }
}

/// Per-child summary of earned badges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeStats {
    pub child_id: String,
    pub total_badges_earned: usize,
    pub badges_by_category: BTreeMap<BadgeCategory, usize>,
    pub badges_by_rarity: BTreeMap<BadgeRarity, usize>,
    pub most_recent: Option<Badge>,
    pub rarest: Option<Badge>,
}

impl BadgeStats {
    pub fn from_badges(child_id: &str, badges: &[Badge]) -> Self {
        let mut badges_by_category = BTreeMap::new();
        let mut badges_by_rarity = BTreeMap::new();
        for badge in badges {
            *badges_by_category.entry(badge.category).or_insert(0) += 1;
            *badges_by_rarity.entry(badge.rarity).or_insert(0) += 1;
        }
        Self {
            child_id: child_id.to_string(),
            total_badges_earned: badges.len(),
            badges_by_category,
            badges_by_rarity,
            most_recent: badges.iter().max_by_key(|b| b.earned_at).cloned(),
            rarest: badges
                .iter()
                .max_by(|a, b| a.rarity.cmp(&b.rarity).then(b.earned_at.cmp(&a.earned_at)))
                .cloned(),
        }
    }
}

/// Legendary first, newest first inside a rarity.
pub fn sort_for_display(badges: &mut [Badge]) {
    badges.sort_by(|a, b| {
        b.rarity
            .cmp(&a.rarity)
            .then_with(|| b.earned_at.cmp(&a.earned_at))
    });
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "badges")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub child_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub definition_id: String,
    pub id: String,
    pub name: String,
    pub category: String,
    pub rarity: String,
    pub earned_at_ms: i64,
    pub benefits: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<&Badge> for ActiveModel {
    type Error = EconomyError;

    fn try_from(value: &Badge) -> Result<Self, Self::Error> {
        Ok(Self {
            child_id: ActiveValue::Set(value.child_id.clone()),
            definition_id: ActiveValue::Set(value.definition_id.clone()),
            id: ActiveValue::Set(value.id.to_string()),
            name: ActiveValue::Set(value.name.clone()),
            category: ActiveValue::Set(value.category.as_str().to_string()),
            rarity: ActiveValue::Set(value.rarity.as_str().to_string()),
            earned_at_ms: ActiveValue::Set(to_millis(value.earned_at)),
            benefits: ActiveValue::Set(serde_json::to_string(&value.benefits)?),
        })
    }
}

impl TryFrom<Model> for Badge {
    type Error = EconomyError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "badge")?,
            child_id: model.child_id,
            definition_id: model.definition_id,
            name: model.name,
            category: BadgeCategory::try_from(model.category.as_str())?,
            earned_at: from_millis(model.earned_at_ms, "badge")?,
            rarity: BadgeRarity::try_from(model.rarity.as_str())?,
            benefits: serde_json::from_str(&model.benefits)?,
        })
    }
}
