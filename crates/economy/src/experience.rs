//! Experience points and level progression.
//!
//! Level `L` requires `L² * 100 + L * 50` cumulative XP, level 1 requires
//! nothing. The level is always recomputed from `total_xp_earned`, never
//! incremented, so stored state cannot drift from the curve.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::{
    EconomyError,
    util::{from_millis, to_millis},
};

/// Cumulative XP needed to reach `level`.
pub fn xp_required_for_level(level: u32) -> i64 {
    if level <= 1 {
        return 0;
    }
    let level = i64::from(level);
    level * level * 100 + level * 50
}

/// XP between `level` and the next one.
pub fn xp_for_next_level(level: u32) -> i64 {
    xp_required_for_level(level + 1) - xp_required_for_level(level)
}

/// Level reached with `total_xp`, capped at `max_level`.
pub fn level_from_total_xp(total_xp: i64, max_level: u32) -> u32 {
    let mut level = 1;
    while level < max_level && xp_required_for_level(level + 1) <= total_xp {
        level += 1;
    }
    level
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XpSource {
    TaskCompletion,
    FirstTryBonus,
    PerfectCompletion,
    NewConceptMastery,
    TeachingMode,
    DailyLogin,
    StreakBonus,
    BadgeEarned,
    LevelUpBonus,
    SpecialEvent,
}

impl XpSource {
    pub const ALL: [XpSource; 10] = [
        Self::TaskCompletion,
        Self::FirstTryBonus,
        Self::PerfectCompletion,
        Self::NewConceptMastery,
        Self::TeachingMode,
        Self::DailyLogin,
        Self::StreakBonus,
        Self::BadgeEarned,
        Self::LevelUpBonus,
        Self::SpecialEvent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskCompletion => "task_completion",
            Self::FirstTryBonus => "first_try_bonus",
            Self::PerfectCompletion => "perfect_completion",
            Self::NewConceptMastery => "new_concept_mastery",
            Self::TeachingMode => "teaching_mode",
            Self::DailyLogin => "daily_login",
            Self::StreakBonus => "streak_bonus",
            Self::BadgeEarned => "badge_earned",
            Self::LevelUpBonus => "level_up_bonus",
            Self::SpecialEvent => "special_event",
        }
    }

    /// Fixed XP granted per occurrence of this source.
    pub fn base_xp(self) -> i64 {
        match self {
            Self::TaskCompletion => 10,
            Self::FirstTryBonus => 5,
            Self::PerfectCompletion => 15,
            Self::NewConceptMastery => 25,
            Self::TeachingMode => 20,
            Self::DailyLogin => 5,
            Self::StreakBonus => 10,
            Self::BadgeEarned => 50,
            Self::LevelUpBonus => 100,
            Self::SpecialEvent => 30,
        }
    }
}

impl TryFrom<&str> for XpSource {
    type Error = EconomyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|source| source.as_str() == value)
            .ok_or_else(|| EconomyError::Validation(format!("unknown xp source: {value}")))
    }
}

/// Returned by an XP award that crossed one or more level thresholds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUpOutcome {
    pub child_id: String,
    pub previous_level: u32,
    pub new_level: u32,
    /// Coins owed for the level-up; paid through the wallet by the caller.
    pub bonus_coins: i64,
    pub timestamp: DateTime<Utc>,
}

impl LevelUpOutcome {
    pub fn levels_gained(&self) -> u32 {
        self.new_level - self.previous_level
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experience {
    pub child_id: String,
    pub level: u32,
    /// XP earned inside the current level. At the top level it is clamped
    /// below `next_level_xp`; the excess is reported by
    /// [`Experience::overflow_xp`].
    pub current_xp: i64,
    /// XP span of the current level.
    pub next_level_xp: i64,
    pub total_xp_earned: i64,
    pub last_updated: DateTime<Utc>,
}

impl Experience {
    pub fn new(child_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        // Zero XP is level 1 under any cap.
        Self::from_total(child_id, 0, 1, now)
    }

    /// Derive every field from the cumulative XP.
    pub fn from_total(
        child_id: impl Into<String>,
        total_xp_earned: i64,
        max_level: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let level = level_from_total_xp(total_xp_earned, max_level);
        let span = xp_for_next_level(level);
        // Past the top level XP keeps accumulating in the total only.
        let current_xp = (total_xp_earned - xp_required_for_level(level)).min(span - 1);
        Self {
            child_id: child_id.into(),
            level,
            current_xp,
            next_level_xp: span,
            total_xp_earned,
            last_updated: now,
        }
    }

    /// XP earned past the clamp of the top level, zero below it, so that
    /// `current_xp + overflow_xp == total_xp_earned - required(level)`.
    pub fn overflow_xp(&self) -> i64 {
        self.total_xp_earned - xp_required_for_level(self.level) - self.current_xp
    }

    /// Progress inside the current level, `0.0..1.0`.
    pub fn progress(&self) -> f64 {
        if self.next_level_xp <= 0 {
            return 1.0;
        }
        self.current_xp as f64 / self.next_level_xp as f64
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "experience")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub child_id: String,
    pub level: i32,
    pub current_xp: i64,
    pub total_xp_earned: i64,
    pub last_updated_ms: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Experience> for ActiveModel {
    fn from(value: &Experience) -> Self {
        Self {
            child_id: ActiveValue::Set(value.child_id.clone()),
            level: ActiveValue::Set(i32::try_from(value.level).unwrap_or(i32::MAX)),
            current_xp: ActiveValue::Set(value.current_xp),
            total_xp_earned: ActiveValue::Set(value.total_xp_earned),
            last_updated_ms: ActiveValue::Set(to_millis(value.last_updated)),
        }
    }
}

impl Model {
    /// Rebuild the snapshot from the stored total; the stored level is only
    /// a denormalized copy.
    pub(crate) fn into_experience(self, max_level: u32) -> Result<Experience, EconomyError> {
        let last_updated = from_millis(self.last_updated_ms, "experience")?;
        Ok(Experience::from_total(
            self.child_id,
            self.total_xp_earned,
            max_level,
            last_updated,
        ))
    }
}
