//! Transaction primitives.
//!
//! A `Transaction` is one immutable balance change of a child's wallet.
//! Positive amounts are earnings, negative amounts are spending; the sum of
//! all transactions of a child is that child's balance.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EconomyError, ResultEconomy,
    util::{from_millis, parse_uuid, to_millis},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionCategory {
    TaskCompletion,
    FirstTryBonus,
    PerfectBonus,
    NewConceptBonus,
    TeachingModeBonus,
    DailyLogin,
    StreakBonus,
    LevelUpBonus,
    BadgeReward,
    GameReward,
    Entertainment,
    EducationalGames,
    CreativeApps,
    PhysicalActivity,
    Customization,
    LearningEnhancement,
    AppAccess,
}

impl TransactionCategory {
    pub const ALL: [TransactionCategory; 17] = [
        Self::TaskCompletion,
        Self::FirstTryBonus,
        Self::PerfectBonus,
        Self::NewConceptBonus,
        Self::TeachingModeBonus,
        Self::DailyLogin,
        Self::StreakBonus,
        Self::LevelUpBonus,
        Self::BadgeReward,
        Self::GameReward,
        Self::Entertainment,
        Self::EducationalGames,
        Self::CreativeApps,
        Self::PhysicalActivity,
        Self::Customization,
        Self::LearningEnhancement,
        Self::AppAccess,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskCompletion => "task_completion",
            Self::FirstTryBonus => "first_try_bonus",
            Self::PerfectBonus => "perfect_bonus",
            Self::NewConceptBonus => "new_concept_bonus",
            Self::TeachingModeBonus => "teaching_mode_bonus",
            Self::DailyLogin => "daily_login",
            Self::StreakBonus => "streak_bonus",
            Self::LevelUpBonus => "level_up_bonus",
            Self::BadgeReward => "badge_reward",
            Self::GameReward => "game_reward",
            Self::Entertainment => "entertainment",
            Self::EducationalGames => "educational_games",
            Self::CreativeApps => "creative_apps",
            Self::PhysicalActivity => "physical_activity",
            Self::Customization => "customization",
            Self::LearningEnhancement => "learning_enhancement",
            Self::AppAccess => "app_access",
        }
    }

    /// Categories that may be credited.
    pub fn is_earning(self) -> bool {
        matches!(
            self,
            Self::TaskCompletion
                | Self::FirstTryBonus
                | Self::PerfectBonus
                | Self::NewConceptBonus
                | Self::TeachingModeBonus
                | Self::DailyLogin
                | Self::StreakBonus
                | Self::LevelUpBonus
                | Self::BadgeReward
                | Self::GameReward
        )
    }

    /// Categories that may be debited.
    pub fn is_spending(self) -> bool {
        !self.is_earning()
    }
}

impl TryFrom<&str> for TransactionCategory {
    type Error = EconomyError;

    /// Accepts the plain names as well as the `earning_`/`spending_`
    /// prefixed spellings used by older clients.
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        let name = normalized
            .strip_prefix("earning_")
            .or_else(|| normalized.strip_prefix("spending_"))
            .unwrap_or(&normalized);
        let name = match name {
            "perfect_completion" => "perfect_bonus",
            other => other,
        };

        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == name)
            .ok_or_else(|| EconomyError::Validation(format!("unknown category: {value}")))
    }
}

impl std::fmt::Display for TransactionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub child_id: String,
    pub amount: i64,
    pub category: TransactionCategory,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
}

impl Transaction {
    /// Build a transaction, generating an id when the caller has none.
    pub fn new(
        id: Option<Uuid>,
        child_id: impl Into<String>,
        amount: i64,
        category: TransactionCategory,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> ResultEconomy<Self> {
        if amount == 0 {
            return Err(EconomyError::Validation(
                "transaction amount must not be 0".to_string(),
            ));
        }
        Ok(Self {
            id: id.unwrap_or_else(Uuid::new_v4),
            child_id: child_id.into(),
            amount,
            category,
            description: description.into(),
            timestamp,
            metadata: BTreeMap::new(),
        })
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub child_id: String,
    pub amount: i64,
    pub category: String,
    pub description: String,
    pub timestamp_ms: i64,
    pub metadata: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<&Transaction> for ActiveModel {
    type Error = EconomyError;

    fn try_from(tx: &Transaction) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ActiveValue::Set(tx.id.to_string()),
            child_id: ActiveValue::Set(tx.child_id.clone()),
            amount: ActiveValue::Set(tx.amount),
            category: ActiveValue::Set(tx.category.as_str().to_string()),
            description: ActiveValue::Set(tx.description.clone()),
            timestamp_ms: ActiveValue::Set(to_millis(tx.timestamp)),
            metadata: ActiveValue::Set(serde_json::to_string(&tx.metadata)?),
        })
    }
}

impl TryFrom<Model> for Transaction {
    type Error = EconomyError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let metadata = if model.metadata.is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&model.metadata)?
        };
        Ok(Self {
            id: parse_uuid(&model.id, "transaction")?,
            child_id: model.child_id,
            amount: model.amount,
            category: TransactionCategory::try_from(model.category.as_str())?,
            description: model.description,
            timestamp: from_millis(model.timestamp_ms, "transaction")?,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn zero_amount_is_rejected() {
        let err = Transaction::new(
            None,
            "ada",
            0,
            TransactionCategory::TaskCompletion,
            "nothing",
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            EconomyError::Validation("transaction amount must not be 0".to_string())
        );
    }

    #[test]
    fn category_parsing_accepts_prefixed_names() {
        assert_eq!(
            TransactionCategory::try_from("earning_task_completion").unwrap(),
            TransactionCategory::TaskCompletion
        );
        assert_eq!(
            TransactionCategory::try_from("spending_app_access").unwrap(),
            TransactionCategory::AppAccess
        );
        assert_eq!(
            TransactionCategory::try_from("task_completion").unwrap(),
            TransactionCategory::TaskCompletion
        );
        assert!(TransactionCategory::try_from("lottery").is_err());
    }

    #[test]
    fn earning_and_spending_partition_categories() {
        for category in TransactionCategory::ALL {
            assert_ne!(category.is_earning(), category.is_spending());
        }
        assert!(TransactionCategory::LevelUpBonus.is_earning());
        assert!(TransactionCategory::Entertainment.is_spending());
    }

    #[test]
    fn model_conversion_keeps_metadata() {
        let at = Utc.with_ymd_and_hms(2026, 1, 10, 9, 0, 0).unwrap();
        let tx = Transaction::new(
            None,
            "ada",
            20,
            TransactionCategory::TaskCompletion,
            "math quiz",
            at,
        )
        .unwrap()
        .with_metadata("subject", "math");

        let active = ActiveModel::try_from(&tx).unwrap();
        let model = Model {
            id: active.id.unwrap(),
            child_id: active.child_id.unwrap(),
            amount: active.amount.unwrap(),
            category: active.category.unwrap(),
            description: active.description.unwrap(),
            timestamp_ms: active.timestamp_ms.unwrap(),
            metadata: active.metadata.unwrap(),
        };
        assert_eq!(Transaction::try_from(model).unwrap(), tx);
    }
}
