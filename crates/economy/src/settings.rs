//! Handles settings for the economy engine.
//!
//! Defaults are compiled in; a configuration file and `ECONOMY__`-prefixed
//! environment variables may override any field, e.g.
//! `ECONOMY__WALLET__DEFAULT_AGE=6` or
//! `ECONOMY__ORCHESTRATOR__MAX_ATTEMPTS=5`.
use std::collections::BTreeMap;

use chrono::{FixedOffset, Offset, Utc};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::TransactionCategory;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WalletSettings {
    /// Age assumed for children whose account was never opened.
    pub default_age: u8,
    /// Offset of the caller's local day boundary from UTC, in minutes.
    pub utc_offset_minutes: i32,
    /// Spending multipliers in percent, keyed by spending category.
    pub discount_percent: BTreeMap<String, u32>,
}

impl Default for WalletSettings {
    fn default() -> Self {
        let discount_percent = [
            (TransactionCategory::Entertainment, 100),
            (TransactionCategory::EducationalGames, 80),
            (TransactionCategory::CreativeApps, 70),
            (TransactionCategory::PhysicalActivity, 50),
            (TransactionCategory::Customization, 100),
            (TransactionCategory::LearningEnhancement, 100),
            (TransactionCategory::AppAccess, 90),
        ]
        .into_iter()
        .map(|(category, percent)| (category.as_str().to_string(), percent))
        .collect();

        Self {
            default_age: 8,
            utc_offset_minutes: 0,
            discount_percent,
        }
    }
}

impl WalletSettings {
    /// Multiplier for `category` in percent (100 when not listed).
    pub fn discount_for(&self, category: TransactionCategory) -> u32 {
        self.discount_percent
            .get(category.as_str())
            .copied()
            .unwrap_or(100)
    }

    pub fn local_offset(&self) -> FixedOffset {
        offset_from_minutes(self.utc_offset_minutes).unwrap_or_else(|| Utc.fix())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExperienceSettings {
    pub max_level: u32,
    /// Coins credited by the orchestrator for each level gained.
    pub level_up_bonus_coins: i64,
}

impl Default for ExperienceSettings {
    fn default() -> Self {
        Self {
            max_level: 50,
            level_up_bonus_coins: 50,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecommenderSettings {
    pub window_size: usize,
    pub target_success_rate: f64,
    pub tolerance: f64,
    pub default_difficulty: u8,
}

impl Default for RecommenderSettings {
    fn default() -> Self {
        Self {
            window_size: 10,
            target_success_rate: 0.8,
            tolerance: 0.1,
            default_difficulty: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// Attempts per sub-step, first try included.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled on every further retry.
    pub backoff_ms: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 25,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomySettings {
    pub wallet: WalletSettings,
    pub experience: ExperienceSettings,
    pub recommender: RecommenderSettings,
    pub orchestrator: OrchestratorSettings,
}

impl EconomySettings {
    /// Layer the defaults, an optional file at `path` (any format the
    /// `config` crate understands) and the environment.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        let settings: Self = builder
            .add_source(Environment::with_prefix("ECONOMY").separator("__"))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.experience.max_level < 1 {
            return Err(ConfigError::Message(
                "experience.max_level must be >= 1".to_string(),
            ));
        }
        if self.experience.level_up_bonus_coins < 0 {
            return Err(ConfigError::Message(
                "experience.level_up_bonus_coins must be >= 0".to_string(),
            ));
        }
        if self.recommender.window_size == 0 {
            return Err(ConfigError::Message(
                "recommender.window_size must be > 0".to_string(),
            ));
        }
        if !(1..=5).contains(&self.recommender.default_difficulty) {
            return Err(ConfigError::Message(
                "recommender.default_difficulty must be within 1..=5".to_string(),
            ));
        }
        let rate = &self.recommender;
        if !(0.0..=1.0).contains(&rate.target_success_rate) || !(0.0..=1.0).contains(&rate.tolerance)
        {
            return Err(ConfigError::Message(
                "recommender rates must be within 0.0..=1.0".to_string(),
            ));
        }
        if self.orchestrator.max_attempts == 0 {
            return Err(ConfigError::Message(
                "orchestrator.max_attempts must be >= 1".to_string(),
            ));
        }
        for (category, percent) in &self.wallet.discount_percent {
            let known = TransactionCategory::try_from(category.as_str())
                .is_ok_and(TransactionCategory::is_spending);
            if !known {
                return Err(ConfigError::Message(format!(
                    "wallet.discount_percent: {category} is not a spending category"
                )));
            }
            if !(1..=100).contains(percent) {
                return Err(ConfigError::Message(format!(
                    "wallet.discount_percent.{category} must be within 1..=100"
                )));
            }
        }
        if offset_from_minutes(self.wallet.utc_offset_minutes).is_none() {
            return Err(ConfigError::Message(
                "wallet.utc_offset_minutes is out of range".to_string(),
            ));
        }
        Ok(())
    }
}

fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    minutes.checked_mul(60).and_then(FixedOffset::east_opt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = EconomySettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.experience.max_level, 50);
        assert_eq!(settings.recommender.window_size, 10);
    }

    #[test]
    fn discount_table_defaults_to_full_price() {
        let wallet = WalletSettings::default();
        assert_eq!(wallet.discount_for(TransactionCategory::PhysicalActivity), 50);
        assert_eq!(wallet.discount_for(TransactionCategory::AppAccess), 90);

        let empty = WalletSettings {
            discount_percent: BTreeMap::new(),
            ..WalletSettings::default()
        };
        assert_eq!(empty.discount_for(TransactionCategory::CreativeApps), 100);
    }

    #[test]
    fn rejects_empty_window() {
        let mut settings = EconomySettings::default();
        settings.recommender.window_size = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_offset() {
        let mut settings = EconomySettings::default();
        settings.wallet.utc_offset_minutes = 24 * 60;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_bad_discounts() {
        let mut settings = EconomySettings::default();
        settings
            .wallet
            .discount_percent
            .insert("entertainment".to_string(), 0);
        assert!(settings.validate().is_err());

        let mut settings = EconomySettings::default();
        settings
            .wallet
            .discount_percent
            .insert("task_completion".to_string(), 50);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn load_without_file_returns_defaults() {
        let settings = EconomySettings::load(None).unwrap();
        assert_eq!(settings.orchestrator, OrchestratorSettings::default());
    }
}
