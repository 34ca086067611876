//! The module contains the cached `Balance` of a child and the daily cap
//! rules.

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::{
    EconomyError, ResultEconomy,
    clock::local_day,
    util::{from_millis, to_millis},
};

/// Daily cap for children aged 5 or less (30 minutes).
pub const DAILY_CAP_3_TO_5: i64 = 1800;
/// Daily cap for children aged 6 to 8 (45 minutes).
pub const DAILY_CAP_6_TO_8: i64 = 2700;
/// Daily cap for children aged 9 or more (60 minutes).
pub const DAILY_CAP_9_TO_12: i64 = 3600;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgeGroup {
    #[serde(rename = "3-5")]
    ThreeToFive,
    #[serde(rename = "6-8")]
    SixToEight,
    #[serde(rename = "9-12")]
    NineToTwelve,
}

impl AgeGroup {
    pub fn for_age(age: u8) -> Self {
        match age {
            0..=5 => Self::ThreeToFive,
            6..=8 => Self::SixToEight,
            _ => Self::NineToTwelve,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ThreeToFive => "3-5",
            Self::SixToEight => "6-8",
            Self::NineToTwelve => "9-12",
        }
    }

    pub fn daily_cap(self) -> i64 {
        match self {
            Self::ThreeToFive => DAILY_CAP_3_TO_5,
            Self::SixToEight => DAILY_CAP_6_TO_8,
            Self::NineToTwelve => DAILY_CAP_9_TO_12,
        }
    }
}

impl TryFrom<&str> for AgeGroup {
    type Error = EconomyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "3-5" => Ok(Self::ThreeToFive),
            "6-8" => Ok(Self::SixToEight),
            "9-12" => Ok(Self::NineToTwelve),
            other => Err(EconomyError::Validation(format!(
                "invalid age group: {other}"
            ))),
        }
    }
}

/// Maximum coins (seconds of screen time) a child of `age` may earn per day.
pub fn cap_for_age(age: u8) -> i64 {
    AgeGroup::for_age(age).daily_cap()
}

/// Cached wallet state of a child.
///
/// `balance` always equals the sum of the child's ledger; the daily
/// counters belong to the local day of `last_updated`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub child_id: String,
    pub balance: i64,
    pub daily_cap: i64,
    pub today_earned: i64,
    pub today_spent: i64,
    pub age_group: AgeGroup,
    pub last_updated: DateTime<Utc>,
}

impl Balance {
    /// An empty wallet for a child of `age`.
    pub fn new(child_id: impl Into<String>, age: u8, now: DateTime<Utc>) -> Self {
        let age_group = AgeGroup::for_age(age);
        Self {
            child_id: child_id.into(),
            balance: 0,
            daily_cap: age_group.daily_cap(),
            today_earned: 0,
            today_spent: 0,
            age_group,
            last_updated: now,
        }
    }

    /// Zero the daily counters when `now` falls on a later local day than
    /// the last update. Returns `true` when a rollover happened.
    pub fn roll_over(&mut self, now: DateTime<Utc>, offset: FixedOffset) -> bool {
        if local_day(self.last_updated, offset) == local_day(now, offset) {
            return false;
        }
        self.today_earned = 0;
        self.today_spent = 0;
        self.last_updated = now;
        true
    }

    /// Coins still earnable today.
    pub fn remaining_today(&self) -> i64 {
        (self.daily_cap - self.today_earned).max(0)
    }

    pub(crate) fn apply_credit(&mut self, amount: i64, now: DateTime<Utc>) {
        self.balance += amount;
        self.today_earned += amount;
        self.last_updated = now;
    }

    pub(crate) fn apply_debit(&mut self, cost: i64, now: DateTime<Utc>) -> ResultEconomy<()> {
        if cost > self.balance {
            return Err(EconomyError::InsufficientBalance {
                required: cost,
                available: self.balance,
            });
        }
        self.balance -= cost;
        self.today_spent += cost;
        self.last_updated = now;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "balances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub child_id: String,
    pub balance: i64,
    pub daily_cap: i64,
    pub today_earned: i64,
    pub today_spent: i64,
    pub age_group: String,
    pub last_updated_ms: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Balance> for ActiveModel {
    fn from(value: &Balance) -> Self {
        Self {
            child_id: ActiveValue::Set(value.child_id.clone()),
            balance: ActiveValue::Set(value.balance),
            daily_cap: ActiveValue::Set(value.daily_cap),
            today_earned: ActiveValue::Set(value.today_earned),
            today_spent: ActiveValue::Set(value.today_spent),
            age_group: ActiveValue::Set(value.age_group.as_str().to_string()),
            last_updated_ms: ActiveValue::Set(to_millis(value.last_updated)),
        }
    }
}

impl TryFrom<Model> for Balance {
    type Error = EconomyError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            child_id: model.child_id,
            balance: model.balance,
            daily_cap: model.daily_cap,
            today_earned: model.today_earned,
            today_spent: model.today_spent,
            age_group: AgeGroup::try_from(model.age_group.as_str())?,
            last_updated: from_millis(model.last_updated_ms, "balance")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn cap_for_age_brackets() {
        assert_eq!(cap_for_age(3), 1800);
        assert_eq!(cap_for_age(5), 1800);
        assert_eq!(cap_for_age(6), 2700);
        assert_eq!(cap_for_age(8), 2700);
        assert_eq!(cap_for_age(9), 3600);
        assert_eq!(cap_for_age(12), 3600);
    }

    #[test]
    fn roll_over_resets_counters_on_new_day() {
        let morning = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        let mut balance = Balance::new("ada", 7, morning);
        balance.apply_credit(300, morning);
        balance.apply_debit(100, morning).unwrap();

        assert!(!balance.roll_over(morning + Duration::hours(3), utc()));
        assert_eq!(balance.today_earned, 300);

        assert!(balance.roll_over(morning + Duration::days(1), utc()));
        assert_eq!(balance.today_earned, 0);
        assert_eq!(balance.today_spent, 0);
        assert_eq!(balance.balance, 200);
    }

    #[test]
    fn debit_never_goes_negative() {
        let now = Utc::now();
        let mut balance = Balance::new("ada", 10, now);
        balance.apply_credit(50, now);

        let err = balance.apply_debit(51, now).unwrap_err();
        assert_eq!(
            err,
            EconomyError::InsufficientBalance {
                required: 51,
                available: 50
            }
        );
        assert_eq!(balance.balance, 50);
    }
}
