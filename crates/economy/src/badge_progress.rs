//! Progress counters toward multi-step badges.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::{
    EconomyError,
    util::{from_millis, to_millis},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeProgress {
    pub badge_id: String,
    pub child_id: String,
    pub current_progress: u32,
    pub target_progress: u32,
    pub last_updated: DateTime<Utc>,
}

impl BadgeProgress {
    pub fn new(
        child_id: impl Into<String>,
        badge_id: impl Into<String>,
        target_progress: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            badge_id: badge_id.into(),
            child_id: child_id.into(),
            current_progress: 0,
            target_progress,
            last_updated: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.current_progress >= self.target_progress
    }

    pub fn percentage(&self) -> f64 {
        if self.target_progress == 0 {
            return 100.0;
        }
        f64::from(self.current_progress) / f64::from(self.target_progress) * 100.0
    }

    /// Add `delta` steps, never past the target.
    pub fn advance(&mut self, delta: u32, now: DateTime<Utc>) {
        self.current_progress = self
            .current_progress
            .saturating_add(delta)
            .min(self.target_progress);
        self.last_updated = now;
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "badge_progress")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub child_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub badge_id: String,
    pub current_progress: i64,
    pub target_progress: i64,
    pub last_updated_ms: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&BadgeProgress> for ActiveModel {
    fn from(value: &BadgeProgress) -> Self {
        Self {
            child_id: ActiveValue::Set(value.child_id.clone()),
            badge_id: ActiveValue::Set(value.badge_id.clone()),
            current_progress: ActiveValue::Set(i64::from(value.current_progress)),
            target_progress: ActiveValue::Set(i64::from(value.target_progress)),
            last_updated_ms: ActiveValue::Set(to_millis(value.last_updated)),
        }
    }
}

impl TryFrom<Model> for BadgeProgress {
    type Error = EconomyError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let counter = |value: i64, label: &str| {
            u32::try_from(value)
                .map_err(|_| EconomyError::Validation(format!("invalid {label}: {value}")))
        };
        Ok(Self {
            current_progress: counter(model.current_progress, "badge progress")?,
            target_progress: counter(model.target_progress, "badge target")?,
            badge_id: model.badge_id,
            child_id: model.child_id,
            last_updated: from_millis(model.last_updated_ms, "badge progress")?,
        })
    }
}

/// Applied progress increments, keyed by the caller's event id.
pub mod events {
    use chrono::{DateTime, Utc};
    use sea_orm::{ActiveValue, entity::prelude::*};
    use uuid::Uuid;

    use crate::util::to_millis;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "badge_progress_events")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub child_id: String,
        pub badge_id: String,
        pub recorded_at_ms: i64,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl ActiveModel {
        pub fn record(id: Uuid, child_id: &str, badge_id: &str, at: DateTime<Utc>) -> Self {
            Self {
                id: ActiveValue::Set(id.to_string()),
                child_id: ActiveValue::Set(child_id.to_string()),
                badge_id: ActiveValue::Set(badge_id.to_string()),
                recorded_at_ms: ActiveValue::Set(to_millis(at)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_clamps_at_target() {
        let now = Utc::now();
        let mut progress = BadgeProgress::new("ada", "bookworm", 5, now);
        progress.advance(3, now);
        assert!(!progress.is_completed());
        progress.advance(10, now);
        assert_eq!(progress.current_progress, 5);
        assert!(progress.is_completed());
        assert_eq!(progress.percentage(), 100.0);
    }
}
