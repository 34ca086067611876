//! Completed task outcomes, the input of the difficulty recommender.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EconomyError, ResultEconomy,
    util::{from_millis, parse_uuid, to_millis},
};

pub const MIN_DIFFICULTY: u8 = 1;
pub const MAX_DIFFICULTY: u8 = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: Uuid,
    pub child_id: String,
    pub subject: String,
    pub difficulty: u8,
    pub success: bool,
    /// 0 to 100.
    pub grade: u8,
    pub time_spent_secs: u32,
    pub hints_used: u32,
    pub attempts_to_solve: u32,
    pub timestamp: DateTime<Utc>,
}

impl TaskResult {
    /// Reject out-of-range difficulty and grade values.
    pub fn validate(&self) -> ResultEconomy<()> {
        if !(MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&self.difficulty) {
            return Err(EconomyError::Validation(format!(
                "difficulty must be in {MIN_DIFFICULTY}..={MAX_DIFFICULTY}, got {}",
                self.difficulty
            )));
        }
        if self.grade > 100 {
            return Err(EconomyError::Validation(format!(
                "grade must be in 0..=100, got {}",
                self.grade
            )));
        }
        if self.subject.trim().is_empty() {
            return Err(EconomyError::Validation(
                "subject must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "task_results")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub child_id: String,
    pub subject: String,
    pub difficulty: i32,
    pub success: bool,
    pub grade: i32,
    pub time_spent_secs: i64,
    pub hints_used: i64,
    pub attempts_to_solve: i64,
    pub timestamp_ms: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&TaskResult> for ActiveModel {
    fn from(value: &TaskResult) -> Self {
        Self {
            id: ActiveValue::Set(value.id.to_string()),
            child_id: ActiveValue::Set(value.child_id.clone()),
            subject: ActiveValue::Set(value.subject.clone()),
            difficulty: ActiveValue::Set(i32::from(value.difficulty)),
            success: ActiveValue::Set(value.success),
            grade: ActiveValue::Set(i32::from(value.grade)),
            time_spent_secs: ActiveValue::Set(i64::from(value.time_spent_secs)),
            hints_used: ActiveValue::Set(i64::from(value.hints_used)),
            attempts_to_solve: ActiveValue::Set(i64::from(value.attempts_to_solve)),
            timestamp_ms: ActiveValue::Set(to_millis(value.timestamp)),
        }
    }
}

impl TryFrom<Model> for TaskResult {
    type Error = EconomyError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let invalid = |label: &str| EconomyError::Validation(format!("invalid stored {label}"));
        Ok(Self {
            id: parse_uuid(&model.id, "task result")?,
            child_id: model.child_id,
            subject: model.subject,
            difficulty: u8::try_from(model.difficulty).map_err(|_| invalid("difficulty"))?,
            success: model.success,
            grade: u8::try_from(model.grade).map_err(|_| invalid("grade"))?,
            time_spent_secs: u32::try_from(model.time_spent_secs)
                .map_err(|_| invalid("time spent"))?,
            hints_used: u32::try_from(model.hints_used).map_err(|_| invalid("hints used"))?,
            attempts_to_solve: u32::try_from(model.attempts_to_solve)
                .map_err(|_| invalid("attempts"))?,
            timestamp: from_millis(model.timestamp_ms, "task result")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TaskResult {
        TaskResult {
            id: Uuid::new_v4(),
            child_id: "ada".to_string(),
            subject: "math".to_string(),
            difficulty: 3,
            success: true,
            grade: 85,
            time_spent_secs: 120,
            hints_used: 0,
            attempts_to_solve: 1,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn difficulty_outside_range_is_rejected() {
        let mut result = sample();
        result.difficulty = 0;
        assert!(result.validate().is_err());
        result.difficulty = 6;
        assert!(result.validate().is_err());
        result.difficulty = 5;
        assert!(result.validate().is_ok());
    }

    #[test]
    fn grade_above_hundred_is_rejected() {
        let mut result = sample();
        result.grade = 101;
        assert!(matches!(
            result.validate(),
            Err(EconomyError::Validation(_))
        ));
    }
}
