//! Command structs for orchestrator operations.
//!
//! They group the parameters of a write so call sites stay readable.

use uuid::Uuid;

use crate::{TransactionCategory, XpSource};

/// A finished task to reward.
#[derive(Clone, Debug)]
pub struct TaskCompletion {
    pub child_id: String,
    pub subject: String,
    pub difficulty: u8,
    pub success: bool,
    pub grade: u8,
    /// Idempotency key of the whole completion; generated when absent.
    pub task_id: Option<Uuid>,
    pub time_spent_secs: u32,
    pub hints_used: u32,
    pub attempts_to_solve: u32,
}

impl TaskCompletion {
    #[must_use]
    pub fn new(
        child_id: impl Into<String>,
        subject: impl Into<String>,
        difficulty: u8,
        success: bool,
        grade: u8,
    ) -> Self {
        Self {
            child_id: child_id.into(),
            subject: subject.into(),
            difficulty,
            success,
            grade,
            task_id: None,
            time_spent_secs: 0,
            hints_used: 0,
            attempts_to_solve: 1,
        }
    }

    #[must_use]
    pub fn task_id(mut self, id: Uuid) -> Self {
        self.task_id = Some(id);
        self
    }

    #[must_use]
    pub fn time_spent_secs(mut self, secs: u32) -> Self {
        self.time_spent_secs = secs;
        self
    }

    #[must_use]
    pub fn hints_used(mut self, hints: u32) -> Self {
        self.hints_used = hints;
        self
    }

    #[must_use]
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts_to_solve = attempts;
        self
    }
}

/// Coins earned outside of task completion (games, logins, streaks).
#[derive(Clone, Debug)]
pub struct CoinAward {
    pub child_id: String,
    pub amount: i64,
    pub category: TransactionCategory,
    pub description: String,
    pub tx_id: Option<Uuid>,
}

impl CoinAward {
    #[must_use]
    pub fn new(child_id: impl Into<String>, amount: i64, category: TransactionCategory) -> Self {
        Self {
            child_id: child_id.into(),
            amount,
            category,
            description: category.as_str().replace('_', " "),
            tx_id: None,
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn tx_id(mut self, id: Uuid) -> Self {
        self.tx_id = Some(id);
        self
    }
}

/// XP earned outside of task completion.
#[derive(Clone, Debug)]
pub struct XpAward {
    pub child_id: String,
    pub amount: i64,
    pub source: XpSource,
    pub xp_tx_id: Option<Uuid>,
}

impl XpAward {
    /// Award the base amount of `source`.
    #[must_use]
    pub fn new(child_id: impl Into<String>, source: XpSource) -> Self {
        Self {
            child_id: child_id.into(),
            amount: source.base_xp(),
            source,
            xp_tx_id: None,
        }
    }

    #[must_use]
    pub fn amount(mut self, amount: i64) -> Self {
        self.amount = amount;
        self
    }

    #[must_use]
    pub fn xp_tx_id(mut self, id: Uuid) -> Self {
        self.xp_tx_id = Some(id);
        self
    }
}

/// Coins to spend on a reward.
#[derive(Clone, Debug)]
pub struct SpendCmd {
    pub child_id: String,
    pub amount: i64,
    pub category: TransactionCategory,
    pub tx_id: Option<Uuid>,
}

impl SpendCmd {
    #[must_use]
    pub fn new(child_id: impl Into<String>, amount: i64, category: TransactionCategory) -> Self {
        Self {
            child_id: child_id.into(),
            amount,
            category,
            tx_id: None,
        }
    }

    #[must_use]
    pub fn tx_id(mut self, id: Uuid) -> Self {
        self.tx_id = Some(id);
        self
    }
}
