//! Persistence boundary.
//!
//! Services only talk to an [`EconomyStore`]. Methods documented as atomic
//! must either apply every write or none of them.

use std::fmt::Debug;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    Badge, BadgeProgress, Balance, Experience, ResultEconomy, TaskResult, Transaction,
    XpTransaction,
};

mod sql;

pub use sql::{SqlStore, SqlStoreBuilder};

/// One page of a child's ledger, ordered by `(timestamp, id)` ascending.
///
/// `from_ms` is inclusive and `to_ms` exclusive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerPageQuery {
    pub child_id: String,
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
    /// Keyset cursor: the `(timestamp_ms, id)` of the last row already seen.
    pub after: Option<(i64, Uuid)>,
    pub limit: u64,
}

#[async_trait]
pub trait EconomyStore: Send + Sync + Debug {
    async fn load_balance(&self, child_id: &str) -> ResultEconomy<Option<Balance>>;

    /// Insert or replace the cached balance row.
    async fn save_balance(&self, balance: &Balance) -> ResultEconomy<()>;

    async fn find_transaction(&self, id: Uuid) -> ResultEconomy<Option<Transaction>>;

    /// Append a ledger row. `DuplicateTransaction` when the id exists.
    async fn insert_transaction(&self, tx: &Transaction) -> ResultEconomy<()>;

    /// Append a ledger row and store the balance it produced. Atomic.
    /// `DuplicateTransaction` when the id exists.
    async fn commit_wallet_change(&self, tx: &Transaction, balance: &Balance)
    -> ResultEconomy<()>;

    async fn sum_transactions(&self, child_id: &str) -> ResultEconomy<i64>;

    async fn transactions_page(&self, query: &LedgerPageQuery)
    -> ResultEconomy<Vec<Transaction>>;

    async fn load_experience(
        &self,
        child_id: &str,
        max_level: u32,
    ) -> ResultEconomy<Option<Experience>>;

    async fn xp_transaction_exists(&self, id: Uuid) -> ResultEconomy<bool>;

    /// Append an XP row and store the experience it produced. Atomic.
    /// `DuplicateTransaction` when the id exists.
    async fn commit_xp(&self, xp_tx: &XpTransaction, experience: &Experience)
    -> ResultEconomy<()>;

    /// Newest first.
    async fn xp_history(&self, child_id: &str, limit: u64) -> ResultEconomy<Vec<XpTransaction>>;

    async fn load_badges(&self, child_id: &str) -> ResultEconomy<Vec<Badge>>;

    async fn has_badge(&self, child_id: &str, definition_id: &str) -> ResultEconomy<bool>;

    async fn load_badge_progress(
        &self,
        child_id: &str,
        badge_id: &str,
    ) -> ResultEconomy<Option<BadgeProgress>>;

    async fn all_badge_progress(&self, child_id: &str) -> ResultEconomy<Vec<BadgeProgress>>;

    async fn badge_event_exists(&self, id: Uuid) -> ResultEconomy<bool>;

    /// Store the progress row and record `event_id` when given. Atomic.
    /// `DuplicateTransaction` when the event was recorded before.
    async fn save_badge_progress(
        &self,
        progress: &BadgeProgress,
        event_id: Option<Uuid>,
    ) -> ResultEconomy<()>;

    /// Insert the badge, delete its progress row and record `event_id` when
    /// given. Atomic. `AlreadyEarned` when the child holds the badge,
    /// `DuplicateTransaction` when the event was recorded before.
    async fn mint_badge(&self, badge: &Badge, event_id: Option<Uuid>) -> ResultEconomy<()>;

    async fn task_result_exists(&self, id: Uuid) -> ResultEconomy<bool>;

    /// `DuplicateTransaction` when the id exists.
    async fn insert_task_result(&self, result: &TaskResult) -> ResultEconomy<()>;

    /// The newest `limit` results, returned oldest first. `subject` filters
    /// when present.
    async fn recent_task_results(
        &self,
        child_id: &str,
        subject: Option<&str>,
        limit: u64,
    ) -> ResultEconomy<Vec<TaskResult>>;
}
