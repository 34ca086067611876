use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, Condition, ConnectionTrait, DatabaseConnection, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
    prelude::*,
    sea_query::{Expr, OnConflict},
};
use uuid::Uuid;

use crate::{
    Badge, BadgeProgress, Balance, EconomyError, Experience, ResultEconomy, TaskResult,
    Transaction, XpTransaction, badge_progress, badges, balances, experience, task_results,
    transactions, xp_transactions,
};

use super::{EconomyStore, LedgerPageQuery};

/// Run a block inside a DB transaction, committing on success and rolling
/// back (on drop) on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

/// [`EconomyStore`] over a sea-orm connection.
///
/// Expects the schema created by the `migration` crate.
#[derive(Debug, Clone)]
pub struct SqlStore {
    database: DatabaseConnection,
}

impl SqlStore {
    /// Return a builder for `SqlStore`.
    pub fn builder() -> SqlStoreBuilder {
        SqlStoreBuilder::default()
    }

    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }

    pub fn database(&self) -> &DatabaseConnection {
        &self.database
    }
}

/// The builder for `SqlStore`
#[derive(Default)]
pub struct SqlStoreBuilder {
    database: DatabaseConnection,
}

impl SqlStoreBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> SqlStoreBuilder {
        self.database = db;
        self
    }

    /// Construct `SqlStore`
    pub fn build(self) -> SqlStore {
        SqlStore {
            database: self.database,
        }
    }
}

async fn upsert_balance<C: ConnectionTrait>(db: &C, balance: &Balance) -> ResultEconomy<()> {
    balances::Entity::insert(balances::ActiveModel::from(balance))
        .on_conflict(
            OnConflict::column(balances::Column::ChildId)
                .update_columns([
                    balances::Column::Balance,
                    balances::Column::DailyCap,
                    balances::Column::TodayEarned,
                    balances::Column::TodaySpent,
                    balances::Column::AgeGroup,
                    balances::Column::LastUpdatedMs,
                ])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

async fn upsert_experience<C: ConnectionTrait>(db: &C, exp: &Experience) -> ResultEconomy<()> {
    experience::Entity::insert(experience::ActiveModel::from(exp))
        .on_conflict(
            OnConflict::column(experience::Column::ChildId)
                .update_columns([
                    experience::Column::Level,
                    experience::Column::CurrentXp,
                    experience::Column::TotalXpEarned,
                    experience::Column::LastUpdatedMs,
                ])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

async fn transaction_row_exists<C: ConnectionTrait>(db: &C, id: Uuid) -> ResultEconomy<bool> {
    Ok(transactions::Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .is_some())
}

/// Insert a ledger row; a concurrent insert of the same id surfaces as a
/// duplicate rather than a storage failure.
async fn append_transaction<C: ConnectionTrait>(db: &C, tx: &Transaction) -> ResultEconomy<()> {
    if transaction_row_exists(db, tx.id).await? {
        return Err(EconomyError::DuplicateTransaction(tx.id));
    }
    if let Err(err) = transactions::ActiveModel::try_from(tx)?.insert(db).await {
        if transaction_row_exists(db, tx.id).await? {
            return Err(EconomyError::DuplicateTransaction(tx.id));
        }
        return Err(err.into());
    }
    Ok(())
}

async fn badge_event_row_exists<C: ConnectionTrait>(db: &C, id: Uuid) -> ResultEconomy<bool> {
    Ok(badge_progress::events::Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .is_some())
}

async fn record_badge_event<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    child_id: &str,
    badge_id: &str,
    at: DateTime<Utc>,
) -> ResultEconomy<()> {
    if badge_event_row_exists(db, id).await? {
        return Err(EconomyError::DuplicateTransaction(id));
    }
    badge_progress::events::ActiveModel::record(id, child_id, badge_id, at)
        .insert(db)
        .await?;
    Ok(())
}

#[async_trait]
impl EconomyStore for SqlStore {
    async fn load_balance(&self, child_id: &str) -> ResultEconomy<Option<Balance>> {
        balances::Entity::find_by_id(child_id.to_string())
            .one(&self.database)
            .await?
            .map(Balance::try_from)
            .transpose()
    }

    async fn save_balance(&self, balance: &Balance) -> ResultEconomy<()> {
        upsert_balance(&self.database, balance).await
    }

    async fn find_transaction(&self, id: Uuid) -> ResultEconomy<Option<Transaction>> {
        transactions::Entity::find_by_id(id.to_string())
            .one(&self.database)
            .await?
            .map(Transaction::try_from)
            .transpose()
    }

    async fn insert_transaction(&self, tx: &Transaction) -> ResultEconomy<()> {
        with_tx!(self, |db_tx| append_transaction(&db_tx, tx).await)
    }

    async fn commit_wallet_change(
        &self,
        tx: &Transaction,
        balance: &Balance,
    ) -> ResultEconomy<()> {
        with_tx!(self, |db_tx| {
            append_transaction(&db_tx, tx).await?;
            upsert_balance(&db_tx, balance).await
        })
    }

    async fn sum_transactions(&self, child_id: &str) -> ResultEconomy<i64> {
        let total: Option<Option<i64>> = transactions::Entity::find()
            .select_only()
            .column_as(Expr::col(transactions::Column::Amount).sum(), "total")
            .filter(transactions::Column::ChildId.eq(child_id.to_string()))
            .into_tuple()
            .one(&self.database)
            .await?;
        Ok(total.flatten().unwrap_or(0))
    }

    async fn transactions_page(
        &self,
        query: &LedgerPageQuery,
    ) -> ResultEconomy<Vec<Transaction>> {
        let mut select = transactions::Entity::find()
            .filter(transactions::Column::ChildId.eq(query.child_id.clone()))
            .order_by_asc(transactions::Column::TimestampMs)
            .order_by_asc(transactions::Column::Id)
            .limit(query.limit);

        if let Some(from) = query.from_ms {
            select = select.filter(transactions::Column::TimestampMs.gte(from));
        }
        if let Some(to) = query.to_ms {
            select = select.filter(transactions::Column::TimestampMs.lt(to));
        }
        if let Some((timestamp_ms, id)) = query.after {
            select = select.filter(
                Condition::any()
                    .add(transactions::Column::TimestampMs.gt(timestamp_ms))
                    .add(
                        Condition::all()
                            .add(transactions::Column::TimestampMs.eq(timestamp_ms))
                            .add(transactions::Column::Id.gt(id.to_string())),
                    ),
            );
        }

        select
            .all(&self.database)
            .await?
            .into_iter()
            .map(Transaction::try_from)
            .collect()
    }

    async fn load_experience(
        &self,
        child_id: &str,
        max_level: u32,
    ) -> ResultEconomy<Option<Experience>> {
        experience::Entity::find_by_id(child_id.to_string())
            .one(&self.database)
            .await?
            .map(|model| model.into_experience(max_level))
            .transpose()
    }

    async fn xp_transaction_exists(&self, id: Uuid) -> ResultEconomy<bool> {
        Ok(xp_transactions::Entity::find_by_id(id.to_string())
            .one(&self.database)
            .await?
            .is_some())
    }

    async fn commit_xp(
        &self,
        xp_tx: &XpTransaction,
        experience: &Experience,
    ) -> ResultEconomy<()> {
        with_tx!(self, |db_tx| {
            let exists = xp_transactions::Entity::find_by_id(xp_tx.id.to_string())
                .one(&db_tx)
                .await?
                .is_some();
            if exists {
                return Err(EconomyError::DuplicateTransaction(xp_tx.id));
            }
            xp_transactions::ActiveModel::from(xp_tx)
                .insert(&db_tx)
                .await?;
            upsert_experience(&db_tx, experience).await
        })
    }

    async fn xp_history(&self, child_id: &str, limit: u64) -> ResultEconomy<Vec<XpTransaction>> {
        xp_transactions::Entity::find()
            .filter(xp_transactions::Column::ChildId.eq(child_id.to_string()))
            .order_by_desc(xp_transactions::Column::TimestampMs)
            .order_by_desc(xp_transactions::Column::Id)
            .limit(limit)
            .all(&self.database)
            .await?
            .into_iter()
            .map(XpTransaction::try_from)
            .collect()
    }

    async fn load_badges(&self, child_id: &str) -> ResultEconomy<Vec<Badge>> {
        badges::Entity::find()
            .filter(badges::Column::ChildId.eq(child_id.to_string()))
            .order_by_asc(badges::Column::EarnedAtMs)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Badge::try_from)
            .collect()
    }

    async fn has_badge(&self, child_id: &str, definition_id: &str) -> ResultEconomy<bool> {
        Ok(
            badges::Entity::find_by_id((child_id.to_string(), definition_id.to_string()))
                .one(&self.database)
                .await?
                .is_some(),
        )
    }

    async fn load_badge_progress(
        &self,
        child_id: &str,
        badge_id: &str,
    ) -> ResultEconomy<Option<BadgeProgress>> {
        badge_progress::Entity::find_by_id((child_id.to_string(), badge_id.to_string()))
            .one(&self.database)
            .await?
            .map(BadgeProgress::try_from)
            .transpose()
    }

    async fn all_badge_progress(&self, child_id: &str) -> ResultEconomy<Vec<BadgeProgress>> {
        badge_progress::Entity::find()
            .filter(badge_progress::Column::ChildId.eq(child_id.to_string()))
            .order_by_asc(badge_progress::Column::BadgeId)
            .all(&self.database)
            .await?
            .into_iter()
            .map(BadgeProgress::try_from)
            .collect()
    }

    async fn badge_event_exists(&self, id: Uuid) -> ResultEconomy<bool> {
        badge_event_row_exists(&self.database, id).await
    }

    async fn save_badge_progress(
        &self,
        progress: &BadgeProgress,
        event_id: Option<Uuid>,
    ) -> ResultEconomy<()> {
        with_tx!(self, |db_tx| {
            if let Some(id) = event_id {
                record_badge_event(
                    &db_tx,
                    id,
                    &progress.child_id,
                    &progress.badge_id,
                    progress.last_updated,
                )
                .await?;
            }
            badge_progress::Entity::insert(badge_progress::ActiveModel::from(progress))
                .on_conflict(
                    OnConflict::columns([
                        badge_progress::Column::ChildId,
                        badge_progress::Column::BadgeId,
                    ])
                    .update_columns([
                        badge_progress::Column::CurrentProgress,
                        badge_progress::Column::TargetProgress,
                        badge_progress::Column::LastUpdatedMs,
                    ])
                    .to_owned(),
                )
                .exec_without_returning(&db_tx)
                .await?;
            Ok(())
        })
    }

    async fn mint_badge(&self, badge: &Badge, event_id: Option<Uuid>) -> ResultEconomy<()> {
        with_tx!(self, |db_tx| {
            let key = (badge.child_id.clone(), badge.definition_id.clone());
            if badges::Entity::find_by_id(key.clone())
                .one(&db_tx)
                .await?
                .is_some()
            {
                return Err(EconomyError::AlreadyEarned(badge.definition_id.clone()));
            }
            if let Some(id) = event_id {
                record_badge_event(
                    &db_tx,
                    id,
                    &badge.child_id,
                    &badge.definition_id,
                    badge.earned_at,
                )
                .await?;
            }
            badges::ActiveModel::try_from(badge)?.insert(&db_tx).await?;
            badge_progress::Entity::delete_by_id(key)
                .exec(&db_tx)
                .await?;
            Ok(())
        })
    }

    async fn task_result_exists(&self, id: Uuid) -> ResultEconomy<bool> {
        Ok(task_results::Entity::find_by_id(id.to_string())
            .one(&self.database)
            .await?
            .is_some())
    }

    async fn insert_task_result(&self, result: &TaskResult) -> ResultEconomy<()> {
        with_tx!(self, |db_tx| {
            let exists = task_results::Entity::find_by_id(result.id.to_string())
                .one(&db_tx)
                .await?
                .is_some();
            if exists {
                return Err(EconomyError::DuplicateTransaction(result.id));
            }
            task_results::ActiveModel::from(result)
                .insert(&db_tx)
                .await?;
            Ok(())
        })
    }

    async fn recent_task_results(
        &self,
        child_id: &str,
        subject: Option<&str>,
        limit: u64,
    ) -> ResultEconomy<Vec<TaskResult>> {
        let mut select = task_results::Entity::find()
            .filter(task_results::Column::ChildId.eq(child_id.to_string()))
            .order_by_desc(task_results::Column::TimestampMs)
            .order_by_desc(task_results::Column::Id)
            .limit(limit);
        if let Some(subject) = subject {
            select = select.filter(task_results::Column::Subject.eq(subject.to_string()));
        }

        let mut results = select
            .all(&self.database)
            .await?
            .into_iter()
            .map(TaskResult::try_from)
            .collect::<ResultEconomy<Vec<_>>>()?;
        results.reverse();
        Ok(results)
    }
}
