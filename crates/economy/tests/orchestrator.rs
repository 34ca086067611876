mod common;

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use async_trait::async_trait;
use sea_orm::DbErr;
use uuid::Uuid;

use common::{assert_consistent, database, economy_over, harness, start};
use economy::{
    Badge, BadgeProgress, Balance, CoinAward, EconomyError, EconomyStore, Experience,
    LedgerPageQuery, ManualClock, ResultEconomy, SpendCmd, SqlStore, TaskCompletion, TaskResult,
    Transaction, TransactionCategory, XpSource, XpTransaction,
};

/// Delegates to a real store and fails selected writes a set number of times.
#[derive(Debug)]
struct FlakyStore {
    inner: SqlStore,
    task_insert_failures: AtomicU32,
    wallet_commit_failures: AtomicU32,
    /// Commits that land and still report an error, as when the connection
    /// drops before the acknowledgement arrives.
    wallet_commit_ghosts: AtomicU32,
}

impl FlakyStore {
    fn new(inner: SqlStore) -> Self {
        Self {
            inner,
            task_insert_failures: AtomicU32::new(0),
            wallet_commit_failures: AtomicU32::new(0),
            wallet_commit_ghosts: AtomicU32::new(0),
        }
    }

    fn trip(counter: &AtomicU32, what: &str) -> ResultEconomy<()> {
        if counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(EconomyError::Storage(DbErr::Custom(format!(
                "{what}: database is locked"
            ))));
        }
        Ok(())
    }
}

#[async_trait]
impl EconomyStore for FlakyStore {
    async fn load_balance(&self, child_id: &str) -> ResultEconomy<Option<Balance>> {
        self.inner.load_balance(child_id).await
    }

    async fn save_balance(&self, balance: &Balance) -> ResultEconomy<()> {
        self.inner.save_balance(balance).await
    }

    async fn find_transaction(&self, id: Uuid) -> ResultEconomy<Option<Transaction>> {
        self.inner.find_transaction(id).await
    }

    async fn insert_transaction(&self, tx: &Transaction) -> ResultEconomy<()> {
        self.inner.insert_transaction(tx).await
    }

    async fn commit_wallet_change(
        &self,
        tx: &Transaction,
        balance: &Balance,
    ) -> ResultEconomy<()> {
        Self::trip(&self.wallet_commit_failures, "wallet commit")?;
        self.inner.commit_wallet_change(tx, balance).await?;
        Self::trip(&self.wallet_commit_ghosts, "wallet commit ack")
    }

    async fn sum_transactions(&self, child_id: &str) -> ResultEconomy<i64> {
        self.inner.sum_transactions(child_id).await
    }

    async fn transactions_page(
        &self,
        query: &LedgerPageQuery,
    ) -> ResultEconomy<Vec<Transaction>> {
        self.inner.transactions_page(query).await
    }

    async fn load_experience(
        &self,
        child_id: &str,
        max_level: u32,
    ) -> ResultEconomy<Option<Experience>> {
        self.inner.load_experience(child_id, max_level).await
    }

    async fn xp_transaction_exists(&self, id: Uuid) -> ResultEconomy<bool> {
        self.inner.xp_transaction_exists(id).await
    }

    async fn commit_xp(
        &self,
        xp_tx: &XpTransaction,
        experience: &Experience,
    ) -> ResultEconomy<()> {
        self.inner.commit_xp(xp_tx, experience).await
    }

    async fn xp_history(&self, child_id: &str, limit: u64) -> ResultEconomy<Vec<XpTransaction>> {
        self.inner.xp_history(child_id, limit).await
    }

    async fn load_badges(&self, child_id: &str) -> ResultEconomy<Vec<Badge>> {
        self.inner.load_badges(child_id).await
    }

    async fn has_badge(&self, child_id: &str, definition_id: &str) -> ResultEconomy<bool> {
        self.inner.has_badge(child_id, definition_id).await
    }

    async fn load_badge_progress(
        &self,
        child_id: &str,
        badge_id: &str,
    ) -> ResultEconomy<Option<BadgeProgress>> {
        self.inner.load_badge_progress(child_id, badge_id).await
    }

    async fn all_badge_progress(&self, child_id: &str) -> ResultEconomy<Vec<BadgeProgress>> {
        self.inner.all_badge_progress(child_id).await
    }

    async fn badge_event_exists(&self, id: Uuid) -> ResultEconomy<bool> {
        self.inner.badge_event_exists(id).await
    }

    async fn save_badge_progress(
        &self,
        progress: &BadgeProgress,
        event_id: Option<Uuid>,
    ) -> ResultEconomy<()> {
        self.inner.save_badge_progress(progress, event_id).await
    }

    async fn mint_badge(&self, badge: &Badge, event_id: Option<Uuid>) -> ResultEconomy<()> {
        self.inner.mint_badge(badge, event_id).await
    }

    async fn task_result_exists(&self, id: Uuid) -> ResultEconomy<bool> {
        self.inner.task_result_exists(id).await
    }

    async fn insert_task_result(&self, result: &TaskResult) -> ResultEconomy<()> {
        Self::trip(&self.task_insert_failures, "task insert")?;
        self.inner.insert_task_result(result).await
    }

    async fn recent_task_results(
        &self,
        child_id: &str,
        subject: Option<&str>,
        limit: u64,
    ) -> ResultEconomy<Vec<TaskResult>> {
        self.inner.recent_task_results(child_id, subject, limit).await
    }
}

async fn flaky() -> (Arc<FlakyStore>, economy::Economy) {
    let store = Arc::new(FlakyStore::new(SqlStore::new(database().await)));
    let clock = Arc::new(ManualClock::new(start()));
    let economy = economy_over(store.clone(), clock);
    (store, economy)
}

#[tokio::test]
async fn transient_storage_errors_are_retried() {
    let (store, economy) = flaky().await;
    store.task_insert_failures.store(2, Ordering::SeqCst);
    store.wallet_commit_failures.store(2, Ordering::SeqCst);

    let result = economy
        .complete_task(TaskCompletion::new("ada", "math", 2, true, 90))
        .await
        .unwrap();
    assert!(result.is_complete());
    assert_eq!(result.total_coins(), 20);

    let stats = economy.performance_stats("ada", "math").await.unwrap();
    assert_eq!(stats.tasks_completed, 1);
    assert_consistent(&economy, "ada").await;
}

#[tokio::test]
async fn later_step_failure_keeps_earlier_effects() {
    let (store, economy) = flaky().await;
    store.task_insert_failures.store(u32::MAX, Ordering::SeqCst);

    let task_id = Uuid::new_v4();
    let cmd = TaskCompletion::new("ada", "math", 2, true, 90).task_id(task_id);
    let result = economy.complete_task(cmd.clone()).await.unwrap();

    assert!(!result.is_complete());
    assert_eq!(result.failed_steps.len(), 1);
    assert_eq!(result.failed_steps[0].step, "record task");
    assert_eq!(result.total_coins(), 20);
    assert_eq!(result.xp_awarded, 15);
    assert_eq!(economy.balance("ada").await.unwrap().balance, 20);
    assert_eq!(
        economy.performance_stats("ada", "math").await.unwrap().tasks_completed,
        0
    );

    // Once storage recovers a retry records the task without paying twice.
    store.task_insert_failures.store(0, Ordering::SeqCst);
    let retry = economy.complete_task(cmd).await.unwrap();
    assert!(retry.is_complete());
    assert!(retry.coins.as_ref().is_some_and(|c| c.replayed));
    assert_eq!(retry.total_coins(), 0);
    assert_eq!(economy.balance("ada").await.unwrap().balance, 20);
    assert_eq!(economy.experience("ada").await.unwrap().total_xp_earned, 15);
    assert_eq!(
        economy.performance_stats("ada", "math").await.unwrap().tasks_completed,
        1
    );
    // Badge progress of the first attempt is not counted again.
    let progress = economy.badge_progress("ada").await.unwrap();
    for badge in ["math_whiz", "task_master"] {
        let current = progress
            .iter()
            .find(|p| p.badge_id == badge)
            .map(|p| p.current_progress);
        assert_eq!(current, Some(1), "{badge}");
    }
    assert_consistent(&economy, "ada").await;
}

#[tokio::test]
async fn primary_step_failure_fails_the_call() {
    let (store, economy) = flaky().await;
    store.wallet_commit_failures.store(u32::MAX, Ordering::SeqCst);

    let err = economy
        .complete_task(TaskCompletion::new("ada", "math", 2, true, 90))
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    assert_eq!(economy.balance("ada").await.unwrap().balance, 0);
    assert_eq!(economy.experience("ada").await.unwrap().total_xp_earned, 0);
    assert_eq!(
        economy.performance_stats("ada", "math").await.unwrap().tasks_completed,
        0
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_keep_the_ledger_consistent() {
    let h = harness().await;
    let economy = Arc::new(h.economy);
    for child in ["ada", "grace"] {
        economy.open_account(child, 10).await.unwrap();
        economy
            .award_coins(CoinAward::new(child, 100, TransactionCategory::GameReward))
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for i in 0..40 {
        let economy = Arc::clone(&economy);
        let child = if i % 2 == 0 { "ada" } else { "grace" };
        handles.push(tokio::spawn(async move {
            if i % 4 < 2 {
                economy
                    .award_coins(CoinAward::new(child, 10, TransactionCategory::GameReward))
                    .await
                    .map(|_| ())
            } else {
                economy
                    .spend(SpendCmd::new(child, 5, TransactionCategory::Entertainment))
                    .await
                    .map(|_| ())
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for child in ["ada", "grace"] {
        let balance = economy.balance(child).await.unwrap();
        assert_eq!(balance.balance, 100 + 10 * 10 - 10 * 5);
        assert!(balance.balance >= 0);
        assert_consistent(&economy, child).await;
    }
}

#[tokio::test]
async fn spend_retried_after_a_lost_acknowledgement_debits_once() {
    let (store, economy) = flaky().await;
    economy
        .award_coins(CoinAward::new("ada", 100, TransactionCategory::GameReward))
        .await
        .unwrap();

    store.wallet_commit_ghosts.store(1, Ordering::SeqCst);
    let change = economy
        .spend(SpendCmd::new("ada", 30, TransactionCategory::Entertainment))
        .await
        .unwrap();
    assert!(change.replayed);
    assert_eq!(change.new_balance, 70);
    assert_eq!(economy.balance("ada").await.unwrap().balance, 70);

    let rows = economy.history("ada", None, None).unwrap().collect_all().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_consistent(&economy, "ada").await;
}

#[tokio::test]
async fn award_retried_after_a_lost_acknowledgement_credits_once() {
    let (store, economy) = flaky().await;
    store.wallet_commit_ghosts.store(1, Ordering::SeqCst);

    economy
        .award_coins(CoinAward::new("ada", 40, TransactionCategory::GameReward))
        .await
        .unwrap();
    assert_eq!(economy.balance("ada").await.unwrap().balance, 40);
    let rows = economy.history("ada", None, None).unwrap().collect_all().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_consistent(&economy, "ada").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn direct_wallet_calls_and_orchestrated_spends_do_not_race() {
    let h = harness().await;
    let economy = Arc::new(h.economy);
    economy.open_account("ada", 10).await.unwrap();
    economy
        .award_coins(CoinAward::new("ada", 200, TransactionCategory::GameReward))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..40 {
        let economy = Arc::clone(&economy);
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                economy
                    .wallet()
                    .credit("ada", 3, TransactionCategory::GameReward, "bonus", None)
                    .await
                    .map(|_| ())
            } else {
                economy
                    .spend(SpendCmd::new("ada", 5, TransactionCategory::Entertainment))
                    .await
                    .map(|_| ())
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let balance = economy.balance("ada").await.unwrap();
    assert_eq!(balance.balance, 200 + 20 * 3 - 20 * 5);
    assert_consistent(&economy, "ada").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn direct_xp_awards_and_task_completions_do_not_race() {
    let h = harness().await;
    let economy = Arc::new(h.economy);

    let mut handles = Vec::new();
    for i in 0..20 {
        let economy = Arc::clone(&economy);
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                economy
                    .experience_service()
                    .award("ada", 7, XpSource::SpecialEvent, None)
                    .await
                    .map(|_| ())
            } else {
                economy
                    .complete_task(TaskCompletion::new("ada", "math", 2, false, 40))
                    .await
                    .map(|_| ())
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let history = economy.xp_history("ada", 100).await.unwrap();
    let summed: i64 = history.iter().map(|tx| tx.amount).sum();
    assert_eq!(summed, 10 * 7 + 10 * 10);
    assert_eq!(economy.experience("ada").await.unwrap().total_xp_earned, summed);
}
