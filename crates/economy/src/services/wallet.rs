//! Wallet: cached balances, daily caps and discounted spending.

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Balance, Clock, EconomyError, ResultEconomy, Transaction, TransactionCategory,
    ledger::{Ledger, LedgerAudit, LedgerRange},
    locks::ChildLocks,
    settings::WalletSettings,
    store::EconomyStore,
    summary::TransactionSummary,
    util::{normalize_child_id, require_positive},
};

/// Outcome of a credit. Capping is reported here, not as an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEarningOutcome {
    pub child_id: String,
    pub requested_amount: i64,
    pub actual_amount: i64,
    pub was_limited: bool,
    /// The transaction id was already recorded; nothing was applied.
    pub replayed: bool,
    /// `None` when the daily cap left nothing to credit.
    pub transaction_id: Option<Uuid>,
    pub balance: i64,
    pub daily_earned: i64,
    pub daily_cap: i64,
    pub remaining_today: i64,
    pub timestamp: DateTime<Utc>,
}

impl GameEarningOutcome {
    /// Turn a fully capped credit into [`EconomyError::CapReached`].
    pub fn into_result(self) -> ResultEconomy<Self> {
        if self.actual_amount == 0 && self.was_limited {
            return Err(EconomyError::CapReached(self.child_id));
        }
        Ok(self)
    }
}

/// Outcome of a debit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub child_id: String,
    pub transaction_id: Uuid,
    pub category: TransactionCategory,
    pub requested_amount: i64,
    /// Coins actually removed after the category discount.
    pub cost: i64,
    pub previous_balance: i64,
    pub new_balance: i64,
    pub replayed: bool,
    pub timestamp: DateTime<Utc>,
}

impl BalanceChange {
    pub fn change_amount(&self) -> i64 {
        self.new_balance - self.previous_balance
    }
}

/// `ceil(amount * percent / 100)` in integers.
pub fn discounted_cost(amount: i64, percent: u32) -> ResultEconomy<i64> {
    amount
        .checked_mul(i64::from(percent))
        .and_then(|scaled| scaled.checked_add(99))
        .map(|scaled| scaled / 100)
        .ok_or_else(|| EconomyError::Validation(format!("amount {amount} is too large")))
}

#[async_trait]
pub trait WalletService: Send + Sync + Debug {
    async fn credit(
        &self,
        child_id: &str,
        amount: i64,
        category: TransactionCategory,
        description: &str,
        tx_id: Option<Uuid>,
    ) -> ResultEconomy<GameEarningOutcome>;

    async fn debit(
        &self,
        child_id: &str,
        amount: i64,
        category: TransactionCategory,
        tx_id: Option<Uuid>,
    ) -> ResultEconomy<BalanceChange>;

    /// Current balance with the daily counters rolled over. Children without
    /// an account get an empty one for the default age.
    async fn get_balance(&self, child_id: &str) -> ResultEconomy<Balance>;

    /// Create the account or move it to the age group of `age`.
    async fn open_account(&self, child_id: &str, age: u8) -> ResultEconomy<Balance>;

    async fn remaining_today(&self, child_id: &str) -> ResultEconomy<i64>;

    async fn audit(&self, child_id: &str) -> ResultEconomy<LedgerAudit>;

    /// Rewrite the cached balance from the ledger when they drifted apart.
    /// Returns the audit taken before the repair.
    async fn reconcile(&self, child_id: &str) -> ResultEconomy<LedgerAudit>;

    fn history(
        &self,
        child_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> ResultEconomy<LedgerRange>;

    /// Earned and spent totals of `[from, to)`, by category and by local
    /// day. Read only.
    async fn transaction_summary(
        &self,
        child_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> ResultEconomy<TransactionSummary>;
}

/// Wallet over an [`EconomyStore`].
///
/// Every balance write of a child runs under that child's lock, so direct
/// calls and orchestrated ones never interleave a read-modify-write.
/// Clones share the lock arena.
#[derive(Debug, Clone)]
pub struct LocalWallet {
    store: Arc<dyn EconomyStore>,
    ledger: Ledger,
    clock: Arc<dyn Clock>,
    settings: WalletSettings,
    locks: Arc<ChildLocks>,
}

impl LocalWallet {
    pub fn new(
        store: Arc<dyn EconomyStore>,
        clock: Arc<dyn Clock>,
        settings: WalletSettings,
    ) -> Self {
        Self {
            ledger: Ledger::new(Arc::clone(&store)),
            store,
            clock,
            settings,
            locks: Arc::new(ChildLocks::new()),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    async fn load_current(&self, child_id: &str, now: DateTime<Utc>) -> ResultEconomy<Balance> {
        let mut balance = match self.store.load_balance(child_id).await? {
            Some(balance) => balance,
            None => Balance::new(child_id, self.settings.default_age, now),
        };
        balance.roll_over(now, self.settings.local_offset());
        Ok(balance)
    }

    /// Look up a recorded transaction for a replayed id.
    async fn recorded(&self, child_id: &str, tx_id: Option<Uuid>) -> ResultEconomy<Option<Transaction>> {
        let Some(id) = tx_id else {
            return Ok(None);
        };
        match self.ledger.find(id).await? {
            Some(tx) if tx.child_id != child_id => Err(EconomyError::Validation(format!(
                "transaction {id} belongs to another child"
            ))),
            found => Ok(found),
        }
    }

    fn earning_outcome(
        balance: &Balance,
        requested_amount: i64,
        actual_amount: i64,
        transaction_id: Option<Uuid>,
        replayed: bool,
        timestamp: DateTime<Utc>,
    ) -> GameEarningOutcome {
        GameEarningOutcome {
            child_id: balance.child_id.clone(),
            requested_amount,
            actual_amount,
            was_limited: actual_amount < requested_amount,
            replayed,
            transaction_id,
            balance: balance.balance,
            daily_earned: balance.today_earned,
            daily_cap: balance.daily_cap,
            remaining_today: balance.remaining_today(),
            timestamp,
        }
    }

    async fn replayed_credit(
        &self,
        recorded: &Transaction,
        requested_amount: i64,
    ) -> ResultEconomy<GameEarningOutcome> {
        if !recorded.category.is_earning() {
            return Err(EconomyError::Validation(format!(
                "transaction {} is a debit, not a credit",
                recorded.id
            )));
        }
        let balance = self
            .load_current(&recorded.child_id, self.clock.now())
            .await?;
        tracing::debug!("credit {} replayed for {}", recorded.id, recorded.child_id);
        Ok(Self::earning_outcome(
            &balance,
            requested_amount,
            recorded.amount,
            Some(recorded.id),
            true,
            recorded.timestamp,
        ))
    }

    async fn replayed_debit(
        &self,
        recorded: &Transaction,
        requested_amount: i64,
    ) -> ResultEconomy<BalanceChange> {
        if !recorded.category.is_spending() {
            return Err(EconomyError::Validation(format!(
                "transaction {} is a credit, not a debit",
                recorded.id
            )));
        }
        let balance = self
            .load_current(&recorded.child_id, self.clock.now())
            .await?;
        tracing::debug!("debit {} replayed for {}", recorded.id, recorded.child_id);
        Ok(BalanceChange {
            child_id: recorded.child_id.clone(),
            transaction_id: recorded.id,
            category: recorded.category,
            requested_amount,
            cost: -recorded.amount,
            previous_balance: balance.balance,
            new_balance: balance.balance,
            replayed: true,
            timestamp: recorded.timestamp,
        })
    }
}

#[async_trait]
impl WalletService for LocalWallet {
    async fn credit(
        &self,
        child_id: &str,
        amount: i64,
        category: TransactionCategory,
        description: &str,
        tx_id: Option<Uuid>,
    ) -> ResultEconomy<GameEarningOutcome> {
        let child_id = normalize_child_id(child_id)?;
        require_positive(amount, "amount")?;
        if !category.is_earning() {
            return Err(EconomyError::Validation(format!(
                "{category} is not an earning category"
            )));
        }
        let _guard = self.locks.lock(&child_id).await;
        if let Some(recorded) = self.recorded(&child_id, tx_id).await? {
            return self.replayed_credit(&recorded, amount).await;
        }

        let now = self.clock.now();
        let mut balance = self.load_current(&child_id, now).await?;
        let proposed = amount.min(balance.remaining_today());
        if proposed <= 0 {
            tracing::debug!("daily cap reached for {child_id}, credit of {amount} dropped");
            return Ok(Self::earning_outcome(&balance, amount, 0, None, false, now));
        }

        let tx = Transaction::new(tx_id, child_id.as_str(), proposed, category, description, now)?
            .with_metadata("requested_amount", amount.to_string());
        balance.apply_credit(proposed, now);
        match self.ledger.append_with_balance(&tx, &balance).await {
            Ok(()) => {}
            Err(EconomyError::DuplicateTransaction(id)) => {
                let recorded = self
                    .ledger
                    .find(id)
                    .await?
                    .ok_or(EconomyError::DuplicateTransaction(id))?;
                return self.replayed_credit(&recorded, amount).await;
            }
            Err(err) => return Err(err),
        }

        if proposed < amount {
            tracing::debug!("credit for {child_id} limited from {amount} to {proposed}");
        }
        Ok(Self::earning_outcome(
            &balance,
            amount,
            proposed,
            Some(tx.id),
            false,
            now,
        ))
    }

    async fn debit(
        &self,
        child_id: &str,
        amount: i64,
        category: TransactionCategory,
        tx_id: Option<Uuid>,
    ) -> ResultEconomy<BalanceChange> {
        let child_id = normalize_child_id(child_id)?;
        require_positive(amount, "amount")?;
        if !category.is_spending() {
            return Err(EconomyError::Validation(format!(
                "{category} is not a spending category"
            )));
        }
        let _guard = self.locks.lock(&child_id).await;
        if let Some(recorded) = self.recorded(&child_id, tx_id).await? {
            return self.replayed_debit(&recorded, amount).await;
        }

        let percent = self.settings.discount_for(category);
        let cost = discounted_cost(amount, percent)?;
        let now = self.clock.now();
        let mut balance = self.load_current(&child_id, now).await?;
        let previous_balance = balance.balance;
        if let Err(err) = balance.apply_debit(cost, now) {
            tracing::debug!("debit of {cost} refused for {child_id}: {err}");
            return Err(err);
        }

        let tx = Transaction::new(
            tx_id,
            child_id.as_str(),
            -cost,
            category,
            format!("Spent on {category}"),
            now,
        )?
        .with_metadata("requested_amount", amount.to_string())
        .with_metadata("discount_percent", percent.to_string());
        match self.ledger.append_with_balance(&tx, &balance).await {
            Ok(()) => {}
            Err(EconomyError::DuplicateTransaction(id)) => {
                let recorded = self
                    .ledger
                    .find(id)
                    .await?
                    .ok_or(EconomyError::DuplicateTransaction(id))?;
                return self.replayed_debit(&recorded, amount).await;
            }
            Err(err) => return Err(err),
        }

        Ok(BalanceChange {
            child_id,
            transaction_id: tx.id,
            category,
            requested_amount: amount,
            cost,
            previous_balance,
            new_balance: balance.balance,
            replayed: false,
            timestamp: now,
        })
    }

    async fn get_balance(&self, child_id: &str) -> ResultEconomy<Balance> {
        let child_id = normalize_child_id(child_id)?;
        self.load_current(&child_id, self.clock.now()).await
    }

    async fn open_account(&self, child_id: &str, age: u8) -> ResultEconomy<Balance> {
        let child_id = normalize_child_id(child_id)?;
        let _guard = self.locks.lock(&child_id).await;
        let now = self.clock.now();
        let mut balance = self.load_current(&child_id, now).await?;
        let fresh = Balance::new(child_id.as_str(), age, now);
        balance.age_group = fresh.age_group;
        balance.daily_cap = fresh.daily_cap;
        balance.last_updated = now;
        self.store.save_balance(&balance).await?;
        tracing::info!(
            "account {child_id} opened for age group {}",
            balance.age_group.as_str()
        );
        Ok(balance)
    }

    async fn remaining_today(&self, child_id: &str) -> ResultEconomy<i64> {
        Ok(self.get_balance(child_id).await?.remaining_today())
    }

    async fn audit(&self, child_id: &str) -> ResultEconomy<LedgerAudit> {
        let balance = self.get_balance(child_id).await?;
        self.ledger.audit(&balance.child_id, balance.balance).await
    }

    async fn reconcile(&self, child_id: &str) -> ResultEconomy<LedgerAudit> {
        let child_id = normalize_child_id(child_id)?;
        let _guard = self.locks.lock(&child_id).await;
        let now = self.clock.now();
        let mut balance = self.load_current(&child_id, now).await?;
        let audit = self.ledger.audit(&child_id, balance.balance).await?;
        if !audit.is_consistent() {
            tracing::warn!(
                "balance of {child_id} drifted by {}, rewriting from ledger",
                audit.drift()
            );
            balance.balance = audit.ledger_sum;
            balance.last_updated = now;
            self.store.save_balance(&balance).await?;
        }
        Ok(audit)
    }

    fn history(
        &self,
        child_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> ResultEconomy<LedgerRange> {
        self.ledger.query_range(child_id, from, to)
    }

    async fn transaction_summary(
        &self,
        child_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> ResultEconomy<TransactionSummary> {
        let range = self.ledger.query_range(child_id, from, to)?;
        let balance = self.get_balance(child_id).await?;
        TransactionSummary::collect(range, &balance, from, to, self.settings.local_offset()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discount_rounds_up() {
        assert_eq!(discounted_cost(10, 70).unwrap(), 7);
        assert_eq!(discounted_cost(11, 70).unwrap(), 8);
        assert_eq!(discounted_cost(100, 50).unwrap(), 50);
        assert_eq!(discounted_cost(1, 50).unwrap(), 1);
        assert_eq!(discounted_cost(600, 100).unwrap(), 600);
    }

    #[test]
    fn discount_overflow_is_rejected() {
        assert!(discounted_cost(i64::MAX, 80).is_err());
    }

    #[test]
    fn capped_outcome_converts_to_cap_reached() {
        let outcome = GameEarningOutcome {
            child_id: "ada".to_string(),
            requested_amount: 20,
            actual_amount: 0,
            was_limited: true,
            replayed: false,
            transaction_id: None,
            balance: 1800,
            daily_earned: 1800,
            daily_cap: 1800,
            remaining_today: 0,
            timestamp: Utc::now(),
        };
        assert_eq!(
            outcome.into_result(),
            Err(EconomyError::CapReached("ada".to_string()))
        );
    }
}
