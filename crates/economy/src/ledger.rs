//! Append-only coin ledger.
//!
//! Every balance change is one immutable [`Transaction`]. The cached
//! [`crate::Balance`] of a child must always equal the sum of its rows;
//! [`Ledger::audit`] checks that.

use std::{collections::VecDeque, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Balance, EconomyError, ResultEconomy, Transaction,
    store::{EconomyStore, LedgerPageQuery},
    util::{normalize_child_id, to_millis},
};

/// Rows fetched per round trip by [`LedgerRange`].
pub const LEDGER_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone)]
pub struct Ledger {
    store: Arc<dyn EconomyStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn EconomyStore>) -> Self {
        Self { store }
    }

    /// Record a transaction without touching the cached balance.
    pub async fn append(&self, tx: &Transaction) -> ResultEconomy<()> {
        validate(tx)?;
        self.store.insert_transaction(tx).await
    }

    /// Record a transaction together with the balance it produced.
    pub(crate) async fn append_with_balance(
        &self,
        tx: &Transaction,
        balance: &Balance,
    ) -> ResultEconomy<()> {
        validate(tx)?;
        self.store.commit_wallet_change(tx, balance).await
    }

    pub async fn find(&self, id: uuid::Uuid) -> ResultEconomy<Option<Transaction>> {
        self.store.find_transaction(id).await
    }

    pub async fn sum_for_child(&self, child_id: &str) -> ResultEconomy<i64> {
        let child_id = normalize_child_id(child_id)?;
        self.store.sum_transactions(&child_id).await
    }

    /// Lazily iterate a child's transactions in `[from, to)`, oldest first.
    pub fn query_range(
        &self,
        child_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> ResultEconomy<LedgerRange> {
        let child_id = normalize_child_id(child_id)?;
        if let (Some(from), Some(to)) = (from, to)
            && from >= to
        {
            return Err(EconomyError::Validation(
                "invalid range: from must be < to".to_string(),
            ));
        }
        Ok(LedgerRange {
            store: Arc::clone(&self.store),
            query: LedgerPageQuery {
                child_id,
                from_ms: from.map(to_millis),
                to_ms: to.map(to_millis),
                after: None,
                limit: LEDGER_PAGE_SIZE,
            },
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }

    /// Compare the ledger sum of a child with a cached balance.
    pub async fn audit(&self, child_id: &str, cached_balance: i64) -> ResultEconomy<LedgerAudit> {
        let child_id = normalize_child_id(child_id)?;
        let ledger_sum = self.store.sum_transactions(&child_id).await?;
        Ok(LedgerAudit {
            child_id,
            ledger_sum,
            cached_balance,
        })
    }
}

fn validate(tx: &Transaction) -> ResultEconomy<()> {
    if tx.amount == 0 {
        return Err(EconomyError::Validation(
            "transaction amount must not be 0".to_string(),
        ));
    }
    normalize_child_id(&tx.child_id)?;
    Ok(())
}

/// Result of comparing a cached balance with the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAudit {
    pub child_id: String,
    pub ledger_sum: i64,
    pub cached_balance: i64,
}

impl LedgerAudit {
    pub fn drift(&self) -> i64 {
        self.cached_balance - self.ledger_sum
    }

    pub fn is_consistent(&self) -> bool {
        self.drift() == 0
    }
}

/// Cursor over a ledger range. Pages are fetched on demand with a keyset on
/// `(timestamp, id)`, so rows appended behind the cursor are never skipped
/// or repeated.
#[derive(Debug)]
pub struct LedgerRange {
    store: Arc<dyn EconomyStore>,
    query: LedgerPageQuery,
    buffer: VecDeque<Transaction>,
    exhausted: bool,
}

impl LedgerRange {
    pub async fn next(&mut self) -> ResultEconomy<Option<Transaction>> {
        if self.buffer.is_empty() && !self.exhausted {
            let page = self.store.transactions_page(&self.query).await?;
            if (page.len() as u64) < self.query.limit {
                self.exhausted = true;
            }
            if let Some(last) = page.last() {
                self.query.after = Some((to_millis(last.timestamp), last.id));
            }
            self.buffer.extend(page);
        }
        Ok(self.buffer.pop_front())
    }

    /// Drain the remaining rows.
    pub async fn collect_all(mut self) -> ResultEconomy<Vec<Transaction>> {
        let mut out = Vec::new();
        while let Some(tx) = self.next().await? {
            out.push(tx);
        }
        Ok(out)
    }
}
