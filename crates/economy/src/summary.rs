//! Earning and spending reports folded over a ledger range.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Balance, ResultEconomy, Transaction, TransactionCategory, clock::local_day,
    ledger::LedgerRange,
};

/// Totals of one child's transactions in `[from, to)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub child_id: String,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub total_earned: i64,
    /// Coins spent, as a positive amount.
    pub total_spent: i64,
    pub transaction_count: u64,
    pub earned_by_category: BTreeMap<TransactionCategory, i64>,
    pub spent_by_category: BTreeMap<TransactionCategory, i64>,
    /// Per local calendar day, oldest first.
    pub daily: Vec<DailyActivity>,
    pub current_balance: i64,
    pub today_earned: i64,
    pub today_spent: i64,
}

/// Activity of one local calendar day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyActivity {
    pub day: NaiveDate,
    pub earned: i64,
    pub spent: i64,
    pub transaction_count: u64,
}

impl TransactionSummary {
    pub fn net(&self) -> i64 {
        self.total_earned - self.total_spent
    }

    /// Category with the most coins spent; ties go to the first in
    /// category order.
    pub fn top_spending_category(&self) -> Option<TransactionCategory> {
        top(&self.spent_by_category)
    }

    pub fn top_earning_category(&self) -> Option<TransactionCategory> {
        top(&self.earned_by_category)
    }

    /// Drain `range` into a summary. `balance` supplies the current
    /// balance and today's counters, which the range does not cover.
    pub(crate) async fn collect(
        mut range: LedgerRange,
        balance: &Balance,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        offset: FixedOffset,
    ) -> ResultEconomy<Self> {
        let mut summary = Self {
            child_id: balance.child_id.clone(),
            from,
            to,
            total_earned: 0,
            total_spent: 0,
            transaction_count: 0,
            earned_by_category: BTreeMap::new(),
            spent_by_category: BTreeMap::new(),
            daily: Vec::new(),
            current_balance: balance.balance,
            today_earned: balance.today_earned,
            today_spent: balance.today_spent,
        };
        let mut days: BTreeMap<NaiveDate, DailyActivity> = BTreeMap::new();
        while let Some(tx) = range.next().await? {
            summary.add(&tx, &mut days, offset);
        }
        summary.daily = days.into_values().collect();
        Ok(summary)
    }

    fn add(
        &mut self,
        tx: &Transaction,
        days: &mut BTreeMap<NaiveDate, DailyActivity>,
        offset: FixedOffset,
    ) {
        let day = local_day(tx.timestamp, offset);
        let activity = days.entry(day).or_insert(DailyActivity {
            day,
            earned: 0,
            spent: 0,
            transaction_count: 0,
        });
        activity.transaction_count += 1;
        self.transaction_count += 1;
        if tx.amount >= 0 {
            self.total_earned += tx.amount;
            activity.earned += tx.amount;
            *self.earned_by_category.entry(tx.category).or_default() += tx.amount;
        } else {
            let spent = tx.amount.abs();
            self.total_spent += spent;
            activity.spent += spent;
            *self.spent_by_category.entry(tx.category).or_default() += spent;
        }
    }
}

fn top(totals: &BTreeMap<TransactionCategory, i64>) -> Option<TransactionCategory> {
    totals
        .iter()
        .fold(None, |best: Option<(TransactionCategory, i64)>, (&category, &amount)| {
            match best {
                Some((_, top)) if top >= amount => best,
                _ => Some((category, amount)),
            }
        })
        .map(|(category, _)| category)
}
