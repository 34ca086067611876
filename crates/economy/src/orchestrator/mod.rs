//! The economy facade.
//!
//! [`Economy`] sequences the cross-service effects of a request. Every
//! mutating call runs under the child's lock, retries storage failures of
//! each step and feeds follow-up rewards through a bounded
//! [`RewardChain`](chain::RewardChain). The first step of a request decides
//! its fate: if it fails the call fails. Later steps that fail are reported
//! in [`OrchestrationResult::failed_steps`] and never undo earlier ones.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Badge, BadgeDefinition, BadgeProgress, BadgeStats, BadgeTrigger, Balance, Clock,
    EconomyError, EconomySettings, Experience, LevelUpOutcome, ResultEconomy, SystemClock,
    TaskResult, TransactionCategory, XpSource, XpTransaction,
    commands::{CoinAward, SpendCmd, TaskCompletion, XpAward},
    ledger::{LedgerAudit, LedgerRange},
    locks::ChildLocks,
    services::{
        BadgeService, BalanceChange, DifficultyRecommendation, DifficultyRecommender,
        ExperienceService, GameEarningOutcome, LocalBadges, LocalExperience, LocalRecommender,
        LocalWallet, PerformanceStats, WalletService, normalize_subject,
    },
    store::{EconomyStore, SqlStore},
    summary::TransactionSummary,
    util::normalize_child_id,
};

mod chain;
mod retry;

pub use chain::MAX_REWARD_HOPS;
use chain::{RewardChain, RewardEffect, derived_id, progress_id};
use retry::with_retry;

/// Coins for a completed task by grade.
pub fn coins_for_grade(grade: u8) -> i64 {
    match grade {
        90.. => 20,
        80..=89 => 15,
        70..=79 => 10,
        60..=69 => 5,
        _ => 2,
    }
}

/// A step that exhausted its retries or failed for good.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedStep {
    pub step: String,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub child_id: String,
    /// Task id for completions, transaction id for direct awards.
    pub request_id: Uuid,
    /// The request was already applied earlier; nothing changed.
    pub replayed: bool,
    /// The primary coin credit, when the request had one.
    pub coins: Option<GameEarningOutcome>,
    pub xp_awarded: i64,
    pub level_ups: Vec<LevelUpOutcome>,
    pub badges: Vec<Badge>,
    /// Level-up bonuses and badge rewards.
    pub bonus_credits: Vec<GameEarningOutcome>,
    pub failed_steps: Vec<FailedStep>,
    /// Effects dropped by the chain bound.
    pub suppressed_effects: usize,
    pub timestamp: DateTime<Utc>,
}

impl OrchestrationResult {
    fn new(child_id: &str, request_id: Uuid, timestamp: DateTime<Utc>) -> Self {
        Self {
            child_id: child_id.to_string(),
            request_id,
            replayed: false,
            coins: None,
            xp_awarded: 0,
            level_ups: Vec::new(),
            badges: Vec::new(),
            bonus_credits: Vec::new(),
            failed_steps: Vec::new(),
            suppressed_effects: 0,
            timestamp,
        }
    }

    /// Every step was applied.
    pub fn is_complete(&self) -> bool {
        self.failed_steps.is_empty()
    }

    /// Coins credited by this request, bonuses included.
    pub fn total_coins(&self) -> i64 {
        self.coins
            .iter()
            .chain(&self.bonus_credits)
            .filter(|outcome| !outcome.replayed)
            .map(|outcome| outcome.actual_amount)
            .sum()
    }

    fn fail(&mut self, step: String, err: &EconomyError) {
        tracing::error!("{step} failed for {}: {err}", self.child_id);
        self.failed_steps.push(FailedStep {
            step,
            error: err.to_string(),
        });
    }
}

#[derive(Debug)]
pub struct Economy {
    clock: Arc<dyn Clock>,
    settings: EconomySettings,
    store: Arc<dyn EconomyStore>,
    wallet: Arc<dyn WalletService>,
    experience: Arc<dyn ExperienceService>,
    badges: Arc<dyn BadgeService>,
    recommender: Arc<dyn DifficultyRecommender>,
    locks: ChildLocks,
}

impl Economy {
    /// Return a builder for `Economy`. Help to build the struct.
    pub fn builder() -> EconomyBuilder {
        EconomyBuilder::default()
    }

    pub fn settings(&self) -> &EconomySettings {
        &self.settings
    }

    pub fn wallet(&self) -> &Arc<dyn WalletService> {
        &self.wallet
    }

    pub fn experience_service(&self) -> &Arc<dyn ExperienceService> {
        &self.experience
    }

    pub fn badge_service(&self) -> &Arc<dyn BadgeService> {
        &self.badges
    }

    pub fn recommender(&self) -> &Arc<dyn DifficultyRecommender> {
        &self.recommender
    }

    /// Reward a finished task: coins by grade, the task record, task XP
    /// (plus first-try and perfect-grade bonuses) and badge progress, then
    /// everything they trigger.
    ///
    /// A task id seen before returns a replayed result without side
    /// effects. The coin credit is the primary step: if it fails nothing is
    /// applied and the error is returned.
    pub async fn complete_task(&self, cmd: TaskCompletion) -> ResultEconomy<OrchestrationResult> {
        let child_id = normalize_child_id(&cmd.child_id)?;
        let subject = normalize_subject(&cmd.subject)?;
        let task_id = cmd.task_id.unwrap_or_else(Uuid::new_v4);
        let task = TaskResult {
            id: task_id,
            child_id: child_id.clone(),
            subject,
            difficulty: cmd.difficulty,
            success: cmd.success,
            grade: cmd.grade,
            time_spent_secs: cmd.time_spent_secs,
            hints_used: cmd.hints_used,
            attempts_to_solve: cmd.attempts_to_solve,
            timestamp: self.clock.now(),
        };
        task.validate()?;

        let _guard = self.locks.lock(&child_id).await;
        let policy = &self.settings.orchestrator;
        let store = &self.store;
        let mut result = OrchestrationResult::new(&child_id, task_id, task.timestamp);

        if with_retry("task lookup", policy, move || store.task_result_exists(task_id)).await? {
            tracing::debug!("task {task_id} already completed by {child_id}");
            result.replayed = true;
            return Ok(result);
        }

        let wallet = &self.wallet;
        let child = child_id.as_str();
        let coins = coins_for_grade(task.grade);
        let description = format!("Completed {} task", task.subject);
        let description = description.as_str();
        let coins_id = derived_id(task_id, "coins");
        let outcome = with_retry("task coins", policy, move || {
            wallet.credit(
                child,
                coins,
                TransactionCategory::TaskCompletion,
                description,
                Some(coins_id),
            )
        })
        .await?;
        result.coins = Some(outcome);

        let record = &task;
        match with_retry("record task", policy, move || store.insert_task_result(record)).await {
            Ok(()) | Err(EconomyError::DuplicateTransaction(_)) => {}
            Err(err) => result.fail("record task".to_string(), &err),
        }

        let mut chain = RewardChain::default();
        chain.push(
            0,
            RewardEffect::Xp {
                amount: XpSource::TaskCompletion.base_xp(),
                source: XpSource::TaskCompletion,
                xp_tx_id: derived_id(task_id, "xp"),
            },
        );
        if task.success && task.attempts_to_solve == 1 {
            chain.push(
                0,
                RewardEffect::Xp {
                    amount: XpSource::FirstTryBonus.base_xp(),
                    source: XpSource::FirstTryBonus,
                    xp_tx_id: derived_id(task_id, "first-try-xp"),
                },
            );
        }
        if task.grade == 100 {
            chain.push(
                0,
                RewardEffect::Xp {
                    amount: XpSource::PerfectCompletion.base_xp(),
                    source: XpSource::PerfectCompletion,
                    xp_tx_id: derived_id(task_id, "perfect-xp"),
                },
            );
        }
        for definition in self.badges.definitions() {
            if definition.trigger.matches_task(&task.subject, task.success) {
                chain.push(
                    0,
                    RewardEffect::BadgeProgress {
                        badge_id: definition.id.clone(),
                        delta: 1,
                        event_id: progress_id(task_id, &definition.id),
                    },
                );
            } else if definition.trigger == BadgeTrigger::PerfectGrade && task.grade == 100 {
                chain.push(
                    0,
                    RewardEffect::AwardBadge {
                        badge_id: definition.id.clone(),
                    },
                );
            }
        }

        self.run_chain(&child_id, chain, &mut result).await;
        Ok(result)
    }

    /// Store a task result that earns nothing, e.g. an unscored practice.
    /// `DuplicateTransaction` when the id was recorded before.
    pub async fn record_task_result(&self, cmd: TaskCompletion) -> ResultEconomy<TaskResult> {
        let child_id = normalize_child_id(&cmd.child_id)?;
        let task = TaskResult {
            id: cmd.task_id.unwrap_or_else(Uuid::new_v4),
            child_id: child_id.clone(),
            subject: normalize_subject(&cmd.subject)?,
            difficulty: cmd.difficulty,
            success: cmd.success,
            grade: cmd.grade,
            time_spent_secs: cmd.time_spent_secs,
            hints_used: cmd.hints_used,
            attempts_to_solve: cmd.attempts_to_solve,
            timestamp: self.clock.now(),
        };
        task.validate()?;

        let _guard = self.locks.lock(&child_id).await;
        let store = &self.store;
        let record = &task;
        with_retry("record task", &self.settings.orchestrator, move || {
            store.insert_task_result(record)
        })
        .await?;
        Ok(task)
    }

    /// Spend coins. No partial debits; `InsufficientBalance` leaves the
    /// wallet untouched.
    pub async fn spend(&self, cmd: SpendCmd) -> ResultEconomy<BalanceChange> {
        let child_id = normalize_child_id(&cmd.child_id)?;
        // Fixed before the first attempt so a retry after an ambiguous
        // commit replays instead of debiting again.
        let tx_id = cmd.tx_id.unwrap_or_else(Uuid::new_v4);
        let _guard = self.locks.lock(&child_id).await;
        let wallet = &self.wallet;
        let child = child_id.as_str();
        with_retry("spend", &self.settings.orchestrator, move || {
            wallet.debit(child, cmd.amount, cmd.category, Some(tx_id))
        })
        .await
    }

    /// Credit coins earned outside of tasks.
    pub async fn award_coins(&self, cmd: CoinAward) -> ResultEconomy<GameEarningOutcome> {
        let child_id = normalize_child_id(&cmd.child_id)?;
        let tx_id = cmd.tx_id.unwrap_or_else(Uuid::new_v4);
        let _guard = self.locks.lock(&child_id).await;
        let wallet = &self.wallet;
        let child = child_id.as_str();
        let description = cmd.description.as_str();
        with_retry("award coins", &self.settings.orchestrator, move || {
            wallet.credit(child, cmd.amount, cmd.category, description, Some(tx_id))
        })
        .await
    }

    /// Award XP and pay whatever the resulting level-ups trigger.
    pub async fn award_xp(&self, cmd: XpAward) -> ResultEconomy<OrchestrationResult> {
        let child_id = normalize_child_id(&cmd.child_id)?;
        let xp_tx_id = cmd.xp_tx_id.unwrap_or_else(Uuid::new_v4);
        let _guard = self.locks.lock(&child_id).await;

        let mut result = OrchestrationResult::new(&child_id, xp_tx_id, self.clock.now());
        let mut chain = RewardChain::default();
        let effect = RewardEffect::Xp {
            amount: cmd.amount,
            source: cmd.source,
            xp_tx_id,
        };
        self.apply(&child_id, 0, effect, &mut chain, &mut result)
            .await?;
        self.run_chain(&child_id, chain, &mut result).await;
        Ok(result)
    }

    /// Mint a badge directly and pay its rewards. `AlreadyEarned` when the
    /// child holds it, `KeyNotFound` for unknown badges.
    pub async fn award_badge(
        &self,
        child_id: &str,
        badge_id: &str,
    ) -> ResultEconomy<OrchestrationResult> {
        let child_id = normalize_child_id(child_id)?;
        let _guard = self.locks.lock(&child_id).await;

        let mut result = OrchestrationResult::new(&child_id, Uuid::new_v4(), self.clock.now());
        let mut chain = RewardChain::default();
        let effect = RewardEffect::AwardBadge {
            badge_id: badge_id.to_string(),
        };
        self.apply(&child_id, 0, effect, &mut chain, &mut result)
            .await?;
        if let Some(badge) = result.badges.first() {
            result.request_id = badge.id;
        }
        self.run_chain(&child_id, chain, &mut result).await;
        Ok(result)
    }

    /// Drain the chain. Failures are recorded, business outcomes skipped.
    async fn run_chain(
        &self,
        child_id: &str,
        mut chain: RewardChain,
        result: &mut OrchestrationResult,
    ) {
        while let Some((hop, effect)) = chain.pop() {
            let label = effect.label();
            match self.apply(child_id, hop, effect, &mut chain, result).await {
                Ok(()) => {}
                Err(err) if err.is_business_outcome() => {
                    tracing::debug!("{label} skipped for {child_id}: {err}");
                }
                Err(err) => result.fail(label, &err),
            }
        }
        result.suppressed_effects += chain.suppressed();
    }

    /// Apply one effect and queue what it triggers at `hop + 1`.
    async fn apply(
        &self,
        child_id: &str,
        hop: usize,
        effect: RewardEffect,
        chain: &mut RewardChain,
        result: &mut OrchestrationResult,
    ) -> ResultEconomy<()> {
        let policy = &self.settings.orchestrator;
        let label = effect.label();
        let step = label.as_str();
        match effect {
            RewardEffect::Coins {
                amount,
                category,
                description,
                tx_id,
            } => {
                let wallet = &self.wallet;
                let description = description.as_str();
                let outcome = with_retry(step, policy, move || {
                    wallet.credit(child_id, amount, category, description, Some(tx_id))
                })
                .await?;
                result.bonus_credits.push(outcome);
            }
            RewardEffect::Xp {
                amount,
                source,
                xp_tx_id,
            } => {
                let experience = &self.experience;
                let level_up = with_retry(step, policy, move || {
                    experience.award(child_id, amount, source, Some(xp_tx_id))
                })
                .await?;
                result.xp_awarded += amount;
                if let Some(level_up) = level_up {
                    self.queue_level_up(&level_up, xp_tx_id, hop + 1, chain);
                    result.level_ups.push(level_up);
                }
            }
            RewardEffect::BadgeProgress {
                badge_id,
                delta,
                event_id,
            } => {
                let badges = &self.badges;
                let badge_id = badge_id.as_str();
                let minted = with_retry(step, policy, move || {
                    badges.increment_progress(child_id, badge_id, delta, Some(event_id))
                })
                .await?;
                if let Some(badge) = minted {
                    self.queue_badge_rewards(&badge, hop + 1, chain)?;
                    result.badges.push(badge);
                }
            }
            RewardEffect::AwardBadge { badge_id } => {
                let badges = &self.badges;
                let badge_id = badge_id.as_str();
                let badge = with_retry(step, policy, move || {
                    badges.award_direct(child_id, badge_id)
                })
                .await?;
                self.queue_badge_rewards(&badge, hop + 1, chain)?;
                result.badges.push(badge);
            }
        }
        Ok(())
    }

    fn queue_level_up(
        &self,
        level_up: &LevelUpOutcome,
        xp_tx_id: Uuid,
        hop: usize,
        chain: &mut RewardChain,
    ) {
        if level_up.bonus_coins > 0 {
            chain.push(
                hop,
                RewardEffect::Coins {
                    amount: level_up.bonus_coins,
                    category: TransactionCategory::LevelUpBonus,
                    description: format!("Reached level {}", level_up.new_level),
                    tx_id: derived_id(xp_tx_id, "level-up-bonus"),
                },
            );
        }
        for definition in self.badges.definitions() {
            if definition.trigger == BadgeTrigger::LevelGained {
                chain.push(
                    hop,
                    RewardEffect::BadgeProgress {
                        badge_id: definition.id.clone(),
                        delta: level_up.levels_gained(),
                        event_id: progress_id(xp_tx_id, &definition.id),
                    },
                );
            }
        }
    }

    fn queue_badge_rewards(
        &self,
        badge: &Badge,
        hop: usize,
        chain: &mut RewardChain,
    ) -> ResultEconomy<()> {
        let definition = self.badges.definition(&badge.definition_id)?;
        if definition.rewards.coins > 0 {
            chain.push(
                hop,
                RewardEffect::Coins {
                    amount: definition.rewards.coins,
                    category: TransactionCategory::BadgeReward,
                    description: format!("Earned badge {}", definition.name),
                    tx_id: derived_id(badge.id, "coins"),
                },
            );
        }
        if definition.rewards.xp > 0 {
            chain.push(
                hop,
                RewardEffect::Xp {
                    amount: definition.rewards.xp,
                    source: XpSource::BadgeEarned,
                    xp_tx_id: derived_id(badge.id, "xp"),
                },
            );
        }
        Ok(())
    }

    pub async fn balance(&self, child_id: &str) -> ResultEconomy<Balance> {
        self.wallet.get_balance(child_id).await
    }

    pub async fn open_account(&self, child_id: &str, age: u8) -> ResultEconomy<Balance> {
        let child_id = normalize_child_id(child_id)?;
        let _guard = self.locks.lock(&child_id).await;
        self.wallet.open_account(&child_id, age).await
    }

    pub fn history(
        &self,
        child_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> ResultEconomy<LedgerRange> {
        self.wallet.history(child_id, from, to)
    }

    pub async fn transaction_summary(
        &self,
        child_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> ResultEconomy<TransactionSummary> {
        self.wallet.transaction_summary(child_id, from, to).await
    }

    pub async fn experience(&self, child_id: &str) -> ResultEconomy<Experience> {
        self.experience.experience(child_id).await
    }

    pub async fn xp_history(&self, child_id: &str, limit: u64) -> ResultEconomy<Vec<XpTransaction>> {
        self.experience.history(child_id, limit).await
    }

    pub async fn badges(&self, child_id: &str) -> ResultEconomy<Vec<Badge>> {
        self.badges.badges(child_id).await
    }

    pub async fn badge_progress(&self, child_id: &str) -> ResultEconomy<Vec<BadgeProgress>> {
        self.badges.progress(child_id).await
    }

    pub async fn badge_stats(&self, child_id: &str) -> ResultEconomy<BadgeStats> {
        self.badges.stats(child_id).await
    }

    pub fn badge_definitions(&self) -> &[BadgeDefinition] {
        self.badges.definitions()
    }

    pub async fn recommend(
        &self,
        child_id: &str,
        subject: &str,
    ) -> ResultEconomy<DifficultyRecommendation> {
        self.recommender.recommend(child_id, subject).await
    }

    pub async fn performance_stats(
        &self,
        child_id: &str,
        subject: &str,
    ) -> ResultEconomy<PerformanceStats> {
        self.recommender.performance_stats(child_id, subject).await
    }

    pub async fn predict_success(
        &self,
        child_id: &str,
        subject: &str,
        difficulty: u8,
    ) -> ResultEconomy<f64> {
        self.recommender
            .predict_success(child_id, subject, difficulty)
            .await
    }

    pub async fn audit(&self, child_id: &str) -> ResultEconomy<LedgerAudit> {
        self.wallet.audit(child_id).await
    }

    pub async fn reconcile(&self, child_id: &str) -> ResultEconomy<LedgerAudit> {
        let child_id = normalize_child_id(child_id)?;
        let _guard = self.locks.lock(&child_id).await;
        self.wallet.reconcile(&child_id).await
    }
}

/// The builder for `Economy`
#[derive(Default)]
pub struct EconomyBuilder {
    store: Option<Arc<dyn EconomyStore>>,
    clock: Option<Arc<dyn Clock>>,
    settings: EconomySettings,
    catalog: Option<Vec<BadgeDefinition>>,
    wallet: Option<Arc<dyn WalletService>>,
    experience: Option<Arc<dyn ExperienceService>>,
    badges: Option<Arc<dyn BadgeService>>,
    recommender: Option<Arc<dyn DifficultyRecommender>>,
}

impl EconomyBuilder {
    /// Pass the required store
    pub fn store(mut self, store: Arc<dyn EconomyStore>) -> EconomyBuilder {
        self.store = Some(store);
        self
    }

    /// Use a [`SqlStore`] over `db`
    pub fn database(self, db: DatabaseConnection) -> EconomyBuilder {
        self.store(Arc::new(SqlStore::new(db)))
    }

    /// Defaults to [`SystemClock`]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> EconomyBuilder {
        self.clock = Some(clock);
        self
    }

    pub fn settings(mut self, settings: EconomySettings) -> EconomyBuilder {
        self.settings = settings;
        self
    }

    /// Replace the default badge catalog of the local badge service
    pub fn badge_catalog(mut self, catalog: Vec<BadgeDefinition>) -> EconomyBuilder {
        self.catalog = Some(catalog);
        self
    }

    pub fn wallet(mut self, wallet: Arc<dyn WalletService>) -> EconomyBuilder {
        self.wallet = Some(wallet);
        self
    }

    pub fn experience(mut self, experience: Arc<dyn ExperienceService>) -> EconomyBuilder {
        self.experience = Some(experience);
        self
    }

    pub fn badges(mut self, badges: Arc<dyn BadgeService>) -> EconomyBuilder {
        self.badges = Some(badges);
        self
    }

    pub fn recommender(mut self, recommender: Arc<dyn DifficultyRecommender>) -> EconomyBuilder {
        self.recommender = Some(recommender);
        self
    }

    /// Construct `Economy`, filling every service not passed in with its
    /// local implementation.
    pub fn build(self) -> ResultEconomy<Economy> {
        let store = self
            .store
            .ok_or_else(|| EconomyError::Validation("a store is required".to_string()))?;
        self.settings
            .validate()
            .map_err(|err| EconomyError::Validation(err.to_string()))?;
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let settings = self.settings;

        let wallet: Arc<dyn WalletService> = match self.wallet {
            Some(wallet) => wallet,
            None => Arc::new(LocalWallet::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                settings.wallet.clone(),
            )),
        };
        let experience: Arc<dyn ExperienceService> = match self.experience {
            Some(experience) => experience,
            None => Arc::new(LocalExperience::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                settings.experience.clone(),
            )),
        };
        let badges: Arc<dyn BadgeService> = match (self.badges, self.catalog) {
            (Some(badges), _) => badges,
            (None, Some(catalog)) => Arc::new(LocalBadges::with_catalog(
                Arc::clone(&store),
                Arc::clone(&clock),
                catalog,
            )),
            (None, None) => Arc::new(LocalBadges::new(Arc::clone(&store), Arc::clone(&clock))),
        };
        let recommender: Arc<dyn DifficultyRecommender> = match self.recommender {
            Some(recommender) => recommender,
            None => Arc::new(LocalRecommender::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                settings.recommender.clone(),
            )),
        };

        Ok(Economy {
            clock,
            settings,
            store,
            wallet,
            experience,
            badges,
            recommender,
            locks: ChildLocks::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_tiers() {
        assert_eq!(coins_for_grade(100), 20);
        assert_eq!(coins_for_grade(90), 20);
        assert_eq!(coins_for_grade(89), 15);
        assert_eq!(coins_for_grade(70), 10);
        assert_eq!(coins_for_grade(60), 5);
        assert_eq!(coins_for_grade(59), 2);
        assert_eq!(coins_for_grade(0), 2);
    }

    #[test]
    fn builder_requires_a_store() {
        let err = Economy::builder().build().unwrap_err();
        assert!(matches!(err, EconomyError::Validation(_)));
    }
}
