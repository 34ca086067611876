//! Economy and progression engine for a children's learning app.
//!
//! The crate keeps an append-only coin ledger with cached balances and
//! age-based daily earning caps, an XP/level curve, badges with progress
//! counters, and an adaptive difficulty recommender. [`Economy`] ties them
//! together: one call per learning event, with follow-up rewards applied
//! through a bounded chain and every step keyed for safe retries.

pub use badge_progress::BadgeProgress;
pub use badges::{
    Badge, BadgeCategory, BadgeDefinition, BadgeRarity, BadgeRewards, BadgeStats, BadgeTrigger,
    default_catalog,
};
pub use balances::{
    AgeGroup, Balance, DAILY_CAP_3_TO_5, DAILY_CAP_6_TO_8, DAILY_CAP_9_TO_12, cap_for_age,
};
pub use clock::{Clock, ManualClock, SystemClock, local_day};
pub use commands::{CoinAward, SpendCmd, TaskCompletion, XpAward};
pub use error::EconomyError;
pub use experience::{
    Experience, LevelUpOutcome, XpSource, level_from_total_xp, xp_for_next_level,
    xp_required_for_level,
};
pub use ledger::{LEDGER_PAGE_SIZE, Ledger, LedgerAudit, LedgerRange};
pub use locks::{ChildGuard, ChildLocks};
pub use orchestrator::{
    Economy, EconomyBuilder, FailedStep, MAX_REWARD_HOPS, OrchestrationResult, coins_for_grade,
};
pub use services::{
    BadgeService, BalanceChange, DifficultyRecommendation, DifficultyRecommender,
    ExperienceService, GameEarningOutcome, LocalBadges, LocalExperience, LocalRecommender,
    LocalWallet, MIN_TASKS_FOR_ANALYSIS, PerformanceStats, STATS_HISTORY_LIMIT, WalletService,
    confidence_for, discounted_cost, predict_from_stats, recommend_from_window,
};
pub use settings::{
    EconomySettings, ExperienceSettings, OrchestratorSettings, RecommenderSettings,
    WalletSettings,
};
pub use store::{EconomyStore, LedgerPageQuery, SqlStore, SqlStoreBuilder};
pub use summary::{DailyActivity, TransactionSummary};
pub use task_results::{MAX_DIFFICULTY, MIN_DIFFICULTY, TaskResult};
pub use transactions::{Transaction, TransactionCategory};
pub use xp_transactions::XpTransaction;

mod badge_progress;
mod badges;
mod balances;
mod clock;
mod commands;
mod error;
mod experience;
mod ledger;
mod locks;
mod orchestrator;
mod services;
mod settings;
mod store;
mod summary;
mod task_results;
mod transactions;
mod util;
mod xp_transactions;

pub type ResultEconomy<T> = Result<T, EconomyError>;
