//! Capability traits of the engine, each with one local implementation.
//!
//! Callers hold the traits behind `Arc<dyn ...>`; a remote implementation can
//! replace any of the local ones without touching the orchestrator.

mod badges;
mod experience;
mod recommender;
mod wallet;

pub use badges::{BadgeService, LocalBadges};
pub use experience::{ExperienceService, LocalExperience};
pub(crate) use recommender::normalize_subject;
pub use recommender::{
    DifficultyRecommendation, DifficultyRecommender, LocalRecommender, MIN_TASKS_FOR_ANALYSIS,
    PerformanceStats, STATS_HISTORY_LIMIT, confidence_for, predict_from_stats,
    recommend_from_window,
};
pub use wallet::{BalanceChange, GameEarningOutcome, LocalWallet, WalletService, discounted_cost};
