use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    Clock, EconomyError, Experience, LevelUpOutcome, ResultEconomy, XpSource, XpTransaction,
    locks::ChildLocks,
    settings::ExperienceSettings,
    store::EconomyStore,
    util::{normalize_child_id, require_positive},
};

#[async_trait]
pub trait ExperienceService: Send + Sync + Debug {
    /// Add XP. Returns the level-up when a threshold was crossed. The
    /// level-up bonus is only reported; paying it is up to the caller.
    /// A replayed `xp_tx_id` changes nothing and returns `None`.
    async fn award(
        &self,
        child_id: &str,
        amount: i64,
        source: XpSource,
        xp_tx_id: Option<Uuid>,
    ) -> ResultEconomy<Option<LevelUpOutcome>>;

    async fn experience(&self, child_id: &str) -> ResultEconomy<Experience>;

    /// Newest first.
    async fn history(&self, child_id: &str, limit: u64) -> ResultEconomy<Vec<XpTransaction>>;
}

#[derive(Debug, Clone)]
pub struct LocalExperience {
    store: Arc<dyn EconomyStore>,
    clock: Arc<dyn Clock>,
    settings: ExperienceSettings,
    locks: Arc<ChildLocks>,
}

impl LocalExperience {
    pub fn new(
        store: Arc<dyn EconomyStore>,
        clock: Arc<dyn Clock>,
        settings: ExperienceSettings,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
            locks: Arc::new(ChildLocks::new()),
        }
    }
}

#[async_trait]
impl ExperienceService for LocalExperience {
    async fn award(
        &self,
        child_id: &str,
        amount: i64,
        source: XpSource,
        xp_tx_id: Option<Uuid>,
    ) -> ResultEconomy<Option<LevelUpOutcome>> {
        let child_id = normalize_child_id(child_id)?;
        require_positive(amount, "xp amount")?;
        let _guard = self.locks.lock(&child_id).await;
        if let Some(id) = xp_tx_id
            && self.store.xp_transaction_exists(id).await?
        {
            tracing::debug!("xp award {id} replayed for {child_id}");
            return Ok(None);
        }

        let now = self.clock.now();
        let current = self.experience(&child_id).await?;
        let total = current
            .total_xp_earned
            .checked_add(amount)
            .ok_or_else(|| EconomyError::Validation(format!("xp total overflow for {child_id}")))?;
        let updated = Experience::from_total(child_id.as_str(), total, self.settings.max_level, now);
        let xp_tx = XpTransaction {
            id: xp_tx_id.unwrap_or_else(Uuid::new_v4),
            child_id: child_id.clone(),
            amount,
            source,
            description: source.as_str().replace('_', " "),
            timestamp: now,
        };

        match self.store.commit_xp(&xp_tx, &updated).await {
            Ok(()) => {}
            Err(EconomyError::DuplicateTransaction(id)) => {
                tracing::debug!("xp award {id} replayed for {child_id}");
                return Ok(None);
            }
            Err(err) => return Err(err),
        }

        if updated.level <= current.level {
            return Ok(None);
        }
        tracing::info!(
            "{child_id} reached level {} (from {})",
            updated.level,
            current.level
        );
        Ok(Some(LevelUpOutcome {
            child_id,
            previous_level: current.level,
            new_level: updated.level,
            bonus_coins: self.settings.level_up_bonus_coins,
            timestamp: now,
        }))
    }

    async fn experience(&self, child_id: &str) -> ResultEconomy<Experience> {
        let child_id = normalize_child_id(child_id)?;
        match self
            .store
            .load_experience(&child_id, self.settings.max_level)
            .await?
        {
            Some(experience) => Ok(experience),
            None => Ok(Experience::new(child_id, self.clock.now())),
        }
    }

    async fn history(&self, child_id: &str, limit: u64) -> ResultEconomy<Vec<XpTransaction>> {
        let child_id = normalize_child_id(child_id)?;
        self.store.xp_history(&child_id, limit).await
    }
}
