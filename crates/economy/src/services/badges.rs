use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    Badge, BadgeDefinition, BadgeProgress, BadgeStats, Clock, EconomyError, ResultEconomy,
    badges::{default_catalog, sort_for_display},
    locks::ChildLocks,
    store::EconomyStore,
    util::normalize_child_id,
};

#[async_trait]
pub trait BadgeService: Send + Sync + Debug {
    /// Move a badge forward by `delta` steps. Returns the badge minted when
    /// this call completes it. Earned badges are left untouched.
    ///
    /// `event_id` keys the increment: a replayed id changes nothing and
    /// returns `None`. Without it every call counts.
    async fn increment_progress(
        &self,
        child_id: &str,
        badge_id: &str,
        delta: u32,
        event_id: Option<Uuid>,
    ) -> ResultEconomy<Option<Badge>>;

    /// Mint a badge regardless of progress. `AlreadyEarned` when held.
    async fn award_direct(&self, child_id: &str, badge_id: &str) -> ResultEconomy<Badge>;

    /// Earned badges, rarest first, newest first inside a rarity.
    async fn badges(&self, child_id: &str) -> ResultEconomy<Vec<Badge>>;

    /// Open progress counters.
    async fn progress(&self, child_id: &str) -> ResultEconomy<Vec<BadgeProgress>>;

    async fn stats(&self, child_id: &str) -> ResultEconomy<BadgeStats>;

    fn definitions(&self) -> &[BadgeDefinition];

    fn definition(&self, badge_id: &str) -> ResultEconomy<&BadgeDefinition> {
        self.definitions()
            .iter()
            .find(|d| d.id == badge_id)
            .ok_or_else(|| EconomyError::KeyNotFound(format!("badge {badge_id}")))
    }
}

#[derive(Debug, Clone)]
pub struct LocalBadges {
    store: Arc<dyn EconomyStore>,
    clock: Arc<dyn Clock>,
    catalog: Vec<BadgeDefinition>,
    locks: Arc<ChildLocks>,
}

impl LocalBadges {
    /// Badge service over the default catalog.
    pub fn new(store: Arc<dyn EconomyStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_catalog(store, clock, default_catalog())
    }

    pub fn with_catalog(
        store: Arc<dyn EconomyStore>,
        clock: Arc<dyn Clock>,
        catalog: Vec<BadgeDefinition>,
    ) -> Self {
        Self {
            store,
            clock,
            catalog,
            locks: Arc::new(ChildLocks::new()),
        }
    }

    async fn mint(
        &self,
        child_id: &str,
        definition: &BadgeDefinition,
        event_id: Option<Uuid>,
    ) -> ResultEconomy<Badge> {
        let badge = Badge::mint(child_id, definition, self.clock.now());
        self.store.mint_badge(&badge, event_id).await?;
        tracing::info!(
            "{child_id} earned badge {} ({})",
            definition.id,
            definition.rarity.as_str()
        );
        Ok(badge)
    }
}

#[async_trait]
impl BadgeService for LocalBadges {
    async fn increment_progress(
        &self,
        child_id: &str,
        badge_id: &str,
        delta: u32,
        event_id: Option<Uuid>,
    ) -> ResultEconomy<Option<Badge>> {
        let child_id = normalize_child_id(child_id)?;
        if delta == 0 {
            return Err(EconomyError::Validation(
                "progress delta must be > 0".to_string(),
            ));
        }
        let definition = self.definition(badge_id)?;
        let _guard = self.locks.lock(&child_id).await;
        if let Some(id) = event_id
            && self.store.badge_event_exists(id).await?
        {
            tracing::debug!("progress {id} on {badge_id} replayed for {child_id}");
            return Ok(None);
        }
        if self.store.has_badge(&child_id, badge_id).await? {
            return Ok(None);
        }

        let now = self.clock.now();
        let target = definition.target.unwrap_or(1);
        let mut progress = match self.store.load_badge_progress(&child_id, badge_id).await? {
            Some(progress) => progress,
            None => BadgeProgress::new(child_id.as_str(), badge_id, target, now),
        };
        progress.target_progress = target;
        progress.advance(delta, now);

        if !progress.is_completed() {
            return match self.store.save_badge_progress(&progress, event_id).await {
                Ok(()) | Err(EconomyError::DuplicateTransaction(_)) => Ok(None),
                Err(err) => Err(err),
            };
        }
        match self.mint(&child_id, definition, event_id).await {
            Ok(badge) => Ok(Some(badge)),
            Err(EconomyError::AlreadyEarned(_) | EconomyError::DuplicateTransaction(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn award_direct(&self, child_id: &str, badge_id: &str) -> ResultEconomy<Badge> {
        let child_id = normalize_child_id(child_id)?;
        let definition = self.definition(badge_id)?;
        let _guard = self.locks.lock(&child_id).await;
        if self.store.has_badge(&child_id, badge_id).await? {
            return Err(EconomyError::AlreadyEarned(badge_id.to_string()));
        }
        self.mint(&child_id, definition, None).await
    }

    async fn badges(&self, child_id: &str) -> ResultEconomy<Vec<Badge>> {
        let child_id = normalize_child_id(child_id)?;
        let mut badges = self.store.load_badges(&child_id).await?;
        sort_for_display(&mut badges);
        Ok(badges)
    }

    async fn progress(&self, child_id: &str) -> ResultEconomy<Vec<BadgeProgress>> {
        let child_id = normalize_child_id(child_id)?;
        self.store.all_badge_progress(&child_id).await
    }

    async fn stats(&self, child_id: &str) -> ResultEconomy<BadgeStats> {
        let child_id = normalize_child_id(child_id)?;
        let badges = self.store.load_badges(&child_id).await?;
        Ok(BadgeStats::from_badges(&child_id, &badges))
    }

    fn definitions(&self) -> &[BadgeDefinition] {
        &self.catalog
    }
}
