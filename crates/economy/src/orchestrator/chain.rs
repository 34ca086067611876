use std::collections::VecDeque;

use uuid::Uuid;

use crate::{TransactionCategory, XpSource};

/// Longest allowed cascade of reward effects. Hop 0 is the direct effect of
/// a request; an effect triggered at hop `n` runs at hop `n + 1`. Effects
/// past this hop are dropped and counted.
pub const MAX_REWARD_HOPS: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RewardEffect {
    Coins {
        amount: i64,
        category: TransactionCategory,
        description: String,
        tx_id: Uuid,
    },
    Xp {
        amount: i64,
        source: XpSource,
        xp_tx_id: Uuid,
    },
    BadgeProgress {
        badge_id: String,
        delta: u32,
        event_id: Uuid,
    },
    AwardBadge {
        badge_id: String,
    },
}

impl RewardEffect {
    pub(crate) fn label(&self) -> String {
        match self {
            Self::Coins { category, .. } => format!("credit {category}"),
            Self::Xp { source, .. } => format!("award xp {}", source.as_str()),
            Self::BadgeProgress { badge_id, .. } => format!("progress badge {badge_id}"),
            Self::AwardBadge { badge_id } => format!("award badge {badge_id}"),
        }
    }
}

/// FIFO of pending effects tagged with their hop.
#[derive(Debug, Default)]
pub(crate) struct RewardChain {
    queue: VecDeque<(usize, RewardEffect)>,
    suppressed: usize,
}

impl RewardChain {
    pub(crate) fn push(&mut self, hop: usize, effect: RewardEffect) {
        if hop > MAX_REWARD_HOPS {
            tracing::warn!(
                "reward chain bound reached, dropping {} at hop {hop}",
                effect.label()
            );
            self.suppressed += 1;
            return;
        }
        self.queue.push_back((hop, effect));
    }

    pub(crate) fn pop(&mut self) -> Option<(usize, RewardEffect)> {
        self.queue.pop_front()
    }

    pub(crate) fn suppressed(&self) -> usize {
        self.suppressed
    }
}

/// Stable id for an effect derived from `parent`, so a retried request
/// replays instead of paying twice.
pub(crate) fn derived_id(parent: Uuid, purpose: &str) -> Uuid {
    Uuid::new_v5(&parent, purpose.as_bytes())
}

/// Key of the progress a request adds to `badge_id`.
pub(crate) fn progress_id(parent: Uuid, badge_id: &str) -> Uuid {
    derived_id(parent, &format!("progress:{badge_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(badge_id: &str) -> RewardEffect {
        RewardEffect::BadgeProgress {
            badge_id: badge_id.to_string(),
            delta: 1,
            event_id: Uuid::nil(),
        }
    }

    #[test]
    fn effects_past_the_bound_are_counted_not_queued() {
        let mut chain = RewardChain::default();
        chain.push(0, progress("a"));
        chain.push(MAX_REWARD_HOPS, progress("b"));
        chain.push(MAX_REWARD_HOPS + 1, progress("c"));

        assert_eq!(chain.suppressed(), 1);
        assert_eq!(chain.pop(), Some((0, progress("a"))));
        assert_eq!(chain.pop(), Some((MAX_REWARD_HOPS, progress("b"))));
        assert_eq!(chain.pop(), None);
    }

    #[test]
    fn derived_ids_are_stable() {
        let task = Uuid::new_v4();
        assert_eq!(derived_id(task, "coins"), derived_id(task, "coins"));
        assert_ne!(derived_id(task, "coins"), derived_id(task, "xp"));
        assert_ne!(progress_id(task, "math_whiz"), progress_id(task, "task_master"));
        assert_eq!(progress_id(task, "bookworm"), progress_id(task, "bookworm"));
    }
}
