//! Filter-set controller: atomic snapshot swap plus load-driven shedding
//!
//! Admission reads take a read lock only long enough to clone the current
//! `Arc<ActiveFilterSet>`; rebalancing builds the replacement set outside
//! the lock and takes the write lock only for the pointer swap.

use crate::config::ObserveConfig;
use crate::filter::{ActiveFilterSet, FilterCategory, FilterPredicate};
use haarc_core::{Error, LoadSample, LoadSource, Result};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Hysteresis marks for shedding and restoring categories.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Watermarks {
    pub high: f64,
    pub low: f64,
    pub sustain_samples: u32,
}

impl Watermarks {
    pub fn new(high: f64, low: f64, sustain_samples: u32) -> Result<Self> {
        if !(0.0..=1.0).contains(&low) || !(0.0..=1.0).contains(&high) || low >= high {
            return Err(Error::config(format!(
                "watermarks need 0 <= low < high <= 1, got low={low} high={high}"
            )));
        }
        if sustain_samples == 0 {
            return Err(Error::config("sustain_samples must be at least 1"));
        }
        Ok(Self {
            high,
            low,
            sustain_samples,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RebalanceAction {
    Unchanged,
    Shed { category: String },
    Restored { category: String },
}

#[derive(Default)]
struct PolicyState {
    high_streak: u32,
    low_streak: u32,
    /// Shed categories, most recent last
    disabled: Vec<String>,
    version: u64,
}

pub struct FilterController {
    /// Every configured predicate, enabled or not
    all: Vec<Arc<dyn FilterPredicate>>,
    /// Distinct categories, lowest rank first
    categories: Vec<FilterCategory>,
    active: RwLock<Arc<ActiveFilterSet>>,
    policy: Mutex<PolicyState>,
    marks: Watermarks,
}

impl FilterController {
    pub fn new(predicates: Vec<Arc<dyn FilterPredicate>>, marks: Watermarks) -> Self {
        let mut categories: Vec<FilterCategory> = Vec::new();
        for p in &predicates {
            if !categories.iter().any(|c| c.name == p.category().name) {
                categories.push(p.category().clone());
            }
        }
        categories.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| b.name.cmp(&a.name)));

        let initial = Arc::new(ActiveFilterSet::new(0, predicates.clone()));
        Self {
            all: predicates,
            categories,
            active: RwLock::new(initial),
            policy: Mutex::new(PolicyState::default()),
            marks,
        }
    }

    pub fn from_config(config: &ObserveConfig) -> Result<Self> {
        let marks = Watermarks::new(config.high_water, config.low_water, config.sustain_samples)?;
        Ok(Self::new(config.build_predicates()?, marks))
    }

    /// The set admission should evaluate against. Cheap: one `Arc` clone.
    pub fn snapshot(&self) -> Arc<ActiveFilterSet> {
        self.active.read().clone()
    }

    pub fn watermarks(&self) -> Watermarks {
        self.marks
    }

    /// Categories currently shed, oldest first.
    pub fn disabled_categories(&self) -> Vec<String> {
        self.policy.lock().disabled.clone()
    }

    /// Feed one load sample through the shedding policy.
    ///
    /// At most one category changes per call. The highest-ranked tier is
    /// never shed.
    pub fn rebalance(&self, load: LoadSample) -> RebalanceAction {
        let mut policy = self.policy.lock();

        if load.load > self.marks.high {
            policy.high_streak += 1;
            policy.low_streak = 0;
        } else if load.load < self.marks.low {
            policy.low_streak += 1;
            policy.high_streak = 0;
        } else {
            policy.high_streak = 0;
            policy.low_streak = 0;
            return RebalanceAction::Unchanged;
        }

        let action = if policy.high_streak >= self.marks.sustain_samples {
            policy.high_streak = 0;
            match self.next_to_shed(&policy.disabled) {
                Some(name) => {
                    policy.disabled.push(name.clone());
                    RebalanceAction::Shed { category: name }
                }
                None => RebalanceAction::Unchanged,
            }
        } else if policy.low_streak >= self.marks.sustain_samples {
            policy.low_streak = 0;
            match policy.disabled.pop() {
                Some(name) => RebalanceAction::Restored { category: name },
                None => RebalanceAction::Unchanged,
            }
        } else {
            RebalanceAction::Unchanged
        };

        if action != RebalanceAction::Unchanged {
            policy.version += 1;
            let enabled: Vec<Arc<dyn FilterPredicate>> = self
                .all
                .iter()
                .filter(|p| !policy.disabled.iter().any(|d| *d == p.category().name))
                .cloned()
                .collect();
            let next = Arc::new(ActiveFilterSet::new(policy.version, enabled));
            info!(
                "Filter set v{} after {:?} at load {:.2}: {} categories",
                next.version(),
                action,
                load.load,
                next.category_count()
            );
            *self.active.write() = next;
        } else {
            debug!(
                "Rebalance: load {:.2}, high streak {}, low streak {}",
                load.load, policy.high_streak, policy.low_streak
            );
        }
        action
    }

    fn next_to_shed(&self, disabled: &[String]) -> Option<String> {
        let top_rank = self.categories.last()?.rank;
        self.categories
            .iter()
            .filter(|c| c.rank < top_rank)
            .find(|c| !disabled.contains(&c.name))
            .map(|c| c.name.clone())
    }
}

/// Run `rebalance` on a fixed timer until cancelled.
pub fn spawn_rebalancer(
    controller: Arc<FilterController>,
    source: Arc<dyn LoadSource>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Rebalancer started ({:?} period)", period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    controller.rebalance(source.sample());
                }
                _ = cancel.cancelled() => break,
            }
        }
        info!("Rebalancer stopped");
    })
}
