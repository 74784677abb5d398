//! Observation layer configuration

use crate::filter::{
    CategoryPredicate, CodeRangePredicate, FieldEqualsPredicate, FilterCategory,
    FilterPredicate, OperationPrefixPredicate,
};
use haarc_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserveConfig {
    /// Per-event classifier budget.
    pub classifier_timeout_ms: u64,
    /// Load above this, sustained, sheds the lowest-ranked category.
    pub high_water: f64,
    /// Load below this, sustained, restores the last shed category.
    pub low_water: f64,
    /// Consecutive samples needed on either side of a mark.
    pub sustain_samples: u32,
    /// Rebalance timer period.
    pub rebalance_interval_ms: u64,
    pub filters: Vec<FilterEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterEntry {
    pub name: String,
    pub category: String,
    pub rank: u32,
    #[serde(flatten)]
    pub kind: FilterKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterKind {
    Category { equals: String },
    OperationPrefix { prefix: String },
    FieldEquals { key: String, value: String },
    CodeRange { start: u32, end: u32 },
}

impl Default for ObserveConfig {
    fn default() -> Self {
        Self {
            classifier_timeout_ms: 250,
            high_water: 0.85,
            low_water: 0.5,
            sustain_samples: 3,
            rebalance_interval_ms: 1_000,
            filters: default_filters(),
        }
    }
}

fn entry(name: &str, category: &str, rank: u32, kind: FilterKind) -> FilterEntry {
    FilterEntry {
        name: name.into(),
        category: category.into(),
        rank,
        kind,
    }
}

fn default_filters() -> Vec<FilterEntry> {
    vec![
        entry("intrusion", "critical", 100, FilterKind::Category { equals: "intrusion".into() }),
        entry("security-codes", "critical", 100, FilterKind::CodeRange { start: 0xE040, end: 0xE04F }),
        entry("anomaly", "anomaly", 50, FilterKind::Category { equals: "anomaly".into() }),
        entry("network-codes", "anomaly", 50, FilterKind::CodeRange { start: 0xE030, end: 0xE03F }),
        entry("audit", "audit", 20, FilterKind::Category { equals: "audit".into() }),
        entry("telemetry", "telemetry", 10, FilterKind::Category { equals: "telemetry".into() }),
    ]
}

impl ObserveConfig {
    pub fn classifier_timeout(&self) -> Duration {
        Duration::from_millis(self.classifier_timeout_ms)
    }

    pub fn rebalance_interval(&self) -> Duration {
        Duration::from_millis(self.rebalance_interval_ms.max(1))
    }

    /// Instantiate the configured predicates, in declaration order.
    pub fn build_predicates(&self) -> Result<Vec<Arc<dyn FilterPredicate>>> {
        let mut ranks: HashMap<&str, u32> = HashMap::new();
        let mut out: Vec<Arc<dyn FilterPredicate>> = Vec::with_capacity(self.filters.len());
        for f in &self.filters {
            if let Some(&rank) = ranks.get(f.category.as_str()) {
                if rank != f.rank {
                    return Err(Error::config(format!(
                        "filter '{}' gives category '{}' rank {}, already declared as {}",
                        f.name, f.category, f.rank, rank
                    )));
                }
            }
            ranks.insert(&f.category, f.rank);

            let category = FilterCategory::new(&f.category, f.rank);
            let predicate: Arc<dyn FilterPredicate> = match &f.kind {
                FilterKind::Category { equals } => {
                    Arc::new(CategoryPredicate::new(&f.name, category, equals))
                }
                FilterKind::OperationPrefix { prefix } => {
                    Arc::new(OperationPrefixPredicate::new(&f.name, category, prefix))
                }
                FilterKind::FieldEquals { key, value } => {
                    Arc::new(FieldEqualsPredicate::new(&f.name, category, key, value))
                }
                FilterKind::CodeRange { start, end } => {
                    if start > end {
                        return Err(Error::config(format!(
                            "filter '{}' has an empty code range",
                            f.name
                        )));
                    }
                    Arc::new(CodeRangePredicate::new(&f.name, category, *start..=*end))
                }
            };
            out.push(predicate);
        }
        Ok(out)
    }
}
