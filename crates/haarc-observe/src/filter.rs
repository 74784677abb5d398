//! Admission predicates and immutable filter-set snapshots

use haarc_core::RawEvent;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Groups predicates for shedding. Higher rank = more valuable, shed last.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterCategory {
    pub name: String,
    pub rank: u32,
}

impl FilterCategory {
    pub fn new(name: impl Into<String>, rank: u32) -> Self {
        Self {
            name: name.into(),
            rank,
        }
    }
}

/// A named admission predicate.
pub trait FilterPredicate: Send + Sync {
    fn name(&self) -> &str;

    fn category(&self) -> &FilterCategory;

    /// Pure check. Must not block.
    fn matches(&self, event: &RawEvent) -> bool;
}

/// Matches on the raw event's category tag.
pub struct CategoryPredicate {
    name: String,
    category: FilterCategory,
    event_category: String,
}

impl CategoryPredicate {
    pub fn new(
        name: impl Into<String>,
        category: FilterCategory,
        event_category: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            event_category: event_category.into(),
        }
    }
}

impl FilterPredicate for CategoryPredicate {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> &FilterCategory {
        &self.category
    }

    fn matches(&self, event: &RawEvent) -> bool {
        event.category == self.event_category
    }
}

pub struct OperationPrefixPredicate {
    name: String,
    category: FilterCategory,
    prefix: String,
}

impl OperationPrefixPredicate {
    pub fn new(name: impl Into<String>, category: FilterCategory, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category,
            prefix: prefix.into().to_ascii_uppercase(),
        }
    }
}

impl FilterPredicate for OperationPrefixPredicate {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> &FilterCategory {
        &self.category
    }

    fn matches(&self, event: &RawEvent) -> bool {
        event.operation.to_ascii_uppercase().starts_with(&self.prefix)
    }
}

pub struct FieldEqualsPredicate {
    name: String,
    category: FilterCategory,
    key: String,
    value: String,
}

impl FieldEqualsPredicate {
    pub fn new(
        name: impl Into<String>,
        category: FilterCategory,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            key: key.into(),
            value: value.into(),
        }
    }
}

impl FilterPredicate for FieldEqualsPredicate {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> &FilterCategory {
        &self.category
    }

    fn matches(&self, event: &RawEvent) -> bool {
        event.field(&self.key) == Some(self.value.as_str())
    }
}

/// Matches operation codes inside a range.
pub struct CodeRangePredicate {
    name: String,
    category: FilterCategory,
    range: RangeInclusive<u32>,
}

impl CodeRangePredicate {
    pub fn new(name: impl Into<String>, category: FilterCategory, range: RangeInclusive<u32>) -> Self {
        Self {
            name: name.into(),
            category,
            range,
        }
    }
}

impl FilterPredicate for CodeRangePredicate {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> &FilterCategory {
        &self.category
    }

    fn matches(&self, event: &RawEvent) -> bool {
        self.range.contains(&event.code.value())
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The enabled predicates at one point in time. Never mutated; the controller
/// swaps in a new set instead.
pub struct ActiveFilterSet {
    version: u64,
    predicates: Vec<Arc<dyn FilterPredicate>>,
    /// Distinct enabled categories, highest rank first
    categories: Vec<FilterCategory>,
}

impl ActiveFilterSet {
    pub fn new(version: u64, predicates: Vec<Arc<dyn FilterPredicate>>) -> Self {
        let mut categories: Vec<FilterCategory> = Vec::new();
        for p in &predicates {
            if !categories.iter().any(|c| c.name == p.category().name) {
                categories.push(p.category().clone());
            }
        }
        categories.sort_by(|a, b| b.rank.cmp(&a.rank).then_with(|| a.name.cmp(&b.name)));
        Self {
            version,
            predicates,
            categories,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// First predicate that admits the event, in registration order.
    pub fn first_match(&self, event: &RawEvent) -> Option<&dyn FilterPredicate> {
        self.predicates
            .iter()
            .find(|p| p.matches(event))
            .map(|p| &**p)
    }

    pub fn categories(&self) -> &[FilterCategory] {
        &self.categories
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    pub fn contains_category(&self, name: &str) -> bool {
        self.categories.iter().any(|c| c.name == name)
    }

    pub fn predicate_names(&self) -> Vec<&str> {
        self.predicates.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

impl std::fmt::Debug for ActiveFilterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveFilterSet")
            .field("version", &self.version)
            .field("predicates", &self.predicate_names())
            .field("categories", &self.categories)
            .finish()
    }
}
