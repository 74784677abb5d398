//! haarc observe - adaptive admission of raw events
//!
//! Every raw event is addressed, then checked against the current
//! [`ActiveFilterSet`]. Matching events are scored by the classifier and
//! become [`ClassifiedEvent`]s; the rest are dropped. A rebalancer on its own
//! timer shrinks the filter set under sustained load and restores it when
//! load falls.

pub mod config;
pub mod controller;
pub mod event;
pub mod filter;
pub mod layer;

pub use config::{FilterEntry, FilterKind, ObserveConfig};
pub use controller::{spawn_rebalancer, FilterController, RebalanceAction, Watermarks};
pub use event::ClassifiedEvent;
pub use filter::{
    ActiveFilterSet, CategoryPredicate, CodeRangePredicate, FieldEqualsPredicate, FilterCategory,
    FilterPredicate, OperationPrefixPredicate,
};
pub use layer::{AdmissionCounts, AdmissionStats, ObservationLayer};
