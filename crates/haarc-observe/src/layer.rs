//! The admission fast path

use crate::config::ObserveConfig;
use crate::controller::FilterController;
use crate::event::ClassifiedEvent;
use chrono::Utc;
use haarc_address::{AddressEngine, UniquenessToken};
use haarc_core::{Classifier, Error, RawEvent, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Lock-free admission counters.
#[derive(Debug, Default)]
pub struct AdmissionStats {
    admitted: AtomicU64,
    dropped: AtomicU64,
    classifier_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionCounts {
    pub admitted: u64,
    pub dropped: u64,
    pub classifier_failures: u64,
}

impl AdmissionStats {
    pub fn counts(&self) -> AdmissionCounts {
        AdmissionCounts {
            admitted: self.admitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            classifier_failures: self.classifier_failures.load(Ordering::Relaxed),
        }
    }
}

/// Addresses, filters and scores raw events. Safe to share across producers.
pub struct ObservationLayer {
    addresses: AddressEngine,
    filters: Arc<FilterController>,
    classifier: Arc<dyn Classifier>,
    classifier_timeout: Duration,
    stats: AdmissionStats,
}

impl ObservationLayer {
    pub fn new(
        addresses: AddressEngine,
        filters: Arc<FilterController>,
        classifier: Arc<dyn Classifier>,
        classifier_timeout: Duration,
    ) -> Self {
        Self {
            addresses,
            filters,
            classifier,
            classifier_timeout,
            stats: AdmissionStats::default(),
        }
    }

    pub fn from_config(
        config: &ObserveConfig,
        addresses: AddressEngine,
        classifier: Arc<dyn Classifier>,
    ) -> Result<Self> {
        let filters = Arc::new(FilterController::from_config(config)?);
        Ok(Self::new(addresses, filters, classifier, config.classifier_timeout()))
    }

    pub fn filters(&self) -> &Arc<FilterController> {
        &self.filters
    }

    pub fn stats(&self) -> AdmissionCounts {
        self.stats.counts()
    }

    /// Address the event, check it against the current filter set, and score
    /// it if admitted. `Ok(None)` means dropped.
    pub async fn admit(&self, raw: RawEvent) -> Result<Option<ClassifiedEvent>> {
        self.admit_with_seed(raw, &UniquenessToken::fresh()).await
    }

    /// [`admit`](Self::admit) with a caller-supplied uniqueness token.
    pub async fn admit_with_seed(
        &self,
        raw: RawEvent,
        token: &UniquenessToken,
    ) -> Result<Option<ClassifiedEvent>> {
        let address = self
            .addresses
            .generate(&raw.operation, &raw.context, token.as_bytes())?;

        let filters = self.filters.snapshot();
        let admitted_by = match filters.first_match(&raw) {
            Some(p) => p.name().to_string(),
            None => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Dropped {} ({}) under filter set v{}",
                    raw.operation,
                    raw.category,
                    filters.version()
                );
                return Ok(None);
            }
        };
        drop(filters);

        let threat_score = self.score(&raw).await;
        self.stats.admitted.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Admitted {} via {} (threat {:.2})",
            address, admitted_by, threat_score
        );

        Ok(Some(ClassifiedEvent {
            address,
            operation: raw.code,
            operation_name: raw.operation,
            category: raw.category,
            threat_score,
            arrival_time: Utc::now(),
            admitted_by,
            fields: raw.fields,
        }))
    }

    /// Classifier failures and timeouts score 0.0 so a cycle never stalls on
    /// a non-answer.
    async fn score(&self, raw: &RawEvent) -> f64 {
        let outcome = match tokio::time::timeout(self.classifier_timeout, self.classifier.score(raw)).await
        {
            Ok(result) => result,
            Err(_) => Err(Error::ClassifierTimeout(self.classifier_timeout.as_millis() as u64)),
        };
        match outcome {
            Ok(score) if score.is_nan() => {
                warn!("Classifier returned NaN for {}; scoring 0", raw.operation);
                0.0
            }
            Ok(score) => score.clamp(0.0, 1.0),
            Err(e) => {
                self.stats.classifier_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Classifier failed for {}: {}; scoring 0", raw.operation, e);
                0.0
            }
        }
    }
}
