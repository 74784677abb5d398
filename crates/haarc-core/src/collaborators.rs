//! Collaborator traits - the external systems the core calls out to
//!
//! Implementations live outside the core. The core treats every call as
//! opaque, possibly slow and possibly failing, and applies its own timeouts.

use crate::error::Result;
use crate::types::{
    Ack, AlertPayload, CapacitySnapshot, LoadSample, RawEvent, WorkerHandle, WorkerSpec,
};

/// Supplies `threat_score` for admitted events.
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    /// Score in `[0, 1]`. Out-of-range values are clamped by the caller.
    async fn score(&self, event: &RawEvent) -> Result<f64>;
}

/// Live utilization figures. Called once per decision cycle, so it must be cheap.
pub trait CapacitySource: Send + Sync {
    fn snapshot(&self) -> Result<CapacitySnapshot>;
}

/// Provisions isolated workers for SpinWorker decisions.
#[async_trait::async_trait]
pub trait Provisioner: Send + Sync {
    async fn spin(&self, spec: &WorkerSpec) -> Result<WorkerHandle>;
}

/// Receives Alert decisions and failure escalations.
#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, payload: &AlertPayload) -> Result<Ack>;
}

/// Ingest load readings for admission rebalancing.
pub trait LoadSource: Send + Sync {
    fn sample(&self) -> LoadSample;
}

/// Scores every event with the same value. Useful as a stand-in classifier.
pub struct FixedClassifier(pub f64);

#[async_trait::async_trait]
impl Classifier for FixedClassifier {
    async fn score(&self, _event: &RawEvent) -> Result<f64> {
        Ok(self.0)
    }
}
