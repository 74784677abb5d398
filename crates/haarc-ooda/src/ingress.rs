//! Producer-side entry: admit a raw event and queue it for a decision

use crate::engine::EngineHandle;
use haarc_core::{Error, RawEvent, Result};
use haarc_observe::ObservationLayer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    /// Admitted and queued for the next cycle
    Queued,
    /// No active filter matched
    Dropped,
    /// Admitted, but the decision queue was full
    Shed,
}

/// Cheap to clone; safe to call from any number of producer tasks.
#[derive(Clone)]
pub struct Ingress {
    layer: Arc<ObservationLayer>,
    engine: EngineHandle,
}

impl Ingress {
    pub fn new(layer: Arc<ObservationLayer>, engine: EngineHandle) -> Self {
        Self { layer, engine }
    }

    pub fn layer(&self) -> &Arc<ObservationLayer> {
        &self.layer
    }

    /// Never blocks on the decision queue. Address errors and a closed
    /// engine are returned; a full queue is reported as [`Admission::Shed`].
    pub async fn offer(&self, raw: RawEvent) -> Result<Admission> {
        let Some(event) = self.layer.admit(raw).await? else {
            return Ok(Admission::Dropped);
        };
        match self.engine.submit(event) {
            Ok(()) => Ok(Admission::Queued),
            Err(Error::QueueFull) => Ok(Admission::Shed),
            Err(e) => Err(e),
        }
    }
}
