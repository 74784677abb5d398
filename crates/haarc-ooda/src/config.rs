use crate::decide::Thresholds;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bound of the inbound queue and of the paused-event buffer
    pub queue_capacity: usize,
    /// Events decided per cycle
    pub batch_size: usize,
    /// Idle cycle period; capacity is refreshed even without events
    pub cycle_interval_ms: u64,
    /// Interval carried by Monitor decisions
    pub monitor_interval_ms: u64,
    pub history_cap: usize,
    /// Consecutive stale-capacity cycles before the engine raises an alert
    pub stale_alert_after: u32,
    /// Pending SpinWorker acts older than this are cancelled
    pub spin_stale_after_ms: u64,
    pub thresholds: Thresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            batch_size: 64,
            cycle_interval_ms: 500,
            monitor_interval_ms: 5_000,
            history_cap: 10_000,
            stale_alert_after: 2,
            spin_stale_after_ms: 30_000,
            thresholds: Thresholds::default(),
        }
    }
}

impl EngineConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms.max(1))
    }

    pub fn spin_stale_after(&self) -> Duration {
        Duration::from_millis(self.spin_stale_after_ms)
    }
}

/// How acts reach the provisioning API and the alert sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Profile requested for SpinWorker acts
    pub worker_profile: String,
    /// Budget for a single provisioning or alert call
    pub act_timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            worker_profile: "isolated-analyzer".into(),
            act_timeout_ms: 2_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl ProvisioningConfig {
    pub fn act_timeout(&self) -> Duration {
        Duration::from_millis(self.act_timeout_ms.max(1))
    }
}
