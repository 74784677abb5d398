//! haarc configuration
//!
//! One TOML file with a section per component. Every section and field has a
//! default, so a missing file or an empty one gives a working setup.

use haarc_address::AddressConfig;
use haarc_dispatch::DispatchConfig;
use haarc_observe::ObserveConfig;
use haarc_ooda::{EngineConfig, ProvisioningConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HaarcConfig {
    /// Hash seeds for the three address segments.
    pub address: AddressConfig,
    /// Code-range routing table. Empty `routes` means the built-in catalog.
    pub dispatch: DispatchConfig,
    /// Admission filters and load-shedding watermarks.
    pub observe: ObserveConfig,
    /// Decision cycle and thresholds.
    pub engine: EngineConfig,
    /// Worker provisioning and act retries.
    pub provisioning: ProvisioningConfig,
    /// Synthetic collaborators used by `haarc run`.
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Synthetic events produced per second.
    pub events_per_sec: u32,
    /// Share of events drawn from the intrusion category.
    pub intrusion_ratio: f64,
    /// Probability that a provisioning call fails.
    pub provision_failure_rate: f64,
    /// Probability that a capacity snapshot fails.
    pub capacity_failure_rate: f64,
    /// Upper bound on simulated collaborator latency.
    pub max_latency_ms: u64,
    pub worker_ceiling: u32,
    /// RNG seed; unset draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            events_per_sec: 50,
            intrusion_ratio: 0.15,
            provision_failure_rate: 0.1,
            capacity_failure_rate: 0.02,
            max_latency_ms: 150,
            worker_ceiling: 8,
            seed: None,
        }
    }
}

impl HaarcConfig {
    /// Load from a TOML file, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}; using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Strict variant of [`load`](Self::load): a present but malformed file
    /// is an error.
    pub fn load_strict(path: &Path) -> haarc_core::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
