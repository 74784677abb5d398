//! Synthetic collaborators for `haarc run`
//!
//! Stand-ins for the classifier, capacity metrics, the provisioning API, the
//! alert sink and the ingest load gauge, plus a random event source. All of
//! them share one seeded RNG so a run with a fixed seed is reproducible up
//! to task scheduling.

use crate::config::SimulationConfig;
use async_trait::async_trait;
use chrono::Utc;
use haarc_core::{
    Ack, AlertPayload, AlertSink, CapacitySnapshot, CapacitySource, Classifier, ContextRecord,
    Error, LoadSample, LoadSource, Provisioner, RawEvent, Result, WorkerHandle, WorkerSpec,
};
use haarc_dispatch::Primitive;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Event categories the simulator draws from, besides intrusion.
const BACKGROUND_CATEGORIES: [&str; 4] = ["anomaly", "audit", "telemetry", "chatter"];

type SharedRng = Arc<Mutex<StdRng>>;

fn chance(rng: &SharedRng, p: f64) -> bool {
    rng.lock().gen_bool(p.clamp(0.0, 1.0))
}

fn latency(rng: &SharedRng, max_ms: u64) -> Duration {
    Duration::from_millis(rng.lock().gen_range(0..=max_ms))
}

/// The simulated world: shared RNG and the worker pool the provisioner fills.
pub struct SimWorld {
    config: SimulationConfig,
    rng: SharedRng,
    workers: Arc<AtomicU32>,
}

impl SimWorld {
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng: Arc::new(Mutex::new(rng)),
            workers: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn classifier(&self) -> Arc<HeuristicClassifier> {
        Arc::new(HeuristicClassifier {
            rng: self.rng.clone(),
            max_latency_ms: self.config.max_latency_ms / 4,
        })
    }

    pub fn capacity(&self) -> Arc<SimCapacity> {
        Arc::new(SimCapacity {
            rng: self.rng.clone(),
            workers: self.workers.clone(),
            ceiling: self.config.worker_ceiling,
            failure_rate: self.config.capacity_failure_rate,
            utilization: Mutex::new((0.35, 0.4)),
        })
    }

    pub fn provisioner(&self) -> Arc<SimProvisioner> {
        Arc::new(SimProvisioner {
            rng: self.rng.clone(),
            workers: self.workers.clone(),
            failure_rate: self.config.provision_failure_rate,
            max_latency_ms: self.config.max_latency_ms,
            spawned: AtomicU64::new(0),
        })
    }

    pub fn alerts(&self) -> Arc<LogAlertSink> {
        Arc::new(LogAlertSink::default())
    }

    pub fn load(&self) -> Arc<SimLoad> {
        Arc::new(SimLoad {
            rng: self.rng.clone(),
            level: Mutex::new(0.4),
        })
    }

    pub fn events(&self) -> EventSource {
        EventSource {
            rng: self.rng.clone(),
            intrusion_ratio: self.config.intrusion_ratio,
        }
    }

    pub fn active_workers(&self) -> u32 {
        self.workers.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Scores by category with noise: intrusion high, anomaly middling, the rest low.
pub struct HeuristicClassifier {
    rng: SharedRng,
    max_latency_ms: u64,
}

#[async_trait]
impl Classifier for HeuristicClassifier {
    async fn score(&self, event: &RawEvent) -> Result<f64> {
        tokio::time::sleep(latency(&self.rng, self.max_latency_ms)).await;
        let (low, high) = match event.category.as_str() {
            "intrusion" => (0.55, 1.0),
            "anomaly" => (0.3, 0.85),
            _ => (0.0, 0.45),
        };
        Ok(self.rng.lock().gen_range(low..high))
    }
}

// ---------------------------------------------------------------------------
// Capacity
// ---------------------------------------------------------------------------

pub struct SimCapacity {
    rng: SharedRng,
    workers: Arc<AtomicU32>,
    ceiling: u32,
    failure_rate: f64,
    /// (cpu, memory) random walk
    utilization: Mutex<(f64, f64)>,
}

impl CapacitySource for SimCapacity {
    fn snapshot(&self) -> Result<CapacitySnapshot> {
        if chance(&self.rng, self.failure_rate) {
            return Err(Error::CapacityUnavailable("metrics scrape timed out".into()));
        }

        // Workers finish their analysis and retire now and then
        let active = self.workers.load(Ordering::Relaxed);
        if active > 0 && chance(&self.rng, 0.2) {
            self.workers.fetch_sub(1, Ordering::Relaxed);
        }
        let active = self.workers.load(Ordering::Relaxed);

        let mut util = self.utilization.lock();
        let mut rng = self.rng.lock();
        let worker_load = active as f64 * 0.05;
        util.0 = (util.0 + rng.gen_range(-0.08..0.08)).clamp(0.05, 0.95);
        util.1 = (util.1 + rng.gen_range(-0.05..0.05)).clamp(0.1, 0.9);
        Ok(CapacitySnapshot::new(
            (util.0 + worker_load).min(1.0),
            util.1,
            active,
            self.ceiling,
        ))
    }
}

// ---------------------------------------------------------------------------
// Provisioning
// ---------------------------------------------------------------------------

pub struct SimProvisioner {
    rng: SharedRng,
    workers: Arc<AtomicU32>,
    failure_rate: f64,
    max_latency_ms: u64,
    spawned: AtomicU64,
}

#[async_trait]
impl Provisioner for SimProvisioner {
    async fn spin(&self, spec: &WorkerSpec) -> Result<WorkerHandle> {
        tokio::time::sleep(latency(&self.rng, self.max_latency_ms)).await;
        if chance(&self.rng, self.failure_rate) {
            return Err(Error::ProvisioningFailure(format!(
                "no host accepted profile '{}'",
                spec.profile
            )));
        }
        self.workers.fetch_add(1, Ordering::Relaxed);
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        let id = format!("{}-{:04}", spec.profile, n);
        debug!("Provisioned {} for {}", id, spec.trigger);
        Ok(WorkerHandle {
            id,
            started_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// Writes alerts to the log and counts them.
#[derive(Default)]
pub struct LogAlertSink {
    sent: AtomicU64,
}

impl LogAlertSink {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn notify(&self, payload: &AlertPayload) -> Result<Ack> {
        let n = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            "ALERT [{:?}] {}{}",
            payload.severity,
            payload.message,
            payload
                .subject
                .as_deref()
                .map(|s| format!(" subject={s}"))
                .unwrap_or_default()
        );
        Ok(Ack {
            id: format!("log-{n}"),
        })
    }
}

// ---------------------------------------------------------------------------
// Load and events
// ---------------------------------------------------------------------------

pub struct SimLoad {
    rng: SharedRng,
    level: Mutex<f64>,
}

impl LoadSource for SimLoad {
    fn sample(&self) -> LoadSample {
        let mut level = self.level.lock();
        *level = (*level + self.rng.lock().gen_range(-0.15..0.15)).clamp(0.0, 1.0);
        LoadSample::new(*level)
    }
}

/// Random raw events across the primitive catalog.
pub struct EventSource {
    rng: SharedRng,
    intrusion_ratio: f64,
}

impl EventSource {
    pub fn next_event(&self) -> RawEvent {
        let mut rng = self.rng.lock();
        let primitive = Primitive::ALL[rng.gen_range(0..Primitive::ALL.len())];
        let category = if rng.gen_bool(self.intrusion_ratio.clamp(0.0, 1.0)) {
            "intrusion"
        } else {
            BACKGROUND_CATEGORIES[rng.gen_range(0..BACKGROUND_CATEGORIES.len())]
        };
        let tenant = rng.gen_range(1..=4_i64);
        let region = if rng.gen_bool(0.5) { "eu" } else { "us" };
        let source = format!("10.0.{}.{}", rng.gen_range(0..8), rng.gen_range(1..255));

        RawEvent::new(primitive.name(), primitive.code(), category)
            .with_context(
                ContextRecord::new()
                    .with("tenant", tenant)
                    .with("region", region),
            )
            .with_field("source", source)
    }
}
