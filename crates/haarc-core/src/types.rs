//! Core types for haarc

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Context records
// ---------------------------------------------------------------------------

/// A single situational attribute value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ContextValue {
    fn canonical(&self, key: &str) -> Result<String> {
        match self {
            Self::Bool(b) => Ok(format!("b:{b}")),
            Self::Int(i) => Ok(format!("i:{i}")),
            Self::Float(f) if f.is_finite() => Ok(format!("f:{f:?}")),
            Self::Float(f) => Err(Error::invalid_context(format!(
                "non-finite float {f} for key '{key}'"
            ))),
            Self::Text(s) => Ok(format!("s:{}", escape(s))),
        }
    }
}

impl From<bool> for ContextValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ContextValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ContextValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ContextValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Situational attributes of an event (location, time bucket, domain tag...).
///
/// Keys are kept sorted so the canonical serialization is independent of
/// insertion order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextRecord(BTreeMap<String, ContextValue>);

impl ContextRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ContextValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Deterministic `key=kind:value;...` form used for hashing.
    ///
    /// Returns an empty string for an empty record. Keys must be non-empty and
    /// free of the `=`/`;` delimiters.
    pub fn canonical(&self) -> Result<String> {
        let mut parts = Vec::with_capacity(self.0.len());
        for (key, value) in &self.0 {
            if key.is_empty() {
                return Err(Error::invalid_context("empty context key"));
            }
            if key.contains(['=', ';']) {
                return Err(Error::invalid_context(format!(
                    "context key '{key}' contains a reserved delimiter"
                )));
            }
            parts.push(format!("{key}={}", value.canonical(key)?));
        }
        Ok(parts.join(";"))
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace(';', "\\;")
}

// ---------------------------------------------------------------------------
// Operation codes and priorities
// ---------------------------------------------------------------------------

/// Compact scalar identifying the kind of work.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationCode(pub u32);

impl OperationCode {
    pub const fn new(code: u32) -> Self {
        Self(code)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn from_char(c: char) -> Self {
        Self(c as u32)
    }

    /// The code as a Unicode scalar, if it is one.
    pub fn as_char(self) -> Option<char> {
        char::from_u32(self.0)
    }
}

impl std::fmt::Display for OperationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "U+{:04X}", self.0)
    }
}

impl From<u32> for OperationCode {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Priority tier. Higher values are processed first.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Unmatched codes land here
    Background = 0,
    Low = 10,
    Normal = 20,
    High = 30,
    Critical = 40,
}

impl Priority {
    pub const LOWEST: Priority = Priority::Background;
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Background => write!(f, "background"),
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw events
// ---------------------------------------------------------------------------

/// An event as it arrives from a producer, before addressing and admission.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawEvent {
    /// Operation kind, e.g. "AUTHENTICATE"
    pub operation: String,
    pub code: OperationCode,
    #[serde(default)]
    pub context: ContextRecord,
    /// Event category used by admission predicates, e.g. "intrusion"
    pub category: String,
    /// Free-form fields handed to the classifier
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    pub observed_at: DateTime<Utc>,
}

impl RawEvent {
    pub fn new(
        operation: impl Into<String>,
        code: impl Into<OperationCode>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            code: code.into(),
            context: ContextRecord::new(),
            category: category.into(),
            fields: BTreeMap::new(),
            observed_at: Utc::now(),
        }
    }

    pub fn with_context(mut self, context: ContextRecord) -> Self {
        self.context = context;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Capacity and load
// ---------------------------------------------------------------------------

/// Live utilization figures for one decision cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    pub cpu_utilization: f64,
    pub memory_utilization: f64,
    pub active_worker_count: u32,
    pub worker_ceiling: u32,
    pub taken_at: DateTime<Utc>,
    /// Set when this is a last-known snapshot reused after a failed refresh.
    #[serde(default)]
    pub stale: bool,
}

impl CapacitySnapshot {
    pub fn new(cpu: f64, memory: f64, active_workers: u32, ceiling: u32) -> Self {
        Self {
            cpu_utilization: cpu,
            memory_utilization: memory,
            active_worker_count: active_workers,
            worker_ceiling: ceiling,
            taken_at: Utc::now(),
            stale: false,
        }
    }

    /// Zero headroom with every worker slot taken. Used before any snapshot
    /// has ever succeeded.
    pub fn exhausted() -> Self {
        Self {
            cpu_utilization: 1.0,
            memory_utilization: 1.0,
            active_worker_count: 0,
            worker_ceiling: 0,
            taken_at: Utc::now(),
            stale: true,
        }
    }

    /// `1 - max(cpu, memory)`, clamped to `[0, 1]`.
    pub fn headroom(&self) -> f64 {
        if self.cpu_utilization.is_nan() || self.memory_utilization.is_nan() {
            return 0.0;
        }
        let used = self.cpu_utilization.max(self.memory_utilization);
        (1.0 - used).clamp(0.0, 1.0)
    }

    pub fn has_worker_slot(&self) -> bool {
        self.active_worker_count < self.worker_ceiling
    }

    pub fn into_stale(mut self) -> Self {
        self.stale = true;
        self
    }
}

/// One reading of ingest load, fed to the observation layer's rebalancer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoadSample {
    /// Normalized load, 0.0 = idle, 1.0 = saturated
    pub load: f64,
    pub queue_depth: usize,
}

impl LoadSample {
    pub fn new(load: f64) -> Self {
        Self { load, queue_depth: 0 }
    }
}

// ---------------------------------------------------------------------------
// Act payloads
// ---------------------------------------------------------------------------

/// What to provision for a SpinWorker decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub profile: String,
    /// Address of the triggering event
    pub trigger: String,
    pub threat_score: f64,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Returned by the provisioning API once a worker is up.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerHandle {
    pub id: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertReason {
    /// Threat above the alert threshold
    ElevatedThreat,
    /// A SpinWorker act exhausted its retries
    ProvisioningFailed {
        record_id: u64,
        attempts: u32,
        last_error: String,
    },
    /// Capacity source failed for this many consecutive cycles
    CapacityUnavailable { consecutive: u32 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub severity: AlertSeverity,
    pub reason: AlertReason,
    /// Address of the triggering event, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat_score: Option<f64>,
    pub message: String,
}

/// Alert sink acknowledgement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub id: String,
}
