//! Decisions and the records that audit them

use chrono::{DateTime, Utc};
use haarc_core::{AlertPayload, CapacitySnapshot, Priority, WorkerSpec};
use haarc_dispatch::HandlerRef;
use haarc_observe::ClassifiedEvent;
use serde::{Deserialize, Serialize};

/// What the engine chose to do about one event. Immutable once emitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    SpinWorker(WorkerSpec),
    Alert(AlertPayload),
    Monitor { interval_ms: u64 },
}

impl Decision {
    pub fn kind(&self) -> DecisionKind {
        match self {
            Self::SpinWorker(_) => DecisionKind::SpinWorker,
            Self::Alert(_) => DecisionKind::Alert,
            Self::Monitor { .. } => DecisionKind::Monitor,
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    SpinWorker,
    Alert,
    Monitor,
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SpinWorker => write!(f, "spin_worker"),
            Self::Alert => write!(f, "alert"),
            Self::Monitor => write!(f, "monitor"),
        }
    }
}

/// Final result of acting on a decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failed { reason: String },
    Timeout,
    Cancelled,
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Timeout)
    }
}

/// Append-only annotations on a record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "note", rename_all = "snake_case")]
pub enum DecisionNote {
    Retried { attempts: u32, at: DateTime<Utc> },
    Cancelled { reason: String, at: DateTime<Utc> },
    Escalated { alert_id: u64, at: DateTime<Utc> },
}

impl DecisionNote {
    pub fn retried(attempts: u32) -> Self {
        Self::Retried {
            attempts,
            at: Utc::now(),
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
            at: Utc::now(),
        }
    }

    pub fn escalated(alert_id: u64) -> Self {
        Self::Escalated {
            alert_id,
            at: Utc::now(),
        }
    }
}

/// One audited decision.
///
/// `event`, `capacity` and `decision` never change after the record is
/// appended. `outcome` is filled once, later; `notes` only grow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Monotonic, starting at 1
    pub id: u64,
    pub cycle: u64,
    /// `None` for engine-originated alerts
    pub event: Option<ClassifiedEvent>,
    /// The snapshot the decision was made against, with in-cycle spins counted
    pub capacity: CapacitySnapshot,
    pub decision: Decision,
    pub handler: HandlerRef,
    pub priority: Priority,
    pub decided_at: DateTime<Utc>,
    #[serde(default)]
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub notes: Vec<DecisionNote>,
    /// Set on the alert raised when a SpinWorker act exhausts its retries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalated_from: Option<u64>,
}

impl DecisionRecord {
    pub fn kind(&self) -> DecisionKind {
        self.decision.kind()
    }

    pub fn is_settled(&self) -> bool {
        self.outcome.is_some()
    }
}
