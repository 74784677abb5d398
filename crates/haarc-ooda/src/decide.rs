//! Orient and Decide: pure functions of one event and one snapshot

use crate::decision::Decision;
use haarc_core::{AlertPayload, AlertReason, AlertSeverity, CapacitySnapshot, WorkerSpec};
use haarc_observe::ClassifiedEvent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum threat for SpinWorker
    pub spin_threat: f64,
    /// Minimum headroom for SpinWorker
    pub min_headroom: f64,
    /// Minimum threat for Alert
    pub alert_threat: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            spin_threat: 0.8,
            min_headroom: 0.3,
            alert_threat: 0.5,
        }
    }
}

/// What Orient derives from a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    pub headroom: f64,
    pub worker_slot_free: bool,
}

pub fn orient(capacity: &CapacitySnapshot) -> Orientation {
    Orientation {
        headroom: capacity.headroom(),
        worker_slot_free: capacity.has_worker_slot(),
    }
}

/// Inputs to Decide that come from configuration rather than the event.
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    pub thresholds: Thresholds,
    pub monitor_interval_ms: u64,
    pub worker_profile: String,
}

/// First matching rule wins:
/// spin if threat and headroom are high enough and a slot is free,
/// else alert if threat is elevated, else keep monitoring.
pub fn decide(
    event: &ClassifiedEvent,
    capacity: &CapacitySnapshot,
    policy: &DecisionPolicy,
) -> Decision {
    let o = orient(capacity);
    let threat = event.threat_score;
    let t = &policy.thresholds;

    if threat >= t.spin_threat && o.headroom >= t.min_headroom && o.worker_slot_free {
        let mut labels = BTreeMap::new();
        labels.insert("operation".to_string(), event.operation_name.clone());
        labels.insert("category".to_string(), event.category.clone());
        return Decision::SpinWorker(WorkerSpec {
            profile: policy.worker_profile.clone(),
            trigger: event.address.to_string(),
            threat_score: threat,
            labels,
        });
    }

    if threat >= t.alert_threat {
        let severity = if threat >= t.spin_threat {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        return Decision::Alert(AlertPayload {
            severity,
            reason: AlertReason::ElevatedThreat,
            subject: Some(event.address.to_string()),
            threat_score: Some(threat),
            message: format!(
                "{} ({}) scored {:.2}; headroom {:.2}",
                event.operation_name, event.operation, threat, o.headroom
            ),
        });
    }

    Decision::Monitor {
        interval_ms: policy.monitor_interval_ms,
    }
}
