use chrono::{DateTime, Utc};
use haarc_address::TrivariateAddress;
use haarc_core::OperationCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An admitted, addressed and scored event. Read-only after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    pub address: TrivariateAddress,
    pub operation: OperationCode,
    pub operation_name: String,
    pub category: String,
    /// In `[0, 1]`. Zero when the classifier failed or timed out.
    pub threat_score: f64,
    pub arrival_time: DateTime<Utc>,
    /// Name of the predicate that admitted the event
    pub admitted_by: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}
