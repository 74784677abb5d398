//! haarc ooda - the Observe/Orient/Decide/Act control loop
//!
//! Admitted events flow in through [`Ingress`] or [`EngineHandle::submit`].
//! [`DecisionEngine::run`] owns the decision cycle; every decision is
//! appended to [`DecisionHistory`] before its act is launched.

pub mod act;
pub mod config;
pub mod decide;
pub mod decision;
pub mod engine;
pub mod history;
pub mod ingress;
pub mod retry;

pub use act::ActReport;
pub use config::{EngineConfig, ProvisioningConfig};
pub use decide::{decide, orient, DecisionPolicy, Orientation, Thresholds};
pub use decision::{Decision, DecisionKind, DecisionNote, DecisionRecord, Outcome};
pub use engine::{
    Collaborators, DecisionEngine, EngineHandle, EngineMessage, EngineStatus, ENGINE_HANDLER,
};
pub use history::{DecisionHistory, HistorySummary};
pub use ingress::{Admission, Ingress};
pub use retry::{retry_with_timeout, Attempted, RetryPolicy};
