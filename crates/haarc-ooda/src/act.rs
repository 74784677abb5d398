//! Act tasks: collaborator calls off the loop, reported back as messages

use crate::decision::{Decision, DecisionKind, Outcome};
use crate::engine::EngineMessage;
use crate::retry::{retry_with_timeout, Attempted, RetryPolicy};
use haarc_core::{AlertSink, Error, Provisioner};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Completion report posted by an act task.
#[derive(Debug, Clone)]
pub struct ActReport {
    pub record_id: u64,
    pub kind: DecisionKind,
    pub outcome: Outcome,
    pub attempts: u32,
    /// Last error seen, when the act did not succeed
    pub last_error: Option<String>,
}

impl ActReport {
    fn from_attempted<T>(record_id: u64, kind: DecisionKind, attempted: Attempted<T>) -> Self {
        let (outcome, last_error) = match attempted.result {
            Ok(_) => (Outcome::Success, None),
            Err(e @ Error::Timeout { .. }) => (Outcome::Timeout, Some(e.to_string())),
            Err(e) => (
                Outcome::Failed {
                    reason: e.to_string(),
                },
                Some(e.to_string()),
            ),
        };
        Self {
            record_id,
            kind,
            outcome,
            attempts: attempted.attempts,
            last_error,
        }
    }
}

/// Everything an act task needs. Holds no lock shared with admission or routing.
pub(crate) struct Actor {
    pub provisioner: Arc<dyn Provisioner>,
    pub alerts: Arc<dyn AlertSink>,
    pub retry: RetryPolicy,
    pub act_timeout: Duration,
    /// Weak so that dropping every handle closes the queue
    pub tx: mpsc::WeakSender<EngineMessage>,
}

impl Actor {
    /// Spawn the act for `decision`. The task reports through the engine
    /// queue and reports nothing once `cancel` fires.
    pub fn launch(
        self: &Arc<Self>,
        record_id: u64,
        decision: &Decision,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let actor = Arc::clone(self);
        match decision {
            Decision::SpinWorker(spec) => {
                let spec = spec.clone();
                tokio::spawn(async move {
                    let provisioner = &actor.provisioner;
                    let spec = &spec;
                    let work = retry_with_timeout(
                        &actor.retry,
                        actor.act_timeout,
                        "spin_worker",
                        move || provisioner.spin(spec),
                    );
                    let attempted = tokio::select! {
                        a = work => a,
                        _ = cancel.cancelled() => {
                            debug!("SpinWorker act for record {} cancelled", record_id);
                            return;
                        }
                    };
                    if let Ok(handle) = &attempted.result {
                        debug!("Record {}: worker {} up", record_id, handle.id);
                    }
                    let report =
                        ActReport::from_attempted(record_id, DecisionKind::SpinWorker, attempted);
                    actor.report(EngineMessage::ActFinished(report)).await;
                })
            }
            Decision::Alert(payload) => {
                let payload = payload.clone();
                tokio::spawn(async move {
                    let alerts = &actor.alerts;
                    let payload = &payload;
                    let work = retry_with_timeout(
                        &actor.retry,
                        actor.act_timeout,
                        "alert",
                        move || alerts.notify(payload),
                    );
                    let attempted = tokio::select! {
                        a = work => a,
                        _ = cancel.cancelled() => {
                            debug!("Alert act for record {} cancelled", record_id);
                            return;
                        }
                    };
                    let report = ActReport::from_attempted(record_id, DecisionKind::Alert, attempted);
                    actor.report(EngineMessage::ActFinished(report)).await;
                })
            }
            Decision::Monitor { interval_ms } => {
                let interval = Duration::from_millis(*interval_ms);
                tokio::spawn(async move {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {
                            actor.report(EngineMessage::MonitorTick { record_id }).await;
                        }
                        _ = cancel.cancelled() => {}
                    }
                })
            }
        }
    }

    async fn report(&self, msg: EngineMessage) {
        if let Some(tx) = self.tx.upgrade() {
            let _ = tx.send(msg).await;
        }
    }
}
