//! Tests for haarc-ooda: decision rules, act retries, escalation, lifecycle

use chrono::Utc;
use haarc_address::{generate, AddressEngine};
use haarc_core::{
    Ack, AlertPayload, AlertReason, AlertSeverity, AlertSink, CapacitySnapshot, CapacitySource,
    ContextRecord, Error, FixedClassifier, OperationCode, Provisioner, RawEvent, Result,
    WorkerHandle, WorkerSpec,
};
use haarc_dispatch::default_table;
use haarc_observe::{ClassifiedEvent, ObservationLayer, ObserveConfig};
use haarc_ooda::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

// ===========================================================================
// Mock collaborators
// ===========================================================================

/// `None` makes every snapshot call fail.
struct SwitchCapacity(Mutex<Option<CapacitySnapshot>>);

impl SwitchCapacity {
    fn new(snapshot: Option<CapacitySnapshot>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(snapshot)))
    }

    fn set(&self, snapshot: Option<CapacitySnapshot>) {
        *self.0.lock() = snapshot;
    }
}

impl CapacitySource for SwitchCapacity {
    fn snapshot(&self) -> Result<CapacitySnapshot> {
        self.0
            .lock()
            .clone()
            .map(|mut s| {
                s.taken_at = Utc::now();
                s
            })
            .ok_or_else(|| Error::CapacityUnavailable("metrics endpoint down".into()))
    }
}

#[derive(Clone, Copy)]
enum Mode {
    Succeed,
    Fail,
    Hang,
}

struct MockProvisioner {
    mode: Mode,
    calls: AtomicU32,
}

impl MockProvisioner {
    fn new(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Provisioner for MockProvisioner {
    async fn spin(&self, spec: &WorkerSpec) -> Result<WorkerHandle> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            Mode::Succeed => Ok(WorkerHandle {
                id: format!("{}-{}", spec.profile, n),
                started_at: Utc::now(),
            }),
            Mode::Fail => Err(Error::ProvisioningFailure("quota exceeded".into())),
            Mode::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

#[derive(Default)]
struct RecordingAlerts(Mutex<Vec<AlertPayload>>);

impl RecordingAlerts {
    fn sent(&self) -> Vec<AlertPayload> {
        self.0.lock().clone()
    }
}

#[async_trait::async_trait]
impl AlertSink for RecordingAlerts {
    async fn notify(&self, payload: &AlertPayload) -> Result<Ack> {
        let mut sent = self.0.lock();
        sent.push(payload.clone());
        Ok(Ack {
            id: format!("ack-{}", sent.len()),
        })
    }
}

struct FailingAlerts(AtomicU32);

#[async_trait::async_trait]
impl AlertSink for FailingAlerts {
    async fn notify(&self, _payload: &AlertPayload) -> Result<Ack> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Err(Error::AlertFailure("pager unreachable".into()))
    }
}

// ===========================================================================
// Harness
// ===========================================================================

static SEQ: AtomicU64 = AtomicU64::new(0);

fn event(threat: f64, code: u32) -> ClassifiedEvent {
    let n = SEQ.fetch_add(1, Ordering::Relaxed);
    ClassifiedEvent {
        address: generate("SCAN", &ContextRecord::new(), &n.to_le_bytes()).unwrap(),
        operation: OperationCode::new(code),
        operation_name: "SCAN".into(),
        category: "intrusion".into(),
        threat_score: threat,
        arrival_time: Utc::now(),
        admitted_by: "intrusion".into(),
        fields: Default::default(),
    }
}

fn roomy() -> CapacitySnapshot {
    CapacitySnapshot::new(0.4, 0.3, 1, 4)
}

fn engine_config() -> EngineConfig {
    EngineConfig {
        monitor_interval_ms: 100,
        ..Default::default()
    }
}

fn provisioning() -> ProvisioningConfig {
    ProvisioningConfig {
        worker_profile: "sandbox".into(),
        act_timeout_ms: 1_000,
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
            jitter_factor: 0.0,
        },
    }
}

fn start(
    config: EngineConfig,
    provisioning: ProvisioningConfig,
    capacity: Arc<dyn CapacitySource>,
    provisioner: Arc<dyn Provisioner>,
    alerts: Arc<dyn AlertSink>,
) -> (EngineHandle, JoinHandle<()>) {
    let table = Arc::new(default_table("passive").unwrap());
    let (engine, handle) = DecisionEngine::new(
        config,
        provisioning,
        table,
        Collaborators {
            capacity,
            provisioner,
            alerts,
        },
    );
    (handle, tokio::spawn(engine.run()))
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..2_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

fn settled(handle: &EngineHandle, n: usize) -> bool {
    handle
        .history()
        .all()
        .iter()
        .filter(|r| r.outcome.is_some())
        .count()
        >= n
}

// ===========================================================================
// Decide
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn high_threat_with_headroom_spins_a_worker() {
    let provisioner = MockProvisioner::new(Mode::Succeed);
    let alerts = Arc::new(RecordingAlerts::default());
    let (handle, _task) = start(
        engine_config(),
        provisioning(),
        SwitchCapacity::new(Some(roomy())),
        provisioner.clone(),
        alerts.clone(),
    );

    let e = event(0.9, 0xE041);
    handle.submit(e.clone()).unwrap();
    wait_until("spin settled", || settled(&handle, 1)).await;

    let record = handle.history().get(1).unwrap();
    assert_eq!(record.kind(), DecisionKind::SpinWorker);
    assert_eq!(record.outcome, Some(Outcome::Success));
    assert_eq!(record.event.as_ref().map(|e| &e.address), Some(&e.address));
    assert_eq!(record.handler.as_str(), "security");
    match &record.decision {
        Decision::SpinWorker(spec) => {
            assert_eq!(spec.profile, "sandbox");
            assert_eq!(spec.trigger, e.address.to_string());
        }
        other => panic!("expected spin, got {other:?}"),
    }
    assert_eq!(provisioner.calls(), 1);
    assert!(alerts.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn high_threat_without_headroom_alerts() {
    let provisioner = MockProvisioner::new(Mode::Succeed);
    let alerts = Arc::new(RecordingAlerts::default());
    let (handle, _task) = start(
        engine_config(),
        provisioning(),
        SwitchCapacity::new(Some(CapacitySnapshot::new(0.85, 0.2, 0, 4))),
        provisioner.clone(),
        alerts.clone(),
    );

    handle.submit(event(0.9, 0xE041)).unwrap();
    wait_until("alert settled", || settled(&handle, 1)).await;

    let record = handle.history().get(1).unwrap();
    assert_eq!(record.kind(), DecisionKind::Alert);
    assert_eq!(record.outcome, Some(Outcome::Success));
    assert_eq!(provisioner.calls(), 0);
    let sent = alerts.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].severity, AlertSeverity::Critical);
    assert_eq!(sent[0].reason, AlertReason::ElevatedThreat);
}

#[tokio::test(start_paused = true)]
async fn low_threat_monitors() {
    let alerts = Arc::new(RecordingAlerts::default());
    let (handle, _task) = start(
        engine_config(),
        provisioning(),
        SwitchCapacity::new(Some(roomy())),
        MockProvisioner::new(Mode::Succeed),
        alerts.clone(),
    );

    handle.submit(event(0.2, 0xE001)).unwrap();
    wait_until("monitor settled", || settled(&handle, 1)).await;

    let record = handle.history().get(1).unwrap();
    assert_eq!(record.decision, Decision::Monitor { interval_ms: 100 });
    assert_eq!(record.outcome, Some(Outcome::Success));
    assert!(alerts.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn spins_decided_in_a_cycle_count_against_the_ceiling() {
    let provisioner = MockProvisioner::new(Mode::Succeed);
    let (handle, _task) = start(
        engine_config(),
        provisioning(),
        SwitchCapacity::new(Some(CapacitySnapshot::new(0.1, 0.1, 3, 4))),
        provisioner.clone(),
        Arc::new(RecordingAlerts::default()),
    );

    handle.pause().await.unwrap();
    wait_until("paused", || handle.status().paused).await;
    handle.submit(event(0.9, 0xE041)).unwrap();
    handle.submit(event(0.95, 0xE042)).unwrap();
    handle.resume().await.unwrap();
    wait_until("both settled", || settled(&handle, 2)).await;

    let records = handle.history().all();
    assert_eq!(records[0].kind(), DecisionKind::SpinWorker);
    assert_eq!(records[1].kind(), DecisionKind::Alert);
    assert_eq!(records[0].cycle, records[1].cycle);
    assert_eq!(records[1].capacity.active_worker_count, 4);
    assert_eq!(provisioner.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn batch_is_ordered_by_route_priority_then_arrival() {
    let (handle, _task) = start(
        engine_config(),
        provisioning(),
        SwitchCapacity::new(Some(roomy())),
        MockProvisioner::new(Mode::Succeed),
        Arc::new(RecordingAlerts::default()),
    );

    handle.pause().await.unwrap();
    wait_until("paused", || handle.status().paused).await;
    handle.submit(event(0.1, 0xE001)).unwrap(); // crud, normal
    handle.submit(event(0.1, 0xE061)).unwrap(); // state, low
    handle.submit(event(0.1, 0xE041)).unwrap(); // security, critical
    handle.submit(event(0.1, 0xE002)).unwrap(); // crud, normal
    assert_eq!(handle.history().len(), 0);
    handle.resume().await.unwrap();
    wait_until("four records", || handle.history().len() == 4).await;

    let codes: Vec<u32> = handle
        .history()
        .all()
        .iter()
        .map(|r| r.event.as_ref().unwrap().operation.value())
        .collect();
    assert_eq!(codes, vec![0xE041, 0xE001, 0xE002, 0xE061]);
}

// ===========================================================================
// Act: retries and escalation
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn exhausted_provisioning_escalates_exactly_once() {
    let provisioner = MockProvisioner::new(Mode::Fail);
    let alerts = Arc::new(RecordingAlerts::default());
    let (handle, _task) = start(
        engine_config(),
        provisioning(),
        SwitchCapacity::new(Some(roomy())),
        provisioner.clone(),
        alerts.clone(),
    );

    let e = event(0.9, 0xE041);
    handle.submit(e.clone()).unwrap();
    wait_until("spin and escalation settled", || settled(&handle, 2)).await;
    // plenty of time for a stray fourth attempt
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(provisioner.calls(), 3);

    let records = handle.history().all();
    let spin = &records[0];
    assert_eq!(spin.kind(), DecisionKind::SpinWorker);
    assert!(matches!(spin.outcome, Some(Outcome::Failed { .. })));
    assert!(spin
        .notes
        .iter()
        .any(|n| matches!(n, DecisionNote::Retried { attempts: 3, .. })));

    let escalations: Vec<&DecisionRecord> =
        records.iter().filter(|r| r.escalated_from.is_some()).collect();
    assert_eq!(escalations.len(), 1);
    let alert = escalations[0];
    assert_eq!(alert.escalated_from, Some(spin.id));
    assert_eq!(alert.kind(), DecisionKind::Alert);
    assert_eq!(alert.event.as_ref().map(|e| &e.address), Some(&e.address));
    assert_eq!(alert.outcome, Some(Outcome::Success));
    assert!(spin
        .notes
        .iter()
        .any(|n| matches!(n, DecisionNote::Escalated { alert_id, .. } if *alert_id == alert.id)));

    let sent = alerts.sent();
    assert_eq!(sent.len(), 1);
    match &sent[0].reason {
        AlertReason::ProvisioningFailed {
            record_id,
            attempts,
            ..
        } => {
            assert_eq!(*record_id, spin.id);
            assert_eq!(*attempts, 3);
        }
        other => panic!("expected provisioning failure, got {other:?}"),
    }
    assert_eq!(sent[0].subject.as_deref(), Some(e.address.as_str()));
}

#[tokio::test(start_paused = true)]
async fn failed_alert_is_not_escalated() {
    let alerts = Arc::new(FailingAlerts(AtomicU32::new(0)));
    let (handle, _task) = start(
        engine_config(),
        provisioning(),
        SwitchCapacity::new(Some(CapacitySnapshot::new(0.9, 0.9, 0, 4))),
        MockProvisioner::new(Mode::Succeed),
        alerts.clone(),
    );

    handle.submit(event(0.6, 0xE041)).unwrap();
    wait_until("alert settled", || settled(&handle, 1)).await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(alerts.0.load(Ordering::SeqCst), 3);
    assert_eq!(handle.history().len(), 1);
    let record = handle.history().get(1).unwrap();
    assert!(matches!(record.outcome, Some(Outcome::Failed { .. })));
}

// ===========================================================================
// Capacity unavailability
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn stale_capacity_raises_one_alert_per_streak() {
    let capacity = SwitchCapacity::new(None);
    let provisioner = MockProvisioner::new(Mode::Succeed);
    let alerts = Arc::new(RecordingAlerts::default());
    let (handle, _task) = start(
        engine_config(),
        provisioning(),
        capacity.clone(),
        provisioner.clone(),
        alerts.clone(),
    );

    wait_until("several stale cycles", || handle.status().stale_cycles >= 6).await;
    let records = handle.history().all();
    assert_eq!(records.len(), 1);
    let alert = &records[0];
    assert!(alert.event.is_none());
    assert_eq!(alert.handler.as_str(), ENGINE_HANDLER);
    assert!(alert.capacity.stale);
    match &alert.decision {
        Decision::Alert(p) => {
            assert_eq!(p.reason, AlertReason::CapacityUnavailable { consecutive: 2 })
        }
        other => panic!("expected alert, got {other:?}"),
    }

    // never a spin on an exhausted fallback snapshot
    handle.submit(event(0.95, 0xE041)).unwrap();
    wait_until("decision", || handle.history().len() == 2).await;
    assert_eq!(handle.history().get(2).unwrap().kind(), DecisionKind::Alert);
    assert_eq!(provisioner.calls(), 0);

    // a fresh snapshot resets the streak; the next outage alerts again
    capacity.set(Some(roomy()));
    wait_until("recovered", || handle.status().stale_cycles == 0).await;
    capacity.set(None);
    wait_until("second outage", || handle.status().stale_cycles >= 3).await;

    let engine_alerts = handle
        .history()
        .all()
        .into_iter()
        .filter(|r| r.event.is_none())
        .count();
    assert_eq!(engine_alerts, 2);
}

// ===========================================================================
// Cancellation and lifecycle
// ===========================================================================

fn hanging_provisioning() -> ProvisioningConfig {
    ProvisioningConfig {
        act_timeout_ms: 3_600_000,
        ..provisioning()
    }
}

#[tokio::test(start_paused = true)]
async fn degraded_capacity_cancels_pending_spin() {
    let capacity = SwitchCapacity::new(Some(roomy()));
    let (handle, _task) = start(
        engine_config(),
        hanging_provisioning(),
        capacity.clone(),
        MockProvisioner::new(Mode::Hang),
        Arc::new(RecordingAlerts::default()),
    );

    handle.submit(event(0.9, 0xE041)).unwrap();
    wait_until("spin pending", || handle.pending_acts().len() == 1).await;
    let before = handle.history().get(1).unwrap();
    assert_eq!(before.kind(), DecisionKind::SpinWorker);
    assert!(before.outcome.is_none());

    capacity.set(Some(CapacitySnapshot::new(0.95, 0.2, 1, 4)));
    wait_until("spin cancelled", || settled(&handle, 1)).await;

    let after = handle.history().get(1).unwrap();
    assert_eq!(after.outcome, Some(Outcome::Cancelled));
    assert_eq!(after.decision, before.decision);
    assert_eq!(after.event, before.event);
    assert!(after
        .notes
        .iter()
        .any(|n| matches!(n, DecisionNote::Cancelled { .. })));
    assert!(handle.pending_acts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn paused_engine_buffers_until_resumed() {
    let (handle, _task) = start(
        engine_config(),
        provisioning(),
        SwitchCapacity::new(Some(roomy())),
        MockProvisioner::new(Mode::Succeed),
        Arc::new(RecordingAlerts::default()),
    );

    handle.pause().await.unwrap();
    wait_until("paused", || handle.status().paused).await;
    for _ in 0..3 {
        handle.submit(event(0.2, 0xE001)).unwrap();
    }
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(handle.history().len(), 0);
    assert_eq!(handle.status().buffered, 3);

    handle.resume().await.unwrap();
    wait_until("drained", || handle.history().len() == 3).await;
    assert!(!handle.status().paused);
    assert_eq!(handle.status().buffered, 0);
}

#[tokio::test(start_paused = true)]
async fn in_flight_acts_finish_while_paused() {
    let (handle, _task) = start(
        engine_config(),
        provisioning(),
        SwitchCapacity::new(Some(roomy())),
        MockProvisioner::new(Mode::Fail),
        Arc::new(RecordingAlerts::default()),
    );

    handle.submit(event(0.9, 0xE041)).unwrap();
    wait_until("spin recorded", || handle.history().len() == 1).await;
    handle.pause().await.unwrap();
    wait_until("spin settled", || settled(&handle, 1)).await;
    assert!(matches!(
        handle.history().get(1).unwrap().outcome,
        Some(Outcome::Failed { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_in_flight_acts() {
    let (handle, task) = start(
        engine_config(),
        hanging_provisioning(),
        SwitchCapacity::new(Some(roomy())),
        MockProvisioner::new(Mode::Hang),
        Arc::new(RecordingAlerts::default()),
    );

    handle.submit(event(0.9, 0xE041)).unwrap();
    wait_until("spin pending", || handle.pending_acts().len() == 1).await;
    handle.shutdown().await.unwrap();
    task.await.unwrap();

    let record = handle.history().get(1).unwrap();
    assert_eq!(record.outcome, Some(Outcome::Cancelled));
    assert!(record.notes.iter().any(
        |n| matches!(n, DecisionNote::Cancelled { reason, .. } if reason == "engine shutdown")
    ));
    assert!(!handle.status().running);
    assert!(matches!(
        handle.submit(event(0.9, 0xE041)),
        Err(Error::QueueClosed)
    ));
}

#[tokio::test]
async fn full_queue_sheds_without_blocking() {
    let table = Arc::new(default_table("passive").unwrap());
    let (_engine, handle) = DecisionEngine::new(
        EngineConfig {
            queue_capacity: 2,
            ..Default::default()
        },
        provisioning(),
        table,
        Collaborators {
            capacity: SwitchCapacity::new(Some(roomy())),
            provisioner: MockProvisioner::new(Mode::Succeed),
            alerts: Arc::new(RecordingAlerts::default()),
        },
    );

    handle.submit(event(0.1, 0xE001)).unwrap();
    handle.submit(event(0.1, 0xE001)).unwrap();
    assert!(matches!(
        handle.submit(event(0.1, 0xE001)),
        Err(Error::QueueFull)
    ));
    assert_eq!(handle.status().shed, 1);
}

#[tokio::test(start_paused = true)]
async fn history_is_bounded() {
    let (handle, _task) = start(
        EngineConfig {
            history_cap: 5,
            ..engine_config()
        },
        provisioning(),
        SwitchCapacity::new(Some(roomy())),
        MockProvisioner::new(Mode::Succeed),
        Arc::new(RecordingAlerts::default()),
    );

    for _ in 0..12 {
        handle.submit(event(0.1, 0xE001)).unwrap();
    }
    wait_until("all decided", || {
        handle.history().latest().map(|r| r.id) == Some(12)
    })
    .await;

    let history = handle.history();
    assert_eq!(history.len(), 5);
    assert!(history.get(7).is_none());
    assert_eq!(history.all().first().map(|r| r.id), Some(8));

    let since = Utc::now() - chrono::Duration::minutes(1);
    let exported = history.export(since, Utc::now());
    assert_eq!(exported.len(), 5);
    assert!(exported.windows(2).all(|w| w[0].id < w[1].id));
}

// ===========================================================================
// Ingress
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn ingress_admits_and_queues() {
    let layer = Arc::new(
        ObservationLayer::from_config(
            &ObserveConfig::default(),
            AddressEngine::default(),
            Arc::new(FixedClassifier(0.9)),
        )
        .unwrap(),
    );
    let provisioner = MockProvisioner::new(Mode::Succeed);
    let (handle, _task) = start(
        engine_config(),
        provisioning(),
        SwitchCapacity::new(Some(roomy())),
        provisioner.clone(),
        Arc::new(RecordingAlerts::default()),
    );
    let ingress = Ingress::new(layer, handle.clone());

    let queued = ingress
        .offer(RawEvent::new("AUTHENTICATE", 0xE041u32, "intrusion"))
        .await
        .unwrap();
    assert_eq!(queued, Admission::Queued);
    let dropped = ingress
        .offer(RawEvent::new("HEARTBEAT", 0x10u32, "chatter"))
        .await
        .unwrap();
    assert_eq!(dropped, Admission::Dropped);

    wait_until("spin settled", || settled(&handle, 1)).await;
    assert_eq!(handle.history().len(), 1);
    assert_eq!(provisioner.calls(), 1);
}
