//! The OODA loop - single owner of Decide and Act
//!
//! Every input (admitted events, act completions, monitor ticks, control
//! commands) enters one bounded queue. The loop drains it, runs decision
//! cycles, and is the only writer of decision history. Collaborator calls run
//! in spawned tasks that post their result back into the same queue.

use crate::act::{ActReport, Actor};
use crate::config::{EngineConfig, ProvisioningConfig};
use crate::decide::{decide, DecisionPolicy};
use crate::decision::{Decision, DecisionKind, DecisionNote, DecisionRecord, Outcome};
use crate::history::DecisionHistory;
use chrono::Utc;
use dashmap::DashMap;
use haarc_core::{
    AlertPayload, AlertReason, AlertSeverity, AlertSink, CapacitySnapshot, CapacitySource, Error,
    Priority, Provisioner, Result,
};
use haarc_dispatch::{DispatchTable, HandlerRef, Route};
use haarc_observe::ClassifiedEvent;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Handler recorded on alerts the engine raises about itself.
pub const ENGINE_HANDLER: &str = "engine";

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum EngineMessage {
    /// An admitted event awaiting a decision
    Event(ClassifiedEvent),
    /// An act task finished (not sent for cancelled acts)
    ActFinished(ActReport),
    /// A Monitor decision's interval elapsed
    MonitorTick { record_id: u64 },
    Pause,
    Resume,
    Shutdown,
}

// ---------------------------------------------------------------------------
// Collaborators and shared state
// ---------------------------------------------------------------------------

/// External systems the engine observes and acts through.
#[derive(Clone)]
pub struct Collaborators {
    pub capacity: Arc<dyn CapacitySource>,
    pub provisioner: Arc<dyn Provisioner>,
    pub alerts: Arc<dyn AlertSink>,
}

/// An act that has been launched and not yet settled.
pub struct PendingAct {
    pub record_id: u64,
    pub kind: DecisionKind,
    pub started: Instant,
    cancel: CancellationToken,
    /// Kept for escalation; the history copy may be evicted first
    event: Option<ClassifiedEvent>,
    route: Route,
    join: JoinHandle<()>,
}

#[derive(Default)]
struct Counters {
    paused: AtomicBool,
    running: AtomicBool,
    cycles: AtomicU64,
    buffered: AtomicUsize,
    shed: AtomicU64,
    stale_cycles: AtomicU64,
}

/// Point-in-time view of the engine for operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub running: bool,
    pub paused: bool,
    pub cycles: u64,
    /// Events waiting for a cycle
    pub buffered: usize,
    /// Events refused because the queue or buffer was full
    pub shed: u64,
    /// Current run of cycles decided on a stale snapshot
    pub stale_cycles: u64,
    pub pending_acts: usize,
    pub records: usize,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable front door to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineMessage>,
    history: Arc<DecisionHistory>,
    pending: Arc<DashMap<u64, PendingAct>>,
    counters: Arc<Counters>,
}

impl EngineHandle {
    /// Queue an admitted event without waiting. A full queue sheds the event.
    pub fn submit(&self, event: ClassifiedEvent) -> Result<()> {
        match self.tx.try_send(EngineMessage::Event(event)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(EngineMessage::Event(e))) => {
                self.counters.shed.fetch_add(1, Ordering::Relaxed);
                warn!("Decision queue full, shedding {}", e.address);
                Err(Error::QueueFull)
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(Error::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::QueueClosed),
        }
    }

    pub async fn pause(&self) -> Result<()> {
        self.control(EngineMessage::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.control(EngineMessage::Resume).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.control(EngineMessage::Shutdown).await
    }

    async fn control(&self, msg: EngineMessage) -> Result<()> {
        self.tx.send(msg).await.map_err(|_| Error::QueueClosed)
    }

    pub fn history(&self) -> Arc<DecisionHistory> {
        self.history.clone()
    }

    /// Record ids of acts still in flight, oldest first.
    pub fn pending_acts(&self) -> Vec<(u64, DecisionKind)> {
        let mut acts: Vec<(u64, DecisionKind)> = self
            .pending
            .iter()
            .map(|entry| (entry.record_id, entry.kind))
            .collect();
        acts.sort_unstable_by_key(|(id, _)| *id);
        acts
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            running: self.counters.running.load(Ordering::Relaxed),
            paused: self.counters.paused.load(Ordering::Relaxed),
            cycles: self.counters.cycles.load(Ordering::Relaxed),
            buffered: self.counters.buffered.load(Ordering::Relaxed),
            shed: self.counters.shed.load(Ordering::Relaxed),
            stale_cycles: self.counters.stale_cycles.load(Ordering::Relaxed),
            pending_acts: self.pending.len(),
            records: self.history.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct Queued {
    seq: u64,
    route: Route,
    event: ClassifiedEvent,
}

enum Flow {
    Continue,
    Stop,
}

pub struct DecisionEngine {
    rx: mpsc::Receiver<EngineMessage>,
    config: EngineConfig,
    policy: DecisionPolicy,
    table: Arc<DispatchTable>,
    capacity: Arc<dyn CapacitySource>,
    actor: Arc<Actor>,
    history: Arc<DecisionHistory>,
    pending: Arc<DashMap<u64, PendingAct>>,
    counters: Arc<Counters>,
    buffer: Vec<Queued>,
    next_seq: u64,
    next_record_id: u64,
    cycle: u64,
    paused: bool,
    last_capacity: Option<CapacitySnapshot>,
    stale_streak: u32,
    stale_alerted: bool,
}

impl DecisionEngine {
    /// Build an engine and the handle that feeds it. Nothing runs until
    /// [`run`](Self::run) is awaited.
    pub fn new(
        config: EngineConfig,
        provisioning: ProvisioningConfig,
        table: Arc<DispatchTable>,
        collaborators: Collaborators,
    ) -> (Self, EngineHandle) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let history = Arc::new(DecisionHistory::new(config.history_cap));
        let pending = Arc::new(DashMap::new());
        let counters = Arc::new(Counters::default());

        let policy = DecisionPolicy {
            thresholds: config.thresholds,
            monitor_interval_ms: config.monitor_interval_ms,
            worker_profile: provisioning.worker_profile.clone(),
        };
        let actor = Arc::new(Actor {
            provisioner: collaborators.provisioner,
            alerts: collaborators.alerts,
            retry: provisioning.retry.clone(),
            act_timeout: provisioning.act_timeout(),
            tx: tx.downgrade(),
        });

        let handle = EngineHandle {
            tx,
            history: history.clone(),
            pending: pending.clone(),
            counters: counters.clone(),
        };
        let engine = Self {
            rx,
            config,
            policy,
            table,
            capacity: collaborators.capacity,
            actor,
            history,
            pending,
            counters,
            buffer: Vec::new(),
            next_seq: 0,
            next_record_id: 1,
            cycle: 0,
            paused: false,
            last_capacity: None,
            stale_streak: 0,
            stale_alerted: false,
        };
        (engine, handle)
    }

    /// Run until Shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        info!(
            "Decision engine started (batch {}, cycle {:?})",
            self.config.batch_size,
            self.config.cycle_interval()
        );
        self.counters.running.store(true, Ordering::Relaxed);

        let mut ticker = tokio::time::interval(self.config.cycle_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                msg = self.rx.recv() => {
                    let Some(msg) = msg else {
                        info!("Decision queue closed, shutting down");
                        self.cancel_all("queue closed");
                        break;
                    };
                    if let Flow::Stop = self.handle(msg) {
                        break;
                    }
                    // Take whatever else is already waiting before deciding
                    let mut stop = false;
                    while let Ok(msg) = self.rx.try_recv() {
                        if let Flow::Stop = self.handle(msg) {
                            stop = true;
                            break;
                        }
                    }
                    if stop {
                        break;
                    }
                    while !self.paused && !self.buffer.is_empty() {
                        self.run_cycle();
                    }
                }
                _ = ticker.tick() => {
                    if !self.paused {
                        self.run_cycle();
                    }
                }
            }
        }

        self.counters.running.store(false, Ordering::Relaxed);
        info!(
            "Decision engine stopped after {} cycles, {} records retained",
            self.cycle,
            self.history.len()
        );
    }

    fn handle(&mut self, msg: EngineMessage) -> Flow {
        match msg {
            EngineMessage::Event(event) => self.enqueue(event),
            EngineMessage::ActFinished(report) => self.finish_act(report),
            EngineMessage::MonitorTick { record_id } => {
                if self.settle_pending(record_id, Outcome::Success).is_some() {
                    debug!("Monitor interval for record {} elapsed", record_id);
                }
                if !self.paused {
                    self.run_cycle();
                }
            }
            EngineMessage::Pause => {
                if !self.paused {
                    info!("Decision engine paused ({} buffered)", self.buffer.len());
                }
                self.set_paused(true);
            }
            EngineMessage::Resume => {
                if self.paused {
                    info!("Decision engine resumed ({} buffered)", self.buffer.len());
                }
                self.set_paused(false);
            }
            EngineMessage::Shutdown => {
                info!("Decision engine received Shutdown");
                self.cancel_all("engine shutdown");
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
        self.counters.paused.store(paused, Ordering::Relaxed);
    }

    fn enqueue(&mut self, event: ClassifiedEvent) {
        if self.buffer.len() >= self.config.queue_capacity {
            self.counters.shed.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Event buffer full ({}), shedding {}",
                self.buffer.len(),
                event.address
            );
            return;
        }
        let route = self.table.route(event.operation);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.buffer.push(Queued { seq, route, event });
        self.counters
            .buffered
            .store(self.buffer.len(), Ordering::Relaxed);
    }

    // -----------------------------------------------------------------------
    // Cycle
    // -----------------------------------------------------------------------

    fn run_cycle(&mut self) {
        self.cycle += 1;
        self.counters.cycles.store(self.cycle, Ordering::Relaxed);

        let capacity = self.observe_capacity();
        if !capacity.stale {
            self.cancel_stale_spins(&capacity);
        }

        let batch = self.take_batch();
        if batch.is_empty() {
            return;
        }
        debug!(
            "Cycle {}: {} events, headroom {:.2}{}",
            self.cycle,
            batch.len(),
            capacity.headroom(),
            if capacity.stale { " (stale)" } else { "" }
        );

        for queued in batch {
            let mut effective = capacity.clone();
            effective.active_worker_count = effective
                .active_worker_count
                .saturating_add(self.pending_spins());

            let decision = decide(&queued.event, &effective, &self.policy);
            debug!(
                "Cycle {}: {} -> {} via {} ({})",
                self.cycle,
                queued.event.address,
                decision.kind(),
                queued.route.handler,
                queued.route.priority
            );
            self.record_and_act(Some(queued.event), effective, decision, queued.route, None);
        }
    }

    /// Highest route priority first, then arrival order.
    fn take_batch(&mut self) -> Vec<Queued> {
        self.buffer
            .sort_by_key(|q| (Reverse(q.route.priority), q.seq));
        let n = self.config.batch_size.max(1).min(self.buffer.len());
        let batch: Vec<Queued> = self.buffer.drain(..n).collect();
        self.counters
            .buffered
            .store(self.buffer.len(), Ordering::Relaxed);
        batch
    }

    fn pending_spins(&self) -> u32 {
        self.pending
            .iter()
            .filter(|p| p.kind == DecisionKind::SpinWorker)
            .count() as u32
    }

    /// Fresh snapshot, or the last known one marked stale. Raises one engine
    /// alert per unavailability streak.
    fn observe_capacity(&mut self) -> CapacitySnapshot {
        match self.capacity.snapshot() {
            Ok(snapshot) => {
                if self.stale_streak > 0 {
                    info!(
                        "Capacity source recovered after {} stale cycles",
                        self.stale_streak
                    );
                }
                self.stale_streak = 0;
                self.stale_alerted = false;
                self.counters.stale_cycles.store(0, Ordering::Relaxed);
                self.last_capacity = Some(snapshot.clone());
                snapshot
            }
            Err(e) => {
                self.stale_streak += 1;
                self.counters
                    .stale_cycles
                    .store(self.stale_streak as u64, Ordering::Relaxed);
                let snapshot = match &self.last_capacity {
                    Some(last) => last.clone().into_stale(),
                    None => CapacitySnapshot::exhausted(),
                };
                warn!(
                    "Capacity snapshot failed ({}); using stale figures, streak {}",
                    e, self.stale_streak
                );
                if self.stale_streak >= self.config.stale_alert_after && !self.stale_alerted {
                    self.stale_alerted = true;
                    self.raise_capacity_alert(&snapshot, &e);
                }
                snapshot
            }
        }
    }

    fn raise_capacity_alert(&mut self, snapshot: &CapacitySnapshot, cause: &Error) {
        let payload = AlertPayload {
            severity: AlertSeverity::Critical,
            reason: AlertReason::CapacityUnavailable {
                consecutive: self.stale_streak,
            },
            subject: None,
            threat_score: None,
            message: format!(
                "capacity source unavailable for {} consecutive cycles: {}",
                self.stale_streak, cause
            ),
        };
        let route = Route {
            handler: HandlerRef::new(ENGINE_HANDLER),
            priority: Priority::Critical,
        };
        self.record_and_act(None, snapshot.clone(), Decision::Alert(payload), route, None);
    }

    /// Cancel SpinWorker acts the fresh snapshot no longer supports.
    fn cancel_stale_spins(&mut self, capacity: &CapacitySnapshot) {
        let min_headroom = self.policy.thresholds.min_headroom;
        let max_age = self.config.spin_stale_after();
        let stale: Vec<(u64, String)> = self
            .pending
            .iter()
            .filter(|p| p.kind == DecisionKind::SpinWorker)
            .filter_map(|p| {
                let age = p.started.elapsed();
                if age > max_age {
                    Some((p.record_id, format!("pending for {:?}", age)))
                } else if capacity.headroom() < min_headroom {
                    Some((
                        p.record_id,
                        format!("headroom fell to {:.2}", capacity.headroom()),
                    ))
                } else if !capacity.has_worker_slot() {
                    Some((p.record_id, "worker ceiling reached".to_string()))
                } else {
                    None
                }
            })
            .collect();

        for (id, reason) in stale {
            info!("Cancelling SpinWorker act for record {}: {}", id, reason);
            self.cancel_act(id, &reason);
        }
    }

    // -----------------------------------------------------------------------
    // Act bookkeeping
    // -----------------------------------------------------------------------

    /// Append the record, then launch its act.
    fn record_and_act(
        &mut self,
        event: Option<ClassifiedEvent>,
        capacity: CapacitySnapshot,
        decision: Decision,
        route: Route,
        escalated_from: Option<u64>,
    ) -> u64 {
        let id = self.next_record_id;
        self.next_record_id += 1;

        self.history.append(DecisionRecord {
            id,
            cycle: self.cycle,
            event: event.clone(),
            capacity,
            decision: decision.clone(),
            handler: route.handler.clone(),
            priority: route.priority,
            decided_at: Utc::now(),
            outcome: None,
            notes: Vec::new(),
            escalated_from,
        });

        let cancel = CancellationToken::new();
        let join = self.actor.launch(id, &decision, cancel.clone());
        self.pending.insert(
            id,
            PendingAct {
                record_id: id,
                kind: decision.kind(),
                started: Instant::now(),
                cancel,
                event,
                route,
                join,
            },
        );
        id
    }

    fn settle_pending(&mut self, id: u64, outcome: Outcome) -> Option<PendingAct> {
        let (_, act) = self.pending.remove(&id)?;
        self.history.settle(id, outcome);
        Some(act)
    }

    fn cancel_act(&mut self, id: u64, reason: &str) {
        if let Some(act) = self.settle_pending(id, Outcome::Cancelled) {
            act.cancel.cancel();
            self.history.annotate(id, DecisionNote::cancelled(reason));
        }
    }

    fn cancel_all(&mut self, reason: &str) {
        let ids: Vec<u64> = self.pending.iter().map(|p| p.record_id).collect();
        if !ids.is_empty() {
            info!("Cancelling {} in-flight acts: {}", ids.len(), reason);
        }
        for id in ids {
            if let Some(act) = self.settle_pending(id, Outcome::Cancelled) {
                act.cancel.cancel();
                act.join.abort();
                self.history.annotate(id, DecisionNote::cancelled(reason));
            }
        }
    }

    fn finish_act(&mut self, report: ActReport) {
        let Some(act) = self.settle_pending(report.record_id, report.outcome.clone()) else {
            debug!(
                "Ignoring late report for record {} (already settled)",
                report.record_id
            );
            return;
        };
        if report.attempts > 1 {
            self.history
                .annotate(report.record_id, DecisionNote::retried(report.attempts));
        }

        match (report.kind, report.outcome.is_failure()) {
            (DecisionKind::SpinWorker, true) => self.escalate(act, &report),
            (DecisionKind::Alert, true) => {
                error!(
                    "Alert for record {} undelivered after {} attempts: {}",
                    report.record_id,
                    report.attempts,
                    report.last_error.as_deref().unwrap_or("unknown error")
                );
            }
            _ => debug!(
                "Record {} settled: {:?} after {} attempts",
                report.record_id, report.outcome, report.attempts
            ),
        }
    }

    /// One Alert for a SpinWorker that exhausted its retries.
    fn escalate(&mut self, act: PendingAct, report: &ActReport) {
        let last_error = report
            .last_error
            .clone()
            .unwrap_or_else(|| "unknown error".to_string());
        warn!(
            "SpinWorker for record {} failed after {} attempts: {}; escalating",
            report.record_id, report.attempts, last_error
        );
        let payload = AlertPayload {
            severity: AlertSeverity::Critical,
            reason: AlertReason::ProvisioningFailed {
                record_id: report.record_id,
                attempts: report.attempts,
                last_error: last_error.clone(),
            },
            subject: act.event.as_ref().map(|e| e.address.to_string()),
            threat_score: act.event.as_ref().map(|e| e.threat_score),
            message: format!(
                "worker provisioning failed after {} attempts: {}",
                report.attempts, last_error
            ),
        };
        let capacity = self
            .last_capacity
            .clone()
            .unwrap_or_else(CapacitySnapshot::exhausted);
        let alert_id = self.record_and_act(
            act.event,
            capacity,
            Decision::Alert(payload),
            act.route,
            Some(report.record_id),
        );
        self.history
            .annotate(report.record_id, DecisionNote::escalated(alert_id));
    }
}
