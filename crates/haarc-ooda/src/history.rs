//! Bounded, append-only decision history

use crate::decision::{DecisionKind, DecisionNote, DecisionRecord, Outcome};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Decision records in id order. The engine loop is the only writer; any
/// number of audit readers may query concurrently.
pub struct DecisionHistory {
    cap: usize,
    records: RwLock<VecDeque<DecisionRecord>>,
}

/// Per-kind and per-outcome tallies over the retained records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub total: usize,
    pub spin_worker: usize,
    pub alert: usize,
    pub monitor: usize,
    pub pending: usize,
    pub success: usize,
    pub failed: usize,
    pub timeout: usize,
    pub cancelled: usize,
    pub escalations: usize,
}

impl DecisionHistory {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            cap,
            records: RwLock::new(VecDeque::with_capacity(cap.min(4096))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Append a record, evicting the oldest past the cap.
    pub(crate) fn append(&self, record: DecisionRecord) {
        let mut records = self.records.write();
        debug_assert!(records.back().map_or(true, |r| r.id < record.id));
        records.push_back(record);
        while records.len() > self.cap {
            records.pop_front();
        }
    }

    /// Fill the outcome of a still-open record. Returns false if the record
    /// is gone or already settled.
    pub(crate) fn settle(&self, id: u64, outcome: Outcome) -> bool {
        let mut records = self.records.write();
        match position(&records, id) {
            Some(i) if records[i].outcome.is_none() => {
                records[i].outcome = Some(outcome);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn annotate(&self, id: u64, note: DecisionNote) -> bool {
        let mut records = self.records.write();
        match position(&records, id) {
            Some(i) => {
                records[i].notes.push(note);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: u64) -> Option<DecisionRecord> {
        let records = self.records.read();
        position(&records, id).map(|i| records[i].clone())
    }

    /// Records decided within `[since, until]`, oldest first.
    pub fn export(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Vec<DecisionRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.decided_at >= since && r.decided_at <= until)
            .cloned()
            .collect()
    }

    /// Every retained record, oldest first.
    pub fn all(&self) -> Vec<DecisionRecord> {
        self.records.read().iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<DecisionRecord> {
        self.records.read().back().cloned()
    }

    pub fn summary(&self) -> HistorySummary {
        let records = self.records.read();
        let mut s = HistorySummary {
            total: records.len(),
            ..Default::default()
        };
        for r in records.iter() {
            match r.kind() {
                DecisionKind::SpinWorker => s.spin_worker += 1,
                DecisionKind::Alert => s.alert += 1,
                DecisionKind::Monitor => s.monitor += 1,
            }
            match &r.outcome {
                None => s.pending += 1,
                Some(Outcome::Success) => s.success += 1,
                Some(Outcome::Failed { .. }) => s.failed += 1,
                Some(Outcome::Timeout) => s.timeout += 1,
                Some(Outcome::Cancelled) => s.cancelled += 1,
            }
            if r.escalated_from.is_some() {
                s.escalations += 1;
            }
        }
        s
    }
}

fn position(records: &VecDeque<DecisionRecord>, id: u64) -> Option<usize> {
    let i = records.partition_point(|r| r.id < id);
    (i < records.len() && records[i].id == id).then_some(i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Decision;
    use chrono::Duration;
    use haarc_core::{CapacitySnapshot, Priority};
    use haarc_dispatch::HandlerRef;

    fn record(id: u64, at: DateTime<Utc>) -> DecisionRecord {
        DecisionRecord {
            id,
            cycle: id,
            event: None,
            capacity: CapacitySnapshot::new(0.1, 0.1, 0, 1),
            decision: Decision::Monitor { interval_ms: 10 },
            handler: HandlerRef::new("h"),
            priority: Priority::Normal,
            decided_at: at,
            outcome: None,
            notes: Vec::new(),
            escalated_from: None,
        }
    }

    #[test]
    fn oldest_records_are_evicted() {
        let h = DecisionHistory::new(3);
        let now = Utc::now();
        for id in 1..=5 {
            h.append(record(id, now));
        }
        assert_eq!(h.len(), 3);
        assert!(h.get(1).is_none());
        assert!(h.get(2).is_none());
        assert_eq!(h.get(3).map(|r| r.id), Some(3));
        assert_eq!(h.latest().map(|r| r.id), Some(5));
    }

    #[test]
    fn export_is_inclusive_and_ordered() {
        let h = DecisionHistory::new(10);
        let t0 = Utc::now();
        for id in 0..5u64 {
            h.append(record(id + 1, t0 + Duration::seconds(id as i64)));
        }
        let ids: Vec<u64> = h
            .export(t0 + Duration::seconds(1), t0 + Duration::seconds(3))
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![2, 3, 4]);
        assert!(h.export(t0 + Duration::seconds(9), t0 + Duration::seconds(10)).is_empty());
    }

    #[test]
    fn outcome_is_set_once() {
        let h = DecisionHistory::new(4);
        h.append(record(1, Utc::now()));
        assert!(h.settle(1, Outcome::Success));
        assert!(!h.settle(1, Outcome::Cancelled));
        assert_eq!(h.get(1).and_then(|r| r.outcome), Some(Outcome::Success));
        assert!(!h.settle(99, Outcome::Success));
    }

    #[test]
    fn notes_append_without_touching_decision() {
        let h = DecisionHistory::new(4);
        h.append(record(1, Utc::now()));
        let before = h.get(1).unwrap();
        assert!(h.annotate(1, DecisionNote::cancelled("stale")));
        let after = h.get(1).unwrap();
        assert_eq!(after.notes.len(), 1);
        assert_eq!(after.decision, before.decision);
        assert_eq!(after.decided_at, before.decided_at);
    }

    #[test]
    fn summary_tallies() {
        let h = DecisionHistory::new(10);
        for id in 1..=3 {
            h.append(record(id, Utc::now()));
        }
        h.settle(1, Outcome::Success);
        h.settle(2, Outcome::Failed { reason: "x".into() });
        let s = h.summary();
        assert_eq!(s.total, 3);
        assert_eq!(s.monitor, 3);
        assert_eq!(s.success, 1);
        assert_eq!(s.failed, 1);
        assert_eq!(s.pending, 1);
    }
}
