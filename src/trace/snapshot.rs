//! Deterministic JSON state snapshots.
//!
//! A snapshot is a canonical JSON rendering of the kernel's semantic
//! state: region states, task states and outcomes, obligation states, the
//! scheduler event count, and the trace digest. Arrays are in ascending
//! slot order and every object's keys are alphabetical (serde_json maps
//! are BTree-backed), so two runs with equal semantic state produce
//! byte-identical documents.

use crate::types::outcome::Outcome;
use crate::types::transition::{ObligationState, RegionState, TaskState};
use crate::util::digest_bytes;
use serde_json::{Map, Value, json};

/// Accumulates kernel state rows and renders the canonical document.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    regions: Vec<Value>,
    tasks: Vec<Value>,
    obligations: Vec<Value>,
    sched_event_count: u64,
    trace_event_count: u64,
    trace_digest: u64,
}

impl SnapshotBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a region row. Call in ascending slot order.
    pub fn push_region(&mut self, slot: u32, state: RegionState, poisoned: bool) {
        self.regions.push(json!({
            "poisoned": poisoned,
            "slot": slot,
            "state": state.as_str(),
        }));
    }

    /// Appends a task row. Call in ascending slot order.
    pub fn push_task(&mut self, slot: u32, state: TaskState, outcome: Option<Outcome>) {
        self.tasks.push(json!({
            "outcome": outcome.map(|o| Value::from(o.as_str())).unwrap_or(Value::Null),
            "slot": slot,
            "state": state.as_str(),
        }));
    }

    /// Appends an obligation row. Call in ascending slot order.
    pub fn push_obligation(&mut self, slot: u32, state: ObligationState) {
        self.obligations.push(json!({
            "slot": slot,
            "state": state.as_str(),
        }));
    }

    /// Records the scheduler event count.
    pub fn set_scheduler(&mut self, event_count: u64) {
        self.sched_event_count = event_count;
    }

    /// Records the trace count and digest.
    pub fn set_trace(&mut self, event_count: u64, digest: u64) {
        self.trace_event_count = event_count;
        self.trace_digest = digest;
    }

    /// Renders the canonical JSON document.
    #[must_use]
    pub fn build(self) -> String {
        let mut root = Map::new();
        root.insert("obligations".into(), Value::Array(self.obligations));
        root.insert("regions".into(), Value::Array(self.regions));
        root.insert(
            "scheduler".into(),
            json!({ "event_count": self.sched_event_count }),
        );
        root.insert("tasks".into(), Value::Array(self.tasks));
        root.insert(
            "trace".into(),
            json!({
                "digest": self.trace_digest,
                "event_count": self.trace_event_count,
            }),
        );
        Value::Object(root).to_string()
    }
}

/// Digest of an emitted snapshot document.
#[must_use]
pub fn snapshot_digest(document: &str) -> u64 {
    digest_bytes(document.as_bytes())
}
