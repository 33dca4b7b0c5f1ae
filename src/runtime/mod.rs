//! The kernel: arenas, scheduler, and the embedder-facing surface.
//!
//! A [`Kernel`] owns every arena and ring for one runtime instance. The
//! process-wide runtime of the reference design is rendered as a
//! first-class value; [`Kernel::reset`] provides the full-teardown
//! semantics tests assume. All methods take `&mut self`: the kernel is
//! strictly single-threaded and lock-free.
//!
//! - [`region`]: region arena and lifecycle
//! - [`task`]: task arena, spawning, poll context
//! - [`obligation`]: linear reservation arena
//! - [`cancel`]: the cancellation protocol engine
//! - [`scheduler`]: the deterministic poll loop and its event ring
//! - [`containment`]: per-profile fault containment

pub mod cancel;
pub mod containment;
pub mod obligation;
pub mod region;
pub mod scheduler;
pub mod task;

use crate::config::RuntimeConfig;
use crate::hooks::Hooks;
use crate::monitor::ghost::{GhostKind, GhostRing, GhostViolation};
use crate::monitor::hindsight::{HindsightEvent, HindsightKind, HindsightPolicy, HindsightRing};
use crate::status::Status;
use crate::trace::replay::{ReplayReport, ReplayState};
use crate::trace::ring::{TraceEvent, TraceKind, TraceRing, import_binary};
use crate::trace::snapshot::{SnapshotBuilder, snapshot_digest};
use crate::types::budget::Budget;
use crate::types::transition::{
    ObligationState, RegionState, TaskState, obligation_transition, region_transition,
    task_transition,
};

use crate::channel::ChannelTable;
use crate::timer::TimerTable;
use obligation::ObligationTable;
use region::RegionTable;
use scheduler::SchedRing;
use task::TaskTable;

/// Number of region slots.
pub const REGION_CAPACITY: usize = 16;
/// Number of task slots.
pub const TASK_CAPACITY: usize = 64;
/// Number of obligation slots.
pub const OBLIGATION_CAPACITY: usize = 64;
/// Number of channel slots.
pub const CHANNEL_CAPACITY: usize = 16;
/// Number of timer slots.
pub const TIMER_CAPACITY: usize = 64;
/// Per-region captured-state arena budget, in bytes.
pub const CAPTURE_ARENA_BYTES: u32 = 16 * 1024;

/// The deterministic cooperative task kernel.
pub struct Kernel {
    pub(crate) config: RuntimeConfig,
    pub(crate) hooks: Hooks,
    pub(crate) regions: RegionTable,
    pub(crate) tasks: TaskTable,
    pub(crate) obligations: ObligationTable,
    pub(crate) channels: ChannelTable,
    pub(crate) timers: TimerTable,
    pub(crate) trace: TraceRing,
    pub(crate) ghost: GhostRing,
    pub(crate) hindsight: HindsightRing,
    pub(crate) sched: SchedRing,
    pub(crate) replay: ReplayState,
    pub(crate) last_replay: Option<ReplayReport>,
}

impl Kernel {
    /// Creates a kernel with the default configuration and default hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Creates a kernel with the given configuration.
    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            config,
            hooks: Hooks::init(),
            regions: RegionTable::new(),
            tasks: TaskTable::new(),
            obligations: ObligationTable::new(),
            channels: ChannelTable::new(),
            timers: TimerTable::new(),
            trace: TraceRing::new(),
            ghost: GhostRing::new(),
            hindsight: HindsightRing::new(),
            sched: SchedRing::new(),
            replay: ReplayState::new(),
            last_replay: None,
        }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Tears down every arena and ring, restoring the just-constructed
    /// state. Hooks and configuration are retained; captured task state is
    /// dropped.
    pub fn reset(&mut self) {
        self.regions = RegionTable::new();
        self.tasks = TaskTable::new();
        self.obligations = ObligationTable::new();
        self.channels = ChannelTable::new();
        self.timers = TimerTable::new();
        self.trace.reset();
        self.ghost.reset();
        self.hindsight.reset();
        self.sched.reset();
        self.replay.clear_reference();
        self.last_replay = None;
        tracing::debug!(target: "lockstep::runtime", "runtime reset");
    }

    // ── Hooks ───────────────────────────────────────────────────────────

    /// Validates and installs a hooks record, replacing the active one.
    pub fn set_hooks(&mut self, hooks: Hooks) -> Result<(), Status> {
        hooks.validate(self.config.deterministic)?;
        self.hooks = hooks;
        Ok(())
    }

    /// Re-validates the active hooks against the configured mode.
    pub fn hooks_validate(&self) -> Result<(), Status> {
        self.hooks.validate(self.config.deterministic)
    }

    /// Returns the active hooks record.
    #[must_use]
    pub const fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Latches the allocator seal. Idempotent.
    pub fn seal_allocator(&mut self) {
        self.hooks.seal_allocator();
    }

    /// Allocates through the hooked allocator, honoring the seal.
    pub fn runtime_alloc(&mut self, len: usize) -> Result<Box<[u8]>, Status> {
        if self.hooks.allocator_sealed() {
            return Err(Status::AllocatorSealed);
        }
        let allocator = self.hooks.allocator.clone().ok_or(Status::InvalidState)?;
        allocator.alloc(len).ok_or(Status::ResourceExhausted)
    }

    /// Reads the mode-appropriate clock.
    ///
    /// Deterministic mode reads the logical clock; live mode reads the
    /// wall clock. Every read lands in the trace and the hindsight ring.
    pub fn runtime_now_ns(&mut self) -> Result<u64, Status> {
        let clock = if self.config.deterministic {
            self.hooks
                .logical_clock
                .clone()
                .ok_or(Status::DeterminismViolation)?
        } else {
            self.hooks.wall_clock.clone().ok_or(Status::InvalidState)?
        };
        let now = clock.now_ns();
        let trace_seq = self.trace.emit(TraceKind::NdClock, 0, 0);
        self.hindsight
            .log(HindsightKind::ClockRead, trace_seq, 0, now);
        Ok(now)
    }

    /// Reads the hooked entropy source. Every read lands in the trace and
    /// the hindsight ring.
    pub fn runtime_random_u64(&mut self) -> Result<u64, Status> {
        let entropy = self.hooks.entropy.clone().ok_or(Status::InvalidState)?;
        let value = entropy.next_u64();
        let trace_seq = self.trace.emit(TraceKind::NdEntropy, 0, 0);
        self.hindsight
            .log(HindsightKind::EntropyRead, trace_seq, 0, value);
        Ok(value)
    }

    /// Waits on the hooked reactor.
    ///
    /// Deterministic mode prefers the ghost wait (a pure logical step)
    /// over a live wait.
    pub fn runtime_reactor_wait(&mut self, budget: &Budget) -> Result<(), Status> {
        let reactor = self.hooks.reactor.clone().ok_or(Status::InvalidState)?;
        let status = if self.config.deterministic {
            reactor.ghost_wait()
        } else {
            reactor.wait(budget)
        };
        let trace_seq = self.trace.emit(TraceKind::NdReactor, 0, 0);
        match status {
            Status::Ok => {
                self.hindsight
                    .log(HindsightKind::IoReadiness, trace_seq, 0, 1);
                Ok(())
            }
            other => {
                self.hindsight.log(HindsightKind::IoTimeout, trace_seq, 0, 0);
                Err(other)
            }
        }
    }

    /// Writes one line through the hooked log sink.
    ///
    /// A missing sink is a silent no-op.
    pub fn runtime_log_write(&self, line: &str) {
        if let Some(sink) = &self.hooks.log {
            sink.write(line);
        }
    }

    // ── Gated transitions ───────────────────────────────────────────────

    /// Applies a region transition, notifying the protocol monitor on
    /// rejection.
    pub(crate) fn gate_region(&mut self, idx: usize, to: RegionState) -> Result<(), Status> {
        let slot = &mut self.regions.slots[idx];
        let from = slot.state;
        match region_transition(from, to) {
            Ok(()) => {
                slot.state = to;
                Ok(())
            }
            Err(status) => {
                self.ghost.record(
                    GhostKind::ProtocolRegion,
                    slot.handle.to_bits(),
                    from.ordinal(),
                    to.ordinal(),
                );
                Err(status)
            }
        }
    }

    /// Applies a task transition, notifying the protocol monitor on
    /// rejection.
    pub(crate) fn gate_task(&mut self, idx: usize, to: TaskState) -> Result<(), Status> {
        let slot = &mut self.tasks.slots[idx];
        let from = slot.state;
        match task_transition(from, to) {
            Ok(()) => {
                slot.state = to;
                Ok(())
            }
            Err(status) => {
                self.ghost.record(
                    GhostKind::ProtocolTask,
                    slot.handle.to_bits(),
                    from.ordinal(),
                    to.ordinal(),
                );
                Err(status)
            }
        }
    }

    /// Applies an obligation transition, notifying the protocol monitor
    /// (and the linearity monitor on double resolution) on rejection.
    pub(crate) fn gate_obligation(&mut self, idx: usize, to: ObligationState) -> Result<(), Status> {
        let slot = &mut self.obligations.slots[idx];
        let from = slot.state;
        match obligation_transition(from, to) {
            Ok(()) => {
                slot.state = to;
                Ok(())
            }
            Err(status) => {
                let bits = slot.handle.to_bits();
                self.ghost.record(
                    GhostKind::ProtocolObligation,
                    bits,
                    from.ordinal(),
                    to.ordinal(),
                );
                if from.is_terminal() {
                    self.ghost
                        .record(GhostKind::LinearityDouble, bits, from.ordinal(), to.ordinal());
                }
                Err(status)
            }
        }
    }

    // ── Trace surface ───────────────────────────────────────────────────

    /// Emits one trace event, returning its sequence number.
    pub fn trace_emit(&mut self, kind: TraceKind, entity: u64, aux: u32) -> u64 {
        self.trace.emit(kind, entity, aux)
    }

    /// Total trace events ever emitted.
    #[must_use]
    pub const fn trace_event_count(&self) -> u64 {
        self.trace.count()
    }

    /// Returns the `i`-th readable trace event, oldest first.
    #[must_use]
    pub fn trace_event_get(&self, i: usize) -> Option<TraceEvent> {
        self.trace.get(i)
    }

    /// Digest over the entire trace history.
    #[must_use]
    pub const fn trace_digest(&self) -> u64 {
        self.trace.digest()
    }

    /// Clears the trace ring, its count, and its digest.
    pub fn trace_reset(&mut self) {
        self.trace.reset();
    }

    /// Encodes the readable trace window as a binary artifact.
    #[must_use]
    pub fn trace_export_binary(&self) -> Vec<u8> {
        self.trace.export_binary()
    }

    /// Decodes a binary artifact and installs it as the replay reference.
    pub fn trace_import_binary(&mut self, buf: &[u8]) -> Result<(), Status> {
        let events = import_binary(buf)?;
        self.replay.load_reference(&events)
    }

    /// Compares the live trace against a binary artifact.
    pub fn trace_continuity_check(&self, buf: &[u8]) -> Result<(), Status> {
        self.trace.continuity_check(buf)
    }

    // ── Replay surface ──────────────────────────────────────────────────

    /// Stores a private copy of the given events as the replay reference.
    pub fn replay_load_reference(&mut self, events: &[TraceEvent]) -> Result<(), Status> {
        self.replay.load_reference(events)
    }

    /// Verifies the live trace against the reference and records the
    /// report for divergence-triggered flushes.
    pub fn replay_verify(&mut self) -> ReplayReport {
        let report = self.replay.verify(&self.trace);
        self.last_replay = Some(report);
        report
    }

    /// Drops the replay reference.
    pub fn replay_clear_reference(&mut self) {
        self.replay.clear_reference();
    }

    // ── Ghost surface ───────────────────────────────────────────────────

    /// Number of readable ghost violations.
    #[must_use]
    pub fn ghost_violation_count(&self) -> usize {
        self.ghost.count()
    }

    /// Returns the `i`-th readable violation, oldest first.
    #[must_use]
    pub fn ghost_violation_get(&self, i: usize) -> Option<GhostViolation> {
        self.ghost.get(i)
    }

    /// Whether ghost entries have been overwritten.
    #[must_use]
    pub fn ghost_ring_overflowed(&self) -> bool {
        self.ghost.overflowed()
    }

    /// Clears the ghost ring.
    pub fn ghost_reset(&mut self) {
        self.ghost.reset();
    }

    // ── Hindsight surface ───────────────────────────────────────────────

    /// Logs an embedder-side nondeterminism observation.
    pub fn hindsight_log(&mut self, kind: HindsightKind, entity: u64, observed: u64) -> u64 {
        let trace_seq = self.trace.next_sequence();
        self.hindsight.log(kind, trace_seq, entity, observed)
    }

    /// Total hindsight observations ever logged.
    #[must_use]
    pub const fn hindsight_total_count(&self) -> u64 {
        self.hindsight.total_count()
    }

    /// Number of readable hindsight observations.
    #[must_use]
    pub fn hindsight_readable_count(&self) -> usize {
        self.hindsight.readable_count()
    }

    /// Returns the `i`-th readable observation, oldest first.
    #[must_use]
    pub fn hindsight_get(&self, i: usize) -> Option<HindsightEvent> {
        self.hindsight.get(i)
    }

    /// Digest over the entire observation history.
    #[must_use]
    pub const fn hindsight_digest(&self) -> u64 {
        self.hindsight.digest()
    }

    /// Whether hindsight entries have been overwritten.
    #[must_use]
    pub fn hindsight_overflowed(&self) -> bool {
        self.hindsight.overflowed()
    }

    /// Clears the hindsight ring; policy is retained.
    pub fn hindsight_reset(&mut self) {
        self.hindsight.reset();
    }

    /// Replaces the hindsight flush policy.
    pub fn hindsight_set_policy(&mut self, policy: HindsightPolicy) {
        self.hindsight.set_policy(policy);
    }

    /// Returns the active hindsight flush policy.
    #[must_use]
    pub const fn hindsight_policy_active(&self) -> HindsightPolicy {
        self.hindsight.policy_active()
    }

    /// Dumps the hindsight window as JSON and writes it to the log sink.
    pub fn hindsight_flush_json(&mut self) -> Result<String, Status> {
        let doc = self.hindsight.flush_json()?;
        self.runtime_log_write(&doc);
        Ok(doc)
    }

    /// Flushes for a ghost-violation trigger.
    ///
    /// Returns [`Status::Pending`] when the policy disables invariant
    /// flushes or no violation has been recorded.
    pub fn hindsight_flush_on_invariant(&mut self) -> Result<String, Status> {
        if self.ghost.count() == 0 {
            return Err(Status::Pending);
        }
        let doc = self.hindsight.flush_on_invariant()?;
        self.runtime_log_write(&doc);
        Ok(doc)
    }

    /// Flushes for a replay-divergence trigger.
    ///
    /// Returns [`Status::Pending`] when the policy disables divergence
    /// flushes or the last verification matched.
    pub fn hindsight_flush_on_divergence(&mut self) -> Result<String, Status> {
        match self.last_replay {
            Some(report) if !report.is_match() => {
                let doc = self.hindsight.flush_on_divergence()?;
                self.runtime_log_write(&doc);
                Ok(doc)
            }
            _ => Err(Status::Pending),
        }
    }

    /// Checks the last verification report against the flush policy.
    pub fn hindsight_check_divergence(&mut self) -> Result<String, Status> {
        self.hindsight_flush_on_divergence()
    }

    // ── Snapshot surface ────────────────────────────────────────────────

    /// Captures the canonical JSON snapshot of the kernel state.
    #[must_use]
    pub fn snapshot_capture(&self) -> String {
        let mut builder = SnapshotBuilder::new();
        for (slot, region) in self.regions.slots.iter().enumerate() {
            if region.ever_allocated {
                builder.push_region(slot as u32, region.state, region.poisoned);
            }
        }
        for (slot, task) in self.tasks.slots.iter().enumerate() {
            if task.ever_allocated {
                let outcome = task.state.is_terminal().then_some(task.outcome);
                builder.push_task(slot as u32, task.state, outcome);
            }
        }
        for (slot, obligation) in self.obligations.slots.iter().enumerate() {
            if obligation.ever_allocated {
                builder.push_obligation(slot as u32, obligation.state);
            }
        }
        builder.set_scheduler(self.sched.count());
        builder.set_trace(self.trace.count(), self.trace.digest());
        builder.build()
    }

    /// Digest of an emitted snapshot document.
    #[must_use]
    pub fn snapshot_digest(document: &str) -> u64 {
        snapshot_digest(document)
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("config", &self.config)
            .field("trace_count", &self.trace.count())
            .field("sched_count", &self.sched.count())
            .field("ghost_count", &self.ghost.count())
            .finish_non_exhaustive()
    }
}
