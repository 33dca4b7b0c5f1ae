//! The deterministic cooperative scheduler.
//!
//! Strictly single-threaded round-robin: tasks are polled in ascending
//! slot-index order, one poll per round, consuming the caller's budget.
//! Every decision is a pure function of the arena contents and the
//! budget, so two identical runs produce identical event sequences.
//!
//! Scheduler events land in their own bounded ring and are mirrored into
//! the trace ring; sequence numbers are monotone across the whole run and
//! never reset per round.

use crate::handle::Handle;
use crate::runtime::Kernel;
use crate::runtime::containment::ContainmentPolicy;
use crate::status::Status;
use crate::trace::ring::TraceKind;
use crate::types::budget::Budget;
use crate::types::outcome::Outcome;
use crate::types::transition::TaskState;
use core::fmt;

/// Capacity of the scheduler event ring.
pub const SCHED_RING_CAPACITY: usize = 1024;

/// The kind of a scheduler event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedEventKind {
    /// A task was polled.
    Poll,
    /// A task completed.
    Complete,
    /// The budget ran out; the run stopped.
    Budget,
    /// No live work remained at round start.
    Quiescent,
    /// A cancelled task exhausted its cleanup budget and was forced to
    /// completion without a poll.
    CancelForced,
}

impl SchedEventKind {
    /// Returns the lowercase name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Complete => "complete",
            Self::Budget => "budget",
            Self::Quiescent => "quiescent",
            Self::CancelForced => "cancel-forced",
        }
    }

    const fn trace_kind(self) -> TraceKind {
        match self {
            Self::Poll => TraceKind::SchedPoll,
            Self::Complete => TraceKind::SchedComplete,
            Self::Budget => TraceKind::SchedBudget,
            Self::Quiescent => TraceKind::SchedQuiescent,
            Self::CancelForced => TraceKind::SchedCancelForced,
        }
    }
}

impl fmt::Display for SchedEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scheduler event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedEvent {
    /// Monotone sequence number across the run.
    pub sequence: u64,
    /// What happened.
    pub kind: SchedEventKind,
    /// Packed handle bits of the task involved, or 0.
    pub task: u64,
    /// The round the event belongs to. Non-decreasing.
    pub round: u32,
    /// Kind-specific auxiliary word.
    pub aux: u32,
}

/// Bounded ring of scheduler events with a monotone count.
#[derive(Debug)]
pub(crate) struct SchedRing {
    entries: Vec<SchedEvent>,
    head: usize,
    count: u64,
}

impl SchedRing {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::with_capacity(SCHED_RING_CAPACITY),
            head: 0,
            count: 0,
        }
    }

    pub(crate) fn emit(&mut self, kind: SchedEventKind, task: u64, round: u32, aux: u32) -> u64 {
        let sequence = self.count;
        self.count += 1;
        let event = SchedEvent {
            sequence,
            kind,
            task,
            round,
            aux,
        };
        if self.entries.len() < SCHED_RING_CAPACITY {
            self.entries.push(event);
        } else {
            self.entries[self.head] = event;
            self.head = (self.head + 1) % SCHED_RING_CAPACITY;
        }
        sequence
    }

    pub(crate) const fn count(&self) -> u64 {
        self.count
    }

    pub(crate) fn get(&self, i: usize) -> Option<SchedEvent> {
        if i >= self.entries.len() {
            return None;
        }
        let idx = if self.count as usize > SCHED_RING_CAPACITY {
            (self.head + i) % SCHED_RING_CAPACITY
        } else {
            i
        };
        Some(self.entries[idx])
    }

    pub(crate) fn readable_count(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn reset(&mut self) {
        self.entries.clear();
        self.head = 0;
        self.count = 0;
    }
}

impl Kernel {
    /// Runs the scheduler over a region until quiescence or budget
    /// exhaustion.
    ///
    /// Returns `Ok(())` once no live task remains. Budget exhaustion
    /// leaves the region's round counter in place, so a subsequent call
    /// with a fresh budget continues where this one stopped.
    pub fn scheduler_run(&mut self, region: Handle, budget: &mut Budget) -> Result<(), Status> {
        let region_idx = self.regions.resolve(region)?;
        if self.regions.slots[region_idx].state.is_terminal() {
            return Err(Status::RegionClosed);
        }
        let generation = self.regions.slots[region_idx].generation;
        let mut round = self.regions.slots[region_idx].sched_round;

        let result = 'run: loop {
            if !self.region_has_live_tasks(region_idx, generation) {
                self.emit_sched(SchedEventKind::Quiescent, 0, round, 0);
                break 'run Ok(());
            }
            for idx in 0..self.tasks.next_free {
                {
                    let slot = &self.tasks.slots[idx];
                    if !slot.ever_allocated
                        || slot.parent != region_idx as u32
                        || slot.parent_generation != generation
                        || slot.state.is_terminal()
                    {
                        continue;
                    }
                }
                if budget.poll_quota == 0 {
                    self.emit_sched(SchedEventKind::Budget, 0, round, 0);
                    break 'run Err(Status::PollBudgetExhausted);
                }
                if budget.cost_quota == 0 {
                    self.emit_sched(SchedEventKind::Budget, 0, round, 1);
                    break 'run Err(Status::CostBudgetExceeded);
                }
                if self.tasks.slots[idx].state == TaskState::Created {
                    self.gate_task(idx, TaskState::Running)?;
                }
                let handle = self.tasks.slots[idx].handle;

                // Hard bound: a cancelled task whose cleanup budget is gone
                // completes without another poll.
                if self.tasks.slots[idx].state.in_cancel_phase()
                    && self.tasks.slots[idx].cleanup_polls_remaining == 0
                {
                    let kind_code = self.tasks.slots[idx]
                        .cancel
                        .as_ref()
                        .map_or(0, |reason| reason.kind().code());
                    self.finish_task(idx, Outcome::Cancelled);
                    self.emit_sched(
                        SchedEventKind::CancelForced,
                        handle.to_bits(),
                        round,
                        kind_code,
                    );
                    tracing::debug!(
                        target: "lockstep::sched",
                        task = %handle,
                        "cleanup budget exhausted, forcing completion"
                    );
                    continue;
                }

                self.emit_sched(
                    SchedEventKind::Poll,
                    handle.to_bits(),
                    round,
                    self.tasks.slots[idx].polls_performed as u32,
                );
                budget.consume_poll();
                {
                    let slot = &mut self.tasks.slots[idx];
                    slot.polls_performed += 1;
                    if slot.state.in_cancel_phase() {
                        slot.cleanup_polls_remaining =
                            slot.cleanup_polls_remaining.saturating_sub(1);
                    }
                }

                match self.poll_task(idx, region, budget) {
                    Ok(Status::Ok) => {
                        let outcome = self.finish_task(idx, Outcome::Ok);
                        self.emit_sched(
                            SchedEventKind::Complete,
                            handle.to_bits(),
                            round,
                            u32::from(outcome.severity()),
                        );
                    }
                    Ok(Status::Pending) => {}
                    Ok(fault) => {
                        let outcome = self.finish_task(idx, Outcome::Err);
                        self.emit_sched(
                            SchedEventKind::Complete,
                            handle.to_bits(),
                            round,
                            u32::from(outcome.severity()),
                        );
                        match self.containment_policy_active() {
                            ContainmentPolicy::FailFast => break 'run Err(fault),
                            ContainmentPolicy::PoisonRegion => {
                                self.poison_and_propagate(region);
                            }
                            ContainmentPolicy::ErrorOnly => {}
                        }
                    }
                    Err(()) => {
                        let outcome = self.finish_task(idx, Outcome::Panicked);
                        self.emit_sched(
                            SchedEventKind::Complete,
                            handle.to_bits(),
                            round,
                            u32::from(outcome.severity()),
                        );
                        tracing::error!(
                            target: "lockstep::sched",
                            task = %handle,
                            "poll function panicked"
                        );
                    }
                }
            }
            if self.region_has_live_tasks(region_idx, generation) {
                round += 1;
            }
        };
        self.regions.slots[region_idx].sched_round = round;
        result
    }

    /// Polls one task, catching unwinds. `Err(())` means the poll
    /// panicked.
    fn poll_task(
        &mut self,
        idx: usize,
        region: Handle,
        budget: &mut Budget,
    ) -> Result<Status, ()> {
        let Some(mut poller) = self.tasks.slots[idx].poller.take() else {
            return Ok(Status::Pending);
        };
        let result = {
            let Kernel {
                tasks,
                trace,
                ghost,
                ..
            } = self;
            let slot = &mut tasks.slots[idx];
            let mut cx = crate::runtime::task::PollCx {
                task: slot.handle,
                region,
                slot,
                trace,
                ghost,
                budget,
            };
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| poller(&mut cx)))
        };
        // The completion paths drop the closure; a pending task keeps it.
        self.tasks.slots[idx].poller = Some(poller);
        result.map_err(|_| ())
    }

    /// Whether the region still owns non-terminal tasks.
    pub(crate) fn region_has_live_tasks(&self, region_idx: usize, generation: u8) -> bool {
        self.tasks.slots[..self.tasks.next_free].iter().any(|slot| {
            slot.ever_allocated
                && slot.parent == region_idx as u32
                && slot.parent_generation == generation
                && !slot.state.is_terminal()
        })
    }

    fn emit_sched(&mut self, kind: SchedEventKind, task: u64, round: u32, aux: u32) {
        self.sched.emit(kind, task, round, aux);
        self.trace.emit(kind.trace_kind(), task, round);
    }

    /// Total scheduler events ever emitted.
    #[must_use]
    pub const fn scheduler_event_count(&self) -> u64 {
        self.sched.count()
    }

    /// Returns the `i`-th readable scheduler event, oldest first.
    #[must_use]
    pub fn scheduler_event_get(&self, i: usize) -> Option<SchedEvent> {
        self.sched.get(i)
    }

    /// Number of readable scheduler events.
    #[must_use]
    pub fn scheduler_event_readable(&self) -> usize {
        self.sched.readable_count()
    }

    /// Clears the scheduler event ring and its counters.
    pub fn scheduler_event_reset(&mut self) {
        self.sched.reset();
    }

    /// Reports whether a region has reached quiescence.
    pub fn quiescence_check(&self, region: Handle) -> Result<(), Status> {
        let region_idx = self.regions.resolve(region)?;
        let generation = self.regions.slots[region_idx].generation;
        if self.region_has_live_tasks(region_idx, generation) {
            return Err(Status::QuiescenceNotReached);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecutionProfile, RuntimeConfig};
    use crate::types::cancel::CancelKind;

    fn events(kernel: &Kernel) -> Vec<SchedEvent> {
        (0..kernel.scheduler_event_readable())
            .filter_map(|i| kernel.scheduler_event_get(i))
            .collect()
    }

    #[test]
    fn noop_task_produces_poll_complete_quiescent() {
        let mut kernel = Kernel::new();
        let region = kernel.region_open().expect("open");
        let task = kernel.task_spawn(region, |_cx| Status::Ok).expect("spawn");

        kernel
            .scheduler_run(region, &mut Budget::INFINITE)
            .expect("run");

        let evts = events(&kernel);
        assert_eq!(evts.len(), 3);
        assert_eq!(evts[0].kind, SchedEventKind::Poll);
        assert_eq!(evts[0].sequence, 0);
        assert_eq!(evts[0].round, 0);
        assert_eq!(evts[0].task, task.to_bits());
        assert_eq!(evts[1].kind, SchedEventKind::Complete);
        assert_eq!(evts[1].sequence, 1);
        assert_eq!(evts[2].kind, SchedEventKind::Quiescent);
        assert_eq!(evts[2].sequence, 2);
        assert_eq!(evts[2].round, 0);

        assert_eq!(kernel.task_get_state(task), Ok(TaskState::Completed));
        assert_eq!(kernel.task_get_outcome(task), Ok(Outcome::Ok));
    }

    #[test]
    fn countdown_spans_rounds() {
        let mut kernel = Kernel::new();
        let region = kernel.region_open().expect("open");
        let task = kernel
            .task_spawn_captured(region, 0u32, |remaining, _cx| {
                *remaining += 1;
                if *remaining > 3 { Status::Ok } else { Status::Pending }
            })
            .expect("spawn");

        kernel
            .scheduler_run(region, &mut Budget::INFINITE)
            .expect("run");

        let evts = events(&kernel);
        assert_eq!(evts.len(), 6);
        for (i, event) in evts.iter().take(4).enumerate() {
            assert_eq!(event.kind, SchedEventKind::Poll);
            assert_eq!(event.round, i as u32);
            assert_eq!(event.sequence, i as u64);
        }
        assert_eq!(evts[4].kind, SchedEventKind::Complete);
        assert_eq!(evts[4].sequence, 4);
        assert_eq!(evts[5].kind, SchedEventKind::Quiescent);
        assert_eq!(evts[5].sequence, 5);
        assert_eq!(kernel.task_get_outcome(task), Ok(Outcome::Ok));
    }

    #[test]
    fn budget_exhaustion_stops_and_resumes_at_round() {
        let mut kernel = Kernel::new();
        let region = kernel.region_open().expect("open");
        let task = kernel
            .task_spawn(region, |_cx| Status::Pending)
            .expect("spawn");

        let mut budget = Budget::new().with_poll_quota(3);
        assert_eq!(
            kernel.scheduler_run(region, &mut budget),
            Err(Status::PollBudgetExhausted)
        );

        let evts = events(&kernel);
        let polls = evts
            .iter()
            .filter(|e| e.kind == SchedEventKind::Poll)
            .count();
        assert_eq!(polls, 3);
        assert_eq!(evts.last().expect("event").kind, SchedEventKind::Budget);
        assert_ne!(kernel.task_get_state(task), Ok(TaskState::Completed));
        assert_eq!(
            kernel.quiescence_check(region),
            Err(Status::QuiescenceNotReached)
        );

        // A later run continues from the saved round; sequences continue.
        let mut budget = Budget::new().with_poll_quota(2);
        assert_eq!(
            kernel.scheduler_run(region, &mut budget),
            Err(Status::PollBudgetExhausted)
        );
        let evts = events(&kernel);
        let next_poll = evts
            .iter()
            .find(|e| e.sequence == 4)
            .expect("poll after resume");
        assert_eq!(next_poll.kind, SchedEventKind::Poll);
        assert_eq!(next_poll.round, 3);
    }

    #[test]
    fn cost_budget_exhaustion_is_distinguished() {
        let mut kernel = Kernel::new();
        let region = kernel.region_open().expect("open");
        kernel
            .task_spawn(region, |cx| {
                // Each poll burns cost; the budget check trips at zero.
                let _ = cx.consume_cost(5);
                Status::Pending
            })
            .expect("spawn");

        let mut budget = Budget::new().with_cost_quota(10);
        assert_eq!(
            kernel.scheduler_run(region, &mut budget),
            Err(Status::CostBudgetExceeded)
        );
        let evts = events(&kernel);
        assert_eq!(evts.last().expect("event").kind, SchedEventKind::Budget);
        assert_eq!(evts.last().expect("event").aux, 1);
    }

    #[test]
    fn stubborn_cancelled_task_is_forced_within_cleanup_budget() {
        let mut kernel = Kernel::new();
        let region = kernel.region_open().expect("open");
        let task = kernel
            .task_spawn(region, |cx| {
                let _ = cx.checkpoint();
                Status::Pending
            })
            .expect("spawn");

        // One poll to get the task running.
        let mut one = Budget::new().with_poll_quota(1);
        let _ = kernel.scheduler_run(region, &mut one);
        assert_eq!(kernel.task_get_state(task), Ok(TaskState::Running));

        kernel
            .task_cancel(task, CancelKind::Shutdown)
            .expect("cancel");

        let mut budget = Budget::new().with_poll_quota(200);
        kernel.scheduler_run(region, &mut budget).expect("run");

        let evts = events(&kernel);
        let forced = evts
            .iter()
            .find(|e| e.kind == SchedEventKind::CancelForced)
            .expect("forced completion");
        assert_eq!(forced.task, task.to_bits());
        // Within the shutdown cleanup budget of 50 polls.
        let polls_after_cancel = evts
            .iter()
            .filter(|e| e.kind == SchedEventKind::Poll && e.sequence > 1)
            .count();
        assert!(polls_after_cancel <= 50, "{polls_after_cancel}");
        assert_eq!(kernel.task_get_state(task), Ok(TaskState::Completed));
        assert_eq!(kernel.task_get_outcome(task), Ok(Outcome::Cancelled));
    }

    #[test]
    fn never_checkpointing_task_is_still_bounded() {
        let mut kernel = Kernel::new();
        let region = kernel.region_open().expect("open");
        let task = kernel
            .task_spawn(region, |_cx| Status::Pending)
            .expect("spawn");

        kernel.task_cancel(task, CancelKind::Shutdown).expect("cancel");
        kernel
            .scheduler_run(region, &mut Budget::new().with_poll_quota(200))
            .expect("run");
        assert_eq!(kernel.task_get_outcome(task), Ok(Outcome::Cancelled));
    }

    #[test]
    fn cooperative_cancel_completes_with_cancelled_outcome() {
        let mut kernel = Kernel::new();
        let region = kernel.region_open().expect("open");
        let task = kernel
            .task_spawn(region, |cx| {
                if cx.checkpoint().cancelled {
                    Status::Ok
                } else {
                    Status::Pending
                }
            })
            .expect("spawn");

        let mut one = Budget::new().with_poll_quota(1);
        let _ = kernel.scheduler_run(region, &mut one);
        kernel.task_cancel(task, CancelKind::User).expect("cancel");
        kernel
            .scheduler_run(region, &mut Budget::INFINITE)
            .expect("run");

        assert_eq!(kernel.task_get_state(task), Ok(TaskState::Completed));
        assert_eq!(kernel.task_get_outcome(task), Ok(Outcome::Cancelled));
        let evts = events(&kernel);
        let tail: Vec<_> = evts.iter().rev().take(2).map(|e| e.kind).collect();
        assert_eq!(tail, [SchedEventKind::Quiescent, SchedEventKind::Complete]);
    }

    #[test]
    fn fail_fast_policy_stops_on_first_fault() {
        let mut kernel = Kernel::with_config(
            RuntimeConfig::default().with_profile(ExecutionProfile::Debug),
        );
        let region = kernel.region_open().expect("open");
        let failing = kernel
            .task_spawn(region, |_cx| Status::ResourceExhausted)
            .expect("spawn");
        let bystander = kernel
            .task_spawn(region, |_cx| Status::Pending)
            .expect("spawn");

        assert_eq!(
            kernel.scheduler_run(region, &mut Budget::INFINITE),
            Err(Status::ResourceExhausted)
        );
        assert_eq!(kernel.task_get_outcome(failing), Ok(Outcome::Err));
        assert_ne!(kernel.task_get_state(bystander), Ok(TaskState::Completed));
        // The region is untouched.
        assert_eq!(kernel.region_is_poisoned(region), Ok(false));
    }

    #[test]
    fn poison_policy_drains_remaining_work() {
        let mut kernel = Kernel::with_config(
            RuntimeConfig::default().with_profile(ExecutionProfile::Hardened),
        );
        let region = kernel.region_open().expect("open");
        kernel
            .task_spawn(region, |_cx| Status::ResourceExhausted)
            .expect("spawn");
        let cooperative = kernel
            .task_spawn(region, |cx| {
                if cx.checkpoint().cancelled {
                    Status::Ok
                } else {
                    Status::Pending
                }
            })
            .expect("spawn");

        kernel
            .scheduler_run(region, &mut Budget::INFINITE)
            .expect("run continues past the fault");
        assert_eq!(kernel.region_is_poisoned(region), Ok(true));
        assert_eq!(kernel.task_get_outcome(cooperative), Ok(Outcome::Cancelled));
        // Poison blocks new spawns.
        assert_eq!(
            kernel.task_spawn(region, |_cx| Status::Ok),
            Err(Status::RegionPoisoned)
        );
    }

    #[test]
    fn error_only_policy_keeps_going() {
        let mut kernel = Kernel::with_config(
            RuntimeConfig::default().with_profile(ExecutionProfile::Release),
        );
        let region = kernel.region_open().expect("open");
        let failing = kernel
            .task_spawn(region, |_cx| Status::ResourceExhausted)
            .expect("spawn");
        let healthy = kernel.task_spawn(region, |_cx| Status::Ok).expect("spawn");

        kernel
            .scheduler_run(region, &mut Budget::INFINITE)
            .expect("run");
        assert_eq!(kernel.task_get_outcome(failing), Ok(Outcome::Err));
        assert_eq!(kernel.task_get_outcome(healthy), Ok(Outcome::Ok));
        assert_eq!(kernel.region_is_poisoned(region), Ok(false));
    }

    #[test]
    fn panicking_poll_produces_panicked_outcome() {
        let mut kernel = Kernel::with_config(
            RuntimeConfig::default().with_profile(ExecutionProfile::Release),
        );
        let region = kernel.region_open().expect("open");
        let panicking = kernel
            .task_spawn(region, |_cx| panic!("boom"))
            .expect("spawn");
        let healthy = kernel.task_spawn(region, |_cx| Status::Ok).expect("spawn");

        kernel
            .scheduler_run(region, &mut Budget::INFINITE)
            .expect("run");
        assert_eq!(kernel.task_get_outcome(panicking), Ok(Outcome::Panicked));
        assert_eq!(kernel.task_get_outcome(healthy), Ok(Outcome::Ok));
    }

    #[test]
    fn events_within_a_round_follow_slot_order() {
        let mut kernel = Kernel::new();
        let region = kernel.region_open().expect("open");
        let mut tasks = Vec::new();
        for _ in 0..4 {
            tasks.push(
                kernel
                    .task_spawn(region, |_cx| Status::Pending)
                    .expect("spawn"),
            );
        }
        let mut budget = Budget::new().with_poll_quota(4);
        let _ = kernel.scheduler_run(region, &mut budget);

        let evts = events(&kernel);
        let round0: Vec<_> = evts
            .iter()
            .filter(|e| e.kind == SchedEventKind::Poll && e.round == 0)
            .map(|e| e.task)
            .collect();
        let expected: Vec<_> = tasks.iter().map(|t| t.to_bits()).collect();
        assert_eq!(round0, expected);
    }

    #[test]
    fn run_on_closed_region_is_rejected() {
        let mut kernel = Kernel::new();
        let region = kernel.region_open().expect("open");
        kernel
            .region_drain(region, &mut Budget::INFINITE)
            .expect("drain");
        assert_eq!(
            kernel.scheduler_run(region, &mut Budget::INFINITE),
            Err(Status::RegionClosed)
        );
    }
}
