//! Task arena, spawning, and the poll context.
//!
//! A task slot stores a boxed poll closure; whatever the closure captures
//! is the task's state, and dropping the box is the destructor contract.
//! Captured-state spawning charges the state's size against the owning
//! region's capture budget and guarantees the drop happens exactly once,
//! at the moment the task completes (or at kernel reset). Task slots
//! retire terminally: a completed slot is never reused within a run.

use crate::handle::{Handle, HandleKind};
use crate::monitor::ghost::{GhostKind, GhostRing};
use crate::runtime::{CAPTURE_ARENA_BYTES, Kernel, TASK_CAPACITY};
use crate::status::Status;
use crate::trace::ring::{TraceKind, TraceRing};
use crate::types::budget::Budget;
use crate::types::cancel::{CancelKind, CancelPhase, CancelReason};
use crate::types::outcome::Outcome;
use crate::types::transition::{TaskState, task_transition};

/// A boxed poll closure. Returning [`Status::Ok`] completes the task,
/// [`Status::Pending`] yields, anything else is a task-level fault.
pub type PollFn = Box<dyn FnMut(&mut PollCx<'_>) -> Status>;

/// One task slot.
pub(crate) struct TaskSlot {
    pub(crate) state: TaskState,
    pub(crate) outcome: Outcome,
    pub(crate) parent: u32,
    pub(crate) parent_generation: u8,
    pub(crate) poller: Option<PollFn>,
    pub(crate) capture_bytes: u32,
    pub(crate) cancel: Option<CancelReason>,
    pub(crate) phase: Option<CancelPhase>,
    pub(crate) cleanup_polls_remaining: u32,
    pub(crate) polls_performed: u64,
    pub(crate) generation: u8,
    pub(crate) ever_allocated: bool,
    pub(crate) handle: Handle,
}

impl Default for TaskSlot {
    fn default() -> Self {
        Self {
            state: TaskState::Created,
            outcome: Outcome::Ok,
            parent: 0,
            parent_generation: 0,
            poller: None,
            capture_bytes: 0,
            cancel: None,
            phase: None,
            cleanup_polls_remaining: 0,
            polls_performed: 0,
            generation: 0,
            ever_allocated: false,
            handle: Handle::INVALID,
        }
    }
}

impl std::fmt::Debug for TaskSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSlot")
            .field("state", &self.state)
            .field("outcome", &self.outcome)
            .field("parent", &self.parent)
            .field("cancel", &self.cancel)
            .field("polls_performed", &self.polls_performed)
            .finish_non_exhaustive()
    }
}

/// Fixed-capacity task table with terminal slot retirement.
#[derive(Debug)]
pub(crate) struct TaskTable {
    pub(crate) slots: Vec<TaskSlot>,
    pub(crate) next_free: usize,
}

impl TaskTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: (0..TASK_CAPACITY).map(|_| TaskSlot::default()).collect(),
            next_free: 0,
        }
    }

    pub(crate) fn resolve(&self, handle: Handle) -> Result<usize, Status> {
        if handle.kind() != Some(HandleKind::Task) {
            return Err(Status::NotFound);
        }
        let idx = handle.slot() as usize;
        if idx >= self.slots.len() || !self.slots[idx].ever_allocated {
            return Err(Status::NotFound);
        }
        if self.slots[idx].generation != handle.generation() {
            return Err(Status::StaleHandle);
        }
        Ok(idx)
    }
}

/// What a task observes at a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    /// Whether a cancellation is in force.
    pub cancelled: bool,
    /// The winning cancel kind, if cancelled.
    pub kind: Option<CancelKind>,
    /// The current cancel phase, if cancelled.
    pub phase: Option<CancelPhase>,
    /// Cleanup polls remaining before forced completion.
    pub polls_remaining: u32,
}

/// The context handed to a poll closure.
///
/// This is the only surface through which task code observes cancellation
/// (checkpoint), declares finalization, and spends cost budget.
pub struct PollCx<'a> {
    pub(crate) task: Handle,
    pub(crate) region: Handle,
    pub(crate) slot: &'a mut TaskSlot,
    pub(crate) trace: &'a mut TraceRing,
    pub(crate) ghost: &'a mut GhostRing,
    pub(crate) budget: &'a mut Budget,
}

impl PollCx<'_> {
    /// Returns this task's handle.
    #[must_use]
    pub const fn task(&self) -> Handle {
        self.task
    }

    /// Returns the owning region's handle.
    #[must_use]
    pub const fn region(&self) -> Handle {
        self.region
    }

    /// Observes any pending cancellation and cooperates with it.
    ///
    /// On a cancel-requested task this call is the authority that advances
    /// the task into `Cancelling`. On a task already draining it is
    /// idempotent but still burns one cleanup poll. On a non-cancelled
    /// task it is side-effect free.
    pub fn checkpoint(&mut self) -> Checkpoint {
        checkpoint_slot(self.slot, self.trace)
    }

    /// Declares the finalization epoch: `Cancelling` → `Finalizing`.
    ///
    /// Rejected with [`Status::InvalidState`] in any other state.
    pub fn finalize(&mut self) -> Result<(), Status> {
        finalize_slot(self.slot, self.trace, self.ghost)
    }

    /// Spends `n` units of the scheduler's cost budget.
    pub fn consume_cost(&mut self, n: u64) -> Result<(), Status> {
        self.budget.consume_cost(n)
    }
}

/// Shared checkpoint logic for the poll context and the kernel surface.
pub(crate) fn checkpoint_slot(slot: &mut TaskSlot, trace: &mut TraceRing) -> Checkpoint {
    match slot.state {
        TaskState::CancelRequested => {
            slot.state = TaskState::Cancelling;
            slot.phase = Some(CancelPhase::Cancelling);
            slot.cleanup_polls_remaining = slot.cleanup_polls_remaining.saturating_sub(1);
            trace.emit(
                TraceKind::TaskCheckpoint,
                slot.handle.to_bits(),
                u32::from(CancelPhase::Cancelling.ordinal()),
            );
            Checkpoint {
                cancelled: true,
                kind: slot.cancel.as_ref().map(CancelReason::kind),
                phase: slot.phase,
                polls_remaining: slot.cleanup_polls_remaining,
            }
        }
        TaskState::Cancelling | TaskState::Finalizing => {
            slot.cleanup_polls_remaining = slot.cleanup_polls_remaining.saturating_sub(1);
            trace.emit(
                TraceKind::TaskCheckpoint,
                slot.handle.to_bits(),
                u32::from(slot.phase.map_or(0, CancelPhase::ordinal)),
            );
            Checkpoint {
                cancelled: true,
                kind: slot.cancel.as_ref().map(CancelReason::kind),
                phase: slot.phase,
                polls_remaining: slot.cleanup_polls_remaining,
            }
        }
        _ => Checkpoint {
            cancelled: false,
            kind: None,
            phase: None,
            polls_remaining: 0,
        },
    }
}

/// Shared finalize logic for the poll context and the kernel surface.
pub(crate) fn finalize_slot(
    slot: &mut TaskSlot,
    trace: &mut TraceRing,
    ghost: &mut GhostRing,
) -> Result<(), Status> {
    if slot.state == TaskState::Cancelling {
        debug_assert!(task_transition(TaskState::Cancelling, TaskState::Finalizing).is_ok());
        slot.state = TaskState::Finalizing;
        slot.phase = Some(CancelPhase::Finalizing);
        trace.emit(
            TraceKind::TaskFinalize,
            slot.handle.to_bits(),
            u32::from(CancelPhase::Finalizing.ordinal()),
        );
        Ok(())
    } else {
        ghost.record(
            GhostKind::ProtocolTask,
            slot.handle.to_bits(),
            slot.state.ordinal(),
            TaskState::Finalizing.ordinal(),
        );
        Err(Status::InvalidState)
    }
}

impl Kernel {
    fn spawn_guard(&self, region: Handle) -> Result<usize, Status> {
        let idx = self.regions.resolve(region)?;
        let slot = &self.regions.slots[idx];
        if slot.poisoned {
            return Err(Status::RegionPoisoned);
        }
        if slot.state.is_terminal() {
            return Err(Status::RegionClosed);
        }
        if !slot.state.can_spawn() {
            return Err(Status::RegionNotOpen);
        }
        Ok(idx)
    }

    fn spawn_slot(&mut self, region_idx: usize, poller: PollFn, capture_bytes: u32) -> Result<Handle, Status> {
        if self.tasks.next_free >= TASK_CAPACITY {
            return Err(Status::ResourceExhausted);
        }
        let idx = self.tasks.next_free;
        self.tasks.next_free += 1;
        let slot = &mut self.tasks.slots[idx];
        slot.generation = slot.generation.wrapping_add(1);
        let handle = Handle::pack(
            HandleKind::Task,
            TaskState::FULL_MASK,
            idx as u32,
            slot.generation,
        );
        slot.state = TaskState::Created;
        slot.outcome = Outcome::Ok;
        slot.parent = region_idx as u32;
        slot.parent_generation = self.regions.slots[region_idx].generation;
        slot.poller = Some(poller);
        slot.capture_bytes = capture_bytes;
        slot.cancel = None;
        slot.phase = None;
        slot.cleanup_polls_remaining = 0;
        slot.polls_performed = 0;
        slot.ever_allocated = true;
        slot.handle = handle;
        self.trace
            .emit(TraceKind::TaskSpawn, handle.to_bits(), region_idx as u32);
        tracing::trace!(target: "lockstep::task", task = %handle, "task spawned");
        Ok(handle)
    }

    /// Spawns a task into an open region.
    pub fn task_spawn<F>(&mut self, region: Handle, poller: F) -> Result<Handle, Status>
    where
        F: FnMut(&mut PollCx<'_>) -> Status + 'static,
    {
        let region_idx = self.spawn_guard(region)?;
        self.spawn_slot(region_idx, Box::new(poller), 0)
    }

    /// Spawns a task with explicit captured state.
    ///
    /// The state is charged (size plus alignment padding) against the
    /// region's capture budget and dropped exactly once when the task
    /// completes. Zero-sized state is rejected: use [`Kernel::task_spawn`].
    pub fn task_spawn_captured<S, F>(
        &mut self,
        region: Handle,
        state: S,
        mut poller: F,
    ) -> Result<Handle, Status>
    where
        S: 'static,
        F: FnMut(&mut S, &mut PollCx<'_>) -> Status + 'static,
    {
        let region_idx = self.spawn_guard(region)?;
        let size = size_of::<S>() as u32;
        if size == 0 {
            return Err(Status::InvalidArgument);
        }
        if self.hooks.allocator_sealed() {
            return Err(Status::AllocatorSealed);
        }
        let align = align_of::<S>() as u32;
        let cursor = self.regions.slots[region_idx].capture_used;
        let aligned = cursor.div_ceil(align) * align;
        let end = aligned.checked_add(size).ok_or(Status::ResourceExhausted)?;
        if end > CAPTURE_ARENA_BYTES {
            return Err(Status::ResourceExhausted);
        }
        self.regions.slots[region_idx].capture_used = end;

        let mut state = state;
        let wrapped: PollFn = Box::new(move |cx| poller(&mut state, cx));
        self.spawn_slot(region_idx, wrapped, size)
    }

    /// Returns the task's lifecycle state. Read-only.
    pub fn task_get_state(&self, task: Handle) -> Result<TaskState, Status> {
        let idx = self.tasks.resolve(task)?;
        Ok(self.tasks.slots[idx].state)
    }

    /// Returns the task's outcome, or [`Status::TaskNotCompleted`] while
    /// the task is non-terminal.
    pub fn task_get_outcome(&self, task: Handle) -> Result<Outcome, Status> {
        let idx = self.tasks.resolve(task)?;
        let slot = &self.tasks.slots[idx];
        if !slot.state.is_terminal() {
            return Err(Status::TaskNotCompleted);
        }
        Ok(slot.outcome)
    }

    /// Observes cancellation from outside the poll loop.
    pub fn task_checkpoint(&mut self, task: Handle) -> Result<Checkpoint, Status> {
        let idx = self.tasks.resolve(task)?;
        Ok(checkpoint_slot(&mut self.tasks.slots[idx], &mut self.trace))
    }

    /// Declares the finalization epoch from outside the poll loop.
    pub fn task_finalize(&mut self, task: Handle) -> Result<(), Status> {
        let idx = self.tasks.resolve(task)?;
        finalize_slot(
            &mut self.tasks.slots[idx],
            &mut self.trace,
            &mut self.ghost,
        )
    }

    /// Walks a task to `Completed` along legal edges and applies the
    /// outcome lattice join with any cancel in force.
    ///
    /// Dropping the poll closure here is the exactly-once destructor of
    /// the task's captured state.
    pub(crate) fn finish_task(&mut self, idx: usize, base: Outcome) -> Outcome {
        let cancel_active = self.tasks.slots[idx].cancel.is_some();
        let outcome = if cancel_active {
            base.join(Outcome::Cancelled)
        } else {
            base
        };
        loop {
            let state = self.tasks.slots[idx].state;
            let next = match state {
                TaskState::Created => TaskState::Running,
                TaskState::Running | TaskState::Finalizing => TaskState::Completed,
                TaskState::CancelRequested => TaskState::Cancelling,
                TaskState::Cancelling => TaskState::Finalizing,
                TaskState::Completed => break,
            };
            debug_assert!(task_transition(state, next).is_ok());
            self.tasks.slots[idx].state = next;
        }
        let slot = &mut self.tasks.slots[idx];
        slot.outcome = outcome;
        slot.poller = None;
        tracing::trace!(
            target: "lockstep::task",
            task = %slot.handle,
            outcome = outcome.as_str(),
            capture_bytes = slot.capture_bytes,
            "task completed"
        );
        let parent = slot.parent as usize;
        let parent_generation = slot.parent_generation;
        let region = &mut self.regions.slots[parent];
        if region.generation == parent_generation {
            region.outcome = region.outcome.join(outcome);
        }
        outcome
    }
}
