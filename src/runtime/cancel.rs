//! The cancellation protocol engine.
//!
//! Request, strengthen, propagate. A cancel request moves the target into
//! `CancelRequested` (transparently starting a `Created` task first);
//! repeated requests strengthen the stored reason under the severity
//! lattice, chaining the superseded reason as a bounded cause. Whenever
//! the stored reason changes, the cleanup budget is re-armed from the
//! winning kind; the scheduler enforces that budget with forced
//! completion.

use crate::handle::Handle;
use crate::runtime::Kernel;
use crate::status::Status;
use crate::trace::ring::TraceKind;
use crate::types::cancel::{CancelKind, CancelPhase, CancelReason};
use crate::types::time::Time;
use crate::types::transition::TaskState;

impl Kernel {
    /// Requests cancellation of a task. No-op on a completed task.
    pub fn task_cancel(&mut self, task: Handle, kind: CancelKind) -> Result<(), Status> {
        self.task_cancel_with_origin(task, kind, Handle::INVALID, Handle::INVALID)
    }

    /// Requests cancellation, attributing it to an originating region and
    /// task.
    pub fn task_cancel_with_origin(
        &mut self,
        task: Handle,
        kind: CancelKind,
        origin_region: Handle,
        origin_task: Handle,
    ) -> Result<(), Status> {
        let idx = self.tasks.resolve(task)?;
        if self.tasks.slots[idx].state.is_terminal() {
            return Ok(());
        }

        // Reason timestamps are logical: the trace sequence at request
        // time. No clock is read on this path.
        let timestamp = Time::from_nanos(self.trace.next_sequence());
        let reason = CancelReason::new(kind)
            .at(timestamp)
            .with_origin(origin_region, origin_task);

        match self.tasks.slots[idx].state {
            TaskState::Created => {
                self.gate_task(idx, TaskState::Running)?;
                self.gate_task(idx, TaskState::CancelRequested)?;
            }
            TaskState::Running => {
                self.gate_task(idx, TaskState::CancelRequested)?;
            }
            // Re-arming an in-flight cancellation is a self-transition.
            state => {
                self.gate_task(idx, state)?;
            }
        }

        let chain_depth = self.cancel_chain_depth_bound();
        let slot = &mut self.tasks.slots[idx];
        let changed = match slot.cancel.as_mut() {
            None => {
                slot.cancel = Some(reason);
                slot.phase = Some(CancelPhase::Requested);
                true
            }
            Some(existing) => {
                let superseded = existing.clone();
                if existing.strengthen(&reason) {
                    *existing = existing.clone().caused_by(superseded, chain_depth);
                    true
                } else {
                    false
                }
            }
        };
        if changed {
            let final_kind = slot.cancel.as_ref().map_or(kind, CancelReason::kind);
            slot.cleanup_polls_remaining = final_kind.cleanup_budget().poll_quota;
            self.trace
                .emit(TraceKind::TaskCancel, task.to_bits(), final_kind.code());
            tracing::debug!(
                target: "lockstep::cancel",
                task = %task,
                kind = final_kind.as_str(),
                "cancel requested"
            );
        }
        Ok(())
    }

    /// Propagates a cancellation across every live task of a region, in
    /// slot order. Returns the count of tasks newly moved toward
    /// cancellation (already-cancelling tasks are strengthened but not
    /// counted; completed tasks are skipped).
    pub fn cancel_propagate(&mut self, region: Handle, kind: CancelKind) -> Result<usize, Status> {
        let region_idx = self.regions.resolve(region)?;
        let generation = self.regions.slots[region_idx].generation;
        let mut moved = 0;
        for idx in 0..self.tasks.next_free {
            let slot = &self.tasks.slots[idx];
            if !slot.ever_allocated
                || slot.parent != region_idx as u32
                || slot.parent_generation != generation
                || slot.state.is_terminal()
            {
                continue;
            }
            let fresh = !slot.state.in_cancel_phase();
            let handle = slot.handle;
            self.task_cancel_with_origin(handle, kind, region, Handle::INVALID)?;
            if fresh {
                moved += 1;
            }
        }
        Ok(moved)
    }

    /// Returns the task's cancel phase, or [`Status::InvalidState`] for a
    /// task with no cancellation in force.
    pub fn task_get_cancel_phase(&self, task: Handle) -> Result<CancelPhase, Status> {
        let idx = self.tasks.resolve(task)?;
        self.tasks.slots[idx].phase.ok_or(Status::InvalidState)
    }

    /// Effective cause-chain bound: the configured depth, tightened by the
    /// configured memory ceiling.
    pub(crate) fn cancel_chain_depth_bound(&self) -> u16 {
        let per_link = size_of::<CancelReason>() as u32;
        let by_memory = (self.config.max_cancel_chain_memory / per_link.max(1)).min(u32::from(u16::MAX));
        self.config.max_cancel_chain_depth.min(by_memory as u16)
    }
}
