//! Region arena and lifecycle operations.
//!
//! Regions are the unit of ownership and fault containment. The arena has
//! a fixed capacity; a region's slot returns to the free pool when the
//! region reaches `Closed`, and the generation bump at the next open makes
//! every outstanding handle to the old occupant stale.

use crate::config::{FinalizerEscalation, LeakResponse};
use crate::handle::{Handle, HandleKind};
use crate::monitor::ghost::GhostKind;
use crate::runtime::{Kernel, REGION_CAPACITY};
use crate::status::Status;
use crate::trace::ring::TraceKind;
use crate::types::budget::Budget;
use crate::types::outcome::Outcome;
use crate::types::transition::{ObligationState, RegionState};

/// One region slot.
#[derive(Debug)]
pub(crate) struct RegionSlot {
    pub(crate) state: RegionState,
    pub(crate) poisoned: bool,
    pub(crate) generation: u8,
    pub(crate) live: bool,
    pub(crate) ever_allocated: bool,
    pub(crate) capture_used: u32,
    pub(crate) sched_round: u32,
    pub(crate) outcome: Outcome,
    pub(crate) handle: Handle,
}

impl Default for RegionSlot {
    fn default() -> Self {
        Self {
            state: RegionState::Closed,
            poisoned: false,
            generation: 0,
            live: false,
            ever_allocated: false,
            capture_used: 0,
            sched_round: 0,
            outcome: Outcome::Ok,
            handle: Handle::INVALID,
        }
    }
}

/// Fixed-capacity region table.
#[derive(Debug)]
pub(crate) struct RegionTable {
    pub(crate) slots: Vec<RegionSlot>,
}

impl RegionTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: (0..REGION_CAPACITY).map(|_| RegionSlot::default()).collect(),
        }
    }

    /// Resolves a region handle to its slot index.
    ///
    /// Wrong kind or never-allocated slots are `NotFound`; a generation
    /// mismatch on a recycled slot is `StaleHandle`.
    pub(crate) fn resolve(&self, handle: Handle) -> Result<usize, Status> {
        if handle.kind() != Some(HandleKind::Region) {
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

impl Kernel {
    /// Opens a new region, returning its handle.
    pub fn region_open(&mut self) -> Result<Handle, Status> {
        let idx = self
            .regions
            .slots
            .iter()
            .position(|slot| !slot.live)
            .ok_or(Status::ResourceExhausted)?;
        let slot = &mut self.regions.slots[idx];
        slot.generation = slot.generation.wrapping_add(1);
        let handle = Handle::pack(
            HandleKind::Region,
            RegionState::FULL_MASK,
            idx as u32,
            slot.generation,
        );
        slot.state = RegionState::Open;
        slot.poisoned = false;
        slot.live = true;
        slot.ever_allocated = true;
        slot.capture_used = 0;
        slot.sched_round = 0;
        slot.outcome = Outcome::Ok;
        slot.handle = handle;
        self.trace.emit(TraceKind::RegionOpen, handle.to_bits(), idx as u32);
        tracing::debug!(target: "lockstep::region", region = %handle, "region opened");
        Ok(handle)
    }

    /// Requests an orderly close: `Open` → `Closing`.
    pub fn region_close(&mut self, region: Handle) -> Result<(), Status> {
        let idx = self.regions.resolve(region)?;
        let slot = &self.regions.slots[idx];
        if slot.state.is_terminal() {
            return Err(Status::RegionClosed);
        }
        if slot.poisoned {
            return Err(Status::RegionPoisoned);
        }
        self.gate_region(idx, RegionState::Closing)?;
        self.trace.emit(TraceKind::RegionClose, region.to_bits(), 0);
        Ok(())
    }

    /// Drains a region to quiescence and closes it.
    ///
    /// Drain is a privileged path: invoked on an `Open` region it passes
    /// through `Closing` without a separate close call, and it proceeds on
    /// a poisoned region so contained work can still finish. The drain is
    /// refused with [`Status::ObligationsUnresolved`] while reserved
    /// obligations remain, unless the configured leak response is
    /// `Ignore`.
    pub fn region_drain(&mut self, region: Handle, budget: &mut Budget) -> Result<(), Status> {
        let idx = self.regions.resolve(region)?;
        if self.regions.slots[idx].state.is_terminal() {
            return Err(Status::RegionClosed);
        }
        if self.regions.slots[idx].state == RegionState::Open {
            self.gate_region(idx, RegionState::Closing)?;
        }
        self.trace.emit(TraceKind::RegionDrain, region.to_bits(), 0);
        if self.regions.slots[idx].state == RegionState::Closing {
            self.gate_region(idx, RegionState::Draining)?;
        }

        // Under bounded escalation the drain iteration is capped by the
        // finalizer poll budget even when the caller's budget is looser.
        let mut drain_budget = *budget;
        if self.config.finalizer_escalation == FinalizerEscalation::BoundedLog {
            drain_budget = drain_budget
                .meet(Budget::new().with_poll_quota(self.config.finalizer_poll_budget));
        }
        let polls_before = drain_budget.poll_quota;
        let cost_before = drain_budget.cost_quota;
        let run = self.scheduler_run(region, &mut drain_budget);
        budget.poll_quota = budget
            .poll_quota
            .saturating_sub(polls_before - drain_budget.poll_quota);
        budget.cost_quota = budget
            .cost_quota
            .saturating_sub(cost_before - drain_budget.cost_quota);
        run?;

        let generation = self.regions.slots[idx].generation;
        let reserved: Vec<usize> = self
            .obligations
            .slots
            .iter()
            .enumerate()
            .filter(|(_, o)| {
                o.ever_allocated
                    && o.parent == idx as u32
                    && o.parent_generation == generation
                    && o.state == ObligationState::Reserved
            })
            .map(|(i, _)| i)
            .collect();
        if !reserved.is_empty() {
            for &obligation_idx in &reserved {
                let bits = self.obligations.slots[obligation_idx].handle.to_bits();
                self.ghost.record(
                    GhostKind::LinearityLeak,
                    bits,
                    ObligationState::Reserved.ordinal(),
                    ObligationState::Leaked.ordinal(),
                );
            }
            match self.config.leak_response {
                LeakResponse::Ignore => {
                    for &obligation_idx in &reserved {
                        let bits = self.obligations.slots[obligation_idx].handle.to_bits();
                        self.gate_obligation(obligation_idx, ObligationState::Leaked)?;
                        self.trace.emit(TraceKind::ObligationLeak, bits, 0);
                    }
                }
                LeakResponse::Log => {
                    tracing::warn!(
                        target: "lockstep::region",
                        region = %region,
                        leaked = reserved.len(),
                        "drain blocked by unresolved obligations"
                    );
                    return Err(Status::ObligationsUnresolved);
                }
                LeakResponse::Abort => {
                    tracing::error!(
                        target: "lockstep::region",
                        region = %region,
                        leaked = reserved.len(),
                        "drain blocked by unresolved obligations"
                    );
                    return Err(Status::ObligationsUnresolved);
                }
            }
        }

        if self.regions.slots[idx].state == RegionState::Draining {
            self.gate_region(idx, RegionState::Finalizing)?;
            self.trace
                .emit(TraceKind::RegionFinalize, region.to_bits(), 0);
        }
        self.gate_region(idx, RegionState::Closed)?;
        self.trace.emit(TraceKind::RegionClosed, region.to_bits(), 0);
        self.regions.slots[idx].live = false;
        tracing::debug!(target: "lockstep::region", region = %region, "region closed");
        Ok(())
    }

    /// Returns the region's lifecycle state. Read-only; survives poison.
    pub fn region_get_state(&self, region: Handle) -> Result<RegionState, Status> {
        let idx = self.regions.resolve(region)?;
        Ok(self.regions.slots[idx].state)
    }

    /// Returns whether the region is poisoned. Read-only; survives poison.
    pub fn region_is_poisoned(&self, region: Handle) -> Result<bool, Status> {
        let idx = self.regions.resolve(region)?;
        Ok(self.regions.slots[idx].poisoned)
    }

    /// Latches the poison bit. Idempotent; does not mutate the lifecycle
    /// state. Valid on any non-terminal state.
    pub fn region_poison(&mut self, region: Handle) -> Result<(), Status> {
        let idx = self.regions.resolve(region)?;
        if self.regions.slots[idx].state.is_terminal() {
            return Err(Status::RegionClosed);
        }
        if !self.regions.slots[idx].poisoned {
            self.regions.slots[idx].poisoned = true;
            self.trace.emit(TraceKind::RegionPoison, region.to_bits(), 0);
            tracing::warn!(target: "lockstep::region", region = %region, "region poisoned");
        }
        Ok(())
    }
}
