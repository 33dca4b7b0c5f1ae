//! Obligation arena: linear resource reservations.
//!
//! An obligation is reserved inside an open region and must be resolved
//! exactly once (commit or abort) before the region can drain. A second
//! resolution is refused by the transition table and recorded by the
//! linearity monitor; a reservation still open at drain is recorded as a
//! leak. Obligation slots retire terminally until kernel reset.

use crate::handle::{Handle, HandleKind};
use crate::runtime::{Kernel, OBLIGATION_CAPACITY};
use crate::status::Status;
use crate::trace::ring::TraceKind;
use crate::types::transition::ObligationState;

/// One obligation slot.
#[derive(Debug)]
pub(crate) struct ObligationSlot {
    pub(crate) state: ObligationState,
    pub(crate) parent: u32,
    pub(crate) parent_generation: u8,
    /// Channel slot this obligation backs as a send permit, if any.
    pub(crate) channel: Option<u32>,
    pub(crate) generation: u8,
    pub(crate) ever_allocated: bool,
    pub(crate) handle: Handle,
}

impl Default for ObligationSlot {
    fn default() -> Self {
        Self {
            state: ObligationState::Reserved,
            parent: 0,
            parent_generation: 0,
            channel: None,
            generation: 0,
            ever_allocated: false,
            handle: Handle::INVALID,
        }
    }
}

/// Fixed-capacity obligation table with terminal slot retirement.
#[derive(Debug)]
pub(crate) struct ObligationTable {
    pub(crate) slots: Vec<ObligationSlot>,
    pub(crate) next_free: usize,
}

impl ObligationTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: (0..OBLIGATION_CAPACITY)
                .map(|_| ObligationSlot::default())
                .collect(),
            next_free: 0,
        }
    }

    pub(crate) fn resolve(&self, handle: Handle) -> Result<usize, Status> {
        if handle.kind() != Some(HandleKind::Obligation) {
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
    pub(crate) fn obligation_reserve_in(
        &mut self,
        region_idx: usize,
        channel: Option<u32>,
    ) -> Result<Handle, Status> {
        if self.obligations.next_free >= OBLIGATION_CAPACITY {
            return Err(Status::ResourceExhausted);
        }
        let idx = self.obligations.next_free;
        self.obligations.next_free += 1;
        let slot = &mut self.obligations.slots[idx];
        slot.generation = slot.generation.wrapping_add(1);
        let handle = Handle::pack(
            HandleKind::Obligation,
            ObligationState::FULL_MASK,
            idx as u32,
            slot.generation,
        );
        slot.state = ObligationState::Reserved;
        slot.parent = region_idx as u32;
        slot.parent_generation = self.regions.slots[region_idx].generation;
        slot.channel = channel;
        slot.ever_allocated = true;
        slot.handle = handle;
        self.trace
            .emit(TraceKind::ObligationReserve, handle.to_bits(), region_idx as u32);
        Ok(handle)
    }

    /// Reserves an obligation in an open region.
    pub fn obligation_reserve(&mut self, region: Handle) -> Result<Handle, Status> {
        let region_idx = self.regions.resolve(region)?;
        let slot = &self.regions.slots[region_idx];
        if slot.poisoned {
            return Err(Status::RegionPoisoned);
        }
        if slot.state.is_terminal() {
            return Err(Status::RegionClosed);
        }
        if !slot.state.can_spawn() {
            return Err(Status::RegionNotOpen);
        }
        self.obligation_reserve_in(region_idx, None)
    }

    /// Resolves a reservation by commit.
    pub fn obligation_commit(&mut self, obligation: Handle) -> Result<(), Status> {
        let idx = self.obligations.resolve(obligation)?;
        self.gate_obligation(idx, ObligationState::Committed)?;
        self.trace
            .emit(TraceKind::ObligationCommit, obligation.to_bits(), 0);
        Ok(())
    }

    /// Resolves a reservation by rollback.
    pub fn obligation_abort(&mut self, obligation: Handle) -> Result<(), Status> {
        let idx = self.obligations.resolve(obligation)?;
        self.gate_obligation(idx, ObligationState::Aborted)?;
        self.trace
            .emit(TraceKind::ObligationAbort, obligation.to_bits(), 0);
        Ok(())
    }

    /// Returns the obligation's state. Read-only; survives poison.
    pub fn obligation_get_state(&self, obligation: Handle) -> Result<ObligationState, Status> {
        let idx = self.obligations.resolve(obligation)?;
        Ok(self.obligations.slots[idx].state)
    }
}
