//! Bounded two-phase channels.
//!
//! A channel is owned by a region and moves opaque 64-bit words. Sending
//! is two-phase to prevent silent drops: `reserve` takes out a send
//! permit backed by a real obligation, `commit` enqueues, `abort`
//! releases. A region therefore cannot drain while a reserved send is in
//! flight, and double resolution of a permit is caught by the same
//! linearity machinery as any other obligation.

use crate::handle::{Handle, HandleKind};
use crate::runtime::{CHANNEL_CAPACITY, Kernel};
use crate::status::Status;
use crate::trace::ring::TraceKind;
use crate::types::transition::ObligationState;
use std::collections::VecDeque;

/// Largest admissible channel capacity.
pub const CHANNEL_MAX_DEPTH: u32 = 256;

/// One channel slot.
#[derive(Debug)]
pub(crate) struct ChannelSlot {
    pub(crate) parent: u32,
    pub(crate) parent_generation: u8,
    pub(crate) depth: u32,
    pub(crate) queue: VecDeque<u64>,
    pub(crate) pending_reserves: u32,
    pub(crate) closed: bool,
    pub(crate) generation: u8,
    pub(crate) ever_allocated: bool,
    pub(crate) handle: Handle,
}

impl Default for ChannelSlot {
    fn default() -> Self {
        Self {
            parent: 0,
            parent_generation: 0,
            depth: 0,
            queue: VecDeque::new(),
            pending_reserves: 0,
            closed: false,
            generation: 0,
            ever_allocated: false,
            handle: Handle::INVALID,
        }
    }
}

/// Fixed-capacity channel table with terminal slot retirement.
#[derive(Debug)]
pub(crate) struct ChannelTable {
    pub(crate) slots: Vec<ChannelSlot>,
    pub(crate) next_free: usize,
}

impl ChannelTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: (0..CHANNEL_CAPACITY).map(|_| ChannelSlot::default()).collect(),
            next_free: 0,
        }
    }

    pub(crate) fn resolve(&self, handle: Handle) -> Result<usize, Status> {
        if handle.kind() != Some(HandleKind::Channel) {
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
    /// Opens a channel in an open region. Depth must be a power of two no
    /// greater than [`CHANNEL_MAX_DEPTH`].
    pub fn channel_open(&mut self, region: Handle, depth: u32) -> Result<Handle, Status> {
        if depth == 0 || depth > CHANNEL_MAX_DEPTH || !depth.is_power_of_two() {
            return Err(Status::InvalidArgument);
        }
        let region_idx = self.regions.resolve(region)?;
        let region_slot = &self.regions.slots[region_idx];
        if region_slot.poisoned {
            return Err(Status::RegionPoisoned);
        }
        if region_slot.state.is_terminal() {
            return Err(Status::RegionClosed);
        }
        if !region_slot.state.can_spawn() {
            return Err(Status::RegionNotOpen);
        }
        if self.channels.next_free >= CHANNEL_CAPACITY {
            return Err(Status::ResourceExhausted);
        }
        let idx = self.channels.next_free;
        self.channels.next_free += 1;
        let slot = &mut self.channels.slots[idx];
        slot.generation = slot.generation.wrapping_add(1);
        let handle = Handle::pack(HandleKind::Channel, 0b11, idx as u32, slot.generation);
        slot.parent = region_idx as u32;
        slot.parent_generation = self.regions.slots[region_idx].generation;
        slot.depth = depth;
        slot.queue = VecDeque::with_capacity(depth as usize);
        slot.pending_reserves = 0;
        slot.closed = false;
        slot.ever_allocated = true;
        slot.handle = handle;
        self.trace
            .emit(TraceKind::ChannelOpen, handle.to_bits(), depth);
        Ok(handle)
    }

    /// Reserves a send slot, returning a permit (an obligation handle).
    ///
    /// Refused with [`Status::AdmissionClosed`] after close and
    /// [`Status::ChannelFull`] when the queue plus in-flight permits
    /// reach the channel depth.
    pub fn channel_reserve(&mut self, channel: Handle) -> Result<Handle, Status> {
        let idx = self.channels.resolve(channel)?;
        let region_idx = self.channels.slots[idx].parent as usize;
        let region_slot = &self.regions.slots[region_idx];
        if region_slot.generation != self.channels.slots[idx].parent_generation
            || region_slot.state.is_terminal()
        {
            return Err(Status::RegionClosed);
        }
        if region_slot.poisoned {
            return Err(Status::RegionPoisoned);
        }
        let slot = &self.channels.slots[idx];
        if slot.closed {
            return Err(Status::AdmissionClosed);
        }
        if slot.queue.len() as u32 + slot.pending_reserves >= slot.depth {
            return Err(Status::ChannelFull);
        }
        let permit = self.obligation_reserve_in(region_idx, Some(idx as u32))?;
        self.channels.slots[idx].pending_reserves += 1;
        self.trace
            .emit(TraceKind::ChannelReserve, channel.to_bits(), 0);
        Ok(permit)
    }

    /// Commits a reserved send, enqueueing the value.
    pub fn channel_commit_send(&mut self, permit: Handle, value: u64) -> Result<(), Status> {
        let obligation_idx = self.obligations.resolve(permit)?;
        let channel_idx = self.obligations.slots[obligation_idx]
            .channel
            .ok_or(Status::InvalidArgument)? as usize;
        self.gate_obligation(obligation_idx, ObligationState::Committed)?;
        let slot = &mut self.channels.slots[channel_idx];
        slot.pending_reserves = slot.pending_reserves.saturating_sub(1);
        slot.queue.push_back(value);
        let bits = slot.handle.to_bits();
        let len = slot.queue.len() as u32;
        self.trace.emit(TraceKind::ChannelCommit, bits, len);
        Ok(())
    }

    /// Aborts a reserved send, releasing the permit.
    pub fn channel_abort_send(&mut self, permit: Handle) -> Result<(), Status> {
        let obligation_idx = self.obligations.resolve(permit)?;
        let channel_idx = self.obligations.slots[obligation_idx]
            .channel
            .ok_or(Status::InvalidArgument)? as usize;
        self.gate_obligation(obligation_idx, ObligationState::Aborted)?;
        let slot = &mut self.channels.slots[channel_idx];
        slot.pending_reserves = slot.pending_reserves.saturating_sub(1);
        let bits = slot.handle.to_bits();
        self.trace.emit(TraceKind::ChannelAbort, bits, 0);
        Ok(())
    }

    /// Receives the oldest value.
    ///
    /// Returns [`Status::Pending`] on an empty open channel and
    /// [`Status::Disconnected`] once the channel is closed and drained.
    pub fn channel_try_recv(&mut self, channel: Handle) -> Result<u64, Status> {
        let idx = self.channels.resolve(channel)?;
        let slot = &mut self.channels.slots[idx];
        match slot.queue.pop_front() {
            Some(value) => {
                let bits = slot.handle.to_bits();
                let len = slot.queue.len() as u32;
                self.trace.emit(TraceKind::ChannelRecv, bits, len);
                Ok(value)
            }
            None if slot.closed => Err(Status::Disconnected),
            None => Err(Status::Pending),
        }
    }

    /// Closes the channel to new reservations. Idempotent; queued values
    /// remain receivable.
    pub fn channel_close(&mut self, channel: Handle) -> Result<(), Status> {
        let idx = self.channels.resolve(channel)?;
        if !self.channels.slots[idx].closed {
            self.channels.slots[idx].closed = true;
            self.trace
                .emit(TraceKind::ChannelClose, channel.to_bits(), 0);
        }
        Ok(())
    }
}
