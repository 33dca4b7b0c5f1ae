//! Bounded-horizon timers over logical time.
//!
//! Timers are driven entirely by the embedder's `advance` calls; the
//! kernel never reads a clock here. Expiry order is deterministic:
//! ascending deadline, then arm order. Arming past the wheel horizon is
//! refused, which keeps every timer within one wheel rotation. Multiple
//! timers expiring in a single advance are one coalesced batch, recorded
//! as a nondeterminism-boundary observation.

use crate::handle::{Handle, HandleKind};
use crate::monitor::hindsight::HindsightKind;
use crate::runtime::{Kernel, TIMER_CAPACITY};
use crate::status::Status;
use crate::trace::ring::TraceKind;
use crate::types::time::Time;

/// Wheel granularity: one slot per millisecond.
pub const TIMER_GRANULARITY_NS: u64 = 1_000_000;

/// Wheel horizon: the farthest admissible deadline, one full rotation.
pub const TIMER_HORIZON_NS: u64 = TIMER_CAPACITY as u64 * TIMER_GRANULARITY_NS;

/// One timer slot.
#[derive(Debug)]
pub(crate) struct TimerSlot {
    pub(crate) deadline: Time,
    pub(crate) armed: bool,
    pub(crate) fired: bool,
    pub(crate) arm_order: u64,
    pub(crate) parent: u32,
    pub(crate) parent_generation: u8,
    pub(crate) generation: u8,
    pub(crate) ever_allocated: bool,
    pub(crate) handle: Handle,
}

impl Default for TimerSlot {
    fn default() -> Self {
        Self {
            deadline: Time::ZERO,
            armed: false,
            fired: false,
            arm_order: 0,
            parent: 0,
            parent_generation: 0,
            generation: 0,
            ever_allocated: false,
            handle: Handle::INVALID,
        }
    }
}

/// Fixed-capacity timer table.
#[derive(Debug)]
pub(crate) struct TimerTable {
    pub(crate) slots: Vec<TimerSlot>,
    pub(crate) next_free: usize,
    pub(crate) arm_counter: u64,
}

impl TimerTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: (0..TIMER_CAPACITY).map(|_| TimerSlot::default()).collect(),
            next_free: 0,
            arm_counter: 0,
        }
    }

    pub(crate) fn resolve(&self, handle: Handle) -> Result<usize, Status> {
        if handle.kind() != Some(HandleKind::Timer) {
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
    /// Creates a timer owned by an open region.
    pub fn timer_create(&mut self, region: Handle) -> Result<Handle, Status> {
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
        if self.timers.next_free >= TIMER_CAPACITY {
            return Err(Status::ResourceExhausted);
        }
        let idx = self.timers.next_free;
        self.timers.next_free += 1;
        let slot = &mut self.timers.slots[idx];
        slot.generation = slot.generation.wrapping_add(1);
        let handle = Handle::pack(HandleKind::Timer, 0b11, idx as u32, slot.generation);
        slot.deadline = Time::ZERO;
        slot.armed = false;
        slot.fired = false;
        slot.arm_order = 0;
        slot.parent = region_idx as u32;
        slot.parent_generation = self.regions.slots[region_idx].generation;
        slot.ever_allocated = true;
        slot.handle = handle;
        self.trace
            .emit(TraceKind::TimerCreate, handle.to_bits(), region_idx as u32);
        Ok(handle)
    }

    /// Arms a timer for `deadline`, measured against `now`.
    ///
    /// Deadlines beyond the wheel horizon are refused with
    /// [`Status::TimerDurationExceeded`].
    pub fn timer_arm(&mut self, timer: Handle, deadline: Time, now: Time) -> Result<(), Status> {
        let idx = self.timers.resolve(timer)?;
        let region_idx = self.timers.slots[idx].parent as usize;
        let region_slot = &self.regions.slots[region_idx];
        if region_slot.generation != self.timers.slots[idx].parent_generation
            || region_slot.state.is_terminal()
        {
            return Err(Status::RegionClosed);
        }
        if deadline.duration_since(now) > TIMER_HORIZON_NS {
            return Err(Status::TimerDurationExceeded);
        }
        let order = self.timers.arm_counter;
        self.timers.arm_counter += 1;
        let slot = &mut self.timers.slots[idx];
        slot.deadline = deadline;
        slot.armed = true;
        slot.fired = false;
        slot.arm_order = order;
        self.trace.emit(
            TraceKind::TimerArm,
            timer.to_bits(),
            (deadline.duration_since(now) / TIMER_GRANULARITY_NS) as u32,
        );
        Ok(())
    }

    /// Disarms a timer. A fired or never-armed timer is left untouched.
    pub fn timer_cancel(&mut self, timer: Handle) -> Result<(), Status> {
        let idx = self.timers.resolve(timer)?;
        if self.timers.slots[idx].armed {
            self.timers.slots[idx].armed = false;
            self.trace.emit(TraceKind::TimerCancel, timer.to_bits(), 0);
        }
        Ok(())
    }

    /// Fires every armed timer with `deadline <= now`, in deterministic
    /// (deadline, arm-order) order. Returns the number fired.
    pub fn timer_advance(&mut self, now: Time) -> usize {
        let mut due: Vec<(Time, u64, usize)> = self
            .timers
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.ever_allocated && slot.armed && slot.deadline <= now)
            .map(|(idx, slot)| (slot.deadline, slot.arm_order, idx))
            .collect();
        due.sort_unstable();
        for &(_, _, idx) in &due {
            let slot = &mut self.timers.slots[idx];
            slot.armed = false;
            slot.fired = true;
            let bits = slot.handle.to_bits();
            self.trace
                .emit(TraceKind::TimerFire, bits, (now.as_millis()) as u32);
        }
        if due.len() > 1 {
            let seq = self
                .trace
                .emit(TraceKind::NdTimerCoalesce, 0, due.len() as u32);
            self.hindsight
                .log(HindsightKind::TimerCoalesce, seq, 0, due.len() as u64);
        }
        due.len()
    }

    /// Returns whether the timer has fired since it was last armed.
    pub fn timer_fired(&self, timer: Handle) -> Result<bool, Status> {
        let idx = self.timers.resolve(timer)?;
        Ok(self.timers.slots[idx].fired)
    }
}
