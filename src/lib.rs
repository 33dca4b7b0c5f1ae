//! Lockstep: a deterministic, cancel-correct cooperative task kernel.
//!
//! # Overview
//!
//! Lockstep schedules user-defined polling work inside bounded scopes
//! called regions, under strict state-machine discipline. Every task is
//! owned by a region; regions close to quiescence. Cancellation is a
//! first-class protocol (request → drain → finalize) with an enforced
//! cleanup budget, never a silent drop. Every state-affecting operation
//! lands in a digested trace ring, so a run can be exported, replayed,
//! and verified byte for byte.
//!
//! # Core Guarantees
//!
//! - **No orphan tasks**: every spawned task is owned by a region, and a
//!   region drains to quiescence before it closes
//! - **Cancel-correctness**: cancellation strengthens under a severity
//!   lattice and completes within a bounded cleanup budget
//! - **Obligation linearity**: two-phase reservations resolve exactly
//!   once; leaks are detected at drain
//! - **Determinism**: identical inputs produce identical event sequences,
//!   digests, and binary exports; nondeterminism boundaries are logged
//! - **Fault containment**: task faults are contained per execution
//!   profile (fail fast, poison the region, or report and continue)
//!
//! # Module Structure
//!
//! - [`status`]: the unified status codespace
//! - [`handle`]: packed, generation-tagged handles
//! - [`types`]: budgets, outcomes, cancellation, lifecycle tables
//! - [`config`]: runtime configuration and execution profiles
//! - [`hooks`]: pluggable clock/entropy/reactor/log/allocator bindings
//! - [`runtime`]: the kernel, its arenas, and the scheduler
//! - [`trace`](mod@trace): trace ring, replay verification, snapshots
//! - [`monitor`]: ghost protocol/linearity monitors and the hindsight ring
//! - [`channel`]: bounded two-phase channels
//! - [`timer`]: bounded-horizon logical timers
//! - [`util`]: deterministic hashing and RNG helpers

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod channel;
pub mod config;
pub mod handle;
pub mod hooks;
pub mod monitor;
pub mod runtime;
pub mod status;
pub mod timer;
pub mod trace;
pub mod types;
pub mod util;

// ── Test-only modules ───────────────────────────────────────────────────
#[cfg(any(test, feature = "test-internals"))]
pub mod test_logging;

// Re-exports for convenient access to the core surface.
pub use config::{
    ExecutionProfile, FinalizerEscalation, LeakResponse, RuntimeConfig, WaitPolicy,
};
pub use handle::{Handle, HandleKind};
pub use hooks::{
    Allocator, Clock, DetEntropy, EntropySource, GhostReactor, Hooks, LogSink, LogicalClock,
    OsEntropy, Reactor, StdAllocator, TracingLogSink,
};
pub use monitor::{
    GhostKind, GhostViolation, HindsightEvent, HindsightKind, HindsightPolicy,
};
pub use runtime::containment::ContainmentPolicy;
pub use runtime::scheduler::{SCHED_RING_CAPACITY, SchedEvent, SchedEventKind};
pub use runtime::task::{Checkpoint, PollCx, PollFn};
pub use runtime::{
    CAPTURE_ARENA_BYTES, CHANNEL_CAPACITY, Kernel, OBLIGATION_CAPACITY, REGION_CAPACITY,
    TASK_CAPACITY, TIMER_CAPACITY,
};
pub use status::{Status, StatusCategory};
pub use trace::{
    ReplayReport, ReplayResult, TRACE_RING_CAPACITY, TraceEvent, TraceKind,
};
pub use types::{
    Budget, CancelKind, CancelPhase, CancelReason, ObligationState, Outcome, RegionState,
    TaskState, Time,
};
