//! Pluggable runtime bindings.
//!
//! The kernel reaches the outside world only through a [`Hooks`] record:
//! clocks, entropy, the reactor, the log sink, and the allocator gate.
//! Every binding is a trait object installed by the embedder; validation
//! enforces the determinism contract per execution mode before a record
//! becomes active. Dispatch lives on the kernel so that clock and entropy
//! reads can land in the hindsight ring.

use crate::status::Status;
use crate::types::budget::Budget;
use crate::util::DetRng;
use std::sync::{Arc, Mutex};

/// A time source. Implementations must be cheap and side-effect free.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current time in nanoseconds.
    fn now_ns(&self) -> u64;
}

/// Core trait for entropy providers.
pub trait EntropySource: Send + Sync + 'static {
    /// Fills a buffer with entropy bytes.
    fn fill_bytes(&self, dest: &mut [u8]);

    /// Returns the next random `u64`.
    fn next_u64(&self) -> u64;

    /// Stable identifier for tracing and diagnostics.
    fn source_id(&self) -> &'static str;
}

/// A reactor binding: how the runtime parks when it must wait.
pub trait Reactor: Send + Sync + 'static {
    /// Waits for readiness under the given budget.
    fn wait(&self, budget: &Budget) -> Status;

    /// Advances one logical step without touching the host (deterministic
    /// mode).
    fn ghost_wait(&self) -> Status;
}

/// A structured log sink.
pub trait LogSink: Send + Sync + 'static {
    /// Writes one log line.
    fn write(&self, line: &str);
}

/// A raw byte allocator behind the seal gate.
pub trait Allocator: Send + Sync + 'static {
    /// Allocates a zeroed block, or `None` when the host refuses.
    fn alloc(&self, len: usize) -> Option<Box<[u8]>>;
}

/// OS-backed entropy source for live runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill_bytes(&self, dest: &mut [u8]) {
        getrandom::fill(dest).expect("OS entropy failed");
    }

    fn next_u64(&self) -> u64 {
        let mut buf = [0u8; 8];
        self.fill_bytes(&mut buf);
        u64::from_le_bytes(buf)
    }

    fn source_id(&self) -> &'static str {
        "os"
    }
}

/// Seeded deterministic entropy source.
#[derive(Debug)]
pub struct DetEntropy {
    inner: Mutex<DetRng>,
}

impl DetEntropy {
    /// Creates a deterministic entropy source from a seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Mutex::new(DetRng::new(seed)),
        }
    }
}

impl EntropySource for DetEntropy {
    fn fill_bytes(&self, dest: &mut [u8]) {
        self.inner
            .lock()
            .expect("det entropy lock poisoned")
            .fill_bytes(dest);
    }

    fn next_u64(&self) -> u64 {
        self.inner
            .lock()
            .expect("det entropy lock poisoned")
            .next_u64()
    }

    fn source_id(&self) -> &'static str {
        "seeded"
    }
}

/// A fixed-step logical clock for deterministic runs.
///
/// Each read advances the clock by the configured step, so repeated reads
/// observe strictly increasing logical time without any host dependency.
#[derive(Debug)]
pub struct LogicalClock {
    now: Mutex<u64>,
    step: u64,
}

impl LogicalClock {
    /// Creates a logical clock starting at `start` advancing by `step`
    /// nanoseconds per read.
    #[must_use]
    pub fn new(start: u64, step: u64) -> Self {
        Self {
            now: Mutex::new(start),
            step,
        }
    }
}

impl Clock for LogicalClock {
    fn now_ns(&self) -> u64 {
        let mut now = self.now.lock().expect("logical clock lock poisoned");
        let current = *now;
        *now = now.saturating_add(self.step);
        current
    }
}

/// A reactor whose waits are pure logical steps.
#[derive(Debug, Default, Clone, Copy)]
pub struct GhostReactor;

impl Reactor for GhostReactor {
    fn wait(&self, _budget: &Budget) -> Status {
        Status::Ok
    }

    fn ghost_wait(&self) -> Status {
        Status::Ok
    }
}

/// Default allocator backed by the global heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdAllocator;

impl Allocator for StdAllocator {
    fn alloc(&self, len: usize) -> Option<Box<[u8]>> {
        Some(vec![0u8; len].into_boxed_slice())
    }
}

/// Default log sink routing through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn write(&self, line: &str) {
        tracing::debug!(target: "lockstep::log", "{line}");
    }
}

/// The active set of runtime bindings.
#[derive(Clone, Default)]
pub struct Hooks {
    /// Wall-clock source; required in live mode.
    pub wall_clock: Option<Arc<dyn Clock>>,
    /// Logical-clock source; required in deterministic mode.
    pub logical_clock: Option<Arc<dyn Clock>>,
    /// Entropy source.
    pub entropy: Option<Arc<dyn EntropySource>>,
    /// Reactor binding.
    pub reactor: Option<Arc<dyn Reactor>>,
    /// Log sink; a missing sink is a silent no-op.
    pub log: Option<Arc<dyn LogSink>>,
    /// Allocator behind the seal gate.
    pub allocator: Option<Arc<dyn Allocator>>,
    /// Declares that any installed entropy source is a seeded PRNG.
    pub deterministic_seeded_prng: bool,
    sealed: bool,
}

impl Hooks {
    /// Creates a hooks record with the default allocator and log sink.
    ///
    /// All other bindings start empty.
    #[must_use]
    pub fn init() -> Self {
        Self {
            allocator: Some(Arc::new(StdAllocator)),
            log: Some(Arc::new(TracingLogSink)),
            ..Self::default()
        }
    }

    /// Validates the record against the execution mode.
    ///
    /// In live mode a wall clock is required. In deterministic mode a
    /// logical clock and a reactor (for ghost waits) are required, a wall
    /// clock alone is insufficient, and any installed entropy source must
    /// be declared as a seeded PRNG.
    pub fn validate(&self, deterministic: bool) -> Result<(), Status> {
        if self.allocator.is_none() {
            return Err(Status::InvalidState);
        }
        if deterministic {
            if self.logical_clock.is_none() || self.reactor.is_none() {
                return Err(Status::DeterminismViolation);
            }
            if self.entropy.is_some() && !self.deterministic_seeded_prng {
                return Err(Status::DeterminismViolation);
            }
        } else if self.wall_clock.is_none() {
            return Err(Status::InvalidState);
        }
        Ok(())
    }

    /// Latches the allocator seal. Idempotent.
    pub fn seal_allocator(&mut self) {
        self.sealed = true;
    }

    /// Returns whether the allocator seal is latched.
    #[must_use]
    pub const fn allocator_sealed(&self) -> bool {
        self.sealed
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("wall_clock", &self.wall_clock.is_some())
            .field("logical_clock", &self.logical_clock.is_some())
            .field("entropy", &self.entropy.is_some())
            .field("reactor", &self.reactor.is_some())
            .field("log", &self.log.is_some())
            .field("allocator", &self.allocator.is_some())
            .field("deterministic_seeded_prng", &self.deterministic_seeded_prng)
            .field("sealed", &self.sealed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deterministic_hooks() -> Hooks {
        let mut hooks = Hooks::init();
        hooks.logical_clock = Some(Arc::new(LogicalClock::new(0, 1)));
        hooks.reactor = Some(Arc::new(GhostReactor));
        hooks
    }

    #[test]
    fn init_fills_allocator_and_log() {
        let hooks = Hooks::init();
        assert!(hooks.allocator.is_some());
        assert!(hooks.log.is_some());
        assert!(hooks.wall_clock.is_none());
        assert!(hooks.entropy.is_none());
    }

    #[test]
    fn live_mode_requires_wall_clock() {
        let hooks = Hooks::init();
        assert_eq!(hooks.validate(false), Err(Status::InvalidState));

        let mut hooks = Hooks::init();
        hooks.wall_clock = Some(Arc::new(LogicalClock::new(0, 1)));
        assert_eq!(hooks.validate(false), Ok(()));
    }

    #[test]
    fn deterministic_mode_requires_logical_clock_and_reactor() {
        let mut hooks = Hooks::init();
        // A wall clock alone is insufficient.
        hooks.wall_clock = Some(Arc::new(LogicalClock::new(0, 1)));
        assert_eq!(hooks.validate(true), Err(Status::DeterminismViolation));

        assert_eq!(deterministic_hooks().validate(true), Ok(()));
    }

    #[test]
    fn deterministic_entropy_must_be_declared_seeded() {
        let mut hooks = deterministic_hooks();
        hooks.entropy = Some(Arc::new(DetEntropy::new(7)));
        assert_eq!(hooks.validate(true), Err(Status::DeterminismViolation));

        hooks.deterministic_seeded_prng = true;
        assert_eq!(hooks.validate(true), Ok(()));
    }

    #[test]
    fn missing_allocator_is_invalid_state() {
        let mut hooks = deterministic_hooks();
        hooks.allocator = None;
        assert_eq!(hooks.validate(true), Err(Status::InvalidState));
    }

    #[test]
    fn seal_is_idempotent() {
        let mut hooks = Hooks::init();
        assert!(!hooks.allocator_sealed());
        hooks.seal_allocator();
        hooks.seal_allocator();
        assert!(hooks.allocator_sealed());
    }

    #[test]
    fn logical_clock_is_strictly_increasing() {
        let clock = LogicalClock::new(100, 10);
        assert_eq!(clock.now_ns(), 100);
        assert_eq!(clock.now_ns(), 110);
        assert_eq!(clock.now_ns(), 120);
    }

    #[test]
    fn det_entropy_is_reproducible() {
        let a = DetEntropy::new(99);
        let b = DetEntropy::new(99);
        for _ in 0..8 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
        assert_eq!(a.source_id(), "seeded");
    }
}
