//! Runtime configuration.
//!
//! A [`RuntimeConfig`] is plain data: it can be built with setters or
//! deserialized from JSON/TOML-shaped input via serde. The execution
//! profile selects the fault-containment policy; the remaining knobs tune
//! finalization and cancellation bookkeeping.

use serde::{Deserialize, Serialize};

/// How the runtime waits when it has nothing to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WaitPolicy {
    /// Yield to the embedder between rounds.
    #[default]
    Yield,
    /// Busy-spin.
    Spin,
    /// Block on the reactor.
    Block,
}

/// How the runtime responds to a leaked obligation at drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LeakResponse {
    /// Record the leak and block the drain.
    #[default]
    Log,
    /// Record the leak at error level and block the drain.
    Abort,
    /// Mark the obligation leaked and let the drain complete.
    Ignore,
}

/// Escalation discipline for finalizers that exceed their budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FinalizerEscalation {
    /// Log and force completion at the budget bound.
    #[default]
    BoundedLog,
    /// Let finalizers run to completion regardless of budget.
    Unbounded,
}

/// Execution profile; selects the fault-containment policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionProfile {
    /// Fail fast on the first task fault.
    #[default]
    Debug,
    /// Poison the region and drain existing work.
    Hardened,
    /// Report the fault and keep going.
    Release,
}

/// Kernel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Execution profile.
    pub profile: ExecutionProfile,
    /// Deterministic mode: logical time only, seeded entropy, ghost reactor.
    pub deterministic: bool,
    /// Idle wait policy.
    pub wait_policy: WaitPolicy,
    /// Response to leaked obligations at drain.
    pub leak_response: LeakResponse,
    /// Poll budget granted to finalization work during drain.
    pub finalizer_poll_budget: u32,
    /// Wall-time budget for finalization work, in nanoseconds (0 = none).
    pub finalizer_time_budget_ns: u64,
    /// Escalation discipline when a finalizer exceeds its budget.
    pub finalizer_escalation: FinalizerEscalation,
    /// Maximum links in a cancel-reason cause chain.
    pub max_cancel_chain_depth: u16,
    /// Maximum bytes a cancel-reason cause chain may occupy.
    pub max_cancel_chain_memory: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            profile: ExecutionProfile::Debug,
            deterministic: false,
            wait_policy: WaitPolicy::Yield,
            leak_response: LeakResponse::Log,
            finalizer_poll_budget: 200,
            finalizer_time_budget_ns: 0,
            finalizer_escalation: FinalizerEscalation::BoundedLog,
            max_cancel_chain_depth: 8,
            max_cancel_chain_memory: 4096,
        }
    }
}

impl RuntimeConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the execution profile.
    #[must_use]
    pub fn with_profile(mut self, profile: ExecutionProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Enables or disables deterministic mode.
    #[must_use]
    pub fn with_deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    /// Sets the leak response.
    #[must_use]
    pub fn with_leak_response(mut self, response: LeakResponse) -> Self {
        self.leak_response = response;
        self
    }
}
