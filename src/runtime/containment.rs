//! Fault containment policies.
//!
//! A task-level fault is contained according to the active execution
//! profile: fail fast out of the scheduler, poison the region and drain,
//! or report and keep going. Poisoning latches the region's poison bit
//! and propagates a fail-fast cancellation so existing work drains while
//! new work is refused.

use crate::config::ExecutionProfile;
use crate::handle::Handle;
use crate::runtime::Kernel;
use crate::status::Status;
use crate::types::cancel::CancelKind;
use core::fmt;

/// The runtime's response to a task-level fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainmentPolicy {
    /// Propagate the first fault out of the scheduler; leave the region
    /// untouched.
    FailFast,
    /// Poison the region, propagate cancellation, keep scheduling so
    /// existing work drains.
    PoisonRegion,
    /// Report the fault; do not poison.
    ErrorOnly,
}

impl ContainmentPolicy {
    /// Maps an execution profile to its containment policy.
    #[must_use]
    pub const fn for_profile(profile: ExecutionProfile) -> Self {
        match profile {
            ExecutionProfile::Debug => Self::FailFast,
            ExecutionProfile::Hardened => Self::PoisonRegion,
            ExecutionProfile::Release => Self::ErrorOnly,
        }
    }

    /// Returns the lowercase name of this policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FailFast => "fail-fast",
            Self::PoisonRegion => "poison-region",
            Self::ErrorOnly => "error-only",
        }
    }
}

impl fmt::Display for ContainmentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Kernel {
    /// Returns the containment policy selected by the active profile.
    #[must_use]
    pub fn containment_policy_active(&self) -> ContainmentPolicy {
        ContainmentPolicy::for_profile(self.config.profile)
    }

    /// Applies the active containment policy to a fault observed against
    /// a region, returning the fault unchanged.
    pub fn region_contain_fault(&mut self, region: Handle, fault: Status) -> Status {
        if self.regions.resolve(region).is_ok()
            && self.containment_policy_active() == ContainmentPolicy::PoisonRegion
        {
            self.poison_and_propagate(region);
        }
        fault
    }

    /// Poisons a region and cancels its live tasks with a fail-fast
    /// reason. Used by the scheduler's poison containment and by
    /// [`Kernel::region_contain_fault`].
    pub(crate) fn poison_and_propagate(&mut self, region: Handle) {
        if self.region_poison(region).is_err() {
            return;
        }
        if let Err(status) = self.cancel_propagate(region, CancelKind::FailFast) {
            tracing::warn!(
                target: "lockstep::containment",
                region = %region,
                status = status.as_str(),
                "cancel propagation failed during poisoning"
            );
        }
    }
}
