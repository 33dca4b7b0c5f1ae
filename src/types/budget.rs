//! Resource budgets for scheduler execution.
//!
//! A budget bounds one scheduler invocation along four axes: a logical
//! deadline, a poll quota, a cost quota, and a priority. Budgets form a
//! meet-semilattice under [`Budget::meet`]; the scheduler consumes quotas
//! in place and stops when either reaches zero.

use crate::status::Status;
use crate::types::time::Time;

/// A four-axis execution bound.
///
/// A deadline of [`Time::ZERO`] means "no deadline"; `meet` therefore
/// takes the nonzero minimum on that axis. Priority 0 likewise means
/// "unspecified".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Budget {
    /// Logical deadline; `Time::ZERO` means none.
    pub deadline: Time,
    /// Remaining polls this budget admits.
    pub poll_quota: u32,
    /// Remaining abstract cost units this budget admits.
    pub cost_quota: u64,
    /// Scheduling priority; higher is more urgent.
    pub priority: u8,
}

impl Budget {
    /// The unbounded budget: no deadline, saturated quotas, neutral priority.
    pub const INFINITE: Self = Self {
        deadline: Time::ZERO,
        poll_quota: u32::MAX,
        cost_quota: u64::MAX,
        priority: 128,
    };

    /// The empty budget: both quotas zero.
    pub const ZERO: Self = Self {
        deadline: Time::ZERO,
        poll_quota: 0,
        cost_quota: 0,
        priority: 128,
    };

    /// Creates an unbounded budget.
    #[must_use]
    pub const fn new() -> Self {
        Self::INFINITE
    }

    /// Replaces the deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Time) -> Self {
        self.deadline = deadline;
        self
    }

    /// Replaces the poll quota.
    #[must_use]
    pub const fn with_poll_quota(mut self, polls: u32) -> Self {
        self.poll_quota = polls;
        self
    }

    /// Replaces the cost quota.
    #[must_use]
    pub const fn with_cost_quota(mut self, cost: u64) -> Self {
        self.cost_quota = cost;
        self
    }

    /// Replaces the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// The priority value that leaves the other operand's priority in
    /// force under [`Budget::meet`].
    pub const NEUTRAL_PRIORITY: u8 = 128;

    /// Returns the tighter of two budgets on every axis.
    ///
    /// Quotas take the plain minimum. Deadline takes the nonzero minimum
    /// and priority the neutral-aware minimum, so an unspecified axis
    /// never loosens a bound and [`Budget::INFINITE`] is a two-sided
    /// identity.
    #[must_use]
    pub fn meet(self, other: Self) -> Self {
        Self {
            deadline: nonzero_min_time(self.deadline, other.deadline),
            poll_quota: self.poll_quota.min(other.poll_quota),
            cost_quota: self.cost_quota.min(other.cost_quota),
            priority: neutral_min_priority(self.priority, other.priority),
        }
    }

    /// Decrements the poll quota, returning the pre-decrement value.
    ///
    /// At zero the quota stays zero and 0 is returned.
    pub fn consume_poll(&mut self) -> u32 {
        let previous = self.poll_quota;
        self.poll_quota = self.poll_quota.saturating_sub(1);
        previous
    }

    /// Decrements the cost quota by `n` iff sufficient; otherwise leaves
    /// the budget untouched and reports [`Status::CostBudgetExceeded`].
    pub fn consume_cost(&mut self, n: u64) -> Result<(), Status> {
        if self.cost_quota >= n {
            self.cost_quota -= n;
            Ok(())
        } else {
            Err(Status::CostBudgetExceeded)
        }
    }

    /// A budget is exhausted iff either quota has reached zero.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.poll_quota == 0 || self.cost_quota == 0
    }

    /// Returns whether `now` is strictly past the deadline.
    ///
    /// A zero deadline never expires.
    #[must_use]
    pub fn is_past_deadline(&self, now: Time) -> bool {
        self.deadline != Time::ZERO && now > self.deadline
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::INFINITE
    }
}

fn nonzero_min_time(a: Time, b: Time) -> Time {
    match (a == Time::ZERO, b == Time::ZERO) {
        (true, _) => b,
        (_, true) => a,
        _ => a.min(b),
    }
}

fn neutral_min_priority(a: u8, b: u8) -> u8 {
    if a == Budget::NEUTRAL_PRIORITY {
        b
    } else if b == Budget::NEUTRAL_PRIORITY {
        a
    } else {
        a.min(b)
    }
}
