//! Cancellation reason and kind types.
//!
//! Cancellation is a first-class protocol, not a silent drop. A reason
//! records why a task is being cancelled; competing reasons combine under
//! a severity lattice via [`CancelReason::strengthen`], and the winning
//! kind fixes the cleanup budget the scheduler will enforce.

use crate::handle::Handle;
use crate::types::budget::Budget;
use crate::types::time::Time;
use core::fmt;

/// The kind of cancellation request, in severity bands 0 through 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CancelKind {
    /// Explicit cancellation requested by user code.
    User,
    /// A timeout elapsed.
    Timeout,
    /// A budget deadline passed.
    Deadline,
    /// The poll quota of the governing budget ran out.
    PollQuota,
    /// The cost quota of the governing budget ran out.
    CostBudget,
    /// A sibling failed under fail-fast policy.
    FailFast,
    /// Another branch of a race completed first.
    RaceLost,
    /// A linked peer exited.
    LinkedExit,
    /// The parent region is cancelling or closing.
    Parent,
    /// A resource limit forced the cancellation.
    Resource,
    /// The runtime is shutting down.
    Shutdown,
}

impl CancelKind {
    /// Returns the severity band of this kind.
    ///
    /// Higher severity takes precedence when strengthening.
    #[must_use]
    pub const fn severity(self) -> u8 {
        match self {
            Self::User => 0,
            Self::Timeout | Self::Deadline => 1,
            Self::PollQuota | Self::CostBudget => 2,
            Self::FailFast | Self::RaceLost | Self::LinkedExit => 3,
            Self::Parent | Self::Resource => 4,
            Self::Shutdown => 5,
        }
    }

    /// Returns the cleanup budget granted to a task cancelled with this kind.
    ///
    /// The poll quota strictly decreases and the priority strictly
    /// increases with severity, so a more urgent cancellation always gets a
    /// tighter drain bound and a stronger claim on the scheduler:
    ///
    /// | severity | polls | priority |
    /// |---------:|------:|---------:|
    /// | 0        | 1000  | 200      |
    /// | 1        | 500   | 210      |
    /// | 2        | 300   | 220      |
    /// | 3        | 200   | 230      |
    /// | 4        | 100   | 240      |
    /// | 5        | 50    | 255      |
    #[must_use]
    pub const fn cleanup_budget(self) -> Budget {
        let (polls, priority) = match self.severity() {
            0 => (1000, 200),
            1 => (500, 210),
            2 => (300, 220),
            3 => (200, 230),
            4 => (100, 240),
            _ => (50, 255),
        };
        Budget::new().with_poll_quota(polls).with_priority(priority)
    }

    /// Returns the lowercase name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Timeout => "timeout",
            Self::Deadline => "deadline",
            Self::PollQuota => "poll-quota",
            Self::CostBudget => "cost-budget",
            Self::FailFast => "fail-fast",
            Self::RaceLost => "race-lost",
            Self::LinkedExit => "linked-exit",
            Self::Parent => "parent",
            Self::Resource => "resource",
            Self::Shutdown => "shutdown",
        }
    }

    /// Stable numeric code for trace and snapshot encoding.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::User => 0,
            Self::Timeout => 1,
            Self::Deadline => 2,
            Self::PollQuota => 3,
            Self::CostBudget => 4,
            Self::FailFast => 5,
            Self::RaceLost => 6,
            Self::LinkedExit => 7,
            Self::Parent => 8,
            Self::Resource => 9,
            Self::Shutdown => 10,
        }
    }
}

impl fmt::Display for CancelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The phase a cancelled task is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CancelPhase {
    /// The reason is recorded; the task has not yet observed it.
    Requested,
    /// The task observed the cancellation at a checkpoint and is draining.
    Cancelling,
    /// The task declared its finalization epoch.
    Finalizing,
}

impl CancelPhase {
    /// Returns the phase ordinal.
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        match self {
            Self::Requested => 0,
            Self::Cancelling => 1,
            Self::Finalizing => 2,
        }
    }

    /// Returns the lowercase name of this phase.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Cancelling => "cancelling",
            Self::Finalizing => "finalizing",
        }
    }
}

/// The reason for a cancellation, including origin and causal context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReason {
    /// The kind of cancellation.
    pub kind: CancelKind,
    /// The region the cancellation originated from, if any.
    pub origin_region: Handle,
    /// The task the cancellation originated from, if any.
    pub origin_task: Handle,
    /// Logical timestamp at which the reason was recorded.
    pub timestamp: Time,
    /// Optional human-readable message (static for determinism).
    pub message: Option<&'static str>,
    /// The upstream reason this one was derived from, if any.
    pub cause: Option<Box<CancelReason>>,
    /// Set when the cause chain was cut at the configured depth bound.
    pub truncated: bool,
}

impl CancelReason {
    /// Creates a new reason with the given kind at logical time zero.
    #[must_use]
    pub const fn new(kind: CancelKind) -> Self {
        Self {
            kind,
            origin_region: Handle::INVALID,
            origin_task: Handle::INVALID,
            timestamp: Time::ZERO,
            message: None,
            cause: None,
            truncated: false,
        }
    }

    /// Creates a shutdown reason.
    #[must_use]
    pub const fn shutdown() -> Self {
        Self::new(CancelKind::Shutdown)
    }

    /// Creates a user reason with a message.
    #[must_use]
    pub const fn user(message: &'static str) -> Self {
        let mut reason = Self::new(CancelKind::User);
        reason.message = Some(message);
        reason
    }

    /// Sets the recording timestamp.
    #[must_use]
    pub const fn at(mut self, timestamp: Time) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Sets the originating region and task.
    #[must_use]
    pub const fn with_origin(mut self, region: Handle, task: Handle) -> Self {
        self.origin_region = region;
        self.origin_task = task;
        self
    }

    /// Chains an upstream cause, cutting the chain at `max_depth` links.
    ///
    /// When the bound is hit the deepest links are dropped and the
    /// truncated flag is set on the cut link.
    #[must_use]
    pub fn caused_by(mut self, cause: Self, max_depth: u16) -> Self {
        if max_depth == 0 {
            self.truncated = true;
            return self;
        }
        let mut boxed = Box::new(cause);
        let mut cursor: &mut CancelReason = &mut boxed;
        let mut depth = 1u16;
        loop {
            if depth >= max_depth {
                if cursor.cause.take().is_some() {
                    cursor.truncated = true;
                }
                break;
            }
            match cursor.cause {
                Some(ref mut next) => {
                    cursor = next;
                    depth += 1;
                }
                None => break,
            }
        }
        self.cause = Some(boxed);
        self
    }

    /// Returns the length of the cause chain, excluding `self`.
    #[must_use]
    pub fn chain_depth(&self) -> u16 {
        let mut depth = 0;
        let mut cursor = self.cause.as_deref();
        while let Some(reason) = cursor {
            depth += 1;
            cursor = reason.cause.as_deref();
        }
        depth
    }

    /// Strengthens this reason with another, keeping the more severe one.
    ///
    /// On equal severity the earlier timestamp wins, which makes the join
    /// strict, monotone, commutative, and idempotent. Returns `true` if the
    /// stored reason changed.
    pub fn strengthen(&mut self, other: &Self) -> bool {
        let (a, b) = (self.kind.severity(), other.kind.severity());
        if b > a || (b == a && other.timestamp < self.timestamp) {
            *self = other.clone();
            return true;
        }
        false
    }

    /// Returns the cleanup budget for the current kind.
    #[must_use]
    pub const fn cleanup_budget(&self) -> Budget {
        self.kind.cleanup_budget()
    }

    /// Returns the kind of this reason.
    #[must_use]
    pub const fn kind(&self) -> CancelKind {
        self.kind
    }
}

impl Default for CancelReason {
    fn default() -> Self {
        Self::new(CancelKind::User)
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(msg) = self.message {
            write!(f, ": {msg}")?;
        }
        if self.origin_region.is_valid() {
            write!(f, " (from {})", self.origin_region)?;
        }
        if self.truncated {
            write!(f, " [truncated]")?;
        }
        Ok(())
    }
}
