//! Unified status codespace for kernel operations.
//!
//! Every kernel operation reports through a single closed [`Status`] enum.
//! The codespace deliberately mixes hard errors with cooperative signals
//! (`Pending`, `WouldBlock`): a poll function yields by returning `Pending`,
//! and the same code travels through the scheduler unchanged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A kernel status code.
///
/// `Ok` is the only non-error code; everything else satisfies
/// [`Status::is_error`]. Cooperative signals share the codespace but are
/// part of the normal protocol, not failures (see [`StatusCategory`]).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The operation succeeded.
    #[error("ok")]
    Ok,
    /// An argument was out of range or null.
    #[error("invalid argument")]
    InvalidArgument,
    /// The requested state transition is not a legal edge.
    #[error("invalid transition")]
    InvalidTransition,
    /// The entity is in a state that does not admit this operation.
    #[error("invalid state")]
    InvalidState,
    /// The handle names a slot that has since been reused.
    #[error("stale handle")]
    StaleHandle,
    /// The handle does not name any live entity.
    #[error("not found")]
    NotFound,
    /// The region is not open.
    #[error("region not open")]
    RegionNotOpen,
    /// The region has already closed.
    #[error("region closed")]
    RegionClosed,
    /// The region is poisoned and refuses new mutations.
    #[error("region poisoned")]
    RegionPoisoned,
    /// Unresolved obligations block the requested teardown.
    #[error("obligations unresolved")]
    ObligationsUnresolved,
    /// The task has not reached a terminal state.
    #[error("task not completed")]
    TaskNotCompleted,
    /// The operation was cancelled.
    #[error("cancelled")]
    Cancelled,
    /// The peer endpoint is gone.
    #[error("disconnected")]
    Disconnected,
    /// The operation cannot make progress without blocking.
    #[error("would block")]
    WouldBlock,
    /// The operation has not completed yet; poll again.
    #[error("pending")]
    Pending,
    /// A fixed-capacity arena or pool is full.
    #[error("resource exhausted")]
    ResourceExhausted,
    /// The allocator has been sealed; no further allocation is permitted.
    #[error("allocator sealed")]
    AllocatorSealed,
    /// The poll quota of the active budget reached zero.
    #[error("poll budget exhausted")]
    PollBudgetExhausted,
    /// The cost quota of the active budget was insufficient.
    #[error("cost budget exceeded")]
    CostBudgetExceeded,
    /// The region still has live work.
    #[error("quiescence not reached")]
    QuiescenceNotReached,
    /// The endpoint no longer admits new work.
    #[error("admission closed")]
    AdmissionClosed,
    /// A determinism contract was violated (hook validation, replay setup).
    #[error("determinism violation")]
    DeterminismViolation,
    /// The provided buffer is too small for the encoded payload.
    #[error("buffer too small")]
    BufferTooSmall,
    /// The live trace diverged from the replay reference.
    #[error("replay mismatch")]
    ReplayMismatch,
    /// The requested timer deadline exceeds the wheel horizon.
    #[error("timer duration exceeded")]
    TimerDurationExceeded,
    /// The channel is at capacity.
    #[error("channel full")]
    ChannelFull,
}

/// Partition of the status codespace used by diagnostics and recovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCategory {
    /// `Ok` only.
    Success,
    /// Argument and state-machine validation failures; never recovered.
    Validation,
    /// Handle identity failures; never recovered.
    Identity,
    /// Capacity and budget failures; containment policy may react.
    Capacity,
    /// Lifecycle-gate failures.
    Lifecycle,
    /// Cooperative signals that are part of the normal protocol.
    Cooperative,
    /// Determinism-contract failures.
    Determinism,
}

impl Status {
    /// Returns `false` only for [`Status::Ok`].
    #[must_use]
    pub const fn is_error(self) -> bool {
        !matches!(self, Self::Ok)
    }

    /// Returns the fixed human-readable string for this code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::InvalidArgument => "invalid argument",
            Self::InvalidTransition => "invalid transition",
            Self::InvalidState => "invalid state",
            Self::StaleHandle => "stale handle",
            Self::NotFound => "not found",
            Self::RegionNotOpen => "region not open",
            Self::RegionClosed => "region closed",
            Self::RegionPoisoned => "region poisoned",
            Self::ObligationsUnresolved => "obligations unresolved",
            Self::TaskNotCompleted => "task not completed",
            Self::Cancelled => "cancelled",
            Self::Disconnected => "disconnected",
            Self::WouldBlock => "would block",
            Self::Pending => "pending",
            Self::ResourceExhausted => "resource exhausted",
            Self::AllocatorSealed => "allocator sealed",
            Self::PollBudgetExhausted => "poll budget exhausted",
            Self::CostBudgetExceeded => "cost budget exceeded",
            Self::QuiescenceNotReached => "quiescence not reached",
            Self::AdmissionClosed => "admission closed",
            Self::DeterminismViolation => "determinism violation",
            Self::BufferTooSmall => "buffer too small",
            Self::ReplayMismatch => "replay mismatch",
            Self::TimerDurationExceeded => "timer duration exceeded",
            Self::ChannelFull => "channel full",
        }
    }

    /// Returns the codespace partition this status belongs to.
    #[must_use]
    pub const fn category(self) -> StatusCategory {
        match self {
            Self::Ok => StatusCategory::Success,
            Self::InvalidArgument | Self::InvalidTransition | Self::InvalidState => {
                StatusCategory::Validation
            }
            Self::NotFound | Self::StaleHandle => StatusCategory::Identity,
            Self::ResourceExhausted
            | Self::AllocatorSealed
            | Self::PollBudgetExhausted
            | Self::CostBudgetExceeded
            | Self::AdmissionClosed
            | Self::BufferTooSmall
            | Self::TimerDurationExceeded
            | Self::ChannelFull => StatusCategory::Capacity,
            Self::RegionNotOpen
            | Self::RegionClosed
            | Self::RegionPoisoned
            | Self::ObligationsUnresolved
            | Self::TaskNotCompleted
            | Self::QuiescenceNotReached => StatusCategory::Lifecycle,
            Self::Cancelled | Self::Disconnected | Self::WouldBlock | Self::Pending => {
                StatusCategory::Cooperative
            }
            Self::DeterminismViolation | Self::ReplayMismatch => StatusCategory::Determinism,
        }
    }

    /// Every defined status code, in declaration order.
    ///
    /// The codespace is closed; this table is the authority for
    /// totality tests over `is_error` and `as_str`.
    pub const ALL: [Self; 26] = [
        Self::Ok,
        Self::InvalidArgument,
        Self::InvalidTransition,
        Self::InvalidState,
        Self::StaleHandle,
        Self::NotFound,
        Self::RegionNotOpen,
        Self::RegionClosed,
        Self::RegionPoisoned,
        Self::ObligationsUnresolved,
        Self::TaskNotCompleted,
        Self::Cancelled,
        Self::Disconnected,
        Self::WouldBlock,
        Self::Pending,
        Self::ResourceExhausted,
        Self::AllocatorSealed,
        Self::PollBudgetExhausted,
        Self::CostBudgetExceeded,
        Self::QuiescenceNotReached,
        Self::AdmissionClosed,
        Self::DeterminismViolation,
        Self::BufferTooSmall,
        Self::ReplayMismatch,
        Self::TimerDurationExceeded,
        Self::ChannelFull,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_ok_is_success() {
        for status in Status::ALL {
            assert_eq!(status.is_error(), status != Status::Ok, "{status:?}");
        }
    }

    #[test]
    fn string_table_is_total() {
        for status in Status::ALL {
            let s = status.as_str();
            assert!(!s.is_empty(), "{status:?}");
            assert!(!s.contains("unknown"), "{status:?} -> {s}");
        }
    }

    #[test]
    fn display_matches_string_table() {
        for status in Status::ALL {
            assert_eq!(status.to_string(), status.as_str());
        }
    }

    #[test]
    fn strings_are_distinct() {
        for (i, a) in Status::ALL.iter().enumerate() {
            for b in &Status::ALL[i + 1..] {
                assert_ne!(a.as_str(), b.as_str(), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn cooperative_signals_are_not_success() {
        assert!(Status::Pending.is_error());
        assert!(Status::WouldBlock.is_error());
        assert_eq!(Status::Pending.category(), StatusCategory::Cooperative);
    }

    #[test]
    fn category_covers_every_code() {
        // Exercise the match for each variant; Success only for Ok.
        let successes: Vec<_> = Status::ALL
            .iter()
            .filter(|s| s.category() == StatusCategory::Success)
            .collect();
        assert_eq!(successes, vec![&Status::Ok]);
    }
}
