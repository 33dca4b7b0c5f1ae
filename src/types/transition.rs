//! Lifecycle state machines as data.
//!
//! Every gated mutation in the kernel consults one of the transition
//! tables below rather than dispatching on ad-hoc conditionals. The tables
//! are two-dimensional arrays keyed by state ordinal; the raw entry points
//! accept arbitrary ordinals and report out-of-range inputs as
//! `InvalidArgument`, which keeps the three-valued contract available to
//! embedders probing the tables directly.

use crate::status::Status;
use core::fmt;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionState {
    /// Accepting spawns and reservations.
    Open,
    /// Close requested; no new work admitted.
    Closing,
    /// The scheduler is draining remaining work.
    Draining,
    /// Cleanup work only.
    Finalizing,
    /// Terminal.
    Closed,
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Spawned, never polled.
    Created,
    /// Polled at least once.
    Running,
    /// A cancel reason is recorded; not yet observed by the task.
    CancelRequested,
    /// The task observed cancellation and is draining.
    Cancelling,
    /// The task declared its finalization epoch.
    Finalizing,
    /// Terminal.
    Completed,
}

/// Lifecycle state of an obligation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObligationState {
    /// Reserved and awaiting exactly one resolution.
    Reserved,
    /// Resolved successfully.
    Committed,
    /// Resolved by rollback.
    Aborted,
    /// Never resolved; detected at region drain.
    Leaked,
}

macro_rules! state_common {
    ($ty:ident, $count:literal, [$($variant:ident => $name:literal),+ $(,)?]) => {
        impl $ty {
            /// Number of states in this machine.
            pub const COUNT: usize = $count;

            /// Returns the state ordinal.
            #[must_use]
            pub const fn ordinal(self) -> u8 {
                self as u8
            }

            /// Returns the admission-mask bit for this state.
            #[must_use]
            pub const fn mask_bit(self) -> u16 {
                1 << (self as u16)
            }

            /// Decodes an ordinal.
            #[must_use]
            pub const fn from_ordinal(ordinal: u8) -> Option<Self> {
                if (ordinal as usize) < $count {
                    Some(Self::VARIANTS[ordinal as usize])
                } else {
                    None
                }
            }

            /// All states in ordinal order.
            pub const VARIANTS: [Self; $count] = [$(Self::$variant),+];

            /// Mask admitting every state of this machine.
            pub const FULL_MASK: u16 = (1 << $count) - 1;

            /// Returns the lowercase name of this state.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

state_common!(RegionState, 5, [
    Open => "open",
    Closing => "closing",
    Draining => "draining",
    Finalizing => "finalizing",
    Closed => "closed",
]);

state_common!(TaskState, 6, [
    Created => "created",
    Running => "running",
    CancelRequested => "cancel-requested",
    Cancelling => "cancelling",
    Finalizing => "finalizing",
    Completed => "completed",
]);

state_common!(ObligationState, 4, [
    Reserved => "reserved",
    Committed => "committed",
    Aborted => "aborted",
    Leaked => "leaked",
]);

// Row = from-state ordinal, column = to-state ordinal.
const REGION_EDGES: [[bool; 5]; 5] = {
    let mut t = [[false; 5]; 5];
    t[RegionState::Open as usize][RegionState::Closing as usize] = true;
    t[RegionState::Closing as usize][RegionState::Draining as usize] = true;
    t[RegionState::Closing as usize][RegionState::Finalizing as usize] = true;
    t[RegionState::Draining as usize][RegionState::Finalizing as usize] = true;
    t[RegionState::Finalizing as usize][RegionState::Closed as usize] = true;
    t
};

const TASK_EDGES: [[bool; 6]; 6] = {
    let mut t = [[false; 6]; 6];
    t[TaskState::Created as usize][TaskState::Running as usize] = true;
    t[TaskState::Running as usize][TaskState::Completed as usize] = true;
    t[TaskState::Running as usize][TaskState::CancelRequested as usize] = true;
    t[TaskState::CancelRequested as usize][TaskState::CancelRequested as usize] = true;
    t[TaskState::CancelRequested as usize][TaskState::Cancelling as usize] = true;
    t[TaskState::Cancelling as usize][TaskState::Cancelling as usize] = true;
    t[TaskState::Cancelling as usize][TaskState::Finalizing as usize] = true;
    t[TaskState::Finalizing as usize][TaskState::Finalizing as usize] = true;
    t[TaskState::Finalizing as usize][TaskState::Completed as usize] = true;
    t
};

const OBLIGATION_EDGES: [[bool; 4]; 4] = {
    let mut t = [[false; 4]; 4];
    t[ObligationState::Reserved as usize][ObligationState::Committed as usize] = true;
    t[ObligationState::Reserved as usize][ObligationState::Aborted as usize] = true;
    t[ObligationState::Reserved as usize][ObligationState::Leaked as usize] = true;
    t
};

/// Checks a region edge.
pub fn region_transition(from: RegionState, to: RegionState) -> Result<(), Status> {
    if REGION_EDGES[from as usize][to as usize] {
        Ok(())
    } else {
        Err(Status::InvalidTransition)
    }
}

/// Checks a task edge.
pub fn task_transition(from: TaskState, to: TaskState) -> Result<(), Status> {
    if TASK_EDGES[from as usize][to as usize] {
        Ok(())
    } else {
        Err(Status::InvalidTransition)
    }
}

/// Checks an obligation edge.
pub fn obligation_transition(from: ObligationState, to: ObligationState) -> Result<(), Status> {
    if OBLIGATION_EDGES[from as usize][to as usize] {
        Ok(())
    } else {
        Err(Status::InvalidTransition)
    }
}

/// Three-valued region edge check over raw ordinals.
#[must_use]
pub fn region_transition_raw(from: u8, to: u8) -> Status {
    match (RegionState::from_ordinal(from), RegionState::from_ordinal(to)) {
        (Some(f), Some(t)) => region_transition(f, t).err().unwrap_or(Status::Ok),
        _ => Status::InvalidArgument,
    }
}

/// Three-valued task edge check over raw ordinals.
#[must_use]
pub fn task_transition_raw(from: u8, to: u8) -> Status {
    match (TaskState::from_ordinal(from), TaskState::from_ordinal(to)) {
        (Some(f), Some(t)) => task_transition(f, t).err().unwrap_or(Status::Ok),
        _ => Status::InvalidArgument,
    }
}

/// Three-valued obligation edge check over raw ordinals.
#[must_use]
pub fn obligation_transition_raw(from: u8, to: u8) -> Status {
    match (
        ObligationState::from_ordinal(from),
        ObligationState::from_ordinal(to),
    ) {
        (Some(f), Some(t)) => obligation_transition(f, t).err().unwrap_or(Status::Ok),
        _ => Status::InvalidArgument,
    }
}

impl RegionState {
    /// Only `Open` admits new spawns and reservations.
    #[must_use]
    pub const fn can_spawn(self) -> bool {
        matches!(self, Self::Open)
    }

    /// `Open` admits new work; `Finalizing` still accepts cleanup work.
    #[must_use]
    pub const fn can_accept_work(self) -> bool {
        matches!(self, Self::Open | Self::Finalizing)
    }

    /// Whether teardown has begun but not finished.
    #[must_use]
    pub const fn is_closing(self) -> bool {
        matches!(self, Self::Closing | Self::Draining)
    }

    /// `Closed` is the only terminal, absorbing state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl TaskState {
    /// `Completed` is the only terminal, absorbing state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Whether a cancel reason is in force.
    #[must_use]
    pub const fn in_cancel_phase(self) -> bool {
        matches!(self, Self::CancelRequested | Self::Cancelling | Self::Finalizing)
    }
}

impl ObligationState {
    /// Every state but `Reserved` is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Reserved)
    }
}
