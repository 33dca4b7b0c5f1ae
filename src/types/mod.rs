//! Core semantic types for the kernel.
//!
//! - [`time`]: logical timestamps
//! - [`budget`]: four-axis execution bounds with meet semantics
//! - [`outcome`]: terminal task outcomes and their severity lattice
//! - [`cancel`]: cancellation kinds, reasons, and cleanup budgets
//! - [`transition`]: lifecycle state machines as data

pub mod budget;
pub mod cancel;
pub mod outcome;
pub mod time;
pub mod transition;

pub use budget::Budget;
pub use cancel::{CancelKind, CancelPhase, CancelReason};
pub use outcome::Outcome;
pub use time::Time;
pub use transition::{
    ObligationState, RegionState, TaskState, obligation_transition, obligation_transition_raw,
    region_transition, region_transition_raw, task_transition, task_transition_raw,
};
