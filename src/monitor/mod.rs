//! Observational safety monitors.
//!
//! - [`ghost`]: bounded ring of protocol and linearity violations
//! - [`hindsight`]: bounded ring of nondeterminism-boundary observations

pub mod ghost;
pub mod hindsight;

pub use ghost::{GHOST_RING_CAPACITY, GhostKind, GhostRing, GhostViolation};
pub use hindsight::{
    HINDSIGHT_RING_CAPACITY, HindsightEvent, HindsightKind, HindsightPolicy, HindsightRing,
};
