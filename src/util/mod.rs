//! Internal utilities.
//!
//! Intentionally minimal and dependency-free to keep kernel paths
//! deterministic.

pub mod det_hash;
pub mod det_rng;

pub use det_hash::{RunDigest, digest_bytes};
pub use det_rng::DetRng;
