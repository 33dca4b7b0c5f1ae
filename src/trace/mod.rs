//! Trace infrastructure: event history, replay verification, snapshots.
//!
//! - [`ring`]: the digested trace ring and its binary codec
//! - [`replay`]: reference store and divergence classification
//! - [`snapshot`]: canonical JSON state snapshots

pub mod replay;
pub mod ring;
pub mod snapshot;

pub use replay::{ReplayReport, ReplayResult, ReplayState};
pub use ring::{
    TRACE_FORMAT_VERSION, TRACE_HEADER_LEN, TRACE_MAGIC, TRACE_RING_CAPACITY, TraceEvent,
    TraceKind, TraceRing, digest_events, import_binary,
};
pub use snapshot::{SnapshotBuilder, snapshot_digest};
