//! Append-only trace ring with a running digest and a binary codec.
//!
//! Every state-affecting kernel operation emits exactly one trace event.
//! The ring is bounded; the count is monotone and the digest folds every
//! emission in order, so overwritten entries still shape the digest. The
//! binary format is little-endian: a 24-byte header followed by 24-byte
//! records.

use crate::status::Status;
use crate::util::RunDigest;

/// Capacity of the trace ring.
pub const TRACE_RING_CAPACITY: usize = 4096;

/// Magic bytes of the binary export ("tXSA" little-endian).
pub const TRACE_MAGIC: u32 = 0x4153_5874;

/// Current binary format version.
pub const TRACE_FORMAT_VERSION: u32 = 1;

/// Size of the binary header and of each record, in bytes.
pub const TRACE_HEADER_LEN: usize = 24;
const TRACE_RECORD_LEN: usize = 24;

/// The kind of a trace event. Codes are part of the binary format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TraceKind {
    /// A region was opened.
    RegionOpen = 1,
    /// A region moved to Closing.
    RegionClose = 2,
    /// A region drain began.
    RegionDrain = 3,
    /// A region moved to Finalizing.
    RegionFinalize = 4,
    /// A region reached Closed.
    RegionClosed = 5,
    /// A region was poisoned.
    RegionPoison = 6,

    /// A task was spawned.
    TaskSpawn = 16,
    /// A cancel reason was recorded or strengthened.
    TaskCancel = 17,
    /// A task observed cancellation at a checkpoint.
    TaskCheckpoint = 18,
    /// A task declared its finalization epoch.
    TaskFinalize = 19,

    /// An obligation was reserved.
    ObligationReserve = 32,
    /// An obligation was committed.
    ObligationCommit = 33,
    /// An obligation was aborted.
    ObligationAbort = 34,
    /// An obligation was marked leaked.
    ObligationLeak = 35,

    /// A channel was opened.
    ChannelOpen = 48,
    /// A send slot was reserved.
    ChannelReserve = 49,
    /// A reserved send was committed.
    ChannelCommit = 50,
    /// A reserved send was aborted.
    ChannelAbort = 51,
    /// A message was received.
    ChannelRecv = 52,
    /// A channel was closed.
    ChannelClose = 53,

    /// A timer was created.
    TimerCreate = 64,
    /// A timer was armed.
    TimerArm = 65,
    /// A timer fired.
    TimerFire = 66,
    /// A timer was cancelled.
    TimerCancel = 67,

    /// The scheduler polled a task.
    SchedPoll = 80,
    /// The scheduler completed a task.
    SchedComplete = 81,
    /// The scheduler stopped on budget exhaustion.
    SchedBudget = 82,
    /// The scheduler observed quiescence.
    SchedQuiescent = 83,
    /// The scheduler force-completed a cancelled task.
    SchedCancelForced = 84,

    /// A clock was read (nondeterminism boundary).
    NdClock = 96,
    /// An entropy source was read (nondeterminism boundary).
    NdEntropy = 97,
    /// The reactor reported readiness (nondeterminism boundary).
    NdReactor = 98,
    /// A signal arrived (nondeterminism boundary).
    NdSignal = 99,
    /// A scheduler tie-break was observed (nondeterminism boundary).
    NdTieBreak = 100,
    /// Timer expiries coalesced (nondeterminism boundary).
    NdTimerCoalesce = 101,
}

impl TraceKind {
    /// Returns the stable wire code of this kind.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Decodes a wire code.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => Self::RegionOpen,
            2 => Self::RegionClose,
            3 => Self::RegionDrain,
            4 => Self::RegionFinalize,
            5 => Self::RegionClosed,
            6 => Self::RegionPoison,
            16 => Self::TaskSpawn,
            17 => Self::TaskCancel,
            18 => Self::TaskCheckpoint,
            19 => Self::TaskFinalize,
            32 => Self::ObligationReserve,
            33 => Self::ObligationCommit,
            34 => Self::ObligationAbort,
            35 => Self::ObligationLeak,
            48 => Self::ChannelOpen,
            49 => Self::ChannelReserve,
            50 => Self::ChannelCommit,
            51 => Self::ChannelAbort,
            52 => Self::ChannelRecv,
            53 => Self::ChannelClose,
            64 => Self::TimerCreate,
            65 => Self::TimerArm,
            66 => Self::TimerFire,
            67 => Self::TimerCancel,
            80 => Self::SchedPoll,
            81 => Self::SchedComplete,
            82 => Self::SchedBudget,
            83 => Self::SchedQuiescent,
            84 => Self::SchedCancelForced,
            96 => Self::NdClock,
            97 => Self::NdEntropy,
            98 => Self::NdReactor,
            99 => Self::NdSignal,
            100 => Self::NdTieBreak,
            101 => Self::NdTimerCoalesce,
            _ => return None,
        })
    }
}

/// One trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEvent {
    /// Monotone sequence number across the run.
    pub sequence: u64,
    /// What happened.
    pub kind: TraceKind,
    /// Packed handle bits of the entity acted upon, or 0.
    pub entity: u64,
    /// Kind-specific auxiliary word.
    pub aux: u32,
}

impl TraceEvent {
    fn fold_into(&self, digest: &mut RunDigest) {
        digest.fold_u64(u64::from(self.kind.code()));
        digest.fold_u64(self.entity);
        digest.fold_u64(u64::from(self.aux));
        digest.fold_u64(self.sequence);
    }
}

/// Folds a slice of events into a fresh digest.
#[must_use]
pub fn digest_events(events: &[TraceEvent]) -> u64 {
    let mut digest = RunDigest::new();
    for event in events {
        event.fold_into(&mut digest);
    }
    digest.value()
}

/// The append-only, digested trace ring.
#[derive(Debug)]
pub struct TraceRing {
    entries: Vec<TraceEvent>,
    head: usize,
    count: u64,
    digest: RunDigest,
}

impl TraceRing {
    /// Creates an empty ring.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(TRACE_RING_CAPACITY),
            head: 0,
            count: 0,
            digest: RunDigest::new(),
        }
    }

    /// Emits one event, returning its sequence number.
    pub fn emit(&mut self, kind: TraceKind, entity: u64, aux: u32) -> u64 {
        let sequence = self.count;
        self.count += 1;
        let event = TraceEvent {
            sequence,
            kind,
            entity,
            aux,
        };
        event.fold_into(&mut self.digest);
        if self.entries.len() < TRACE_RING_CAPACITY {
            self.entries.push(event);
        } else {
            self.entries[self.head] = event;
            self.head = (self.head + 1) % TRACE_RING_CAPACITY;
        }
        sequence
    }

    /// Sequence number the next emission will receive.
    #[must_use]
    pub const fn next_sequence(&self) -> u64 {
        self.count
    }

    /// Total events ever emitted (monotone, not bounded by capacity).
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Number of events currently readable (capped at capacity).
    #[must_use]
    pub fn readable_count(&self) -> usize {
        self.entries.len()
    }

    /// Returns the `i`-th readable event, oldest first.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<TraceEvent> {
        if i >= self.entries.len() {
            return None;
        }
        let idx = if self.overflowed() {
            (self.head + i) % TRACE_RING_CAPACITY
        } else {
            i
        };
        Some(self.entries[idx])
    }

    /// Whether entries have been overwritten.
    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.count as usize > TRACE_RING_CAPACITY
    }

    /// Digest over the entire emission history.
    #[must_use]
    pub const fn digest(&self) -> u64 {
        self.digest.value()
    }

    /// Clears the ring, its count, and its digest.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.head = 0;
        self.count = 0;
        self.digest = RunDigest::new();
    }

    /// Copies the readable window, oldest first.
    #[must_use]
    pub fn readable_events(&self) -> Vec<TraceEvent> {
        (0..self.readable_count()).filter_map(|i| self.get(i)).collect()
    }

    /// Encodes the readable window as `header || records`.
    ///
    /// The header digest is computed over the exported records so the
    /// artifact validates standalone.
    #[must_use]
    pub fn export_binary(&self) -> Vec<u8> {
        let events = self.readable_events();
        let mut out = Vec::with_capacity(TRACE_HEADER_LEN + events.len() * TRACE_RECORD_LEN);
        out.extend_from_slice(&TRACE_MAGIC.to_le_bytes());
        out.extend_from_slice(&TRACE_FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(events.len() as u64).to_le_bytes());
        out.extend_from_slice(&digest_events(&events).to_le_bytes());
        for event in &events {
            out.extend_from_slice(&event.sequence.to_le_bytes());
            out.extend_from_slice(&event.kind.code().to_le_bytes());
            out.extend_from_slice(&event.entity.to_le_bytes());
            out.extend_from_slice(&event.aux.to_le_bytes());
        }
        out
    }

    /// Compares the live trace against an imported artifact.
    ///
    /// Returns [`Status::ReplayMismatch`] if the in-memory trace does not
    /// begin with the imported event sequence.
    pub fn continuity_check(&self, buf: &[u8]) -> Result<(), Status> {
        let imported = import_binary(buf)?;
        let live = self.readable_events();
        if live.len() < imported.len() {
            return Err(Status::ReplayMismatch);
        }
        for (a, b) in imported.iter().zip(live.iter()) {
            if a != b {
                return Err(Status::ReplayMismatch);
            }
        }
        Ok(())
    }
}

impl Default for TraceRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes and validates a binary trace artifact.
pub fn import_binary(buf: &[u8]) -> Result<Vec<TraceEvent>, Status> {
    if buf.len() < TRACE_HEADER_LEN {
        return Err(Status::BufferTooSmall);
    }
    let magic = u32::from_le_bytes(buf[0..4].try_into().expect("4 bytes"));
    let version = u32::from_le_bytes(buf[4..8].try_into().expect("4 bytes"));
    if magic != TRACE_MAGIC || version != TRACE_FORMAT_VERSION {
        return Err(Status::InvalidArgument);
    }
    let count = u64::from_le_bytes(buf[8..16].try_into().expect("8 bytes"));
    let stored_digest = u64::from_le_bytes(buf[16..24].try_into().expect("8 bytes"));
    if count as usize > TRACE_RING_CAPACITY {
        return Err(Status::InvalidArgument);
    }
    let body_len = (count as usize) * TRACE_RECORD_LEN;
    if buf.len() < TRACE_HEADER_LEN + body_len {
        return Err(Status::BufferTooSmall);
    }
    if buf.len() > TRACE_HEADER_LEN + body_len {
        return Err(Status::InvalidArgument);
    }
    let mut events = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let at = TRACE_HEADER_LEN + i * TRACE_RECORD_LEN;
        let sequence = u64::from_le_bytes(buf[at..at + 8].try_into().expect("8 bytes"));
        let code = u32::from_le_bytes(buf[at + 8..at + 12].try_into().expect("4 bytes"));
        let entity = u64::from_le_bytes(buf[at + 12..at + 20].try_into().expect("8 bytes"));
        let aux = u32::from_le_bytes(buf[at + 20..at + 24].try_into().expect("4 bytes"));
        let kind = TraceKind::from_code(code).ok_or(Status::InvalidArgument)?;
        events.push(TraceEvent {
            sequence,
            kind,
            entity,
            aux,
        });
    }
    if digest_events(&events) != stored_digest {
        return Err(Status::InvalidArgument);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ring() -> TraceRing {
        let mut ring = TraceRing::new();
        ring.emit(TraceKind::RegionOpen, 10, 0);
        ring.emit(TraceKind::TaskSpawn, 20, 0);
        ring.emit(TraceKind::SchedPoll, 20, 0);
        ring.emit(TraceKind::SchedComplete, 20, 1);
        ring
    }

    #[test]
    fn sequences_are_monotone_from_zero() {
        let mut ring = TraceRing::new();
        assert_eq!(ring.emit(TraceKind::RegionOpen, 1, 0), 0);
        assert_eq!(ring.emit(TraceKind::RegionClose, 1, 0), 1);
        assert_eq!(ring.next_sequence(), 2);
        assert_eq!(ring.count(), 2);
    }

    #[test]
    fn digest_is_deterministic_and_order_sensitive() {
        let a = sample_ring();
        let b = sample_ring();
        assert_eq!(a.digest(), b.digest());

        let mut c = TraceRing::new();
        c.emit(TraceKind::TaskSpawn, 20, 0);
        c.emit(TraceKind::RegionOpen, 10, 0);
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn count_is_monotone_past_capacity() {
        let mut ring = TraceRing::new();
        let total = TRACE_RING_CAPACITY as u64 + 7;
        for i in 0..total {
            ring.emit(TraceKind::SchedPoll, i, 0);
        }
        assert!(ring.overflowed());
        assert_eq!(ring.count(), total);
        assert_eq!(ring.readable_count(), TRACE_RING_CAPACITY);
        assert_eq!(ring.get(0).expect("event").sequence, 7);
    }

    #[test]
    fn overwritten_entries_still_shape_digest() {
        let mut full = TraceRing::new();
        for i in 0..=TRACE_RING_CAPACITY as u64 {
            full.emit(TraceKind::SchedPoll, i, 0);
        }
        // A ring that only ever saw the surviving window has a different
        // digest even though its readable contents match.
        let window = full.readable_events();
        assert_ne!(full.digest(), digest_events(&window));
    }

    #[test]
    fn export_import_round_trip() {
        let ring = sample_ring();
        let blob = ring.export_binary();
        assert_eq!(blob.len(), TRACE_HEADER_LEN + 4 * 24);
        let events = import_binary(&blob).expect("import");
        assert_eq!(events, ring.readable_events());
    }

    #[test]
    fn import_rejects_bad_magic_and_version() {
        let mut blob = sample_ring().export_binary();
        blob[0] ^= 0xff;
        assert_eq!(import_binary(&blob), Err(Status::InvalidArgument));

        let mut blob = sample_ring().export_binary();
        blob[4] = 0x7f;
        assert_eq!(import_binary(&blob), Err(Status::InvalidArgument));
    }

    #[test]
    fn import_rejects_short_and_oversized_buffers() {
        let blob = sample_ring().export_binary();
        assert_eq!(import_binary(&blob[..10]), Err(Status::BufferTooSmall));
        assert_eq!(
            import_binary(&blob[..blob.len() - 1]),
            Err(Status::BufferTooSmall)
        );
        let mut padded = blob.clone();
        padded.push(0);
        assert_eq!(import_binary(&padded), Err(Status::InvalidArgument));
    }

    #[test]
    fn import_rejects_corrupted_records() {
        let mut blob = sample_ring().export_binary();
        // Flip a byte inside the first record's entity field.
        blob[TRACE_HEADER_LEN + 12] ^= 0x01;
        assert_eq!(import_binary(&blob), Err(Status::InvalidArgument));
    }

    #[test]
    fn import_rejects_unknown_kind() {
        let mut ring = TraceRing::new();
        ring.emit(TraceKind::RegionOpen, 1, 0);
        let mut blob = ring.export_binary();
        // Overwrite the kind code with an undefined value.
        blob[TRACE_HEADER_LEN + 8..TRACE_HEADER_LEN + 12]
            .copy_from_slice(&999u32.to_le_bytes());
        assert_eq!(import_binary(&blob), Err(Status::InvalidArgument));
    }

    #[test]
    fn continuity_accepts_prefix_and_rejects_divergence() {
        let ring = sample_ring();
        let blob = ring.export_binary();
        assert_eq!(ring.continuity_check(&blob), Ok(()));

        // The live ring may have continued past the artifact.
        let mut longer = sample_ring();
        longer.emit(TraceKind::SchedQuiescent, 0, 0);
        assert_eq!(longer.continuity_check(&blob), Ok(()));

        // A diverging run is rejected.
        let mut other = TraceRing::new();
        other.emit(TraceKind::RegionOpen, 10, 0);
        other.emit(TraceKind::TaskSpawn, 99, 0);
        other.emit(TraceKind::SchedPoll, 99, 0);
        other.emit(TraceKind::SchedComplete, 99, 1);
        assert_eq!(other.continuity_check(&blob), Err(Status::ReplayMismatch));

        // A shorter live trace cannot contain the artifact.
        let mut short = TraceRing::new();
        short.emit(TraceKind::RegionOpen, 10, 0);
        assert_eq!(short.continuity_check(&blob), Err(Status::ReplayMismatch));
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut ring = sample_ring();
        ring.reset();
        assert_eq!(ring.count(), 0);
        assert_eq!(ring.readable_count(), 0);
        assert_eq!(ring.digest(), TraceRing::new().digest());
    }

    #[test]
    fn kind_codes_round_trip() {
        for code in 0..128 {
            if let Some(kind) = TraceKind::from_code(code) {
                assert_eq!(kind.code(), code);
            }
        }
        assert_eq!(TraceKind::from_code(0), None);
        assert_eq!(TraceKind::from_code(7), None);
    }
}
