//! Monotonic millisecond ticks and TAI64N wall-clock timestamps

use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tai64::{Tai64, Tai64N};

/// Length of an encoded TAI64N timestamp
pub const TAI64N_LEN: usize = 12;

/// TAI64 label of the Unix epoch: 2^62 plus the 10 s TAI-UTC offset of 1970
pub const TAI64_UNIX_EPOCH_LABEL: u64 = 0x4000_0000_0000_000a;

/// Milliseconds from `since` to `now` on the wrapping 32-bit tick counter
pub fn elapsed_ms(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

/// Whether tick `later` is at or after tick `earlier`, across wraparound
pub fn is_not_before(later: u32, earlier: u32) -> bool {
    elapsed_ms(later, earlier) <= u32::MAX / 2
}

/// 32-bit millisecond counter anchored at its first use
#[derive(Debug, Default)]
pub struct MonotonicClock {
    origin: OnceLock<Instant>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchor the counter now; returns false if it was already anchored
    pub fn start(&self) -> bool {
        self.origin.set(Instant::now()).is_ok()
    }

    pub fn now_ms(&self) -> u32 {
        let origin = self.origin.get_or_init(Instant::now);
        ticks(origin.elapsed())
    }
}

// Truncation to u32 is the wraparound (~49.7 days).
fn ticks(elapsed: Duration) -> u32 {
    elapsed.as_millis() as u32
}

/// TAI64N timestamps that never go backwards
///
/// If the wall clock steps back, the last issued timestamp is repeated
/// until real time catches up. An unsynchronized clock still yields a
/// well-formed value near the 1970 epoch.
#[derive(Debug, Default)]
pub struct Tai64nClock {
    last: Mutex<[u8; TAI64N_LEN]>,
}

impl Tai64nClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> [u8; TAI64N_LEN] {
        self.stamp(SystemTime::now())
    }

    /// Encode `wall`, clamped to the latest value already handed out
    pub fn stamp(&self, wall: SystemTime) -> [u8; TAI64N_LEN] {
        let fresh = encode_tai64n(wall);
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // big-endian seconds then nanos, so byte order is time order
        if fresh > *last {
            *last = fresh;
        }
        *last
    }
}

/// Encode `wall` with the fixed 1970 offset; pre-epoch times clamp to the epoch
fn encode_tai64n(wall: SystemTime) -> [u8; TAI64N_LEN] {
    let since_epoch = wall.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
    Tai64N(
        Tai64(TAI64_UNIX_EPOCH_LABEL + since_epoch.as_secs()),
        since_epoch.subsec_nanos(),
    )
    .to_bytes()
}

/// Split an encoded TAI64N value into (label seconds, nanoseconds)
pub fn decode_tai64n(bytes: &[u8; TAI64N_LEN]) -> (u64, u32) {
    let mut secs = [0u8; 8];
    let mut nanos = [0u8; 4];
    secs.copy_from_slice(&bytes[..8]);
    nanos.copy_from_slice(&bytes[8..]);
    (u64::from_be_bytes(secs), u32::from_be_bytes(nanos))
}
