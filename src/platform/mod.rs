//! Platform services supplied to the WireGuard engine
//!
//! The engine calls back into these for randomness, timer ticks, handshake
//! timestamps and the cookie load signal. Calls may arrive from the engine's
//! timer or receive context, so every implementation is `Send + Sync` and
//! none of the operations return errors. Hardware problems are surfaced by
//! [`self_test`] at startup instead.

pub mod clock;
pub mod entropy;
pub mod load;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::PlatformError;

pub use clock::{elapsed_ms, MonotonicClock, Tai64nClock, TAI64N_LEN, TAI64_UNIX_EPOCH_LABEL};
pub use entropy::{EntropySource, OsEntropy};
pub use load::{LoadPolicy, ManualLoad, NeverUnderLoad};

/// Services the protocol engine expects from the device
pub trait Platform: Send + Sync {
    /// One-time setup; repeat calls do nothing
    fn init(&self);

    /// Fill `buf` entirely from the entropy source
    fn random_bytes(&self, buf: &mut [u8]);

    /// Wrapping millisecond tick counter
    fn now_ms(&self) -> u32;

    /// Current wall-clock time as TAI64N
    fn tai64n_now(&self) -> [u8; TAI64N_LEN];

    fn is_under_load(&self) -> bool;
}

/// Platform services backed by the host OS
pub struct HostPlatform {
    entropy: Box<dyn EntropySource>,
    clock: MonotonicClock,
    wall: Tai64nClock,
    load: Box<dyn LoadPolicy>,
}

impl Default for HostPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl HostPlatform {
    /// OS entropy, no load reporting
    pub fn new() -> Self {
        Self {
            entropy: Box::new(OsEntropy),
            clock: MonotonicClock::new(),
            wall: Tai64nClock::new(),
            load: Box::new(NeverUnderLoad),
        }
    }

    pub fn with_entropy(mut self, entropy: impl EntropySource + 'static) -> Self {
        self.entropy = Box::new(entropy);
        self
    }

    pub fn with_load_policy(mut self, policy: impl LoadPolicy + 'static) -> Self {
        self.load = Box::new(policy);
        self
    }
}

impl Platform for HostPlatform {
    fn init(&self) {
        if self.clock.start() {
            tracing::debug!("Platform services initialized");
        }
    }

    fn random_bytes(&self, buf: &mut [u8]) {
        entropy::fill_from_words(buf, || self.entropy.next_word());
    }

    fn now_ms(&self) -> u32 {
        self.clock.now_ms()
    }

    fn tai64n_now(&self) -> [u8; TAI64N_LEN] {
        self.wall.now()
    }

    fn is_under_load(&self) -> bool {
        self.load.is_under_load()
    }
}

/// Pause between the two tick samples of the self-test
const SELF_TEST_WAIT: Duration = Duration::from_millis(5);

/// Allowed distance between a TAI64N stamp and the wall clock in the self-test
const TAI64N_MAX_SKEW_SECS: u64 = 5;

/// What the startup self-test observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfTestReport {
    pub random_sample: [u8; 16],
    pub monotonic_ms: u32,
    pub tai64n: [u8; TAI64N_LEN],
    pub under_load: bool,
}

/// Check that entropy and clocks behave before handing them to the engine
pub fn self_test(platform: &dyn Platform) -> Result<SelfTestReport, PlatformError> {
    platform.init();

    let mut first = [0u8; 16];
    let mut second = [0u8; 16];
    platform.random_bytes(&mut first);
    platform.random_bytes(&mut second);
    if first.iter().all(|&b| b == first[0]) {
        return Err(PlatformError::EntropyConstant);
    }
    if first == second {
        return Err(PlatformError::EntropyRepeated);
    }

    let before = platform.now_ms();
    std::thread::sleep(SELF_TEST_WAIT);
    let after = platform.now_ms();
    if !clock::is_not_before(after, before) {
        return Err(PlatformError::ClockWentBackwards {
            first: before,
            second: after,
        });
    }

    let stamp = platform.tai64n_now();
    let (label, nanos) = clock::decode_tai64n(&stamp);
    if label < (1 << 62) || label >= (1 << 63) {
        return Err(PlatformError::MalformedTimestamp {
            reason: format!("label {:#018x} outside TAI64 range", label),
        });
    }
    if nanos >= 1_000_000_000 {
        return Err(PlatformError::MalformedTimestamp {
            reason: format!("{} nanoseconds", nanos),
        });
    }
    let wall_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    match label.checked_sub(TAI64_UNIX_EPOCH_LABEL) {
        Some(secs) if secs.abs_diff(wall_secs) <= TAI64N_MAX_SKEW_SECS => {}
        _ => {
            return Err(PlatformError::MalformedTimestamp {
                reason: format!(
                    "label {:#018x} is not unix time {} plus the 1970 offset",
                    label, wall_secs
                ),
            });
        }
    }
    if platform.tai64n_now() < stamp {
        return Err(PlatformError::TimestampWentBackwards);
    }

    tracing::info!(
        "Platform self-test passed (tick={} ms, tai64n={})",
        after,
        hex::encode(stamp)
    );

    Ok(SelfTestReport {
        random_sample: first,
        monotonic_ms: after,
        tai64n: stamp,
        under_load: platform.is_under_load(),
    })
}
