//! Process-wide monotonic clock.
//!
//! Times are reported as a [Duration] since a fixed origin captured on
//! first use, so `Duration::ZERO` can serve as the "never happened"
//! sentinel for receive times.

use std::{
    sync::OnceLock,
    time::{Duration, Instant},
};

static ORIGIN: OnceLock<Instant> = OnceLock::new();

/// Current monotonic time.
pub fn monotonic() -> Duration {
    ORIGIN.get_or_init(Instant::now).elapsed()
}

/// Current monotonic time in nanoseconds, saturating at `u64::MAX`.
pub fn monotonic_nanos() -> u64 {
    u64::try_from(monotonic().as_nanos()).unwrap_or(u64::MAX)
}
