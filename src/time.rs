//! Time base (spec §4.1): a monotonic 64-bit microsecond clock built from a
//! 1 Hz hardware pulse plus a sub-second [`Hpet`] elapsed read.

use crate::platform::Hpet;
use core::sync::atomic::{AtomicU64, Ordering};

/// `now() = seconds * 1_000_000 + elapsed_us()`.
///
/// Monotone non-decreasing and wraparound-free over the product's lifetime
/// (a `u64` count of seconds since boot does not wrap within any plausible
/// device lifetime).
pub struct Clock {
    seconds: AtomicU64,
}

impl Clock {
    pub const fn new() -> Self {
        Self {
            seconds: AtomicU64::new(0),
        }
    }

    /// Called on each 1 Hz hardware pulse, before the timer wheel's own
    /// `tick()` runs (spec §4.2).
    pub fn on_second_pulse(&self) {
        self.seconds.fetch_add(1, Ordering::Relaxed);
    }

    /// Current monotonic time in microseconds since boot.
    pub fn now(&self, hpet: &impl Hpet) -> u64 {
        let seconds = self.seconds.load(Ordering::Relaxed);
        seconds * 1_000_000 + u64::from(hpet.hpet_elapsed())
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
