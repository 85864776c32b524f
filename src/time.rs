//! Millisecond timebase shared between interrupt and main contexts

use core::sync::atomic::{AtomicU32, Ordering};

/// Free-running millisecond counter
///
/// The counter is advanced from a periodic timer interrupt and read from
/// the main loop. Reads are single atomic loads: a multi-byte read that
/// an interrupt could tear mid-way would be a correctness bug.
pub struct MillisClock(AtomicU32);

impl MillisClock {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Advance by one millisecond; to be called from the timer interrupt
    pub fn tick(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of the current time
    pub fn now(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for MillisClock {
    fn default() -> Self {
        Self::new()
    }
}

/// True once `now` has reached `deadline`, correct across counter wraparound
pub fn deadline_passed(now: u32, deadline: u32) -> bool {
    now.wrapping_sub(deadline) as i32 >= 0
}
