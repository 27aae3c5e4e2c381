//! Time and scheduling services the core needs from its host kernel.

/// Delays and cooperative yields used by every polling loop in this crate.
///
/// Passing this in instead of calling a timer directly lets the same loops
/// run against a fake clock.
pub trait Delay: Send + Sync {
    /// Busy-waits for at least `us` microseconds.
    fn udelay(&self, us: u32);

    /// Gives other tasks a chance to run.
    fn yield_now(&self) {}

    /// Blocks the current task for at least `ms` milliseconds.
    fn sleep_ms(&self, ms: u32);
}

/// A [`Delay`] that spins for a calibrated number of iterations per microsecond.
/// Useful before a timer is available; it never yields.
pub struct SpinDelay {
    pub loops_per_us: u32,
}

impl Delay for SpinDelay {
    fn udelay(&self, us: u32) {
        for _ in 0..(us as u64 * self.loops_per_us as u64) {
            core::hint::spin_loop();
        }
    }

    fn sleep_ms(&self, ms: u32) {
        for _ in 0..ms {
            self.udelay(1000);
        }
    }
}
