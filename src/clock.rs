//! Explicit monotonic clock for polling loops.

use std::time::{Duration, Instant};

/// Monotonic millisecond clock, started explicitly and passed to
/// whatever needs elapsed time. There is no process-global clock state;
/// two loops ticking against different clocks never interfere.
#[derive(Debug, Clone, Copy)]
pub struct TickClock {
    started: Instant,
}

impl TickClock {
    /// Start counting from now.
    #[must_use]
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Whole milliseconds elapsed since [`start`](TickClock::start).
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Elapsed time since [`start`](TickClock::start).
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_clock_is_monotonic() {
        let clock = TickClock::start();
        let first = clock.elapsed();
        thread::sleep(Duration::from_millis(5));
        let second = clock.elapsed();
        assert!(second >= first);
        assert!(clock.elapsed_ms() >= 5);
    }

    #[test]
    fn test_independent_clocks() {
        let older = TickClock::start();
        thread::sleep(Duration::from_millis(5));
        let newer = TickClock::start();
        assert!(older.elapsed() >= newer.elapsed());
    }
}
