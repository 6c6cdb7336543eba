//! Monotonic millisecond time source for the supervisor

use std::time::Instant;

/// Millisecond tick source
///
/// Values must never go backwards. Zero is a legal reading; "never happened"
/// is expressed with `Option`, not with a zero timestamp.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Clock backed by `Instant`, counting from construction
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
