//! Monotonic session clock
//!
//! The controller never reads time itself: every operation receives `now` as
//! milliseconds on this clock. Values are signed so `started_at = now - position`
//! stays representable right after the session starts.

use tokio::time::Instant;

/// Milliseconds since the session clock's origin
pub type ClockTime = i64;

/// Monotonic millisecond clock anchored at session start
///
/// Backed by `tokio::time::Instant`, so paused test runtimes control it.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    origin: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Current time on the session clock
    pub fn now(&self) -> ClockTime {
        Instant::now().duration_since(self.origin).as_millis() as ClockTime
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn follows_paused_tokio_time() {
        let clock = SessionClock::new();
        assert_eq!(clock.now(), 0);

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(clock.now(), 1500);
    }
}
