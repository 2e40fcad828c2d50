//! Position tracking while playing
//!
//! Position is always derived as `now - started_at` on the session clock and
//! never accumulated from ticks, so a late or dropped tick cannot drift it.
//! Each ticker run gets a fresh epoch; ticks carrying an older epoch belong to
//! a cancelled ticker and are ignored.

use crate::clock::ClockTime;

/// Outcome of a progress tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Tick from a cancelled ticker
    Stale,

    /// Position inside the track
    Progress {
        position_ms: u64,
        /// Enough playback elapsed since the last checkpoint
        checkpoint_due: bool,
    },

    /// Position reached the track's duration
    Completed,
}

/// Ticker bookkeeping for the current playing span
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    epoch: u64,
    running: bool,
    checkpoint_interval_ms: u64,
    last_checkpoint_ms: u64,
}

impl ProgressTracker {
    pub fn new(checkpoint_interval_ms: u64) -> Self {
        Self {
            epoch: 0,
            running: false,
            checkpoint_interval_ms,
            last_checkpoint_ms: 0,
        }
    }

    /// `started_at` that makes the position read `position_ms` at `now`
    pub fn anchor(now: ClockTime, position_ms: u64) -> ClockTime {
        now.saturating_sub(ClockTime::try_from(position_ms).unwrap_or(ClockTime::MAX))
    }

    /// Position at `now` for a span started at `started_at`
    pub fn position(started_at: ClockTime, now: ClockTime) -> u64 {
        now.saturating_sub(started_at).max(0) as u64
    }

    /// Begin a new ticker run from `position_ms`
    ///
    /// Returns the epoch the new ticker must carry.
    pub fn start(&mut self, position_ms: u64) -> u64 {
        self.epoch += 1;
        self.running = true;
        self.last_checkpoint_ms = position_ms;
        self.epoch
    }

    /// Invalidate the running ticker
    ///
    /// Returns whether a ticker was running.
    pub fn stop(&mut self) -> bool {
        let was_running = self.running;
        if was_running {
            self.epoch += 1;
            self.running = false;
        }
        was_running
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Mark a checkpoint taken at `position_ms`
    pub fn checkpointed(&mut self, position_ms: u64) {
        self.last_checkpoint_ms = position_ms;
    }

    /// Evaluate a tick against the playing span
    pub fn tick(
        &mut self,
        epoch: u64,
        started_at: ClockTime,
        now: ClockTime,
        duration_ms: u64,
    ) -> Tick {
        if !self.running || epoch != self.epoch {
            return Tick::Stale;
        }

        let position_ms = Self::position(started_at, now);
        if position_ms >= duration_ms {
            return Tick::Completed;
        }

        // A seek backwards moves the position below the last checkpoint
        let since = position_ms.abs_diff(self.last_checkpoint_ms);
        let checkpoint_due = self.checkpoint_interval_ms > 0 && since >= self.checkpoint_interval_ms;

        Tick::Progress {
            position_ms,
            checkpoint_due,
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_is_derived_from_anchor() {
        let started_at = ProgressTracker::anchor(5_000, 2_000);
        assert_eq!(started_at, 3_000);
        assert_eq!(ProgressTracker::position(started_at, 5_000), 2_000);
        assert_eq!(ProgressTracker::position(started_at, 6_500), 3_500);
    }

    #[test]
    fn anchor_can_precede_clock_origin() {
        let started_at = ProgressTracker::anchor(100, 60_000);
        assert!(started_at < 0);
        assert_eq!(ProgressTracker::position(started_at, 100), 60_000);
    }

    #[test]
    fn anchor_saturates_for_huge_positions() {
        assert_eq!(ProgressTracker::anchor(1_000, u64::MAX), 1_000 - ClockTime::MAX);
        assert_eq!(ProgressTracker::anchor(-5, u64::MAX), ClockTime::MIN);
    }

    #[test]
    fn tick_reports_position_until_completion() {
        let mut tracker = ProgressTracker::new(10_000);
        let epoch = tracker.start(0);

        assert_eq!(
            tracker.tick(epoch, 0, 1_000, 180_000),
            Tick::Progress {
                position_ms: 1_000,
                checkpoint_due: false
            }
        );
        assert_eq!(tracker.tick(epoch, 0, 180_000, 180_000), Tick::Completed);
    }

    #[test]
    fn stale_epoch_is_ignored() {
        let mut tracker = ProgressTracker::new(10_000);
        let old = tracker.start(0);
        let new = tracker.start(0);
        assert_ne!(old, new);
        assert_eq!(tracker.tick(old, 0, 1_000, 5_000), Tick::Stale);

        tracker.stop();
        assert_eq!(tracker.tick(new, 0, 1_000, 5_000), Tick::Stale);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut tracker = ProgressTracker::default();
        assert!(!tracker.stop());
        tracker.start(0);
        assert!(tracker.stop());
        let epoch = tracker.epoch();
        assert!(!tracker.stop());
        assert_eq!(tracker.epoch(), epoch);
    }

    #[test]
    fn checkpoint_due_after_interval() {
        let mut tracker = ProgressTracker::new(10_000);
        let epoch = tracker.start(0);

        assert!(matches!(
            tracker.tick(epoch, 0, 9_000, 60_000),
            Tick::Progress { checkpoint_due: false, .. }
        ));
        assert!(matches!(
            tracker.tick(epoch, 0, 10_000, 60_000),
            Tick::Progress { checkpoint_due: true, .. }
        ));

        tracker.checkpointed(10_000);
        assert!(matches!(
            tracker.tick(epoch, 0, 11_000, 60_000),
            Tick::Progress { checkpoint_due: false, .. }
        ));
    }

    #[test]
    fn zero_interval_disables_periodic_checkpoints() {
        let mut tracker = ProgressTracker::new(0);
        let epoch = tracker.start(0);
        assert!(matches!(
            tracker.tick(epoch, 0, 50_000, 60_000),
            Tick::Progress { checkpoint_due: false, .. }
        ));
    }
}
