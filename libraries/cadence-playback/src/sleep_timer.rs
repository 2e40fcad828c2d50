//! Sleep timer countdown
//!
//! The timer only knows its deadline. It never looks at playback state; when
//! it fires, the session issues the action through the regular command path
//! and an illegal action becomes a logged no-op there.

use crate::clock::ClockTime;
use crate::types::SleepAction;
use serde::{Deserialize, Serialize};

/// Sleep timer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SleepTimer {
    #[default]
    Inactive,

    /// Fires once `now >= deadline`
    Armed {
        deadline: ClockTime,
        action: SleepAction,
    },
}

impl SleepTimer {
    pub fn is_armed(&self) -> bool {
        matches!(self, Self::Armed { .. })
    }
}

/// Outcome of a sleep tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepTick {
    /// Tick from a replaced or cancelled countdown
    Stale,

    /// Deadline not reached yet
    Pending { remaining_ms: u64 },

    /// Deadline reached; the timer is now inactive
    Fire(SleepAction),
}

/// Sleep timer plus the epoch of its ticker
#[derive(Debug, Clone, Default)]
pub struct SleepCountdown {
    timer: SleepTimer,
    epoch: u64,
}

impl SleepCountdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timer(&self) -> SleepTimer {
        self.timer
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Arm (or re-arm) the timer
    ///
    /// Replaces any previous deadline. Returns the epoch the new ticker must
    /// carry.
    pub fn arm(&mut self, now: ClockTime, duration_ms: u64, action: SleepAction) -> u64 {
        self.epoch += 1;
        self.timer = SleepTimer::Armed {
            deadline: now.saturating_add(ClockTime::try_from(duration_ms).unwrap_or(ClockTime::MAX)),
            action,
        };
        self.epoch
    }

    /// Disarm the timer
    ///
    /// Returns whether it was armed. Cancelling an inactive timer is a no-op.
    pub fn cancel(&mut self) -> bool {
        if !self.timer.is_armed() {
            return false;
        }
        self.epoch += 1;
        self.timer = SleepTimer::Inactive;
        true
    }

    /// Milliseconds left before the timer fires
    pub fn remaining_ms(&self, now: ClockTime) -> Option<u64> {
        match self.timer {
            SleepTimer::Inactive => None,
            SleepTimer::Armed { deadline, .. } => Some(deadline.saturating_sub(now).max(0) as u64),
        }
    }

    /// Compare `now` against the deadline
    pub fn tick(&mut self, epoch: u64, now: ClockTime) -> SleepTick {
        if epoch != self.epoch {
            return SleepTick::Stale;
        }

        match self.timer {
            SleepTimer::Inactive => SleepTick::Stale,
            SleepTimer::Armed { deadline, action } if now >= deadline => {
                self.epoch += 1;
                self.timer = SleepTimer::Inactive;
                SleepTick::Fire(action)
            }
            SleepTimer::Armed { deadline, .. } => SleepTick::Pending {
                remaining_ms: deadline.saturating_sub(now) as u64,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_duration_fires_on_first_tick() {
        let mut countdown = SleepCountdown::new();
        let epoch = countdown.arm(1_000, 0, SleepAction::Pause);
        assert_eq!(countdown.tick(epoch, 1_000), SleepTick::Fire(SleepAction::Pause));
        assert_eq!(countdown.timer(), SleepTimer::Inactive);
    }

    #[test]
    fn huge_duration_saturates_instead_of_wrapping() {
        let mut countdown = SleepCountdown::new();
        let epoch = countdown.arm(1_000, u64::MAX, SleepAction::Pause);

        assert_eq!(
            countdown.timer(),
            SleepTimer::Armed {
                deadline: ClockTime::MAX,
                action: SleepAction::Pause
            }
        );
        assert!(matches!(
            countdown.tick(epoch, 1_000),
            SleepTick::Pending { .. }
        ));
        assert!(countdown.timer().is_armed());
    }

    #[test]
    fn pending_until_deadline() {
        let mut countdown = SleepCountdown::new();
        let epoch = countdown.arm(0, 5_000, SleepAction::Stop);

        assert_eq!(
            countdown.tick(epoch, 2_000),
            SleepTick::Pending { remaining_ms: 3_000 }
        );
        assert_eq!(countdown.remaining_ms(2_000), Some(3_000));
        assert_eq!(countdown.tick(epoch, 6_000), SleepTick::Fire(SleepAction::Stop));

        // Fires exactly once
        assert_eq!(countdown.tick(epoch, 7_000), SleepTick::Stale);
    }

    #[test]
    fn rearming_replaces_deadline_and_invalidates_old_ticker() {
        let mut countdown = SleepCountdown::new();
        let first = countdown.arm(0, 1_000, SleepAction::Pause);
        let second = countdown.arm(0, 60_000, SleepAction::StopAndExit);

        assert_eq!(countdown.tick(first, 2_000), SleepTick::Stale);
        assert_eq!(
            countdown.timer(),
            SleepTimer::Armed {
                deadline: 60_000,
                action: SleepAction::StopAndExit
            }
        );
        assert!(matches!(countdown.tick(second, 2_000), SleepTick::Pending { .. }));
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut countdown = SleepCountdown::new();
        assert!(!countdown.cancel());

        let epoch = countdown.arm(0, 1_000, SleepAction::Pause);
        assert!(countdown.cancel());
        assert!(!countdown.cancel());
        assert_eq!(countdown.tick(epoch, 5_000), SleepTick::Stale);
        assert_eq!(countdown.remaining_ms(5_000), None);
    }
}
