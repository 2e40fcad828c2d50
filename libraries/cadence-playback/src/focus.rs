//! Audio focus arbitration
//!
//! Two halves:
//! - [`FocusArbiter`] talks to the host asynchronously (request, one bounded
//!   retry on a delayed answer, abandon)
//! - [`FocusLedger`] is the controller's synchronous view of what it asked
//!   for and what it holds, so requests stay idempotent and late answers can
//!   be recognised as stale

use cadence_core::{FocusHost, FocusResponse};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Final answer of a focus acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusGrant {
    Granted,
    Denied,
    /// Host asked to retry later
    DelayedRetry,
}

impl From<FocusResponse> for FocusGrant {
    fn from(response: FocusResponse) -> Self {
        match response {
            FocusResponse::Granted => Self::Granted,
            FocusResponse::Denied => Self::Denied,
            FocusResponse::Delayed => Self::DelayedRetry,
        }
    }
}

/// Asynchronous side of focus handling
#[derive(Clone)]
pub struct FocusArbiter {
    host: Arc<dyn FocusHost>,
    retry_delay: Duration,
}

impl FocusArbiter {
    pub fn new(host: Arc<dyn FocusHost>, retry_delay: Duration) -> Self {
        Self { host, retry_delay }
    }

    /// Ask the host once
    ///
    /// A host error counts as a denial.
    pub async fn acquire(&self) -> FocusGrant {
        match self.host.request().await {
            Ok(response) => response.into(),
            Err(e) => {
                warn!("Focus request failed: {}", e);
                FocusGrant::Denied
            }
        }
    }

    /// Ask the host, re-requesting once after a delayed answer
    ///
    /// Never returns `DelayedRetry`: a second delay falls back to `Denied`.
    pub async fn acquire_with_retry(&self) -> FocusGrant {
        match self.acquire().await {
            FocusGrant::DelayedRetry => {
                debug!("Focus delayed, retrying in {:?}", self.retry_delay);
                tokio::time::sleep(self.retry_delay).await;
                match self.acquire().await {
                    FocusGrant::Granted => FocusGrant::Granted,
                    FocusGrant::Denied | FocusGrant::DelayedRetry => FocusGrant::Denied,
                }
            }
            grant => grant,
        }
    }

    /// Give focus back to the host
    pub async fn release(&self) {
        if let Err(e) = self.host.abandon().await {
            warn!("Focus abandon failed: {}", e);
        }
    }
}

impl std::fmt::Debug for FocusArbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusArbiter")
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

/// How the controller should treat an acquisition result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    /// Focus is now held
    Held,

    /// Host refused; playback must pause
    Refused,

    /// Answer to a superseded request; `granted` means the host believes we
    /// hold focus and it must be handed back
    Stale { granted: bool },
}

/// Controller-side focus bookkeeping
#[derive(Debug, Clone, Default)]
pub struct FocusLedger {
    held: bool,
    pending: Option<u64>,
    epoch: u64,
    ducked: bool,
    paused_by_loss: bool,
}

impl FocusLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_ducked(&self) -> bool {
        self.ducked
    }

    pub fn paused_by_loss(&self) -> bool {
        self.paused_by_loss
    }

    /// Start an acquisition unless focus is held or already requested
    ///
    /// Returns the epoch the request must carry.
    pub fn request(&mut self) -> Option<u64> {
        if self.held || self.pending.is_some() {
            return None;
        }
        self.epoch += 1;
        self.pending = Some(self.epoch);
        Some(self.epoch)
    }

    /// Record the result of the request tagged `epoch`
    pub fn resolve(&mut self, epoch: u64, grant: FocusGrant) -> GrantOutcome {
        if self.pending != Some(epoch) {
            return GrantOutcome::Stale {
                granted: grant == FocusGrant::Granted,
            };
        }
        self.pending = None;

        if grant == FocusGrant::Granted {
            self.held = true;
            GrantOutcome::Held
        } else {
            GrantOutcome::Refused
        }
    }

    /// Drop focus and any in-flight request
    ///
    /// Returns whether the host must be told.
    pub fn release(&mut self) -> bool {
        let notify = self.held;
        if self.held || self.pending.is_some() {
            self.epoch += 1;
        }
        self.held = false;
        self.pending = None;
        self.ducked = false;
        notify
    }

    /// Host took focus away
    pub fn lost(&mut self, paused_playback: bool) {
        self.held = false;
        self.ducked = false;
        self.paused_by_loss = paused_playback;
    }

    /// Returns whether the duck level changed
    pub fn set_ducked(&mut self, ducked: bool) -> bool {
        let changed = self.ducked != ducked;
        self.ducked = ducked;
        changed
    }

    /// Host gave focus back; returns whether playback should resume
    pub fn regained(&mut self) -> bool {
        self.held = true;
        self.ducked = false;
        std::mem::take(&mut self.paused_by_loss)
    }

    /// Forget a focus-caused pause (the user took over)
    pub fn clear_paused_by_loss(&mut self) {
        self.paused_by_loss = false;
    }
}
