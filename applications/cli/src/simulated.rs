//! Simulated platform collaborators
//!
//! There is no audio output in the headless host: the renderer only logs
//! what it was asked to do and reports a load as ready after a short delay.
//! Track completion comes from the session's own clock.

use async_trait::async_trait;
use cadence_core::{FocusHost, FocusResponse, Renderer, Track};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

/// Renderer that logs every call instead of producing sound
#[derive(Debug)]
pub struct SimulatedRenderer {
    load_delay: Duration,
    ducked: AtomicBool,
}

impl SimulatedRenderer {
    pub fn new(load_delay: Duration) -> Self {
        Self {
            load_delay,
            ducked: AtomicBool::new(false),
        }
    }

    pub fn is_ducked(&self) -> bool {
        self.ducked.load(Ordering::Relaxed)
    }
}

impl Default for SimulatedRenderer {
    fn default() -> Self {
        Self::new(Duration::from_millis(150))
    }
}

#[async_trait]
impl Renderer for SimulatedRenderer {
    async fn load(&self, track: &Track) -> cadence_core::Result<()> {
        info!("[renderer] load {} ({})", track.id, track.source_ref);
        tokio::time::sleep(self.load_delay).await;
        Ok(())
    }

    async fn start(&self) -> cadence_core::Result<()> {
        info!("[renderer] start");
        Ok(())
    }

    async fn pause(&self) -> cadence_core::Result<()> {
        info!("[renderer] pause");
        Ok(())
    }

    async fn stop(&self) -> cadence_core::Result<()> {
        info!("[renderer] stop");
        Ok(())
    }

    async fn seek(&self, position: Duration) -> cadence_core::Result<()> {
        info!("[renderer] seek {}ms", position.as_millis());
        Ok(())
    }

    fn set_ducked(&self, ducked: bool) {
        info!("[renderer] ducked = {}", ducked);
        self.ducked.store(ducked, Ordering::Relaxed);
    }
}

/// Focus host for a machine with no competing audio
#[derive(Debug, Default)]
pub struct GrantingFocusHost;

#[async_trait]
impl FocusHost for GrantingFocusHost {
    async fn request(&self) -> cadence_core::Result<FocusResponse> {
        Ok(FocusResponse::Granted)
    }

    async fn abandon(&self) -> cadence_core::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::TrackId;

    #[tokio::test(start_paused = true)]
    async fn load_waits_for_the_configured_delay() {
        let renderer = SimulatedRenderer::new(Duration::from_millis(300));
        let track = Track::new(TrackId::new("a"), "Intro", 1000);

        let started = tokio::time::Instant::now();
        renderer.load(&track).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn duck_state_is_tracked() {
        let renderer = SimulatedRenderer::default();
        renderer.set_ducked(true);
        assert!(renderer.is_ducked());
        renderer.set_ducked(false);
        assert!(!renderer.is_ducked());
    }

    #[tokio::test]
    async fn focus_is_always_granted() {
        let host = GrantingFocusHost;
        assert_eq!(host.request().await.unwrap(), FocusResponse::Granted);
    }
}
