//! Minimum dwell time per page

use std::time::Duration;
use tokio::time::Instant;

/// Guarantees that a page visit lasts at least `target`
///
/// Waiting without a prior `start` returns immediately.
#[derive(Debug, Clone)]
pub struct DelayTimer {
    target: Duration,
    started: Option<Instant>,
}

impl DelayTimer {
    pub fn new(target: Duration) -> Self {
        Self {
            target,
            started: None,
        }
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    pub fn restart(&mut self) {
        self.start();
    }

    /// Time since the last start, zero if never started
    pub fn elapsed(&self) -> Duration {
        self.started.map(|t| t.elapsed()).unwrap_or_default()
    }

    pub fn remaining(&self) -> Duration {
        match self.started {
            Some(started) => self.target.saturating_sub(started.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Sleeps for whatever is left of the target duration
    pub async fn wait_remaining(&self) {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            tracing::debug!("Dwelling {:?} before leaving the page", remaining);
            tokio::time::sleep(remaining).await;
        }
    }
}
