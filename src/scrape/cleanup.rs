//! End-of-session cleanup shared by every terminal path
//!
//! The overlay is taken down first, then results are saved by the caller,
//! then [`Cleanup::finish`] resets the session. Each step tolerates failure
//! of the previous one; running the sequence twice leaves the same state as
//! running it once.

use crate::messaging::{MessageBus, PageRequest, PanelEvent};
use crate::scrape::SessionReport;
use crate::state::StateStore;
use crate::TabId;

pub struct Cleanup<'a> {
    bus: &'a MessageBus,
    state: &'a StateStore,
    tab_id: TabId,
}

impl<'a> Cleanup<'a> {
    pub fn new(bus: &'a MessageBus, state: &'a StateStore, tab_id: TabId) -> Self {
        Self { bus, state, tab_id }
    }

    /// Asks the page context to take the overlay down
    ///
    /// A tab or page context that no longer exists is fine.
    pub async fn hide_overlay(&self) {
        let options = self.bus.default_options().without_retry().silent();
        if let Err(e) = self
            .bus
            .send_to_tab(self.tab_id, PageRequest::HideModal, &options)
            .await
        {
            tracing::debug!("[tab {}] Overlay not hidden: {}", self.tab_id, e);
        }
    }

    /// Clears the overlay flag, resets the session and tells the panel
    pub async fn finish(&self, report: SessionReport) {
        if let Err(e) = self.state.hide_modal().await {
            tracing::warn!("Failed to clear overlay flag: {}", e);
        }
        if let Err(e) = self.state.reset().await {
            tracing::error!("Failed to reset scraping state: {}", e);
        }
        self.bus.notify_panel(PanelEvent::ScrapeComplete(report));
    }
}
