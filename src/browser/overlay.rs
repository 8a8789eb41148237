//! Progress overlay shown inside a tab while a session runs

use crate::messaging::Progress;
use crate::TabId;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Consumer of progress events
///
/// Every call must be safe when nothing is displayed: hiding a hidden overlay
/// or updating one that was never shown is a no-op.
pub trait ProgressSink: Send + Sync {
    fn show(&self, tab_id: TabId, progress: &Progress);
    fn update(&self, tab_id: TabId, progress: &Progress);
    fn hide(&self, tab_id: TabId);
}

/// Overlay rendered as log lines
#[derive(Debug, Default)]
pub struct TracingProgressSink {
    visible: Mutex<HashSet<TabId>>,
}

impl TracingProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_visible(&self, tab_id: TabId) -> bool {
        self.visible
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&tab_id)
    }
}

fn describe(progress: &Progress) -> String {
    match progress.total_pages {
        Some(total) => format!(
            "page {}/{}, {} items",
            progress.current_page + 1,
            total,
            progress.items_collected
        ),
        None => format!(
            "page {}, {} items",
            progress.current_page + 1,
            progress.items_collected
        ),
    }
}

impl ProgressSink for TracingProgressSink {
    fn show(&self, tab_id: TabId, progress: &Progress) {
        let newly_shown = self
            .visible
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tab_id);
        if newly_shown {
            tracing::info!("[tab {}] Scraping... {}", tab_id, describe(progress));
        }
    }

    fn update(&self, tab_id: TabId, progress: &Progress) {
        if self.is_visible(tab_id) {
            tracing::info!("[tab {}] {}", tab_id, describe(progress));
        }
    }

    fn hide(&self, tab_id: TabId) {
        let was_visible = self
            .visible
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&tab_id);
        if was_visible {
            tracing::debug!("[tab {}] Overlay hidden", tab_id);
        }
    }
}
