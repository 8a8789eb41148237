//! Session record shared by the controller and the page contexts
//!
//! This module defines the scraping session, its lifecycle modes and the
//! partial-update patch used to mutate it.
use crate::TabId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle mode of a scraping session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// No session running
    #[default]
    Idle,

    /// The orchestrator is walking pages
    Scraping,

    /// A stop was requested; the orchestrator ends at its next checkpoint
    Stopping,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scraping => "scraping",
            Self::Stopping => "stopping",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "scraping" => Some(Self::Scraping),
            "stopping" => Some(Self::Stopping),
            _ => None,
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-flight scraping session state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScrapingSession {
    pub is_active: bool,
    pub mode: SessionMode,

    /// Zero-based page counter
    pub current_page_index: u32,

    /// Total page count when the site exposes it; advisory only
    pub total_pages: Option<u32>,

    pub items_collected: u64,

    /// Cooperative cancellation flag, latched until the next reset
    pub should_stop: bool,

    /// Whether the page context should display the progress overlay
    pub modal_visible: bool,

    pub tab_id: Option<TabId>,
    pub scraper_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl ScrapingSession {
    /// The idle record every reset returns to
    pub fn idle() -> Self {
        Self::default()
    }

    /// A freshly started session for the given tab and scraper
    pub fn started(tab_id: TabId, scraper_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            is_active: true,
            mode: SessionMode::Scraping,
            tab_id: Some(tab_id),
            scraper_id: Some(scraper_id.into()),
            started_at: Some(at),
            ..Self::default()
        }
    }

    /// Returns true when this session is running against the given tab
    pub fn is_active_for(&self, tab_id: TabId) -> bool {
        self.is_active && self.tab_id == Some(tab_id)
    }
}

/// Partial update of a [`ScrapingSession`]
///
/// Unset fields are left untouched. Nullable fields use a nested `Option` so
/// that "set to null" can be told apart from "leave alone".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub is_active: Option<bool>,
    pub mode: Option<SessionMode>,
    pub current_page_index: Option<u32>,
    pub total_pages: Option<Option<u32>>,
    pub items_collected: Option<u64>,
    pub should_stop: Option<bool>,
    pub modal_visible: Option<bool>,
    pub tab_id: Option<Option<TabId>>,
    pub scraper_id: Option<Option<String>>,
    pub started_at: Option<Option<DateTime<Utc>>>,
}

impl SessionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(mut self, value: bool) -> Self {
        self.is_active = Some(value);
        self
    }

    pub fn mode(mut self, value: SessionMode) -> Self {
        self.mode = Some(value);
        self
    }

    pub fn page_index(mut self, value: u32) -> Self {
        self.current_page_index = Some(value);
        self
    }

    pub fn total_pages(mut self, value: Option<u32>) -> Self {
        self.total_pages = Some(value);
        self
    }

    pub fn items_collected(mut self, value: u64) -> Self {
        self.items_collected = Some(value);
        self
    }

    pub fn should_stop(mut self, value: bool) -> Self {
        self.should_stop = Some(value);
        self
    }

    pub fn modal_visible(mut self, value: bool) -> Self {
        self.modal_visible = Some(value);
        self
    }

    pub fn tab_id(mut self, value: Option<TabId>) -> Self {
        self.tab_id = Some(value);
        self
    }

    pub fn scraper_id(mut self, value: Option<String>) -> Self {
        self.scraper_id = Some(value);
        self
    }

    pub fn started_at(mut self, value: Option<DateTime<Utc>>) -> Self {
        self.started_at = Some(value);
        self
    }

    /// Names of the fields this patch sets
    pub fn changed_keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.is_active.is_some() {
            keys.push("is_active");
        }
        if self.mode.is_some() {
            keys.push("mode");
        }
        if self.current_page_index.is_some() {
            keys.push("current_page_index");
        }
        if self.total_pages.is_some() {
            keys.push("total_pages");
        }
        if self.items_collected.is_some() {
            keys.push("items_collected");
        }
        if self.should_stop.is_some() {
            keys.push("should_stop");
        }
        if self.modal_visible.is_some() {
            keys.push("modal_visible");
        }
        if self.tab_id.is_some() {
            keys.push("tab_id");
        }
        if self.scraper_id.is_some() {
            keys.push("scraper_id");
        }
        if self.started_at.is_some() {
            keys.push("started_at");
        }
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.changed_keys().is_empty()
    }

    /// Merges this patch over `session` without any invariant checks
    pub(crate) fn apply_to(self, session: &mut ScrapingSession) {
        if let Some(v) = self.is_active {
            session.is_active = v;
        }
        if let Some(v) = self.mode {
            session.mode = v;
        }
        if let Some(v) = self.current_page_index {
            session.current_page_index = v;
        }
        if let Some(v) = self.total_pages {
            session.total_pages = v;
        }
        if let Some(v) = self.items_collected {
            session.items_collected = v;
        }
        if let Some(v) = self.should_stop {
            session.should_stop = v;
        }
        if let Some(v) = self.modal_visible {
            session.modal_visible = v;
        }
        if let Some(v) = self.tab_id {
            session.tab_id = v;
        }
        if let Some(v) = self.scraper_id {
            session.scraper_id = v;
        }
        if let Some(v) = self.started_at {
            session.started_at = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_roundtrip() {
        for mode in [SessionMode::Idle, SessionMode::Scraping, SessionMode::Stopping] {
            assert_eq!(SessionMode::from_str_opt(mode.as_str()), Some(mode));
        }
        assert_eq!(SessionMode::from_str_opt("paused"), None);
    }

    #[test]
    fn test_idle_defaults() {
        let idle = ScrapingSession::idle();
        assert!(!idle.is_active);
        assert_eq!(idle.mode, SessionMode::Idle);
        assert_eq!(idle.current_page_index, 0);
        assert_eq!(idle.total_pages, None);
        assert!(!idle.should_stop);
        assert_eq!(idle.tab_id, None);
    }

    #[test]
    fn test_started_session() {
        let session = ScrapingSession::started(TabId(4), "products", Utc::now());
        assert!(session.is_active_for(TabId(4)));
        assert!(!session.is_active_for(TabId(5)));
        assert_eq!(session.mode, SessionMode::Scraping);
        assert_eq!(session.scraper_id.as_deref(), Some("products"));
    }

    #[test]
    fn test_patch_changed_keys() {
        let patch = SessionPatch::new().page_index(2).total_pages(None);
        assert_eq!(patch.changed_keys(), vec!["current_page_index", "total_pages"]);
        assert!(SessionPatch::new().is_empty());
    }

    #[test]
    fn test_patch_sets_nullable_field_to_none() {
        let mut session = ScrapingSession::idle();
        session.total_pages = Some(9);

        SessionPatch::new().total_pages(None).apply_to(&mut session);
        assert_eq!(session.total_pages, None);

        SessionPatch::new().items_collected(3).apply_to(&mut session);
        assert_eq!(session.items_collected, 3);
        assert_eq!(session.total_pages, None);
    }
}
