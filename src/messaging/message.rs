//! Message payloads exchanged between the controller and the page contexts
//!
//! Requests are tagged the same way on every route (`type` + `payload`), so a
//! logged message reads the same whichever side produced it.

use crate::scrape::SessionReport;
use crate::state::ScrapingSession;
use crate::{Item, ScrapeMode, TabId};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Discriminant of every message the bus carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    ExtractPage,
    CheckNextPage,
    ShowModal,
    UpdateProgress,
    HideModal,
    StartScrape,
    StopScrape,
    GetState,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtractPage => "EXTRACT_PAGE",
            Self::CheckNextPage => "CHECK_NEXT_PAGE",
            Self::ShowModal => "SHOW_MODAL",
            Self::UpdateProgress => "UPDATE_PROGRESS",
            Self::HideModal => "HIDE_MODAL",
            Self::StartScrape => "START_SCRAPE",
            Self::StopScrape => "STOP_SCRAPE",
            Self::GetState => "GET_STATE",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload the bus knows how to route and check
pub trait Message: fmt::Debug + Clone + Send + Sync + 'static {
    fn kind(&self) -> MessageKind;

    /// Checks the payload shape before anything is sent
    fn validate(&self) -> Result<(), String>;
}

/// Progress snapshot shown by the overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub current_page: u32,
    pub total_pages: Option<u32>,
    pub items_collected: u64,
}

impl From<&ScrapingSession> for Progress {
    fn from(session: &ScrapingSession) -> Self {
        Self {
            current_page: session.current_page_index,
            total_pages: session.total_pages,
            items_collected: session.items_collected,
        }
    }
}

/// What an extractor reported for the current page
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutcome {
    pub success: bool,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub total_pages: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExtractionOutcome {
    pub fn found(items: Vec<Item>, has_next_page: bool, total_pages: Option<u32>) -> Self {
        Self {
            success: true,
            items,
            has_next_page,
            total_pages,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// A response counts only when it succeeded and carried items
    pub fn is_valid(&self) -> bool {
        self.success && !self.items.is_empty()
    }
}

/// Requests served by a page context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageRequest {
    ExtractPage { site_id: String },
    CheckNextPage { site_id: String },
    ShowModal(Progress),
    UpdateProgress(Progress),
    HideModal,
}

impl Message for PageRequest {
    fn kind(&self) -> MessageKind {
        match self {
            Self::ExtractPage { .. } => MessageKind::ExtractPage,
            Self::CheckNextPage { .. } => MessageKind::CheckNextPage,
            Self::ShowModal(_) => MessageKind::ShowModal,
            Self::UpdateProgress(_) => MessageKind::UpdateProgress,
            Self::HideModal => MessageKind::HideModal,
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            Self::ExtractPage { site_id } | Self::CheckNextPage { site_id } => {
                if site_id.trim().is_empty() {
                    return Err("site_id must not be empty".to_string());
                }
            }
            Self::ShowModal(progress) | Self::UpdateProgress(progress) => {
                if progress.total_pages == Some(0) {
                    return Err("total_pages must be positive when known".to_string());
                }
            }
            Self::HideModal => {}
        }
        Ok(())
    }
}

impl PageRequest {
    /// Whether `response` is the reply this request calls for
    pub fn accepts(&self, response: &PageResponse) -> bool {
        matches!(
            (self, response),
            (Self::ExtractPage { .. }, PageResponse::Extracted(_))
                | (Self::CheckNextPage { .. }, PageResponse::NextPage(_))
                | (
                    Self::ShowModal(_) | Self::UpdateProgress(_) | Self::HideModal,
                    PageResponse::Ack
                )
        )
    }
}

/// Replies produced by a page context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageResponse {
    Extracted(ExtractionOutcome),
    NextPage(bool),
    Ack,
}

/// Parameters of a `START_SCRAPE` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest {
    pub tab_id: TabId,
    pub scraper_id: String,
    pub mode: ScrapeMode,
    pub base_url: String,
}

/// Requests served by the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    StartScrape(ScrapeRequest),
    StopScrape {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
    GetState,
}

impl Message for ControlMessage {
    fn kind(&self) -> MessageKind {
        match self {
            Self::StartScrape(_) => MessageKind::StartScrape,
            Self::StopScrape { .. } => MessageKind::StopScrape,
            Self::GetState => MessageKind::GetState,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if let Self::StartScrape(request) = self {
            if request.scraper_id.trim().is_empty() {
                return Err("scraper_id must not be empty".to_string());
            }
            Url::parse(&request.base_url)
                .map_err(|e| format!("base_url '{}' is not a valid URL: {}", request.base_url, e))?;
        }
        Ok(())
    }
}

/// Replies produced by the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlReply {
    Started,
    Stopping,
    Rejected(String),
    State(ScrapingSession),
}

/// Notifications for whoever watches the control panel
#[derive(Debug, Clone)]
pub enum PanelEvent {
    ScrapeProgress { tab_id: TabId, progress: Progress },
    ScrapeComplete(SessionReport),
}
