//! Listing-Harvester: multi-page scraping of paginated listing sites
//!
//! A controller drives a tab page by page while a page context, recreated on
//! every navigation, answers extraction requests. The two sides only talk
//! through the message bus and the shared session state store.

pub mod browser;
pub mod config;
pub mod messaging;
pub mod output;
pub mod scrape;
pub mod state;
pub mod storage;
pub mod url;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Main error type for Listing-Harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("State error: {0}")]
    State(#[from] state::StateError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] messaging::MessagingError),

    #[error("Browser error: {0}")]
    Browser(#[from] browser::BrowserError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Unknown scraper: {0}")]
    UnknownScraper(String),

    #[error("Session rejected: {0}")]
    Rejected(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid selector in scraper '{scraper}': {selector}")]
    InvalidSelector { scraper: String, selector: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("No configured scraper matches {0}")]
    NoScraper(String),
}

/// Result type alias for Listing-Harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Identifier of a browser tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TabId(pub u32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single extracted record
///
/// The field set is defined by the scraper that produced it; `id` is the
/// stable per-item identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub fields: BTreeMap<String, String>,
}

impl Item {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

/// How many pages a session should cover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeMode {
    /// Only the page the tab is currently showing
    Current,
    /// Every page, starting from the first one
    All,
}

impl ScrapeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::All => "all",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "current" => Some(Self::Current),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

impl fmt::Display for ScrapeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Re-export commonly used types
pub use config::Config;
pub use messaging::{ExtractionOutcome, MessageBus};
pub use scrape::{Controller, ControllerHandle, Orchestrator, SessionReport, SessionStatus};
pub use state::{ScrapingSession, SessionMode, StateStore};
