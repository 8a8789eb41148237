//! Result store trait and error types

use crate::Item;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Result not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// What a finished session hands over for saving
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScrapeResult {
    pub scraper_id: String,
    pub scraper_name: String,
    /// URL of the tab when the session ended
    pub url: String,
    pub page_title: Option<String>,
    pub favicon: Option<String>,
    pub items: Vec<Item>,
}

/// A saved result with its items
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeResultRecord {
    pub id: String,
    pub scraper_id: String,
    pub scraper_name: String,
    pub url: String,
    pub page_title: Option<String>,
    pub favicon: Option<String>,
    pub items: Vec<Item>,
    pub created_at: String,
}

/// A saved result without its items, for listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSummary {
    pub id: String,
    pub scraper_id: String,
    pub scraper_name: String,
    pub url: String,
    pub page_title: Option<String>,
    pub item_count: u64,
    pub created_at: String,
}

/// Durable home of scraping results
///
/// The scraping loop only ever calls [`ResultStore::save`], once per session.
/// Implementations must be usable from several tasks at once.
pub trait ResultStore: Send + Sync {
    /// Saves a result and returns its generated id
    fn save(&self, result: &NewScrapeResult) -> StorageResult<String>;

    /// Gets a saved result by id
    fn get(&self, id: &str) -> StorageResult<ScrapeResultRecord>;

    /// Lists saved results, newest first
    fn list(&self) -> StorageResult<Vec<ResultSummary>>;
}
