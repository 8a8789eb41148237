//! Storage module for persisting scraping results
//!
//! This module handles the durable side of a session:
//! - SQLite database initialization and schema management
//! - Saving the items accumulated by a session
//! - Reading saved results back for the results view

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteResultStore;
pub use traits::{
    NewScrapeResult, ResultStore, ResultSummary, ScrapeResultRecord, StorageError, StorageResult,
};

use std::path::Path;

/// Initializes or opens a result database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteResultStore)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteResultStore> {
    SqliteResultStore::new(path)
}
