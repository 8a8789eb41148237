//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the ResultStore trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    NewScrapeResult, ResultStore, ResultSummary, ScrapeResultRecord, StorageError, StorageResult,
};
use crate::Item;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// SQLite result store
pub struct SqliteResultStore {
    conn: Mutex<Connection>,
}

impl SqliteResultStore {
    /// Creates a new SqliteResultStore instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteResultStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builds a result id: creation time in milliseconds plus a short content hash
fn generate_result_id(result: &NewScrapeResult, created_at: &DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(result.scraper_id.as_bytes());
    hasher.update(result.url.as_bytes());
    hasher.update(created_at.to_rfc3339().as_bytes());
    hasher.update(result.items.len().to_le_bytes());
    for item in &result.items {
        hasher.update(item.id.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());

    format!("{}-{}", created_at.timestamp_millis(), &digest[..8])
}

impl ResultStore for SqliteResultStore {
    fn save(&self, result: &NewScrapeResult) -> StorageResult<String> {
        let now = Utc::now();
        let id = generate_result_id(result, &now);
        let items = serde_json::to_string(&result.items)?;

        self.conn().execute(
            "INSERT INTO scrape_results
             (id, scraper_id, scraper_name, url, page_title, favicon, item_count, items, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                result.scraper_id,
                result.scraper_name,
                result.url,
                result.page_title,
                result.favicon,
                result.items.len() as i64,
                items,
                now.to_rfc3339()
            ],
        )?;

        tracing::debug!("Stored result {} ({} items)", id, result.items.len());
        Ok(id)
    }

    fn get(&self, id: &str) -> StorageResult<ScrapeResultRecord> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, scraper_id, scraper_name, url, page_title, favicon, items, created_at
             FROM scrape_results WHERE id = ?1",
        )?;

        let (record, items_json) = stmt
            .query_row(params![id], |row| {
                Ok((
                    ScrapeResultRecord {
                        id: row.get(0)?,
                        scraper_id: row.get(1)?,
                        scraper_name: row.get(2)?,
                        url: row.get(3)?,
                        page_title: row.get(4)?,
                        favicon: row.get(5)?,
                        items: Vec::new(),
                        created_at: row.get(7)?,
                    },
                    row.get::<_, String>(6)?,
                ))
            })
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StorageError::NotFound(id.to_string()),
                other => StorageError::Sqlite(other),
            })?;

        let items: Vec<Item> = serde_json::from_str(&items_json)?;
        Ok(ScrapeResultRecord { items, ..record })
    }

    fn list(&self) -> StorageResult<Vec<ResultSummary>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, scraper_id, scraper_name, url, page_title, item_count, created_at
             FROM scrape_results ORDER BY created_at DESC, id DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(ResultSummary {
                id: row.get(0)?,
                scraper_id: row.get(1)?,
                scraper_name: row.get(2)?,
                url: row.get(3)?,
                page_title: row.get(4)?,
                item_count: row.get::<_, i64>(5)?.max(0) as u64,
                created_at: row.get(6)?,
            })
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        Ok(summaries)
    }
}
