//! Database schema of the result store

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per saved scraping session
CREATE TABLE IF NOT EXISTS scrape_results (
    id TEXT PRIMARY KEY,
    scraper_id TEXT NOT NULL,
    scraper_name TEXT NOT NULL,
    url TEXT NOT NULL,
    page_title TEXT,
    favicon TEXT,
    item_count INTEGER NOT NULL,
    items TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scrape_results_scraper ON scrape_results(scraper_id);
CREATE INDEX IF NOT EXISTS idx_scrape_results_created ON scrape_results(created_at);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
