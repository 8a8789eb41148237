//! URL handling module for Listing-Harvester
//!
//! Page-number rewriting for paginated listings and matching of page URLs
//! against the configured scraper domains.

mod matcher;
mod pagination;

pub use matcher::{find_scrapers_for_url, matches_wildcard, scraper_by_id};
pub use pagination::Pagination;

use crate::config::ScraperConfig;

impl From<&ScraperConfig> for Pagination {
    fn from(scraper: &ScraperConfig) -> Self {
        Pagination::new(scraper.page_param.clone(), scraper.first_page)
    }
}
