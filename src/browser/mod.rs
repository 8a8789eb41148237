//! Browser module: tabs and the page contexts living in them
//!
//! This module models the page side of a scraping session:
//! - HTTP-backed tabs whose navigation the controller drives
//! - One page context per loaded document, answering page requests
//! - Per-site extractors and the progress overlay

mod document;
mod extractor;
mod fetcher;
mod overlay;
mod page_context;
mod tab;

pub use document::{parse_page_meta, PageMeta};
pub use extractor::{
    ExtractError, ExtractedPage, Extractor, ExtractorRegistry, PageSnapshot, SelectorExtractor,
};
pub use fetcher::{build_http_client, fetch_page, FetchResult};
pub use overlay::{ProgressSink, TracingProgressSink};
pub use page_context::{PageContextHandle, PageEnvironment};
pub use tab::{TabDriver, TabHost, TabInfo, TabStatus, TabUpdate};

use crate::TabId;
use thiserror::Error;

/// Errors raised by the tab host
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("No tab with id {0}")]
    NoSuchTab(TabId),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Extractor error: {0}")]
    Extractor(#[from] ExtractError),
}
