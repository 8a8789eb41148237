use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Listing-Harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default, rename = "scraper")]
    pub scrapers: Vec<ScraperConfig>,
}

impl Config {
    /// Looks up a scraper definition by its id
    pub fn scraper(&self, id: &str) -> Option<&ScraperConfig> {
        self.scrapers.iter().find(|s| s.id == id)
    }
}

/// Pacing and retry settings of the scraping loop
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Minimum wall-clock time spent on every page (milliseconds)
    #[serde(rename = "dwell-ms")]
    pub dwell_ms: u64,

    /// Extraction attempts per page before the page is skipped
    #[serde(rename = "max-extract-attempts")]
    pub max_extract_attempts: u32,

    /// Fixed pause between two extraction attempts (milliseconds)
    #[serde(rename = "extract-retry-delay-ms")]
    pub extract_retry_delay_ms: u64,

    /// Round-trip budget of a single extraction request (milliseconds)
    #[serde(rename = "extract-timeout-ms")]
    pub extract_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            dwell_ms: 3000,
            max_extract_attempts: 3,
            extract_retry_delay_ms: 1000,
            extract_timeout_ms: 10_000,
        }
    }
}

impl OrchestratorConfig {
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }

    pub fn extract_retry_delay(&self) -> Duration {
        Duration::from_millis(self.extract_retry_delay_ms)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_millis(self.extract_timeout_ms)
    }
}

/// Tab navigation settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    #[serde(rename = "page-load-timeout-ms")]
    pub page_load_timeout_ms: u64,

    /// Extra wait after the tab reports "complete" (milliseconds)
    #[serde(rename = "settle-delay-ms")]
    pub settle_delay_ms: u64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            page_load_timeout_ms: 10_000,
            settle_delay_ms: 1000,
        }
    }
}

impl NavigationConfig {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_millis(self.page_load_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Default policy of the message bus
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    #[serde(rename = "exponential-backoff")]
    pub exponential_backoff: bool,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            max_attempts: 1,
            retry_delay_ms: 500,
            exponential_backoff: true,
        }
    }
}

/// HTTP settings of the tab host
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    #[serde(rename = "request-timeout-ms")]
    pub request_timeout_ms: u64,

    #[serde(rename = "https-only")]
    pub https_only: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("listing-harvester/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_ms: 30_000,
            https_only: false,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path to the SQLite database holding saved results
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "harvest.db".to_string(),
        }
    }
}

/// Per-site scraper definition
#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
    /// Stable identifier (e.g., "domeme-products")
    pub id: String,

    /// Display name stored with results
    pub name: String,

    /// Domain pattern (e.g., "example.com" or "*.example.com")
    pub domain: String,

    /// Query parameter carrying the page number
    #[serde(rename = "page-param", default = "default_page_param")]
    pub page_param: String,

    /// Value of the page parameter on the first page
    #[serde(rename = "first-page", default)]
    pub first_page: u32,

    /// Selector matching one element per listed item
    #[serde(rename = "item-selector")]
    pub item_selector: String,

    /// Field whose value becomes the item id
    #[serde(rename = "id-field")]
    pub id_field: String,

    /// Selector that exists only when a further page is available
    #[serde(rename = "next-page-selector")]
    pub next_page_selector: Option<String>,

    /// Selector whose text holds the total page count
    #[serde(rename = "total-pages-selector")]
    pub total_pages_selector: Option<String>,

    #[serde(default, rename = "field")]
    pub fields: Vec<FieldConfig>,
}

fn default_page_param() -> String {
    "page".to_string()
}

/// One extracted field of an item
#[derive(Debug, Clone, Deserialize)]
pub struct FieldConfig {
    pub name: String,

    /// Selector relative to the item element
    pub selector: String,

    /// Attribute to read instead of the text content
    pub attribute: Option<String>,
}
