//! Per-site extraction running inside a page context
//!
//! An extractor only ever sees the document currently loaded in its tab; page
//! advancement belongs to the orchestrator.

use crate::config::{Config, ScraperConfig};
use crate::Item;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// The document an extractor works on
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub url: String,
    pub html: String,
}

/// Items and pagination hints found on one page
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractedPage {
    pub items: Vec<Item>,
    pub has_next_page: bool,
    pub total_pages: Option<u32>,
}

/// Errors raised while building or running an extractor
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Invalid selector '{selector}' for {site_id}")]
    Selector { site_id: String, selector: String },

    #[error("Extractor failed: {0}")]
    Failed(String),
}

/// Site-specific extraction logic
pub trait Extractor: Send + Sync {
    fn site_id(&self) -> &str;

    /// Extracts the items of the current page
    fn extract(&self, page: &PageSnapshot) -> Result<ExtractedPage, ExtractError>;

    /// Whether the current page links to a further one
    fn has_next_page(&self, page: &PageSnapshot) -> bool;
}

struct CompiledField {
    name: String,
    selector: Selector,
    attribute: Option<String>,
}

/// Extractor driven by the CSS selectors of a scraper definition
pub struct SelectorExtractor {
    site_id: String,
    item: Selector,
    id_field: String,
    fields: Vec<CompiledField>,
    next_page: Option<Selector>,
    total_pages: Option<Selector>,
}

impl SelectorExtractor {
    /// Compiles the selectors of `scraper`
    ///
    /// # Returns
    ///
    /// * `Ok(SelectorExtractor)` - Every selector parsed
    /// * `Err(ExtractError::Selector)` - The first selector that did not
    pub fn from_config(scraper: &ScraperConfig) -> Result<Self, ExtractError> {
        let compile = |selector: &str| {
            Selector::parse(selector).map_err(|_| ExtractError::Selector {
                site_id: scraper.id.clone(),
                selector: selector.to_string(),
            })
        };

        let fields = scraper
            .fields
            .iter()
            .map(|field| {
                Ok(CompiledField {
                    name: field.name.clone(),
                    selector: compile(&field.selector)?,
                    attribute: field.attribute.clone(),
                })
            })
            .collect::<Result<Vec<_>, ExtractError>>()?;

        Ok(Self {
            site_id: scraper.id.clone(),
            item: compile(&scraper.item_selector)?,
            id_field: scraper.id_field.clone(),
            fields,
            next_page: scraper.next_page_selector.as_deref().map(&compile).transpose()?,
            total_pages: scraper
                .total_pages_selector
                .as_deref()
                .map(&compile)
                .transpose()?,
        })
    }

    fn extract_item(&self, element: ElementRef<'_>) -> Option<Item> {
        let mut fields = BTreeMap::new();
        for field in &self.fields {
            let Some(target) = element.select(&field.selector).next() else {
                continue;
            };
            let value = match &field.attribute {
                Some(attribute) => target.value().attr(attribute).map(|v| v.trim().to_string()),
                None => Some(collapse_whitespace(target.text())),
            };
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                fields.insert(field.name.clone(), value);
            }
        }

        let id = fields.get(&self.id_field)?.clone();
        Some(Item { id, fields })
    }

    fn next_page_in(&self, document: &Html) -> bool {
        self.next_page
            .as_ref()
            .is_some_and(|selector| document.select(selector).next().is_some())
    }

    fn total_pages_in(&self, document: &Html) -> Option<u32> {
        let selector = self.total_pages.as_ref()?;
        let text = collapse_whitespace(document.select(selector).next()?.text());
        // "Page 1 of 12" and "12" both mean twelve pages
        text.split(|c: char| !c.is_ascii_digit())
            .filter(|part| !part.is_empty())
            .last()
            .and_then(|digits| digits.parse::<u32>().ok())
            .filter(|total| *total > 0)
    }
}

impl Extractor for SelectorExtractor {
    fn site_id(&self) -> &str {
        &self.site_id
    }

    fn extract(&self, page: &PageSnapshot) -> Result<ExtractedPage, ExtractError> {
        let document = Html::parse_document(&page.html);

        let mut items = Vec::new();
        let mut skipped = 0usize;
        for element in document.select(&self.item) {
            match self.extract_item(element) {
                Some(item) => items.push(item),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::debug!(
                "{}: skipped {} element(s) without '{}'",
                self.site_id,
                skipped,
                self.id_field
            );
        }

        Ok(ExtractedPage {
            items,
            has_next_page: self.next_page_in(&document),
            total_pages: self.total_pages_in(&document),
        })
    }

    fn has_next_page(&self, page: &PageSnapshot) -> bool {
        self.next_page_in(&Html::parse_document(&page.html))
    }
}

fn collapse_whitespace<'a>(text: impl Iterator<Item = &'a str>) -> String {
    text.flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extractors available to the page contexts, keyed by site id
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a selector extractor for every configured scraper
    pub fn from_config(config: &Config) -> Result<Self, ExtractError> {
        let mut registry = Self::new();
        for scraper in &config.scrapers {
            registry.register(Arc::new(SelectorExtractor::from_config(scraper)?));
        }
        Ok(registry)
    }

    /// Adds an extractor, replacing any previous one for the same site
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        self.extractors
            .insert(extractor.site_id().to_string(), extractor);
    }

    pub fn get(&self, site_id: &str) -> Option<Arc<dyn Extractor>> {
        self.extractors.get(site_id).cloned()
    }

    pub fn site_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.extractors.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
