//! In-process fakes for driving the orchestrator in tests

use crate::browser::{BrowserError, TabDriver, TabInfo, TabStatus, TabUpdate};
use crate::config::{parse_config, Config};
use crate::messaging::{
    ExtractionOutcome, MessageBus, MessagingError, PageRequest, PageResponse, PanelEvent,
    TabTransport,
};
use crate::scrape::Orchestrator;
use crate::state::StateStore;
use crate::storage::{
    NewScrapeResult, ResultStore, ResultSummary, ScrapeResultRecord, StorageError, StorageResult,
};
use crate::url::Pagination;
use crate::{Item, TabId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

pub(crate) const START_URL: &str = "https://site.example/list?pagenum=5";

pub(crate) const ITEMS_PER_PAGE: usize = 5;

const CONFIG: &str = r#"
[[scraper]]
id = "products"
name = "Product list"
domain = "site.example"
page-param = "pagenum"
item-selector = ".item"
id-field = "id"

[[scraper.field]]
name = "id"
selector = ".id"
"#;

pub(crate) fn test_config() -> Config {
    parse_config(CONFIG).unwrap()
}

/// A paginated site of `pages` pages with five items each
///
/// Tab 1 starts out on [`START_URL`]. Loads complete immediately.
pub(crate) struct FakeSite {
    pages: u32,
    pagination: Pagination,
    updates: broadcast::Sender<TabUpdate>,
    current: Mutex<HashMap<TabId, String>>,
    navigations: Mutex<Vec<String>>,
    extract_calls: Mutex<Vec<u32>>,
    probes: Mutex<u32>,
    hidden: Mutex<u32>,
    overlay: Mutex<Vec<&'static str>>,
    failing: Mutex<HashSet<u32>>,
    close_after: Mutex<Option<u32>>,
    stop_after: Mutex<Option<(u32, StateStore)>>,
}

impl FakeSite {
    pub(crate) fn new(pages: u32) -> Arc<Self> {
        let (updates, _) = broadcast::channel(64);
        let mut current = HashMap::new();
        current.insert(TabId(1), START_URL.to_string());
        Arc::new(Self {
            pages,
            pagination: Pagination::new("pagenum", 0),
            updates,
            current: Mutex::new(current),
            navigations: Mutex::new(Vec::new()),
            extract_calls: Mutex::new(Vec::new()),
            probes: Mutex::new(0),
            hidden: Mutex::new(0),
            overlay: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            close_after: Mutex::new(None),
            stop_after: Mutex::new(None),
        })
    }

    /// Every extraction of `page` answers with a failure
    pub(crate) fn fail_page(&self, page: u32) {
        self.failing.lock().unwrap().insert(page);
    }

    /// The tab disappears once `page` has been extracted
    pub(crate) fn close_after(&self, page: u32) {
        *self.close_after.lock().unwrap() = Some(page);
    }

    /// A stop is requested while `page` is being extracted
    pub(crate) fn stop_after(&self, page: u32, state: &StateStore) {
        *self.stop_after.lock().unwrap() = Some((page, state.clone()));
    }

    pub(crate) fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub(crate) fn extract_calls(&self) -> Vec<u32> {
        self.extract_calls.lock().unwrap().clone()
    }

    pub(crate) fn probes(&self) -> u32 {
        *self.probes.lock().unwrap()
    }

    pub(crate) fn hidden(&self) -> u32 {
        *self.hidden.lock().unwrap()
    }

    /// Overlay requests in arrival order: "show", "update" or "hide"
    pub(crate) fn overlay(&self) -> Vec<&'static str> {
        self.overlay.lock().unwrap().clone()
    }

    fn page_of(&self, tab_id: TabId) -> Result<u32, MessagingError> {
        let current = self.current.lock().unwrap();
        let url = current.get(&tab_id).ok_or(MessagingError::NoSuchTab(tab_id))?;
        Ok(self.pagination.page_index(url).unwrap_or(0))
    }

    fn has_next(&self, page: u32) -> bool {
        page + 1 < self.pages
    }

    async fn extract(&self, tab_id: TabId) -> Result<PageResponse, MessagingError> {
        let page = self.page_of(tab_id)?;
        self.extract_calls.lock().unwrap().push(page);

        let outcome = if self.failing.lock().unwrap().contains(&page) {
            ExtractionOutcome::failed("no items on page")
        } else {
            let items = (0..ITEMS_PER_PAGE)
                .map(|i| Item::new(format!("p{}-{}", page, i)))
                .collect();
            ExtractionOutcome::found(items, self.has_next(page), Some(self.pages))
        };

        let stop = self.stop_after.lock().unwrap().clone();
        if let Some((stop_page, state)) = stop {
            if stop_page == page {
                state.stop_scraping().await.unwrap();
            }
        }
        if *self.close_after.lock().unwrap() == Some(page) {
            self.current.lock().unwrap().remove(&tab_id);
        }

        Ok(PageResponse::Extracted(outcome))
    }
}

#[async_trait]
impl TabDriver for FakeSite {
    async fn update_url(&self, tab_id: TabId, url: &str) -> Result<(), BrowserError> {
        {
            let mut current = self.current.lock().unwrap();
            let slot = current.get_mut(&tab_id).ok_or(BrowserError::NoSuchTab(tab_id))?;
            *slot = url.to_string();
        }
        self.navigations.lock().unwrap().push(url.to_string());

        for status in [TabStatus::Loading, TabStatus::Complete] {
            let _ = self.updates.send(TabUpdate {
                tab_id,
                status,
                url: url.to_string(),
            });
        }
        Ok(())
    }

    fn subscribe_updates(&self) -> broadcast::Receiver<TabUpdate> {
        self.updates.subscribe()
    }

    async fn tab_info(&self, tab_id: TabId) -> Result<TabInfo, BrowserError> {
        let current = self.current.lock().unwrap();
        let url = current.get(&tab_id).ok_or(BrowserError::NoSuchTab(tab_id))?;
        Ok(TabInfo {
            url: url.clone(),
            title: Some("Listing".to_string()),
            favicon: None,
        })
    }
}

#[async_trait]
impl TabTransport for FakeSite {
    async fn deliver_to_tab(
        &self,
        tab_id: TabId,
        request: PageRequest,
    ) -> Result<PageResponse, MessagingError> {
        match request {
            PageRequest::ExtractPage { .. } => self.extract(tab_id).await,
            PageRequest::CheckNextPage { .. } => {
                *self.probes.lock().unwrap() += 1;
                let page = self.page_of(tab_id)?;
                Ok(PageResponse::NextPage(self.has_next(page)))
            }
            PageRequest::HideModal => {
                self.page_of(tab_id)?;
                *self.hidden.lock().unwrap() += 1;
                self.overlay.lock().unwrap().push("hide");
                Ok(PageResponse::Ack)
            }
            PageRequest::ShowModal(_) => {
                self.page_of(tab_id)?;
                self.overlay.lock().unwrap().push("show");
                Ok(PageResponse::Ack)
            }
            PageRequest::UpdateProgress(_) => {
                self.page_of(tab_id)?;
                self.overlay.lock().unwrap().push("update");
                Ok(PageResponse::Ack)
            }
        }
    }
}

/// Result store keeping everything in memory
#[derive(Default)]
pub(crate) struct RecordingStore {
    saved: Mutex<Vec<NewScrapeResult>>,
}

impl RecordingStore {
    pub(crate) fn saved(&self) -> Vec<NewScrapeResult> {
        self.saved.lock().unwrap().clone()
    }
}

impl ResultStore for RecordingStore {
    fn save(&self, result: &NewScrapeResult) -> StorageResult<String> {
        let mut saved = self.saved.lock().unwrap();
        saved.push(result.clone());
        Ok(format!("result-{}", saved.len()))
    }

    fn get(&self, id: &str) -> StorageResult<ScrapeResultRecord> {
        Err(StorageError::NotFound(id.to_string()))
    }

    fn list(&self) -> StorageResult<Vec<ResultSummary>> {
        Ok(Vec::new())
    }
}

/// Wires an orchestrator against `site`, sharing `state`
pub(crate) fn orchestrator(
    site: &Arc<FakeSite>,
    state: &StateStore,
) -> (Orchestrator, Arc<RecordingStore>, broadcast::Receiver<PanelEvent>) {
    let (panel, events) = broadcast::channel(256);
    let bus = MessageBus::builder().tabs(site.clone()).panel(panel).build();
    let store = Arc::new(RecordingStore::default());
    let orchestrator = Orchestrator::new(
        site.clone(),
        bus,
        state.clone(),
        store.clone(),
        Arc::new(test_config()),
    );
    (orchestrator, store, events)
}
