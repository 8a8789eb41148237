//! The scraping loop
//!
//! For one tab the orchestrator repeats navigate, extract with retry,
//! accumulate and decide, until the site runs out of pages, a stop is
//! requested or something fatal happens. Every terminal path goes through
//! the same cleanup.
//!
//! # Loop
//!
//! | Step | Action |
//! |------|--------|
//! | entry checkpoint | stop if `should_stop` |
//! | extract | up to `max-extract-attempts` requests, skip the page when all fail |
//! | accumulate | append items, publish progress |
//! | post-extract checkpoint | stop if `should_stop` |
//! | decide | finish on single-page mode or no next page |
//! | dwell | wait out the per-page minimum |
//! | pre-navigate checkpoint | stop if `should_stop` |
//! | advance | next page URL, navigate, restart the dwell timer |

use crate::browser::{TabDriver, TabInfo};
use crate::config::{Config, ScraperConfig};
use crate::messaging::{
    with_retry, ExtractionOutcome, MessageBus, MessageKind, MessagingError, PageRequest,
    PageResponse, PanelEvent, Progress, RetryPolicy, ScrapeRequest, SendOptions,
};
use crate::scrape::{Cleanup, DelayTimer, PageNavigator};
use crate::state::StateStore;
use crate::storage::{NewScrapeResult, ResultStore};
use crate::url::Pagination;
use crate::{HarvestError, Item, ScrapeMode, TabId};
use std::fmt;
use std::sync::Arc;

/// Points in the loop where a requested stop is honoured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Entry,
    PostExtract,
    PreNavigate,
}

impl Checkpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::PostExtract => "post-extract",
            Self::PreNavigate => "pre-navigate",
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// The last page was reached
    Finished,
    /// A stop was requested
    Stopped,
    /// Something fatal happened; carries the error message
    Failed(String),
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Finished => "finished",
            Self::Stopped => "stopped",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(error) => write!(f, "failed: {}", error),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Summary of one finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub tab_id: TabId,
    pub scraper_id: String,
    pub status: SessionStatus,
    pub pages_visited: u32,
    pub items_collected: u64,
    /// Id of the saved result, if one was saved
    pub result_id: Option<String>,
}

/// Per-session bookkeeping; lives only as long as one `run`
struct Run {
    request: ScrapeRequest,
    scraper_name: Option<String>,
    items: Vec<Item>,
    pages_visited: u32,
    pages_skipped: u32,
    total_pages: Option<u32>,
    start_url: String,
    current_url: String,
}

impl Run {
    fn new(request: ScrapeRequest) -> Self {
        let base_url = request.base_url.clone();
        Self {
            request,
            scraper_name: None,
            items: Vec::new(),
            pages_visited: 0,
            pages_skipped: 0,
            total_pages: None,
            start_url: base_url.clone(),
            current_url: base_url,
        }
    }

    fn tab_id(&self) -> TabId {
        self.request.tab_id
    }
}

/// Drives scraping sessions
pub struct Orchestrator {
    driver: Arc<dyn TabDriver>,
    bus: MessageBus,
    state: StateStore,
    results: Arc<dyn ResultStore>,
    config: Arc<Config>,
}

impl Orchestrator {
    pub fn new(
        driver: Arc<dyn TabDriver>,
        bus: MessageBus,
        state: StateStore,
        results: Arc<dyn ResultStore>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            driver,
            bus,
            state,
            results,
            config,
        }
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs one session to its end
    ///
    /// Never fails: errors end the session as [`SessionStatus::Failed`] and
    /// still go through result saving and cleanup.
    pub async fn run(&self, request: ScrapeRequest) -> SessionReport {
        self.execute(request, false).await
    }

    /// Runs a session whose record the caller already started
    ///
    /// The stored record, including a stop latched since it was started, is
    /// used as is.
    pub async fn run_started(&self, request: ScrapeRequest) -> SessionReport {
        self.execute(request, true).await
    }

    async fn execute(&self, request: ScrapeRequest, started: bool) -> SessionReport {
        let tab_id = request.tab_id;
        tracing::info!(
            "Starting {} scrape of tab {} with {}",
            request.mode,
            tab_id,
            request.scraper_id
        );

        let mut run = Run::new(request);
        let status = match self.config.scraper(&run.request.scraper_id).cloned() {
            Some(scraper) => {
                run.scraper_name = Some(scraper.name.clone());
                match self.drive(&mut run, &scraper, started).await {
                    Ok(status) => status,
                    Err(e) => {
                        tracing::error!("Scraping session on tab {} failed: {}", tab_id, e);
                        SessionStatus::Failed(e.to_string())
                    }
                }
            }
            None => {
                let error = HarvestError::UnknownScraper(run.request.scraper_id.clone());
                tracing::error!("{}", error);
                SessionStatus::Failed(error.to_string())
            }
        };

        let cleanup = Cleanup::new(&self.bus, &self.state, tab_id);
        cleanup.hide_overlay().await;

        let result_id = self.persist(&run, &status).await;
        let report = SessionReport {
            tab_id,
            scraper_id: run.request.scraper_id.clone(),
            status,
            pages_visited: run.pages_visited,
            items_collected: run.items.len() as u64,
            result_id,
        };

        cleanup.finish(report.clone()).await;

        tracing::info!(
            "Session on tab {} {}: {} page(s), {} skipped, {} items",
            tab_id,
            report.status,
            run.pages_visited,
            run.pages_skipped,
            report.items_collected
        );
        report
    }

    async fn drive(
        &self,
        run: &mut Run,
        scraper: &ScraperConfig,
        started: bool,
    ) -> crate::Result<SessionStatus> {
        let tab_id = run.tab_id();
        let navigator = PageNavigator::new(
            Arc::clone(&self.driver),
            Pagination::from(scraper),
            &self.config.navigation,
        );
        let mut timer = DelayTimer::new(self.config.orchestrator.dwell());

        if !started {
            self.state.start_scraping(tab_id, &scraper.id).await?;
        }

        let mut page_index = 0;
        match run.request.mode {
            ScrapeMode::All => {
                let url = navigator.normalize_start_url(&run.request.base_url);
                self.state.show_modal(page_index, None).await?;
                navigator.navigate_to_page(tab_id, &url).await?;
                run.start_url = url.clone();
                run.current_url = url;
            }
            ScrapeMode::Current => {
                // no reload follows, so the page context has to be told
                let session = self.state.show_modal(page_index, None).await?;
                let options = self.bus.default_options().without_retry().silent();
                let request = PageRequest::ShowModal(Progress::from(&session));
                if let Err(e) = self.bus.send_to_tab(tab_id, request, &options).await {
                    tracing::debug!("[tab {}] Overlay not shown: {}", tab_id, e);
                }
            }
        }
        timer.start();

        loop {
            if self.stop_requested(Checkpoint::Entry).await {
                return Ok(SessionStatus::Stopped);
            }

            let has_next_page = self.scrape_page(run, scraper, page_index).await?;
            run.pages_visited += 1;

            if self.stop_requested(Checkpoint::PostExtract).await {
                return Ok(SessionStatus::Stopped);
            }

            if run.request.mode == ScrapeMode::Current || !has_next_page {
                return Ok(SessionStatus::Finished);
            }

            timer.wait_remaining().await;

            if self.stop_requested(Checkpoint::PreNavigate).await {
                return Ok(SessionStatus::Stopped);
            }

            page_index += 1;
            let url = navigator.build_next_page_url(&run.start_url, page_index);
            self.state.show_modal(page_index, run.total_pages).await?;
            navigator.navigate_to_page(tab_id, &url).await?;
            run.current_url = url;
            timer.restart();
        }
    }

    /// Extracts the current page and returns whether another one follows
    async fn scrape_page(
        &self,
        run: &mut Run,
        scraper: &ScraperConfig,
        page_index: u32,
    ) -> crate::Result<bool> {
        let tab_id = run.tab_id();

        match self.extract_with_retry(tab_id, &scraper.id, page_index).await {
            Ok(outcome) => {
                let found = outcome.items.len();
                run.items.extend(outcome.items);

                if run.total_pages.is_none() && outcome.total_pages.is_some() {
                    run.total_pages = outcome.total_pages;
                    self.state.set_total_pages(run.total_pages).await?;
                }

                let session = self
                    .state
                    .update_progress(page_index, run.items.len() as u64)
                    .await?;
                tracing::info!(
                    "Page {}: {} items collected ({} total)",
                    page_index + 1,
                    found,
                    run.items.len()
                );

                let progress = Progress::from(&session);
                self.bus
                    .notify_tab(tab_id, PageRequest::UpdateProgress(progress));
                self.bus
                    .notify_panel(PanelEvent::ScrapeProgress { tab_id, progress });

                Ok(outcome.has_next_page)
            }
            Err(last_response) => {
                run.pages_skipped += 1;
                tracing::warn!(
                    "Page {}: skipped after {} attempts",
                    page_index + 1,
                    self.config.orchestrator.max_extract_attempts
                );
                match last_response {
                    Some(outcome) => Ok(outcome.has_next_page),
                    None => Ok(self.probe_next_page(tab_id, &scraper.id).await),
                }
            }
        }
    }

    /// Requests extraction until a valid response arrives or attempts run out
    ///
    /// On failure returns the last successful-but-empty response, if the
    /// final attempt produced one.
    async fn extract_with_retry(
        &self,
        tab_id: TabId,
        site_id: &str,
        page_index: u32,
    ) -> Result<ExtractionOutcome, Option<ExtractionOutcome>> {
        let settings = &self.config.orchestrator;
        let policy =
            RetryPolicy::fixed(settings.max_extract_attempts, settings.extract_retry_delay());
        let options = SendOptions::default()
            .with_timeout(settings.extract_timeout())
            .expecting(MessageKind::ExtractPage);

        let result = with_retry(
            policy,
            |_: &Option<ExtractionOutcome>| true,
            |attempt| {
                let request = PageRequest::ExtractPage {
                    site_id: site_id.to_string(),
                };
                let options = &options;
                async move {
                    let reply = self
                        .bus
                        .send_to_tab(tab_id, request, options)
                        .await
                        .and_then(|response| match response {
                            PageResponse::Extracted(outcome) => Ok(outcome),
                            other => Err(MessagingError::UnexpectedReply(format!("{:?}", other))),
                        });
                    match reply {
                        Ok(outcome) if outcome.is_valid() => Ok(outcome),
                        Ok(outcome) => {
                            tracing::warn!(
                                "Page {}: empty or invalid response ({}/{})",
                                page_index + 1,
                                attempt,
                                policy.max_attempts
                            );
                            let answered = outcome.success;
                            Err(answered.then_some(outcome))
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Page {}: extraction request failed ({}/{}): {}",
                                page_index + 1,
                                attempt,
                                policy.max_attempts,
                                e
                            );
                            Err(None)
                        }
                    }
                }
            },
        )
        .await;

        result.map_err(|failure| failure.error)
    }

    /// Asks the page whether a next page exists; any failure means no
    async fn probe_next_page(&self, tab_id: TabId, site_id: &str) -> bool {
        let options = SendOptions::default()
            .with_timeout(self.config.orchestrator.extract_timeout())
            .expecting(MessageKind::CheckNextPage);
        let request = PageRequest::CheckNextPage {
            site_id: site_id.to_string(),
        };

        let reply = self
            .bus
            .send_to_tab(tab_id, request, &options)
            .await
            .and_then(|response| match response {
                PageResponse::NextPage(has_next_page) => Ok(has_next_page),
                other => Err(MessagingError::UnexpectedReply(format!("{:?}", other))),
            });

        match reply {
            Ok(has_next_page) => has_next_page,
            Err(e) => {
                tracing::warn!("Next-page probe failed, treating as last page: {}", e);
                false
            }
        }
    }

    async fn stop_requested(&self, checkpoint: Checkpoint) -> bool {
        let stop = self.state.get_state().await.should_stop;
        if stop {
            tracing::info!("Stop requested, ending at {} checkpoint", checkpoint);
        }
        stop
    }

    /// Saves the accumulated items
    ///
    /// A finished session is always saved; stopped and failed sessions only
    /// when they collected something. Failures are logged, never raised.
    async fn persist(&self, run: &Run, status: &SessionStatus) -> Option<String> {
        if *status != SessionStatus::Finished && run.items.is_empty() {
            tracing::debug!("Nothing collected, no result saved");
            return None;
        }

        let info = match self.driver.tab_info(run.tab_id()).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!("Failed to get tab info: {}", e);
                TabInfo::default()
            }
        };
        let url = if info.url.is_empty() {
            run.current_url.clone()
        } else {
            info.url
        };

        let record = NewScrapeResult {
            scraper_id: run.request.scraper_id.clone(),
            scraper_name: run
                .scraper_name
                .clone()
                .unwrap_or_else(|| run.request.scraper_id.clone()),
            url,
            page_title: info.title,
            favicon: info.favicon,
            items: run.items.clone(),
        };

        match self.results.save(&record) {
            Ok(id) => {
                tracing::info!("Saved {} items as result {}", record.items.len(), id);
                Some(id)
            }
            Err(e) => {
                tracing::error!("Failed to save results: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::testing::{orchestrator, FakeSite, ITEMS_PER_PAGE, START_URL};
    use crate::state::ScrapingSession;
    use std::time::Duration;
    use tokio::sync::broadcast;
    use tokio::time::Instant;

    fn request(mode: ScrapeMode) -> ScrapeRequest {
        ScrapeRequest {
            tab_id: TabId(1),
            scraper_id: "products".to_string(),
            mode,
            base_url: START_URL.to_string(),
        }
    }

    fn page_url(page: u32) -> String {
        format!("https://site.example/list?pagenum={}", page)
    }

    fn drain(events: &mut broadcast::Receiver<PanelEvent>) -> Vec<PanelEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = events.try_recv() {
            drained.push(event);
        }
        drained
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_page_session_end_to_end() {
        let site = FakeSite::new(3);
        let state = StateStore::in_memory();
        let (orchestrator, store, mut events) = orchestrator(&site, &state);

        let started = Instant::now();
        let report = orchestrator.run(request(ScrapeMode::All)).await;

        assert_eq!(report.status, SessionStatus::Finished);
        assert_eq!(report.pages_visited, 3);
        assert_eq!(report.items_collected, 15);
        assert_eq!(report.result_id.as_deref(), Some("result-1"));
        assert_eq!(site.navigations(), vec![page_url(0), page_url(1), page_url(2)]);

        // two dwells between three pages
        assert!(started.elapsed() >= Duration::from_secs(6));

        let saved = store.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].items.len(), 15);
        assert_eq!(saved[0].url, page_url(2));
        assert_eq!(saved[0].page_title.as_deref(), Some("Listing"));
        assert_eq!(saved[0].scraper_name, "Product list");

        assert_eq!(state.get_state().await, ScrapingSession::idle());
        assert_eq!(site.hidden(), 1);

        let progress: Vec<Progress> = drain(&mut events)
            .into_iter()
            .filter_map(|event| match event {
                PanelEvent::ScrapeProgress { progress, .. } => Some(progress),
                _ => None,
            })
            .collect();
        let counts: Vec<u64> = progress.iter().map(|p| p.items_collected).collect();
        assert_eq!(counts, vec![5, 10, 15]);
        assert!(progress.iter().all(|p| p.total_pages == Some(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_after_first_page() {
        let site = FakeSite::new(3);
        let state = StateStore::in_memory();
        site.stop_after(0, &state);
        let (orchestrator, store, mut events) = orchestrator(&site, &state);

        let report = orchestrator.run(request(ScrapeMode::All)).await;

        assert_eq!(report.status, SessionStatus::Stopped);
        assert_eq!(report.pages_visited, 1);
        assert_eq!(site.navigations(), vec![page_url(0)]);
        assert_eq!(site.extract_calls(), vec![0]);

        let saved = store.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].items.len(), ITEMS_PER_PAGE);

        let completions = drain(&mut events)
            .into_iter()
            .filter(|event| matches!(event, PanelEvent::ScrapeComplete(_)))
            .count();
        assert_eq!(completions, 1);

        let session = state.get_state().await;
        assert!(!session.is_active);
        assert!(!session.should_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_page_is_retried_then_skipped() {
        let site = FakeSite::new(3);
        site.fail_page(1);
        let state = StateStore::in_memory();
        let (orchestrator, store, _events) = orchestrator(&site, &state);

        let report = orchestrator.run(request(ScrapeMode::All)).await;

        assert_eq!(site.extract_calls(), vec![0, 1, 1, 1, 2]);
        assert_eq!(site.probes(), 1);
        assert_eq!(report.status, SessionStatus::Finished);
        assert_eq!(report.pages_visited, 3);
        assert_eq!(report.items_collected, 10);
        assert_eq!(store.saved()[0].items.len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bound_in_single_page_mode() {
        let site = FakeSite::new(1);
        // the current tab sits on pagenum=5
        site.fail_page(5);
        let state = StateStore::in_memory();
        let (orchestrator, store, _events) = orchestrator(&site, &state);

        let started = Instant::now();
        let report = orchestrator.run(request(ScrapeMode::Current)).await;

        assert_eq!(site.extract_calls(), vec![5, 5, 5]);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(site.navigations().is_empty());
        assert_eq!(report.status, SessionStatus::Finished);
        assert_eq!(report.items_collected, 0);

        // a finished session is saved even when empty
        let saved = store.saved();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].items.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_page_mode_does_not_navigate() {
        let site = FakeSite::new(3);
        let state = StateStore::in_memory();
        let (orchestrator, store, _events) = orchestrator(&site, &state);

        let report = orchestrator.run(request(ScrapeMode::Current)).await;

        assert!(site.navigations().is_empty());
        assert_eq!(site.extract_calls(), vec![5]);
        assert_eq!(report.status, SessionStatus::Finished);
        assert_eq!(report.pages_visited, 1);
        assert_eq!(store.saved()[0].url, START_URL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_page_overlay_is_shown_before_it_is_hidden() {
        let site = FakeSite::new(1);
        let state = StateStore::in_memory();
        let (orchestrator, _store, _events) = orchestrator(&site, &state);

        orchestrator.run(request(ScrapeMode::Current)).await;

        let overlay = site.overlay();
        assert_eq!(overlay.first(), Some(&"show"));
        let shown = overlay.iter().filter(|step| **step == "show").count();
        let hide = overlay.iter().position(|step| *step == "hide").unwrap();
        assert_eq!(shown, 1);
        assert!(hide > 0);
        assert!(!state.get_state().await.modal_visible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_record_keeps_latched_stop() {
        let site = FakeSite::new(3);
        let state = StateStore::in_memory();
        let (orchestrator, store, _events) = orchestrator(&site, &state);

        state.start_scraping(TabId(1), "products").await.unwrap();
        state.stop_scraping().await.unwrap();
        let report = orchestrator.run_started(request(ScrapeMode::All)).await;

        assert_eq!(report.status, SessionStatus::Stopped);
        assert_eq!(report.pages_visited, 0);
        assert!(site.extract_calls().is_empty());
        assert!(store.saved().is_empty());
        assert_eq!(state.get_state().await, ScrapingSession::idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_tab_fails_session_and_resets() {
        let site = FakeSite::new(3);
        site.close_after(0);
        let state = StateStore::in_memory();
        let (orchestrator, store, _events) = orchestrator(&site, &state);

        let report = orchestrator.run(request(ScrapeMode::All)).await;

        assert!(matches!(report.status, SessionStatus::Failed(_)));
        assert_eq!(report.items_collected, 5);
        assert_eq!(site.navigations(), vec![page_url(0)]);

        // partial results are kept; the tab is gone so the last known URL is used
        let saved = store.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].url, page_url(0));
        assert_eq!(saved[0].page_title, None);

        assert_eq!(state.get_state().await, ScrapingSession::idle());
    }

    #[tokio::test]
    async fn test_unknown_scraper_fails_without_saving() {
        let site = FakeSite::new(3);
        let state = StateStore::in_memory();
        let (orchestrator, store, _events) = orchestrator(&site, &state);

        let mut request = request(ScrapeMode::All);
        request.scraper_id = "nope".to_string();
        let report = orchestrator.run(request).await;

        assert!(matches!(report.status, SessionStatus::Failed(ref e) if e.contains("nope")));
        assert!(store.saved().is_empty());
        assert!(site.navigations().is_empty());
        assert!(!state.get_state().await.is_active);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SessionStatus::Finished.to_string(), "finished");
        assert_eq!(
            SessionStatus::Failed("tab closed".to_string()).to_string(),
            "failed: tab closed"
        );
        assert_eq!(Checkpoint::PostExtract.to_string(), "post-extract");
    }
}
