//! Drives a tab from page to page

use crate::browser::{BrowserError, TabDriver, TabStatus, TabUpdate};
use crate::config::NavigationConfig;
use crate::url::Pagination;
use crate::TabId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

/// How a page-load wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLoad {
    /// The tab reported `Complete` and the settle delay elapsed
    Complete,
    /// No completion within the timeout; the page is assumed usable
    TimedOut,
}

/// Navigation plus the page-number URL rewriting of one scraper
pub struct PageNavigator<D: TabDriver + ?Sized> {
    driver: Arc<D>,
    pagination: Pagination,
    load_timeout: Duration,
    settle_delay: Duration,
}

impl<D: TabDriver + ?Sized> PageNavigator<D> {
    pub fn new(driver: Arc<D>, pagination: Pagination, config: &NavigationConfig) -> Self {
        Self {
            driver,
            pagination,
            load_timeout: config.page_load_timeout(),
            settle_delay: config.settle_delay(),
        }
    }

    /// Rewrites the page parameter of `url` to the first page
    pub fn normalize_start_url(&self, url: &str) -> String {
        self.pagination.normalize_start_url(url)
    }

    /// Rewrites the page parameter of `url` to the given zero-based page
    pub fn build_next_page_url(&self, url: &str, page_index: u32) -> String {
        self.pagination.build_next_page_url(url, page_index)
    }

    /// Navigates `tab_id` to `url` and waits for the load
    ///
    /// The lifecycle subscription is taken before the navigation starts, so a
    /// fast load cannot complete unseen.
    pub async fn navigate_to_page(
        &self,
        tab_id: TabId,
        url: &str,
    ) -> Result<PageLoad, BrowserError> {
        tracing::debug!("[tab {}] Navigating to {}", tab_id, url);
        let mut updates = self.driver.subscribe_updates();
        self.driver.update_url(tab_id, url).await?;
        Ok(self.wait_on(&mut updates, tab_id).await)
    }

    /// Waits for the next completed load of `tab_id`
    ///
    /// Resolves with [`PageLoad::TimedOut`] instead of hanging when the tab
    /// never completes.
    pub async fn wait_for_page_load(&self, tab_id: TabId) -> PageLoad {
        let mut updates = self.driver.subscribe_updates();
        self.wait_on(&mut updates, tab_id).await
    }

    async fn wait_on(
        &self,
        updates: &mut broadcast::Receiver<TabUpdate>,
        tab_id: TabId,
    ) -> PageLoad {
        let completed = tokio::time::timeout(self.load_timeout, async {
            loop {
                match updates.recv().await {
                    Ok(update)
                        if update.tab_id == tab_id && update.status == TabStatus::Complete =>
                    {
                        return true;
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Tab update listener lagged by {} events", skipped);
                    }
                    Err(RecvError::Closed) => return false,
                }
            }
        })
        .await;

        match completed {
            Ok(true) => {
                tokio::time::sleep(self.settle_delay).await;
                PageLoad::Complete
            }
            Ok(false) => {
                tracing::warn!("[tab {}] Tab updates closed, continuing anyway", tab_id);
                PageLoad::TimedOut
            }
            Err(_) => {
                tracing::warn!(
                    "[tab {}] Page load not complete after {:?}, continuing anyway",
                    tab_id,
                    self.load_timeout
                );
                PageLoad::TimedOut
            }
        }
    }
}
