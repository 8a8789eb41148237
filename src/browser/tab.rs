//! HTTP-backed tabs
//!
//! A tab loads documents with the HTTP client and hosts at most one page
//! context at a time. Navigation is asynchronous: the tab reports `Loading`
//! immediately and `Complete` once the document is in place, exactly like a
//! browser tab the controller does not own.

use crate::browser::document::parse_page_meta;
use crate::browser::fetcher::{fetch_page, FetchResult};
use crate::browser::page_context::{PageContextHandle, PageContextTask, PageEnvironment};
use crate::browser::{BrowserError, PageSnapshot};
use crate::messaging::{MessagingError, PageRequest, PageResponse, TabTransport};
use crate::TabId;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

const UPDATE_CHANNEL: usize = 64;

/// Navigation lifecycle of a tab
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabStatus {
    Loading,
    Complete,
}

/// Lifecycle event published for every tab
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabUpdate {
    pub tab_id: TabId,
    pub status: TabStatus,
    pub url: String,
}

/// What the controller may know about a tab
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabInfo {
    pub url: String,
    pub title: Option<String>,
    pub favicon: Option<String>,
}

/// Controller-side control over tabs
#[async_trait]
pub trait TabDriver: Send + Sync {
    /// Starts navigating `tab_id` to `url`; returns before the load finishes
    async fn update_url(&self, tab_id: TabId, url: &str) -> Result<(), BrowserError>;

    /// Subscribes to lifecycle events of every tab
    fn subscribe_updates(&self) -> broadcast::Receiver<TabUpdate>;

    async fn tab_info(&self, tab_id: TabId) -> Result<TabInfo, BrowserError>;
}

struct TabSlot {
    info: TabInfo,
    status: TabStatus,
    /// Bumped on every navigation so a slow load cannot overwrite a newer one
    generation: u64,
    page: Option<PageContextTask>,
}

struct HostInner {
    client: Client,
    env: PageEnvironment,
    tabs: Mutex<HashMap<TabId, TabSlot>>,
    updates: broadcast::Sender<TabUpdate>,
    next_id: AtomicU32,
}

/// Owner of every tab and of their page contexts
#[derive(Clone)]
pub struct TabHost {
    inner: Arc<HostInner>,
}

impl TabHost {
    pub fn new(client: Client, env: PageEnvironment) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL);
        Self {
            inner: Arc::new(HostInner {
                client,
                env,
                tabs: Mutex::new(HashMap::new()),
                updates,
                next_id: AtomicU32::new(1),
            }),
        }
    }

    /// Opens an empty tab
    pub async fn open_tab(&self) -> TabId {
        let tab_id = TabId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.tabs.lock().await.insert(
            tab_id,
            TabSlot {
                info: TabInfo {
                    url: "about:blank".to_string(),
                    ..TabInfo::default()
                },
                status: TabStatus::Complete,
                generation: 0,
                page: None,
            },
        );
        tracing::debug!("Opened tab {}", tab_id);
        tab_id
    }

    /// Closes a tab, destroying its page context
    pub async fn close_tab(&self, tab_id: TabId) -> Result<(), BrowserError> {
        let removed = self.inner.tabs.lock().await.remove(&tab_id);
        match removed {
            Some(_) => {
                tracing::debug!("Closed tab {}", tab_id);
                Ok(())
            }
            None => Err(BrowserError::NoSuchTab(tab_id)),
        }
    }

    pub async fn status(&self, tab_id: TabId) -> Option<TabStatus> {
        self.inner.tabs.lock().await.get(&tab_id).map(|slot| slot.status)
    }

    /// Handle to the page context currently loaded in `tab_id`
    pub async fn page_context(&self, tab_id: TabId) -> Option<PageContextHandle> {
        self.inner
            .tabs
            .lock()
            .await
            .get(&tab_id)
            .and_then(|slot| slot.page.as_ref())
            .map(PageContextTask::handle)
    }
}

impl HostInner {
    async fn load(&self, tab_id: TabId, generation: u64, url: String) {
        let (final_url, body) = match fetch_page(&self.client, &url).await {
            FetchResult::Success {
                final_url, body, ..
            } => (final_url, Some(body)),
            FetchResult::ContentMismatch {
                final_url,
                content_type,
            } => {
                tracing::warn!("[tab {}] {} is not HTML ({})", tab_id, final_url, content_type);
                (final_url, None)
            }
            FetchResult::HttpError { status_code } => {
                tracing::warn!("[tab {}] {} answered HTTP {}", tab_id, url, status_code);
                (url, None)
            }
            FetchResult::NetworkError { error } => {
                tracing::warn!("[tab {}] Failed to load {}: {}", tab_id, url, error);
                (url, None)
            }
        };

        let meta = body
            .as_deref()
            .map(|html| parse_page_meta(html, &final_url))
            .unwrap_or_default();

        {
            let mut tabs = self.tabs.lock().await;
            let Some(slot) = tabs.get_mut(&tab_id) else {
                tracing::debug!("[tab {}] Closed while loading", tab_id);
                return;
            };
            if slot.generation != generation {
                tracing::debug!("[tab {}] Load of {} superseded", tab_id, final_url);
                return;
            }

            slot.info = TabInfo {
                url: final_url.clone(),
                title: meta.title,
                favicon: meta.favicon,
            };
            slot.status = TabStatus::Complete;
            slot.page = body.map(|html| {
                let snapshot = PageSnapshot {
                    url: final_url.clone(),
                    html,
                };
                PageContextTask::spawn(tab_id, snapshot, &self.env)
            });
        }

        tracing::debug!("[tab {}] Loaded {}", tab_id, final_url);
        let _ = self.updates.send(TabUpdate {
            tab_id,
            status: TabStatus::Complete,
            url: final_url,
        });
    }
}

#[async_trait]
impl TabDriver for TabHost {
    async fn update_url(&self, tab_id: TabId, url: &str) -> Result<(), BrowserError> {
        let generation = {
            let mut tabs = self.inner.tabs.lock().await;
            let slot = tabs.get_mut(&tab_id).ok_or(BrowserError::NoSuchTab(tab_id))?;
            slot.generation += 1;
            slot.status = TabStatus::Loading;
            // the old document goes away with its page context
            slot.page = None;
            slot.info = TabInfo {
                url: url.to_string(),
                ..TabInfo::default()
            };
            slot.generation
        };

        let _ = self.inner.updates.send(TabUpdate {
            tab_id,
            status: TabStatus::Loading,
            url: url.to_string(),
        });

        let inner = Arc::clone(&self.inner);
        let url = url.to_string();
        tokio::spawn(async move { inner.load(tab_id, generation, url).await });
        Ok(())
    }

    fn subscribe_updates(&self) -> broadcast::Receiver<TabUpdate> {
        self.inner.updates.subscribe()
    }

    async fn tab_info(&self, tab_id: TabId) -> Result<TabInfo, BrowserError> {
        self.inner
            .tabs
            .lock()
            .await
            .get(&tab_id)
            .map(|slot| slot.info.clone())
            .ok_or(BrowserError::NoSuchTab(tab_id))
    }
}

#[async_trait]
impl TabTransport for TabHost {
    async fn deliver_to_tab(
        &self,
        tab_id: TabId,
        request: PageRequest,
    ) -> Result<PageResponse, MessagingError> {
        let handle = {
            let tabs = self.inner.tabs.lock().await;
            let slot = tabs.get(&tab_id).ok_or(MessagingError::NoSuchTab(tab_id))?;
            if slot.status == TabStatus::Loading {
                return Err(MessagingError::ConnectFailed(tab_id));
            }
            slot.page
                .as_ref()
                .map(PageContextTask::handle)
                .ok_or_else(|| MessagingError::ReceiverMissing(format!("tab {}", tab_id)))?
        };

        handle.request(request).await
    }
}
