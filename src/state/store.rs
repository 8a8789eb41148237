//! Session state store
//!
//! The single source of truth for the running session. Every mutation is a
//! serialized read-modify-write against the backend followed by an in-process
//! notification.

use crate::state::{
    MemoryBackend, ScrapingSession, SessionMode, SessionPatch, StateBackend, StateError,
};
use crate::TabId;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Storage key of the canonical session record
pub const STATE_KEY: &str = "scraping_state";

const MAX_HISTORY: usize = 10;

/// One recorded state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub at: DateTime<Utc>,
    pub changed_keys: Vec<&'static str>,
}

/// Handle to the shared session record
///
/// Clones share the backend, the write lock, the subscribers and the history,
/// so a clone handed to a page context observes the controller's writes.
#[derive(Clone)]
pub struct StateStore {
    backend: Arc<dyn StateBackend>,
    key: Arc<str>,
    write_lock: Arc<Mutex<()>>,
    notifier: Arc<watch::Sender<ScrapingSession>>,
    history: Arc<Mutex<VecDeque<StateChange>>>,
}

impl StateStore {
    /// Creates a store over the given backend using [`STATE_KEY`]
    pub fn new(backend: Arc<dyn StateBackend>) -> Self {
        Self::with_key(backend, STATE_KEY)
    }

    /// Creates a store keeping its record under a custom key
    pub fn with_key(backend: Arc<dyn StateBackend>, key: &str) -> Self {
        let (notifier, _) = watch::channel(ScrapingSession::idle());
        Self {
            backend,
            key: Arc::from(key),
            write_lock: Arc::new(Mutex::new(())),
            notifier: Arc::new(notifier),
            history: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_HISTORY))),
        }
    }

    /// Creates a store over a fresh session-scoped memory area
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Returns the persisted session, or the idle record
    ///
    /// Never fails: a missing record and a failing backend both yield the
    /// idle default so callers can always proceed.
    pub async fn get_state(&self) -> ScrapingSession {
        match self.backend.load(&self.key).await {
            Ok(Some(session)) => session,
            Ok(None) => ScrapingSession::idle(),
            Err(e) => {
                tracing::warn!("Failed to read scraping state, using idle default: {}", e);
                ScrapingSession::idle()
            }
        }
    }

    /// Merges `patch` into the persisted session
    ///
    /// Rejects clearing a latched stop flag and lowering the page index or
    /// item count; only [`reset`](Self::reset) and
    /// [`start_scraping`](Self::start_scraping) may do either.
    pub async fn update_state(&self, patch: SessionPatch) -> Result<ScrapingSession, StateError> {
        let _guard = self.write_lock.lock().await;

        let current = self
            .backend
            .load(&self.key)
            .await?
            .unwrap_or_else(ScrapingSession::idle);

        check_patch(&current, &patch)?;

        let changed_keys = patch.changed_keys();
        let mut next = current;
        patch.apply_to(&mut next);

        self.commit(next, changed_keys).await
    }

    /// Replaces the session with the idle record
    pub async fn reset(&self) -> Result<ScrapingSession, StateError> {
        let _guard = self.write_lock.lock().await;
        self.commit(ScrapingSession::idle(), vec!["*"]).await
    }

    /// Starts a fresh session, discarding whatever was stored before
    pub async fn start_scraping(
        &self,
        tab_id: TabId,
        scraper_id: &str,
    ) -> Result<ScrapingSession, StateError> {
        let _guard = self.write_lock.lock().await;
        let session = ScrapingSession::started(tab_id, scraper_id, Utc::now());
        self.commit(session, vec!["*"]).await
    }

    /// Requests a cooperative stop
    pub async fn stop_scraping(&self) -> Result<ScrapingSession, StateError> {
        self.update_state(
            SessionPatch::new()
                .should_stop(true)
                .mode(SessionMode::Stopping),
        )
        .await
    }

    pub async fn update_progress(
        &self,
        page_index: u32,
        items_collected: u64,
    ) -> Result<ScrapingSession, StateError> {
        self.update_state(
            SessionPatch::new()
                .page_index(page_index)
                .items_collected(items_collected),
        )
        .await
    }

    pub async fn set_total_pages(&self, total: Option<u32>) -> Result<ScrapingSession, StateError> {
        self.update_state(SessionPatch::new().total_pages(total)).await
    }

    /// Flags the progress overlay as visible for the given page
    pub async fn show_modal(
        &self,
        page_index: u32,
        total_pages: Option<u32>,
    ) -> Result<ScrapingSession, StateError> {
        self.update_state(
            SessionPatch::new()
                .modal_visible(true)
                .page_index(page_index)
                .total_pages(total_pages),
        )
        .await
    }

    pub async fn hide_modal(&self) -> Result<ScrapingSession, StateError> {
        self.update_state(SessionPatch::new().modal_visible(false))
            .await
    }

    /// Returns true once a stop has been requested for the running session
    pub async fn is_stop_requested(&self) -> bool {
        self.get_state().await.should_stop
    }

    /// Subscribes to state changes made through this store
    ///
    /// In-process only; dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<ScrapingSession> {
        self.notifier.subscribe()
    }

    /// Returns the most recent transitions, oldest first
    pub async fn history(&self) -> Vec<StateChange> {
        self.history.lock().await.iter().cloned().collect()
    }

    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
    }

    async fn commit(
        &self,
        session: ScrapingSession,
        changed_keys: Vec<&'static str>,
    ) -> Result<ScrapingSession, StateError> {
        self.backend.store(&self.key, &session).await.map_err(|e| {
            tracing::error!("Failed to write scraping state: {}", e);
            e
        })?;

        if !changed_keys.is_empty() {
            let mut history = self.history.lock().await;
            history.push_back(StateChange {
                at: Utc::now(),
                changed_keys,
            });
            while history.len() > MAX_HISTORY {
                history.pop_front();
            }
        }

        self.notifier.send_replace(session.clone());
        Ok(session)
    }
}

fn check_patch(current: &ScrapingSession, patch: &SessionPatch) -> Result<(), StateError> {
    if current.should_stop && patch.should_stop == Some(false) {
        return Err(StateError::StopLatched);
    }

    if let Some(page) = patch.current_page_index {
        if page < current.current_page_index {
            return Err(StateError::Regression {
                field: "current_page_index",
                from: u64::from(current.current_page_index),
                to: u64::from(page),
            });
        }
    }

    if let Some(items) = patch.items_collected {
        if items < current.items_collected {
            return Err(StateError::Regression {
                field: "items_collected",
                from: current.items_collected,
                to: items,
            });
        }
    }

    Ok(())
}
