use crate::state::{ScrapingSession, StateError};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Storage area holding session records
///
/// Both execution contexts read the same area; nothing about it may live in
/// a page context since those are destroyed on every navigation.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Reads the record under `key`, `None` when nothing was written yet
    async fn load(&self, key: &str) -> Result<Option<ScrapingSession>, StateError>;

    /// Replaces the record under `key`
    async fn store(&self, key: &str, session: &ScrapingSession) -> Result<(), StateError>;
}

/// Session-scoped storage area
///
/// Lives as long as the process; records are gone once the harvester exits.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<String, ScrapingSession>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateBackend for MemoryBackend {
    async fn load(&self, key: &str) -> Result<Option<ScrapingSession>, StateError> {
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn store(&self, key: &str, session: &ScrapingSession) -> Result<(), StateError> {
        self.records
            .lock()
            .await
            .insert(key.to_string(), session.clone());
        Ok(())
    }
}
