//! Page context: the short-lived side of a tab
//!
//! One context is spawned per successful page load and destroyed when the tab
//! navigates away. It answers page requests from its own copy of the document
//! and never navigates on its own; anything it wants from the controller goes
//! through its message bus.

use crate::browser::{ExtractorRegistry, PageSnapshot, ProgressSink};
use crate::messaging::{
    ControlMessage, ControlReply, ExtractionOutcome, MessageBus, MessagingError, PageRequest,
    PageResponse, Progress,
};
use crate::state::StateStore;
use crate::TabId;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

type Envelope = (PageRequest, oneshot::Sender<Result<PageResponse, String>>);

const REQUEST_QUEUE: usize = 16;

/// What every page context of a tab host is built with
#[derive(Clone)]
pub struct PageEnvironment {
    pub extractors: Arc<ExtractorRegistry>,
    pub sink: Arc<dyn ProgressSink>,
    pub state: StateStore,
    /// Route back to the controller
    pub bus: MessageBus,
}

/// Address of a live page context
#[derive(Clone)]
pub struct PageContextHandle {
    tab_id: TabId,
    requests: mpsc::Sender<Envelope>,
    bus: MessageBus,
}

impl PageContextHandle {
    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    /// Delivers one request and waits for the context to answer
    pub async fn request(&self, request: PageRequest) -> Result<PageResponse, MessagingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send((request, reply_tx))
            .await
            .map_err(|_| MessagingError::ReceiverMissing(format!("tab {}", self.tab_id)))?;

        match reply_rx.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(error)) => Err(MessagingError::Remote(error)),
            Err(_) => Err(MessagingError::PortClosed),
        }
    }

    /// The overlay's stop button: asks the controller to stop this tab's session
    pub async fn request_stop(&self) -> Result<ControlReply, MessagingError> {
        let options = self.bus.default_options();
        self.bus
            .send_to_background(ControlMessage::StopScrape { tab_id: self.tab_id }, &options)
            .await
    }
}

/// A running page context; dropping it destroys the context
pub(crate) struct PageContextTask {
    handle: PageContextHandle,
    task: JoinHandle<()>,
}

impl PageContextTask {
    pub(crate) fn spawn(tab_id: TabId, snapshot: PageSnapshot, env: &PageEnvironment) -> Self {
        let (requests, receiver) = mpsc::channel(REQUEST_QUEUE);

        let context = PageContext {
            tab_id,
            snapshot,
            extractors: Arc::clone(&env.extractors),
            sink: Arc::clone(&env.sink),
            state: env.state.clone(),
            requests: receiver,
        };
        let task = tokio::spawn(context.run());

        Self {
            handle: PageContextHandle {
                tab_id,
                requests,
                bus: env.bus.clone(),
            },
            task,
        }
    }

    pub(crate) fn handle(&self) -> PageContextHandle {
        self.handle.clone()
    }
}

impl Drop for PageContextTask {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct PageContext {
    tab_id: TabId,
    snapshot: PageSnapshot,
    extractors: Arc<ExtractorRegistry>,
    sink: Arc<dyn ProgressSink>,
    state: StateStore,
    requests: mpsc::Receiver<Envelope>,
}

impl PageContext {
    async fn run(mut self) {
        self.restore_overlay().await;

        while let Some((request, reply)) = self.requests.recv().await {
            let response = self.handle(request);
            if reply.send(response).is_err() {
                tracing::debug!("[tab {}] Requester went away before the reply", self.tab_id);
            }
        }
    }

    /// A reload wipes the overlay; bring it back if the session says it was up
    async fn restore_overlay(&self) {
        let session = self.state.get_state().await;
        if session.is_active_for(self.tab_id) && session.modal_visible {
            tracing::debug!("[tab {}] Restoring overlay after reload", self.tab_id);
            self.sink.show(self.tab_id, &Progress::from(&session));
        }
    }

    fn handle(&self, request: PageRequest) -> Result<PageResponse, String> {
        match request {
            PageRequest::ExtractPage { site_id } => {
                let extractor = self.extractor(&site_id)?;
                let outcome = match extractor.extract(&self.snapshot) {
                    Ok(page) => {
                        ExtractionOutcome::found(page.items, page.has_next_page, page.total_pages)
                    }
                    Err(e) => {
                        tracing::warn!("[tab {}] Extraction failed: {}", self.tab_id, e);
                        ExtractionOutcome::failed(e.to_string())
                    }
                };
                Ok(PageResponse::Extracted(outcome))
            }
            PageRequest::CheckNextPage { site_id } => {
                let extractor = self.extractor(&site_id)?;
                Ok(PageResponse::NextPage(extractor.has_next_page(&self.snapshot)))
            }
            PageRequest::ShowModal(progress) => {
                self.sink.show(self.tab_id, &progress);
                Ok(PageResponse::Ack)
            }
            PageRequest::UpdateProgress(progress) => {
                self.sink.update(self.tab_id, &progress);
                Ok(PageResponse::Ack)
            }
            PageRequest::HideModal => {
                self.sink.hide(self.tab_id);
                Ok(PageResponse::Ack)
            }
        }
    }

    fn extractor(&self, site_id: &str) -> Result<Arc<dyn crate::browser::Extractor>, String> {
        self.extractors
            .get(site_id)
            .ok_or_else(|| format!("No extractor registered for '{}'", site_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{ExtractError, ExtractedPage, Extractor, TracingProgressSink};
    use crate::Item;

    struct FixedExtractor;

    impl Extractor for FixedExtractor {
        fn site_id(&self) -> &str {
            "fixed"
        }

        fn extract(&self, page: &PageSnapshot) -> Result<ExtractedPage, ExtractError> {
            if page.html.is_empty() {
                return Err(ExtractError::Failed("empty document".to_string()));
            }
            Ok(ExtractedPage {
                items: vec![Item::new("a"), Item::new("b")],
                has_next_page: true,
                total_pages: Some(2),
            })
        }

        fn has_next_page(&self, _page: &PageSnapshot) -> bool {
            true
        }
    }

    fn environment(state: StateStore, sink: Arc<TracingProgressSink>) -> PageEnvironment {
        let mut extractors = ExtractorRegistry::new();
        extractors.register(Arc::new(FixedExtractor));
        PageEnvironment {
            extractors: Arc::new(extractors),
            sink,
            state,
            bus: MessageBus::builder().build(),
        }
    }

    fn snapshot(html: &str) -> PageSnapshot {
        PageSnapshot {
            url: "https://site.example/list".to_string(),
            html: html.to_string(),
        }
    }

    #[tokio::test]
    async fn test_answers_extraction_requests() {
        let env = environment(StateStore::in_memory(), Arc::new(TracingProgressSink::new()));
        let context = PageContextTask::spawn(TabId(1), snapshot("<ul></ul>"), &env);

        let response = context
            .handle()
            .request(PageRequest::ExtractPage {
                site_id: "fixed".to_string(),
            })
            .await
            .unwrap();

        match response {
            PageResponse::Extracted(outcome) => {
                assert!(outcome.is_valid());
                assert_eq!(outcome.items.len(), 2);
                assert_eq!(outcome.total_pages, Some(2));
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_extractor_failure_is_a_failed_outcome() {
        let env = environment(StateStore::in_memory(), Arc::new(TracingProgressSink::new()));
        let context = PageContextTask::spawn(TabId(1), snapshot(""), &env);

        let response = context
            .handle()
            .request(PageRequest::ExtractPage {
                site_id: "fixed".to_string(),
            })
            .await
            .unwrap();
        assert!(matches!(response, PageResponse::Extracted(ref o) if !o.success));
    }

    #[tokio::test]
    async fn test_unknown_site_is_a_remote_error() {
        let env = environment(StateStore::in_memory(), Arc::new(TracingProgressSink::new()));
        let context = PageContextTask::spawn(TabId(1), snapshot("<p></p>"), &env);

        let result = context
            .handle()
            .request(PageRequest::CheckNextPage {
                site_id: "unknown".to_string(),
            })
            .await;
        assert!(matches!(result, Err(MessagingError::Remote(_))));
    }

    #[tokio::test]
    async fn test_destroyed_context_is_missing() {
        let env = environment(StateStore::in_memory(), Arc::new(TracingProgressSink::new()));
        let context = PageContextTask::spawn(TabId(1), snapshot("<p></p>"), &env);
        let handle = context.handle();
        drop(context);
        tokio::task::yield_now().await;

        let result = handle.request(PageRequest::HideModal).await;
        assert!(matches!(
            result,
            Err(MessagingError::ReceiverMissing(_)) | Err(MessagingError::PortClosed)
        ));
    }

    #[tokio::test]
    async fn test_overlay_restored_from_session_state() {
        let state = StateStore::in_memory();
        state.start_scraping(TabId(3), "fixed").await.unwrap();
        state.show_modal(1, Some(4)).await.unwrap();

        let sink = Arc::new(TracingProgressSink::new());
        let env = environment(state, sink.clone());
        let context = PageContextTask::spawn(TabId(3), snapshot("<p></p>"), &env);

        // any answered request means the restore step already ran
        context.handle().request(PageRequest::UpdateProgress(Progress::default())).await.unwrap();
        assert!(sink.is_visible(TabId(3)));

        let other = PageContextTask::spawn(TabId(4), snapshot("<p></p>"), &env);
        other.handle().request(PageRequest::HideModal).await.unwrap();
        assert!(!sink.is_visible(TabId(4)));
    }

    #[tokio::test]
    async fn test_request_stop_without_controller_fails() {
        let env = environment(StateStore::in_memory(), Arc::new(TracingProgressSink::new()));
        let context = PageContextTask::spawn(TabId(1), snapshot("<p></p>"), &env);

        let result = context.handle().request_stop().await;
        assert!(matches!(result, Err(MessagingError::NotConnected(_))));
    }
}
