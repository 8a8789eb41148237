//! Control entry point
//!
//! The controller owns the session tasks. Requests arrive over an mpsc
//! channel through [`ControllerHandle`], which is what the page side and
//! the CLI use as their background route on the message bus.

use crate::messaging::{
    BackgroundTransport, ControlMessage, ControlReply, MessagingError, ScrapeRequest,
};
use crate::scrape::{Orchestrator, SessionReport};
use crate::{HarvestError, TabId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const CONTROL_CHANNEL: usize = 32;

type ControlEnvelope = (ControlMessage, oneshot::Sender<ControlReply>);

/// Sending side of the controller
#[derive(Clone)]
pub struct ControllerHandle {
    sender: mpsc::Sender<ControlEnvelope>,
}

/// Receiving side of the controller, before a controller is attached
pub struct ControlInbox {
    receiver: mpsc::Receiver<ControlEnvelope>,
}

impl ControllerHandle {
    /// Creates the control channel
    ///
    /// Lets the page side get its background route before the orchestrator
    /// (which needs the tabs) exists.
    pub fn channel() -> (ControllerHandle, ControlInbox) {
        let (sender, receiver) = mpsc::channel(CONTROL_CHANNEL);
        (ControllerHandle { sender }, ControlInbox { receiver })
    }
}

#[async_trait]
impl BackgroundTransport for ControllerHandle {
    async fn deliver_to_background(
        &self,
        message: ControlMessage,
    ) -> Result<ControlReply, MessagingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send((message, reply_tx))
            .await
            .map_err(|_| MessagingError::ReceiverMissing("controller".to_string()))?;
        reply_rx.await.map_err(|_| MessagingError::PortClosed)
    }
}

/// Serves control messages and runs one orchestrator task per session
pub struct Controller {
    orchestrator: Arc<Orchestrator>,
    receiver: mpsc::Receiver<ControlEnvelope>,
    sessions: HashMap<TabId, JoinHandle<SessionReport>>,
}

impl Controller {
    pub fn new(orchestrator: Arc<Orchestrator>) -> (Self, ControllerHandle) {
        let (handle, inbox) = ControllerHandle::channel();
        (Self::with_inbox(orchestrator, inbox), handle)
    }

    pub fn with_inbox(orchestrator: Arc<Orchestrator>, inbox: ControlInbox) -> Self {
        Self {
            orchestrator,
            receiver: inbox.receiver,
            sessions: HashMap::new(),
        }
    }

    /// Serves requests until every handle is dropped
    pub async fn run(mut self) {
        tracing::debug!("Controller started");
        while let Some((message, reply)) = self.receiver.recv().await {
            let response = self.handle(message).await;
            if reply.send(response).is_err() {
                tracing::debug!("Control reply dropped, requester went away");
            }
        }
        tracing::debug!("Controller stopped");
    }

    pub async fn handle(&mut self, message: ControlMessage) -> ControlReply {
        match message {
            ControlMessage::StartScrape(request) => self.start(request).await,
            ControlMessage::StopScrape { tab_id } => self.stop(tab_id).await,
            ControlMessage::GetState => {
                ControlReply::State(self.orchestrator.state().get_state().await)
            }
        }
    }

    async fn start(&mut self, request: ScrapeRequest) -> ControlReply {
        if self.orchestrator.config().scraper(&request.scraper_id).is_none() {
            let error = HarvestError::UnknownScraper(request.scraper_id);
            tracing::warn!("Start rejected: {}", error);
            return ControlReply::Rejected(error.to_string());
        }

        self.sessions.retain(|_, task| !task.is_finished());
        // one session record is shared by all tabs
        if let Some(running) = self.sessions.keys().next() {
            tracing::warn!(
                "Start on tab {} rejected, session on tab {} still running",
                request.tab_id,
                running
            );
            return ControlReply::Rejected(format!("a session is running on tab {}", running));
        }

        let session = self.orchestrator.state().get_state().await;
        if session.is_active {
            let owner = session
                .tab_id
                .map(|tab| tab.to_string())
                .unwrap_or_else(|| "?".to_string());
            tracing::warn!(
                "Start on tab {} rejected, state is active for tab {}",
                request.tab_id,
                owner
            );
            return ControlReply::Rejected(format!("a session is active on tab {}", owner));
        }

        // active before the reply, so a stop right behind it finds the session
        let tab_id = request.tab_id;
        if let Err(e) = self
            .orchestrator
            .state()
            .start_scraping(tab_id, &request.scraper_id)
            .await
        {
            tracing::error!("Failed to start session on tab {}: {}", tab_id, e);
            return ControlReply::Rejected(e.to_string());
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        let task = tokio::spawn(async move { orchestrator.run_started(request).await });
        self.sessions.insert(tab_id, task);
        ControlReply::Started
    }

    async fn stop(&mut self, tab_id: TabId) -> ControlReply {
        let state = self.orchestrator.state();
        if !state.get_state().await.is_active_for(tab_id) {
            return ControlReply::Rejected(format!("no session is active on tab {}", tab_id));
        }

        match state.stop_scraping().await {
            Ok(_) => {
                tracing::info!("Stop requested for tab {}", tab_id);
                ControlReply::Stopping
            }
            Err(e) => {
                tracing::error!("Failed to request stop: {}", e);
                ControlReply::Rejected(e.to_string())
            }
        }
    }

    /// Waits for the session task of `tab_id`, if there is one
    pub async fn join(&mut self, tab_id: TabId) -> Option<SessionReport> {
        let task = self.sessions.remove(&tab_id)?;
        match task.await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!("Session task on tab {} ended abnormally: {}", tab_id, e);
                None
            }
        }
    }
}
