//! Message bus between the controller and the page contexts
//!
//! The bus owns the delivery policy (timeout, retry, validation, logging and
//! diagnostics). Transports underneath it only move a message once.

use crate::config::MessagingConfig;
use crate::messaging::diagnostics::{DeadLetter, Diagnostics, MessageStats};
use crate::messaging::retry::{with_retry, RetryFailure, RetryPolicy};
use crate::messaging::{
    ControlMessage, ControlReply, Message, MessageKind, MessagingError, PageRequest, PageResponse,
    PanelEvent,
};
use crate::TabId;
use async_trait::async_trait;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Raw delivery of page requests to the page context of a tab
#[async_trait]
pub trait TabTransport: Send + Sync {
    async fn deliver_to_tab(
        &self,
        tab_id: TabId,
        request: PageRequest,
    ) -> Result<PageResponse, MessagingError>;
}

/// Raw delivery of control messages to the controller
#[async_trait]
pub trait BackgroundTransport: Send + Sync {
    async fn deliver_to_background(
        &self,
        message: ControlMessage,
    ) -> Result<ControlReply, MessagingError>;
}

/// Per-send delivery options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOptions {
    /// Budget for a single attempt
    pub timeout: Duration,
    pub retry: Option<RetryPolicy>,
    /// Kind the message must have; anything else fails validation
    pub schema: Option<MessageKind>,
    /// Suppresses error logs for unexpected failures
    pub silent: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            retry: None,
            schema: None,
            silent: false,
        }
    }
}

impl SendOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.retry = None;
        self
    }

    pub fn expecting(mut self, kind: MessageKind) -> Self {
        self.schema = Some(kind);
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

impl From<&MessagingConfig> for SendOptions {
    fn from(config: &MessagingConfig) -> Self {
        let retry = (config.max_attempts > 1).then(|| RetryPolicy::from(config));
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            retry,
            ..Self::default()
        }
    }
}

/// Typed messaging between the two execution contexts
///
/// Clones share the routes and the diagnostics.
#[derive(Clone)]
pub struct MessageBus {
    tabs: Option<Arc<dyn TabTransport>>,
    background: Option<Arc<dyn BackgroundTransport>>,
    panel: Option<broadcast::Sender<PanelEvent>>,
    defaults: SendOptions,
    diagnostics: Arc<Diagnostics>,
}

/// Builder wiring the routes of a [`MessageBus`]
#[derive(Default)]
pub struct MessageBusBuilder {
    tabs: Option<Arc<dyn TabTransport>>,
    background: Option<Arc<dyn BackgroundTransport>>,
    panel: Option<broadcast::Sender<PanelEvent>>,
    defaults: SendOptions,
}

impl MessageBusBuilder {
    pub fn tabs(mut self, transport: Arc<dyn TabTransport>) -> Self {
        self.tabs = Some(transport);
        self
    }

    pub fn background(mut self, transport: Arc<dyn BackgroundTransport>) -> Self {
        self.background = Some(transport);
        self
    }

    pub fn panel(mut self, sender: broadcast::Sender<PanelEvent>) -> Self {
        self.panel = Some(sender);
        self
    }

    pub fn defaults(mut self, options: SendOptions) -> Self {
        self.defaults = options;
        self
    }

    pub fn build(self) -> MessageBus {
        MessageBus {
            tabs: self.tabs,
            background: self.background,
            panel: self.panel,
            defaults: self.defaults,
            diagnostics: Arc::new(Diagnostics::new()),
        }
    }
}

impl MessageBus {
    pub fn builder() -> MessageBusBuilder {
        MessageBusBuilder::default()
    }

    /// Options used when a caller has no specific needs
    pub fn default_options(&self) -> SendOptions {
        self.defaults.clone()
    }

    /// Sends a request to the page context of `tab_id` and awaits its reply
    ///
    /// # Arguments
    ///
    /// * `tab_id` - The tab whose page context should answer
    /// * `request` - The request to deliver
    /// * `options` - Timeout, retry, schema and logging options
    ///
    /// # Returns
    ///
    /// * `Ok(PageResponse)` - The page context answered
    /// * `Err(MessagingError)` - Delivery failed on every allowed attempt
    pub async fn send_to_tab(
        &self,
        tab_id: TabId,
        request: PageRequest,
        options: &SendOptions,
    ) -> Result<PageResponse, MessagingError> {
        let transport = match &self.tabs {
            Some(transport) => Arc::clone(transport),
            None => {
                let error = MessagingError::NotConnected("tab");
                self.record_failure(&request, Some(tab_id), &error, 0, options.silent);
                return Err(error);
            }
        };

        self.dispatch(&request, Some(tab_id), options, || {
            let transport = Arc::clone(&transport);
            let request = request.clone();
            async move {
                let response = transport.deliver_to_tab(tab_id, request.clone()).await?;
                if request.accepts(&response) {
                    Ok(response)
                } else {
                    Err(MessagingError::UnexpectedReply(format!(
                        "{:?} in reply to {}",
                        response,
                        request.kind()
                    )))
                }
            }
        })
        .await
    }

    /// Sends a control message to the controller and awaits its reply
    pub async fn send_to_background(
        &self,
        message: ControlMessage,
        options: &SendOptions,
    ) -> Result<ControlReply, MessagingError> {
        let transport = match &self.background {
            Some(transport) => Arc::clone(transport),
            None => {
                let error = MessagingError::NotConnected("background");
                self.record_failure(&message, None, &error, 0, options.silent);
                return Err(error);
            }
        };

        self.dispatch(&message, None, options, || {
            let transport = Arc::clone(&transport);
            let message = message.clone();
            async move { transport.deliver_to_background(message).await }
        })
        .await
    }

    /// Fire-and-forget delivery to a page context
    ///
    /// Runs on its own task; every failure is swallowed.
    pub fn notify_tab(&self, tab_id: TabId, request: PageRequest) {
        let bus = self.clone();
        let options = self.defaults.clone().without_retry().silent();
        tokio::spawn(async move {
            if let Err(e) = bus.send_to_tab(tab_id, request, &options).await {
                tracing::debug!("Notification to tab {} dropped: {}", tab_id, e);
            }
        });
    }

    /// Publishes an event to the control panel, if anyone listens
    pub fn notify_panel(&self, event: PanelEvent) {
        match &self.panel {
            Some(sender) => {
                if sender.send(event).is_err() {
                    tracing::debug!("No panel listener for event");
                }
            }
            None => tracing::debug!("Bus has no panel route, event dropped"),
        }
    }

    /// Subscribes to panel events
    pub fn subscribe_panel(&self) -> Option<broadcast::Receiver<PanelEvent>> {
        self.panel.as_ref().map(broadcast::Sender::subscribe)
    }

    pub fn stats(&self) -> MessageStats {
        self.diagnostics.stats()
    }

    pub fn reset_stats(&self) {
        self.diagnostics.reset_stats();
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.diagnostics.dead_letters()
    }

    pub fn clear_dead_letters(&self) {
        self.diagnostics.clear_dead_letters();
    }

    async fn dispatch<M, T, F, Fut>(
        &self,
        message: &M,
        tab_id: Option<TabId>,
        options: &SendOptions,
        mut deliver: F,
    ) -> Result<T, MessagingError>
    where
        M: Message,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, MessagingError>>,
    {
        let kind = message.kind();

        if let Err(error) = check_schema(message, options.schema) {
            self.record_failure(message, tab_id, &error, 0, options.silent);
            return Err(error);
        }

        let policy = options.retry.unwrap_or_default();
        let timeout = options.timeout;
        let started = Instant::now();

        let result = with_retry(policy, MessagingError::is_retryable, |attempt| {
            tracing::debug!("Sending {} (attempt {})", kind, attempt);
            let delivery = deliver();
            async move {
                match tokio::time::timeout(timeout, delivery).await {
                    Ok(result) => result,
                    Err(_) => Err(MessagingError::Timeout(timeout)),
                }
            }
        })
        .await;

        match result {
            Ok(reply) => {
                self.diagnostics.record_sent(kind, started.elapsed());
                Ok(reply)
            }
            Err(RetryFailure { error, attempts }) => {
                self.record_failure(message, tab_id, &error, attempts, options.silent);
                Err(error)
            }
        }
    }

    fn record_failure<M: Message>(
        &self,
        message: &M,
        tab_id: Option<TabId>,
        error: &MessagingError,
        attempts: u32,
        silent: bool,
    ) {
        let kind = message.kind();
        self.diagnostics.record_failed(kind);

        if error.is_expected() {
            tracing::debug!("{} not delivered: {}", kind, error);
            return;
        }

        if !silent {
            tracing::error!("{} failed after {} attempt(s): {}", kind, attempts, error);
        }

        self.diagnostics.push_dead_letter(DeadLetter {
            kind,
            tab_id,
            message: format!("{:?}", message),
            error: error.to_string(),
            attempts,
            at: Utc::now(),
        });
    }
}

fn check_schema<M: Message>(
    message: &M,
    schema: Option<MessageKind>,
) -> Result<(), MessagingError> {
    if let Some(expected) = schema {
        let actual = message.kind();
        if actual != expected {
            return Err(MessagingError::Validation(format!(
                "expected {} message, got {}",
                expected, actual
            )));
        }
    }
    message.validate().map_err(MessagingError::Validation)
}
