//! Messaging between the controller and the page contexts
//!
//! This module handles every message crossing the context boundary:
//! - Typed request/response payloads and their validation
//! - The message bus with timeout, retry and schema checks
//! - Fire-and-forget notifications for the overlay and the control panel
//! - Delivery statistics and a dead-letter queue

mod bus;
mod diagnostics;
mod message;
mod retry;

pub use bus::{BackgroundTransport, MessageBus, MessageBusBuilder, SendOptions, TabTransport};
pub use diagnostics::{DeadLetter, Diagnostics, KindStats, MessageStats, DEAD_LETTER_CAPACITY};
pub use message::{
    ControlMessage, ControlReply, ExtractionOutcome, Message, MessageKind, PageRequest,
    PageResponse, PanelEvent, Progress, ScrapeRequest,
};
pub use retry::{with_retry, RetryFailure, RetryPolicy};

use crate::TabId;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while delivering a message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagingError {
    #[error("No tab with id {0}")]
    NoSuchTab(TabId),

    #[error("Receiving end does not exist: {0}")]
    ReceiverMissing(String),

    #[error("Message port closed before a response was received")]
    PortClosed,

    #[error("Could not establish connection to tab {0}")]
    ConnectFailed(TabId),

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Invalid message: {0}")]
    Validation(String),

    #[error("Receiver reported an error: {0}")]
    Remote(String),

    #[error("Bus has no {0} route")]
    NotConnected(&'static str),

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),
}

impl MessagingError {
    /// Failures that are part of normal operation: the other side is not
    /// there yet, went away, or is between two pages
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::NoSuchTab(_)
                | Self::ReceiverMissing(_)
                | Self::PortClosed
                | Self::ConnectFailed(_)
        )
    }

    /// Failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::ConnectFailed(_))
    }
}
