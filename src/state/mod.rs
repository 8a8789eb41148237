//! State module for tracking the scraping session
//!
//! This module provides the session record shared between the controller and
//! the page contexts.
//!
//! # Components
//!
//! - `ScrapingSession`: The persisted session record (mode, counters, stop flag)
//! - `SessionPatch`: Partial update applied through a read-modify-write cycle
//! - `StateStore`: Serialized access, change notification and history
//! - `StateBackend`: The storage area the record lives in

mod backend;
mod session;
mod store;

// Re-export main types
pub use backend::{MemoryBackend, StateBackend};
pub use session::{ScrapingSession, SessionMode, SessionPatch};
pub use store::{StateChange, StateStore, STATE_KEY};

use thiserror::Error;

/// Errors raised by session state updates
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Storage backend failure: {0}")]
    Backend(String),

    #[error("Stop flag is latched until the session is reset")]
    StopLatched,

    #[error("{field} cannot decrease within a session ({from} -> {to})")]
    Regression {
        field: &'static str,
        from: u64,
        to: u64,
    },
}
