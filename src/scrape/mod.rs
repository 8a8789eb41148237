//! Scrape module: the controller-side session machinery
//!
//! This module handles everything a session does between a start request
//! and its result:
//! - Per-page dwell timing and page-to-page navigation
//! - The orchestrating loop with its stop checkpoints
//! - The shared end-of-session cleanup
//! - The controller that accepts start/stop requests and owns session tasks

mod cleanup;
mod controller;
mod delay;
mod navigator;
mod orchestrator;

#[cfg(test)]
pub(crate) mod testing;

pub use cleanup::Cleanup;
pub use controller::{ControlInbox, Controller, ControllerHandle};
pub use delay::DelayTimer;
pub use navigator::{PageLoad, PageNavigator};
pub use orchestrator::{Checkpoint, Orchestrator, SessionReport, SessionStatus};
