//! Delivery statistics and the dead-letter queue
//!
//! Only unexpected failures end up as dead letters; a page context that is
//! simply gone is part of normal operation and only shows in the counters.

use crate::messaging::MessageKind;
use crate::TabId;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Maximum number of dead letters kept
pub const DEAD_LETTER_CAPACITY: usize = 50;

/// A message that could not be delivered for an unexpected reason
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub kind: MessageKind,
    pub tab_id: Option<TabId>,
    /// Debug rendering of the payload
    pub message: String,
    pub error: String,
    pub attempts: u32,
    pub at: DateTime<Utc>,
}

/// Counters for one message kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindStats {
    pub sent: u64,
    pub failed: u64,
    pub total_latency: Duration,
}

impl KindStats {
    pub fn avg_latency(&self) -> Duration {
        average(self.total_latency, self.sent)
    }
}

/// Snapshot of the bus counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageStats {
    pub sent: u64,
    pub failed: u64,
    pub total_latency: Duration,
    pub by_kind: BTreeMap<MessageKind, KindStats>,
}

impl MessageStats {
    pub fn avg_latency(&self) -> Duration {
        average(self.total_latency, self.sent)
    }
}

fn average(total: Duration, count: u64) -> Duration {
    match u32::try_from(count) {
        Ok(0) => Duration::ZERO,
        Ok(n) => total / n,
        Err(_) => Duration::from_secs_f64(total.as_secs_f64() / count as f64),
    }
}

/// Shared diagnostics sink for one bus and all its clones
#[derive(Debug, Default)]
pub struct Diagnostics {
    stats: Mutex<MessageStats>,
    dead_letters: Mutex<VecDeque<DeadLetter>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self, kind: MessageKind, latency: Duration) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.sent += 1;
        stats.total_latency += latency;

        let entry = stats.by_kind.entry(kind).or_default();
        entry.sent += 1;
        entry.total_latency += latency;
    }

    pub fn record_failed(&self, kind: MessageKind) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.failed += 1;
        stats.by_kind.entry(kind).or_default().failed += 1;
    }

    pub fn push_dead_letter(&self, letter: DeadLetter) {
        let mut queue = self
            .dead_letters
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        queue.push_back(letter);
        while queue.len() > DEAD_LETTER_CAPACITY {
            queue.pop_front();
        }
    }

    pub fn stats(&self) -> MessageStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reset_stats(&self) {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner) = MessageStats::default();
    }

    /// Dead letters, oldest first
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear_dead_letters(&self) {
        self.dead_letters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
