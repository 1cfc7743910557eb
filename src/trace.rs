use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use serde::{Deserialize, Serialize};

use crate::registry::ProviderKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum CallOutcome {
    Success,
    Failure(String),
}

/// One `respond` call as seen by the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub shorthand:  String,
    pub provider:   ProviderKind,
    pub model_id:   String,
    pub started_at: DateTime<Utc>,
    pub latency_ms: u64,
    pub outcome:    CallOutcome,
}

impl CallRecord {
    pub fn is_success(&self) -> bool {
        self.outcome == CallOutcome::Success
    }
}

pub const DEFAULT_TRACE_CAPACITY: usize = 256;

/// The most recent calls of one agent, oldest first.
///
/// Holds at most `capacity` records; recording past that evicts the oldest.
/// A capacity of zero records nothing.
#[derive(Debug, Clone)]
pub struct Trace {
    entries:  VecDeque<CallRecord>,
    capacity: usize,
    evicted:  u64,
}

impl Default for Trace {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TRACE_CAPACITY)
    }
}

impl Trace {
    pub fn new() -> Self { Self::default() }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: VecDeque::with_capacity(capacity.min(DEFAULT_TRACE_CAPACITY)), capacity, evicted: 0 }
    }

    pub fn record(&mut self, entry: CallRecord) {
        if self.capacity == 0 {
            self.evicted += 1;
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &CallRecord> {
        self.entries.iter()
    }

    pub fn get(&self, index: usize) -> Option<&CallRecord> {
        self.entries.get(index)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records dropped to stay within capacity since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Moves the held records out, leaving an empty trace with the same capacity.
    pub fn take(&mut self) -> Trace {
        let mut taken = Trace::with_capacity(self.capacity);
        taken.entries = std::mem::take(&mut self.entries);
        taken.evicted = std::mem::take(&mut self.evicted);
        taken
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn failures(&self) -> Vec<&CallRecord> {
        self.entries.iter().filter(|e| !e.is_success()).collect()
    }

    /// Serializes the trace to a pretty-printed JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.entries)
            .unwrap_or_else(|_| "[]".to_string())
    }
}
