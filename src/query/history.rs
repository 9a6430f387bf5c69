//! Query history
//!
//! A bounded, newest-first log of statements that reached the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of entries kept
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// One executed statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryHistoryEntry {
    pub query: String,
    pub executed_at: DateTime<Utc>,
}

/// Newest-first bounded log
#[derive(Debug, Clone)]
pub struct QueryHistory {
    entries: VecDeque<QueryHistoryEntry>,
    limit: usize,
}

impl QueryHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(limit),
            limit,
        }
    }

    /// Insert at the front, evicting the oldest entries past the limit
    pub fn record(&mut self, query: impl Into<String>, executed_at: DateTime<Utc>) {
        self.entries.push_front(QueryHistoryEntry {
            query: query.into(),
            executed_at,
        });
        self.entries.truncate(self.limit);
    }

    /// Entries, most recent first
    pub fn entries(&self) -> impl Iterator<Item = &QueryHistoryEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&QueryHistoryEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

}

impl Default for QueryHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}
