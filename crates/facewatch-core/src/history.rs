//! Bounded record of recent detection cycles.

use crate::types::RecognizedFace;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// Number of cycles kept.
pub const HISTORY_CAPACITY: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub faces: Vec<RecognizedFace>,
}

/// Most recent cycles that produced at least one face, newest first.
#[derive(Debug, Clone)]
pub struct DetectionHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl Default for DetectionHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl DetectionHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a cycle. Cycles without faces are ignored.
    pub fn record(&mut self, at: DateTime<Utc>, faces: &[RecognizedFace]) {
        if faces.is_empty() || self.capacity == 0 {
            return;
        }
        self.entries.push_front(HistoryEntry {
            at,
            faces: faces.to_vec(),
        });
        self.entries.truncate(self.capacity);
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
