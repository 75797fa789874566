// ============================================================
// Layer 3 - Checkpoint Selection Policy
// ============================================================
// Keeps the K best model snapshots seen so far, ranked by the
// monitored validation metric.
//
// The monitored channel is called "Val Dice" but it carries the
// Dice LOSS, so lower is better and the list is sorted ascending.
//
// Example with K = 2, metrics arriving as 0.5, 0.3, 0.4, 0.2:
//   0.5 -> [0.5]
//   0.3 -> [0.3, 0.5]
//   0.4 -> [0.3, 0.4]        (0.5 evicted)
//   0.2 -> [0.2, 0.3]        (0.4 evicted)

use serde::{Deserialize, Serialize};

/// Metric channel the policy ranks on.
pub const MONITOR: &str = "Val Dice";

/// One retained (or candidate) model snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// 1-based epoch the snapshot was taken after
    pub epoch: usize,

    /// Epoch-level validation Dice loss
    pub metric: f64,

    /// File name of the persisted weights, relative to the store
    pub file: String,
}

impl CheckpointRecord {
    pub fn new(epoch: usize, metric: f64, file: impl Into<String>) -> Self {
        Self {
            epoch,
            metric,
            file: file.into(),
        }
    }
}

/// Outcome of offering a candidate to the policy.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Candidate was inserted; `evicted` is the record that fell off the end, if any.
    Retained { evicted: Option<CheckpointRecord> },

    /// Candidate was not good enough and is handed back.
    Rejected(CheckpointRecord),
}

/// Ranked list of at most `capacity` checkpoints, best (lowest metric) first.
#[derive(Debug, Clone)]
pub struct TopKCheckpoints {
    capacity: usize,
    records:  Vec<CheckpointRecord>,
}

impl TopKCheckpoints {
    /// Create an empty policy.
    ///
    /// # Panics
    /// Panics if `capacity` is zero: nothing could ever be retained.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "checkpoint capacity must be at least 1");
        Self {
            capacity,
            records: Vec::with_capacity(capacity + 1),
        }
    }

    /// Whether a candidate with this metric would be inserted.
    pub fn would_admit(&self, metric: f64) -> bool {
        if !metric.is_finite() {
            return false;
        }
        if self.records.len() < self.capacity {
            return true;
        }
        self.worst().map_or(true, |worst| metric < worst.metric)
    }

    /// Offer a candidate. Inserts it in sorted position and evicts the
    /// worst record if the list grows beyond capacity.
    pub fn offer(&mut self, candidate: CheckpointRecord) -> Admission {
        if !self.would_admit(candidate.metric) {
            return Admission::Rejected(candidate);
        }

        // Equal metrics keep arrival order.
        let pos = self
            .records
            .partition_point(|r| r.metric <= candidate.metric);
        self.records.insert(pos, candidate);

        let evicted = if self.records.len() > self.capacity {
            self.records.pop()
        } else {
            None
        };
        Admission::Retained { evicted }
    }

    /// Retained records, best first.
    pub fn records(&self) -> &[CheckpointRecord] {
        &self.records
    }

    pub fn best(&self) -> Option<&CheckpointRecord> {
        self.records.first()
    }

    pub fn worst(&self) -> Option<&CheckpointRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
