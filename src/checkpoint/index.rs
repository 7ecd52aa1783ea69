// src/checkpoint/index.rs

//! Pure operations on the checkpoint index.

use chrono::Utc;
use tracing::warn;

use crate::checkpoint::model::{CheckpointIndex, CheckpointInfo, CheckpointStats};

impl CheckpointIndex {
    pub fn empty() -> Self {
        Self {
            checkpoints: Vec::new(),
            stats: CheckpointStats::default(),
            last_updated: Utc::now(),
        }
    }

    /// Parse a persisted index. A malformed one yields `None` so the caller
    /// can start from an empty index instead of failing.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        match serde_json::from_slice::<CheckpointIndex>(bytes) {
            Ok(mut index) => {
                index.sort();
                index.recompute_stats();
                Some(index)
            }
            Err(e) => {
                warn!(error = %e, "checkpoint index is malformed; starting from an empty index");
                None
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&CheckpointInfo> {
        self.checkpoints.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut CheckpointInfo> {
        self.checkpoints.iter_mut().find(|c| c.id == id)
    }

    /// Insert or replace the entry with the same id.
    pub fn upsert(&mut self, info: CheckpointInfo) {
        self.checkpoints.retain(|c| c.id != info.id);
        self.checkpoints.push(info);
        self.sort();
    }

    pub fn remove(&mut self, id: &str) -> Option<CheckpointInfo> {
        let pos = self.checkpoints.iter().position(|c| c.id == id)?;
        Some(self.checkpoints.remove(pos))
    }

    /// Newest first.
    fn sort(&mut self) {
        self.checkpoints
            .sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
    }

    /// Rebuild `stats` from the entries. Run after every mutation.
    pub fn recompute_stats(&mut self) {
        self.stats = CheckpointStats {
            total_count: self.checkpoints.len(),
            total_size: self.checkpoints.iter().map(|c| c.size).sum(),
            compressed_count: self.checkpoints.iter().filter(|c| c.compressed).count(),
            oldest_date: self.checkpoints.last().map(|c| c.timestamp),
            newest_date: self.checkpoints.first().map(|c| c.timestamp),
        };
    }
}
