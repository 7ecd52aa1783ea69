// src/checkpoint/model.rs

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkpoint::hash::calculate_hash;
use crate::errors::{PhasedagError, Result};

/// Content of one file at checkpoint time.
///
/// `hash` is the hex SHA-256 of `content`. It is checked only when a
/// caller asks (see [`crate::checkpoint::verify_file_snapshot`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub path: String,
    pub content: String,
    pub hash: String,
}

impl FileSnapshot {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let hash = calculate_hash(content.as_bytes());
        Self {
            path: path.into(),
            content,
            hash,
        }
    }

    /// Read a file from disk into a snapshot.
    pub async fn capture(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            PhasedagError::checkpoint("capture", path.display().to_string(), e)
        })?;
        Ok(Self::new(path.to_string_lossy(), content))
    }
}

/// One turn of the conversation that led up to the checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationEntry {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A full snapshot of execution state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    pub files: Vec<FileSnapshot>,
    #[serde(default)]
    pub conversation_state: Vec<ConversationEntry>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

static ID_COUNTER: AtomicU32 = AtomicU32::new(0);

impl Checkpoint {
    pub fn new(id: impl Into<String>, description: impl Into<String>, files: Vec<FileSnapshot>) -> Self {
        Self {
            id: id.into(),
            timestamp: Utc::now(),
            description: description.into(),
            files,
            conversation_state: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Time-ordered id that is unique within this process.
    pub fn generate_id() -> String {
        let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:04}", Utc::now().format("%Y%m%dT%H%M%S%3f"), seq % 10_000)
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_conversation(mut self, entries: Vec<ConversationEntry>) -> Self {
        self.conversation_state = entries;
        self
    }

    pub fn files_changed(&self) -> Vec<String> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }
}

/// Index entry for one checkpoint; enough to list and locate it without
/// reading the checkpoint file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointInfo {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub files_changed: Vec<String>,
    /// Bytes on disk, compressed size once compressed.
    pub size: u64,
    pub compressed: bool,
}

impl CheckpointInfo {
    pub fn from_checkpoint(checkpoint: &Checkpoint, size: u64, compressed: bool) -> Self {
        Self {
            id: checkpoint.id.clone(),
            timestamp: checkpoint.timestamp,
            description: checkpoint.description.clone(),
            files_changed: checkpoint.files_changed(),
            size,
            compressed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointStats {
    pub total_count: usize,
    pub total_size: u64,
    pub compressed_count: usize,
    pub oldest_date: Option<DateTime<Utc>>,
    pub newest_date: Option<DateTime<Utc>>,
}

/// Cached directory of every checkpoint, newest first.
///
/// Derived from the checkpoint files; losing it loses nothing but speed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointIndex {
    pub checkpoints: Vec<CheckpointInfo>,
    pub stats: CheckpointStats,
    pub last_updated: DateTime<Utc>,
}
