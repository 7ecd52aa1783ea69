// src/checkpoint/mod.rs

//! Crash-recoverable snapshots of execution state.
//!
//! - [`model`] defines checkpoints, file snapshots and the index types.
//! - [`hash`] computes and verifies SHA-256 content hashes.
//! - [`index`] holds pure operations on the cached index.
//! - [`store`] is the on-disk [`CheckpointStore`].

pub mod hash;
pub mod index;
pub mod model;
pub mod store;

pub use hash::{calculate_hash, verify_checkpoint, verify_file_snapshot};
pub use model::{
    Checkpoint, CheckpointIndex, CheckpointInfo, CheckpointStats, ConversationEntry, FileSnapshot,
};
pub use store::{BatchOutcome, CheckpointStore, RetentionPolicy, RetentionReport};
