// src/checkpoint/hash.rs

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::checkpoint::model::{Checkpoint, FileSnapshot};

/// Hex-encoded SHA-256 of `content`.
pub fn calculate_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Recompute the snapshot's hash and compare it with the stored one.
pub fn verify_file_snapshot(snapshot: &FileSnapshot) -> bool {
    let actual = calculate_hash(snapshot.content.as_bytes());
    if actual != snapshot.hash {
        warn!(
            path = %snapshot.path,
            expected = %snapshot.hash,
            actual = %actual,
            "file snapshot hash mismatch"
        );
        return false;
    }
    true
}

/// Paths of every snapshot in `checkpoint` whose hash does not verify.
pub fn verify_checkpoint(checkpoint: &Checkpoint) -> Vec<String> {
    checkpoint
        .files
        .iter()
        .filter(|f| !verify_file_snapshot(f))
        .map(|f| f.path.clone())
        .collect()
}
