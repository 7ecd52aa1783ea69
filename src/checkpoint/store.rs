// src/checkpoint/store.rs

use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::checkpoint::model::{Checkpoint, CheckpointIndex, CheckpointInfo, CheckpointStats};
use crate::errors::{PhasedagError, Result};

/// Name of the index file under the storage root.
pub const INDEX_FILE: &str = "metadata.json";

/// Storage root used by [`CheckpointStore::with_default_root`].
pub const DEFAULT_ROOT: &str = ".phasedag/checkpoints";

const FILE_PREFIX: &str = "checkpoint-";
const PLAIN_EXT: &str = ".json";
const GZIP_EXT: &str = ".json.gz";

/// Result of an operation applied to many checkpoints where individual
/// failures do not stop the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub succeeded: usize,
    /// `(checkpoint id, error message)` for every item that failed.
    pub failures: Vec<(String, String)>,
}

impl BatchOutcome {
    /// Human-readable warning when anything failed.
    pub fn warning(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        let ids: Vec<&str> = self.failures.iter().map(|(id, _)| id.as_str()).collect();
        Some(format!(
            "{} checkpoint(s) could not be processed: {}",
            self.failures.len(),
            ids.join(", ")
        ))
    }
}

/// Retention settings applied by [`CheckpointStore::apply_retention`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub retention_days: Option<u32>,
    pub compress_after_days: Option<u32>,
    pub max_checkpoints: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub pruned: BatchOutcome,
    pub trimmed: BatchOutcome,
    pub compressed: BatchOutcome,
}

/// Durable checkpoint storage.
///
/// Layout under `root`:
///
/// ```text
/// metadata.json
/// 2025-01-31/checkpoint-<id>.json
/// 2025-01-31/checkpoint-<id>.json.gz
/// ```
///
/// Checkpoint files are read and written without coordination. Every
/// change to the index goes through `mutation_lock`, so two concurrent
/// saves can never both read the old index and lose one entry.
#[derive(Debug)]
pub struct CheckpointStore {
    root: PathBuf,
    cache: RwLock<Option<CheckpointIndex>>,
    /// Held only while the index is first read from disk.
    load_lock: Mutex<()>,
    mutation_lock: Mutex<()>,
}

impl CheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(None),
            load_lock: Mutex::new(()),
            mutation_lock: Mutex::new(()),
        }
    }

    /// Store rooted at [`DEFAULT_ROOT`] relative to the working directory.
    pub fn with_default_root() -> Self {
        Self::new(DEFAULT_ROOT)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn checkpoint_path(&self, id: &str, timestamp: DateTime<Utc>, compressed: bool) -> PathBuf {
        let ext = if compressed { GZIP_EXT } else { PLAIN_EXT };
        self.root
            .join(timestamp.format("%Y-%m-%d").to_string())
            .join(format!("{FILE_PREFIX}{id}{ext}"))
    }

    /// Create the storage root and load the index.
    pub async fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| PhasedagError::checkpoint("initialize", self.root.display().to_string(), e))?;
        let index = self.index().await?;
        info!(
            root = %self.root.display(),
            checkpoints = index.checkpoints.len(),
            "checkpoint store initialised"
        );
        Ok(())
    }

    // ----- index access -----------------------------------------------------

    /// Current index, reading it from disk on first use.
    async fn index(&self) -> Result<CheckpointIndex> {
        if let Some(index) = self.cache.read().await.as_ref() {
            return Ok(index.clone());
        }

        let _load = self.load_lock.lock().await;
        if let Some(index) = self.cache.read().await.as_ref() {
            return Ok(index.clone());
        }

        let index = match fs::read(self.index_path()).await {
            Ok(bytes) => CheckpointIndex::parse(&bytes).unwrap_or_else(CheckpointIndex::empty),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckpointIndex::empty(),
            Err(e) => return Err(PhasedagError::checkpoint("load index", INDEX_FILE, e)),
        };
        debug!(entries = index.checkpoints.len(), "loaded checkpoint index");

        *self.cache.write().await = Some(index.clone());
        Ok(index)
    }

    /// Read-modify-write of the index under the mutation lock.
    async fn mutate_index<F, R>(&self, mutate: F) -> Result<R>
    where
        F: FnOnce(&mut CheckpointIndex) -> R,
    {
        let _guard = self.mutation_lock.lock().await;

        let mut index = self.index().await?;
        let out = mutate(&mut index);
        index.recompute_stats();
        index.last_updated = Utc::now();

        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| PhasedagError::checkpoint("write index", INDEX_FILE, e))?;
        write_json_atomic(&self.index_path(), &index)
            .await
            .map_err(|e| PhasedagError::checkpoint("write index", INDEX_FILE, e))?;

        *self.cache.write().await = Some(index);
        Ok(out)
    }

    /// Path and compression state of a checkpoint file.
    ///
    /// The index only supplies a first guess; when the file it names is
    /// gone the date directories are scanned for either extension.
    async fn locate(&self, id: &str) -> Result<Option<(PathBuf, bool)>> {
        validate_id(id)?;
        if let Some(info) = self.index().await?.get(id) {
            let path = self.checkpoint_path(id, info.timestamp, info.compressed);
            if fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(Some((path, info.compressed)));
            }
            debug!(checkpoint_id = %id, path = %path.display(), "indexed path missing; scanning");
        }
        self.scan_for(id).await
    }

    async fn scan_for(&self, id: &str) -> Result<Option<(PathBuf, bool)>> {
        for dir in self.date_dirs().await? {
            for compressed in [true, false] {
                let ext = if compressed { GZIP_EXT } else { PLAIN_EXT };
                let candidate = dir.join(format!("{FILE_PREFIX}{id}{ext}"));
                if fs::try_exists(&candidate).await.unwrap_or(false) {
                    debug!(checkpoint_id = %id, path = %candidate.display(), "located checkpoint outside index");
                    return Ok(Some((candidate, compressed)));
                }
            }
        }
        Ok(None)
    }

    async fn date_dirs(&self) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(dirs),
            Err(e) => return Err(PhasedagError::checkpoint("scan", self.root.display().to_string(), e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PhasedagError::checkpoint("scan", self.root.display().to_string(), e))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    // ----- core operations --------------------------------------------------

    /// Write a checkpoint and record it in the index.
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<CheckpointInfo> {
        validate_id(&checkpoint.id)?;
        let id = checkpoint.id.as_str();
        let previous = self.locate(id).await?;

        let path = self.checkpoint_path(id, checkpoint.timestamp, false);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PhasedagError::checkpoint("save", id, e))?;
        }
        write_json_atomic(&path, checkpoint)
            .await
            .map_err(|e| PhasedagError::checkpoint("save", id, e))?;
        let size = file_size(&path)
            .await
            .map_err(|e| PhasedagError::checkpoint("save", id, e))?;

        if let Some((old_path, _)) = previous {
            if old_path != path {
                remove_if_exists(&old_path)
                    .await
                    .map_err(|e| PhasedagError::checkpoint("save", id, e))?;
            }
        }

        let info = CheckpointInfo::from_checkpoint(checkpoint, size, false);
        let entry = info.clone();
        self.mutate_index(move |index| index.upsert(entry)).await?;

        info!(checkpoint_id = %id, files = checkpoint.files.len(), size, "saved checkpoint");
        Ok(info)
    }

    /// Load a checkpoint, decompressing it if needed.
    pub async fn load(&self, id: &str) -> Result<Option<Checkpoint>> {
        let Some((mut path, mut compressed)) = self.locate(id).await? else {
            return Ok(None);
        };

        // A concurrent compress can swap the plaintext for the .gz between
        // locating and reading; follow the file once it moves.
        let bytes = loop {
            match fs::read(&path).await {
                Ok(bytes) => break bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => match self.scan_for(id).await? {
                    Some((moved, kind)) if moved != path => {
                        path = moved;
                        compressed = kind;
                    }
                    _ => {
                        warn!(checkpoint_id = %id, path = %path.display(), "checkpoint file is missing");
                        return Ok(None);
                    }
                },
                Err(e) => return Err(PhasedagError::checkpoint("load", id, e)),
            }
        };

        let json = if compressed {
            gunzip(&bytes).map_err(|e| PhasedagError::checkpoint("decompress", id, e))?
        } else {
            bytes
        };

        decode(&json, "load", id).map(Some)
    }

    /// Remove a checkpoint file and its index entry.
    ///
    /// Returns `false` if there was nothing to delete.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let located = self.locate(id).await?;
        let removed_file = match &located {
            Some((path, _)) => remove_if_exists(path)
                .await
                .map_err(|e| PhasedagError::checkpoint("delete", id, e))?,
            None => false,
        };

        let removed_entry = self
            .mutate_index(|index| index.remove(id).is_some())
            .await?;

        if removed_file || removed_entry {
            info!(checkpoint_id = %id, "deleted checkpoint");
        }
        Ok(removed_file || removed_entry)
    }

    /// Gzip a checkpoint in place. One-way; compressing an already
    /// compressed checkpoint does nothing and returns `false`.
    pub async fn compress(&self, id: &str) -> Result<bool> {
        let Some((path, compressed)) = self.locate(id).await? else {
            return Err(PhasedagError::checkpoint(
                "compress",
                id,
                std::io::Error::new(std::io::ErrorKind::NotFound, "checkpoint not found"),
            ));
        };
        if compressed {
            debug!(checkpoint_id = %id, "checkpoint already compressed");
            let size = file_size(&path)
                .await
                .map_err(|e| PhasedagError::checkpoint("compress", id, e))?;
            self.mark_compressed(id, size).await?;
            return Ok(false);
        }

        let plain = fs::read(&path)
            .await
            .map_err(|e| PhasedagError::checkpoint("compress", id, e))?;
        let checkpoint: Checkpoint = decode(&plain, "compress", id)?;
        let packed = gzip(&plain).map_err(|e| PhasedagError::checkpoint("compress", id, e))?;

        let gz_path = self.checkpoint_path(id, checkpoint.timestamp, true);
        write_atomic(&gz_path, &packed)
            .await
            .map_err(|e| PhasedagError::checkpoint("compress", id, e))?;
        let size = file_size(&gz_path)
            .await
            .map_err(|e| PhasedagError::checkpoint("compress", id, e))?;

        // Index first: until the plaintext is removed both files are valid.
        self.mutate_index(move |index| match index.get_mut(&checkpoint.id) {
            Some(info) => {
                info.size = size;
                info.compressed = true;
            }
            None => index.upsert(CheckpointInfo::from_checkpoint(&checkpoint, size, true)),
        })
        .await?;
        remove_if_exists(&path)
            .await
            .map_err(|e| PhasedagError::checkpoint("compress", id, e))?;

        info!(
            checkpoint_id = %id,
            original = plain.len(),
            compressed = size,
            "compressed checkpoint"
        );
        Ok(true)
    }

    /// Bring an index entry in line with a `.gz` file found on disk.
    async fn mark_compressed(&self, id: &str, size: u64) -> Result<()> {
        let stale = self
            .index()
            .await?
            .get(id)
            .is_some_and(|info| !info.compressed || info.size != size);
        if !stale {
            return Ok(());
        }
        self.mutate_index(|index| {
            if let Some(info) = index.get_mut(id) {
                info.compressed = true;
                info.size = size;
            }
        })
        .await?;
        info!(checkpoint_id = %id, "index entry repaired to match compressed file");
        Ok(())
    }

    // ----- queries ----------------------------------------------------------

    pub async fn get_checkpoint_info(&self, id: &str) -> Result<Option<CheckpointInfo>> {
        Ok(self.index().await?.get(id).cloned())
    }

    pub async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.locate(id).await?.is_some())
    }

    /// Index entries, newest first.
    pub async fn list_info(&self) -> Result<Vec<CheckpointInfo>> {
        Ok(self.index().await?.checkpoints)
    }

    pub async fn get_stats(&self) -> Result<CheckpointStats> {
        Ok(self.index().await?.stats)
    }

    // ----- bulk maintenance -------------------------------------------------

    /// Delete every checkpoint with `timestamp < cutoff`.
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<BatchOutcome> {
        let ids: Vec<String> = self
            .list_info()
            .await?
            .into_iter()
            .filter(|c| c.timestamp < cutoff)
            .map(|c| c.id)
            .collect();

        let outcome = self.delete_each(ids).await;
        info!(removed = outcome.succeeded, failed = outcome.failures.len(), %cutoff, "pruned old checkpoints");
        Ok(outcome)
    }

    /// Keep the `max` newest checkpoints and delete the rest.
    pub async fn prune_to_max_count(&self, max: usize) -> Result<BatchOutcome> {
        let ids: Vec<String> = self
            .list_info()
            .await?
            .into_iter()
            .skip(max)
            .map(|c| c.id)
            .collect();

        let outcome = self.delete_each(ids).await;
        if outcome.succeeded > 0 {
            info!(removed = outcome.succeeded, max, "trimmed checkpoints to maximum count");
        }
        Ok(outcome)
    }

    /// Compress every uncompressed checkpoint with `timestamp < cutoff`.
    pub async fn compress_older_than(&self, cutoff: DateTime<Utc>) -> Result<BatchOutcome> {
        let ids: Vec<String> = self
            .list_info()
            .await?
            .into_iter()
            .filter(|c| !c.compressed && c.timestamp < cutoff)
            .map(|c| c.id)
            .collect();

        let mut outcome = BatchOutcome::default();
        for id in ids {
            match self.compress(&id).await {
                Ok(_) => outcome.succeeded += 1,
                Err(e) => {
                    warn!(checkpoint_id = %id, error = %e, "failed to compress checkpoint");
                    outcome.failures.push((id, e.to_string()));
                }
            }
        }
        if let Some(warning) = outcome.warning() {
            warn!("{warning}");
        }
        Ok(outcome)
    }

    async fn delete_each(&self, ids: Vec<String>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for id in ids {
            match self.delete(&id).await {
                Ok(true) => outcome.succeeded += 1,
                Ok(false) => debug!(checkpoint_id = %id, "checkpoint already gone"),
                Err(e) => {
                    warn!(checkpoint_id = %id, error = %e, "failed to delete checkpoint");
                    outcome.failures.push((id, e.to_string()));
                }
            }
        }
        if let Some(warning) = outcome.warning() {
            warn!("{warning}");
        }
        outcome
    }

    /// Age pruning, then count trimming, then age-based compression.
    pub async fn apply_retention(&self, now: DateTime<Utc>, policy: &RetentionPolicy) -> Result<RetentionReport> {
        let mut report = RetentionReport::default();
        if let Some(days) = policy.retention_days {
            report.pruned = self
                .prune_older_than(now - Duration::days(i64::from(days)))
                .await?;
        }
        if let Some(max) = policy.max_checkpoints {
            report.trimmed = self.prune_to_max_count(max).await?;
        }
        if let Some(days) = policy.compress_after_days {
            report.compressed = self
                .compress_older_than(now - Duration::days(i64::from(days)))
                .await?;
        }
        Ok(report)
    }

    /// Drop index entries whose checkpoint file no longer exists.
    pub async fn cleanup_stale_entries(&self) -> Result<usize> {
        let mut stale = Vec::new();
        for info in self.list_info().await? {
            let path = self.checkpoint_path(&info.id, info.timestamp, info.compressed);
            if !fs::try_exists(&path).await.unwrap_or(false) {
                stale.push(info.id);
            }
        }
        if stale.is_empty() {
            return Ok(0);
        }

        let removed = self
            .mutate_index(|index| {
                stale
                    .iter()
                    .filter(|id| index.remove(id).is_some())
                    .count()
            })
            .await?;
        warn!(removed, "removed stale checkpoint index entries");
        Ok(removed)
    }

    /// Replace the index with one built by reading every checkpoint file.
    ///
    /// Explicit recovery path for a lost or corrupted index; never run
    /// implicitly. Unreadable files are skipped with a warning.
    pub async fn rebuild_index_from_disk(&self) -> Result<usize> {
        let mut entries = Vec::new();

        for dir in self.date_dirs().await? {
            let mut listing = fs::read_dir(&dir)
                .await
                .map_err(|e| PhasedagError::checkpoint("rebuild", dir.display().to_string(), e))?;
            while let Some(entry) = listing
                .next_entry()
                .await
                .map_err(|e| PhasedagError::checkpoint("rebuild", dir.display().to_string(), e))?
            {
                let path = entry.path();
                let Some(compressed) = checkpoint_file_kind(&path) else {
                    continue;
                };
                match read_checkpoint_file(&path, compressed).await {
                    Ok((checkpoint, size)) => {
                        entries.push(CheckpointInfo::from_checkpoint(&checkpoint, size, compressed));
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping unreadable checkpoint file");
                    }
                }
            }
        }

        let count = entries.len();
        self.mutate_index(move |index| {
            index.checkpoints.clear();
            for info in entries {
                index.upsert(info);
            }
        })
        .await?;

        info!(count, "rebuilt checkpoint index from disk");
        Ok(count)
    }
}

fn decode(json: &[u8], operation: &'static str, id: &str) -> Result<Checkpoint> {
    serde_json::from_slice(json).map_err(|e| PhasedagError::checkpoint(operation, id, e.into()))
}

fn validate_id(id: &str) -> Result<()> {
    let bad = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\'])
        || id.chars().any(char::is_control);
    if bad {
        return Err(PhasedagError::InvalidCheckpointId(id.to_string()));
    }
    Ok(())
}

/// `Some(compressed)` if `path` names a checkpoint file.
fn checkpoint_file_kind(path: &Path) -> Option<bool> {
    let name = path.file_name()?.to_str()?;
    if !name.starts_with(FILE_PREFIX) {
        return None;
    }
    if name.ends_with(GZIP_EXT) {
        Some(true)
    } else if name.ends_with(PLAIN_EXT) {
        Some(false)
    } else {
        None
    }
}

async fn read_checkpoint_file(path: &Path, compressed: bool) -> anyhow::Result<(Checkpoint, u64)> {
    let bytes = fs::read(path).await?;
    let size = bytes.len() as u64;
    let json = if compressed { gunzip(&bytes)? } else { bytes };
    Ok((serde_json::from_slice(&json)?, size))
}

/// Write to `<path>.tmp`, then rename over `path`.
async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp: OsString = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json).await
}

async fn file_size(path: &Path) -> std::io::Result<u64> {
    Ok(fs::metadata(path).await?.len())
}

async fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

fn gunzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}
