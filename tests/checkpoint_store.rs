// tests/checkpoint_store.rs

use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use phasedag::checkpoint::store::INDEX_FILE;
use phasedag::checkpoint::{
    Checkpoint, CheckpointStore, ConversationEntry, FileSnapshot, RetentionPolicy,
    calculate_hash, verify_checkpoint, verify_file_snapshot,
};
use phasedag::errors::PhasedagError;
use phasedag_test_utils::temp_store;

async fn store() -> (TempDir, CheckpointStore) {
    temp_store().await
}

fn checkpoint(id: &str, days_ago: i64) -> Checkpoint {
    Checkpoint::new(
        id,
        format!("checkpoint {id}"),
        vec![FileSnapshot::new("x.ts", format!("content of {id}"))],
    )
    .with_timestamp(Utc::now() - Duration::days(days_ago))
}

async fn assert_index_consistent(store: &CheckpointStore) {
    let infos = store.list_info().await.unwrap();
    let stats = store.get_stats().await.unwrap();
    assert_eq!(stats.total_count, infos.len());
    assert_eq!(stats.total_size, infos.iter().map(|i| i.size).sum::<u64>());
    assert_eq!(stats.compressed_count, infos.iter().filter(|i| i.compressed).count());
}

#[test]
fn hash_is_sha256_hex() {
    assert_eq!(
        calculate_hash(b"hello"),
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );

    let mut snapshot = FileSnapshot::new("x.ts", "hello");
    assert!(verify_file_snapshot(&snapshot));
    snapshot.content.push('!');
    assert!(!verify_file_snapshot(&snapshot));
}

#[tokio::test]
async fn save_then_load_round_trips() {
    let (_dir, store) = store().await;
    let cp = Checkpoint::new("cp1", "first", vec![FileSnapshot::new("x.ts", "hello")])
        .with_conversation(vec![ConversationEntry::new("user", "do the thing")]);

    let info = store.save(&cp).await.unwrap();
    assert_eq!(info.id, "cp1");
    assert_eq!(info.files_changed, vec!["x.ts"]);
    assert!(!info.compressed);
    assert!(info.size > 0);

    let loaded = store.load("cp1").await.unwrap().expect("checkpoint exists");
    assert_eq!(loaded, cp);
    assert_eq!(loaded.files[0].hash, calculate_hash(b"hello"));
    assert!(verify_file_snapshot(&loaded.files[0]));
    assert!(verify_checkpoint(&loaded).is_empty());
    assert!(store.exists("cp1").await.unwrap());
}

#[tokio::test]
async fn files_land_in_date_directories_with_an_index() {
    let (dir, store) = store().await;
    let cp = checkpoint("dated", 0);
    store.save(&cp).await.unwrap();

    let root = dir.path().join("checkpoints");
    let day = cp.timestamp.format("%Y-%m-%d").to_string();
    assert!(root.join(&day).join("checkpoint-dated.json").is_file());
    assert!(root.join(INDEX_FILE).is_file());

    let leftovers: Vec<_> = std::fs::read_dir(root.join(&day))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "no temp files left behind");
}

#[tokio::test]
async fn missing_checkpoints_load_as_none() {
    let (_dir, store) = store().await;
    assert!(store.load("nope").await.unwrap().is_none());
    assert!(!store.exists("nope").await.unwrap());
    assert!(!store.delete("nope").await.unwrap());
    assert!(store.get_checkpoint_info("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn ids_that_escape_the_root_are_rejected() {
    let (_dir, store) = store().await;
    let cp = Checkpoint::new("../evil", "bad", vec![]);
    assert!(matches!(
        store.save(&cp).await,
        Err(PhasedagError::InvalidCheckpointId(_))
    ));
    assert!(store.load("a/b").await.is_err());
}

#[tokio::test]
async fn compression_keeps_content_and_is_one_way() {
    let (dir, store) = store().await;
    let cp = checkpoint("cp2", 0);
    store.save(&cp).await.unwrap();

    assert!(store.compress("cp2").await.unwrap());
    let info = store.get_checkpoint_info("cp2").await.unwrap().unwrap();
    assert!(info.compressed);

    let day = cp.timestamp.format("%Y-%m-%d").to_string();
    let gz = dir.path().join("checkpoints").join(&day).join("checkpoint-cp2.json.gz");
    assert!(gz.is_file());
    assert!(!gz.with_extension("").is_file(), "plaintext removed");
    assert_eq!(info.size, std::fs::metadata(&gz).unwrap().len());

    assert_eq!(store.load("cp2").await.unwrap().unwrap(), cp);
    assert!(!store.compress("cp2").await.unwrap(), "second compress is a no-op");
    assert_eq!(store.load("cp2").await.unwrap().unwrap(), cp);
    assert_index_consistent(&store).await;
}

#[tokio::test]
async fn compressing_an_unknown_checkpoint_fails_with_context() {
    let (_dir, store) = store().await;
    match store.compress("ghost").await {
        Err(PhasedagError::Checkpoint { operation, id, .. }) => {
            assert_eq!(operation, "compress");
            assert_eq!(id, "ghost");
        }
        other => panic!("Expected Checkpoint error, got: {:?}", other),
    }
}

#[tokio::test]
async fn prune_removes_exactly_the_older_checkpoints() {
    let (_dir, store) = store().await;
    for (id, days) in [("t10", 10), ("t5", 5), ("t1", 1)] {
        store.save(&checkpoint(id, days)).await.unwrap();
    }

    let outcome = store.prune_older_than(Utc::now() - Duration::days(7)).await.unwrap();
    assert_eq!(outcome.succeeded, 1);
    assert!(outcome.warning().is_none());

    let ids: Vec<String> = store.list_info().await.unwrap().into_iter().map(|i| i.id).collect();
    assert_eq!(ids, vec!["t1", "t5"], "newest first");
    assert!(store.load("t10").await.unwrap().is_none());
    assert_index_consistent(&store).await;
}

#[tokio::test]
async fn prune_boundary_is_exclusive() {
    let (_dir, store) = store().await;
    let cutoff = Utc::now() - Duration::days(3);
    store.save(&Checkpoint::new("at", "", vec![]).with_timestamp(cutoff)).await.unwrap();
    store
        .save(&Checkpoint::new("before", "", vec![]).with_timestamp(cutoff - Duration::milliseconds(1)))
        .await
        .unwrap();

    let outcome = store.prune_older_than(cutoff).await.unwrap();
    assert_eq!(outcome.succeeded, 1);
    assert!(store.exists("at").await.unwrap());
    assert!(!store.exists("before").await.unwrap());
}

#[tokio::test]
async fn stats_track_every_mutation() {
    let (_dir, store) = store().await;
    for (id, days) in [("a", 3), ("b", 2), ("c", 1)] {
        store.save(&checkpoint(id, days)).await.unwrap();
        assert_index_consistent(&store).await;
    }
    store.compress("b").await.unwrap();
    assert_index_consistent(&store).await;
    store.delete("a").await.unwrap();
    assert_index_consistent(&store).await;

    let stats = store.get_stats().await.unwrap();
    assert_eq!(stats.total_count, 2);
    assert_eq!(stats.compressed_count, 1);
    let infos = store.list_info().await.unwrap();
    assert_eq!(stats.newest_date, Some(infos[0].timestamp));
    assert_eq!(stats.oldest_date, Some(infos[1].timestamp));
}

#[tokio::test]
async fn resaving_an_id_replaces_the_entry() {
    let (_dir, store) = store().await;
    store.save(&checkpoint("same", 4)).await.unwrap();
    let newer = checkpoint("same", 0);
    store.save(&newer).await.unwrap();

    assert_eq!(store.list_info().await.unwrap().len(), 1);
    assert_eq!(store.load("same").await.unwrap().unwrap(), newer);
    assert_eq!(store.rebuild_index_from_disk().await.unwrap(), 1, "old file removed");
}

#[tokio::test]
async fn concurrent_saves_do_not_lose_index_entries() {
    let (_dir, store) = store().await;
    let store = Arc::new(store);

    let mut handles = Vec::new();
    for i in 0..16 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.save(&checkpoint(&format!("c{i}"), 0)).await.unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    assert_eq!(store.list_info().await.unwrap().len(), 16);
    assert_index_consistent(&store).await;

    let reopened = CheckpointStore::new(store.root());
    assert_eq!(reopened.list_info().await.unwrap().len(), 16, "persisted index is complete");
}

#[tokio::test]
async fn corrupted_index_degrades_to_empty_and_can_be_rebuilt() {
    let (dir, store) = store().await;
    store.save(&checkpoint("keep", 1)).await.unwrap();
    store.save(&checkpoint("also", 2)).await.unwrap();
    store.compress("also").await.unwrap();
    drop(store);

    let root = dir.path().join("checkpoints");
    std::fs::write(root.join(INDEX_FILE), "{ not json").unwrap();

    let store = CheckpointStore::new(&root);
    store.initialize().await.unwrap();
    assert!(store.list_info().await.unwrap().is_empty());

    // Files are still reachable by id.
    assert!(store.load("keep").await.unwrap().is_some());
    assert!(store.load("also").await.unwrap().is_some());

    assert_eq!(store.rebuild_index_from_disk().await.unwrap(), 2);
    let infos = store.list_info().await.unwrap();
    assert_eq!(infos.len(), 2);
    assert!(infos.iter().any(|i| i.id == "also" && i.compressed));
    assert_index_consistent(&store).await;
}

#[tokio::test]
async fn stale_entries_are_cleaned_up() {
    let (dir, store) = store().await;
    let cp = checkpoint("gone", 0);
    store.save(&cp).await.unwrap();
    store.save(&checkpoint("here", 0)).await.unwrap();

    let day = cp.timestamp.format("%Y-%m-%d").to_string();
    std::fs::remove_file(dir.path().join("checkpoints").join(day).join("checkpoint-gone.json")).unwrap();

    assert_eq!(store.cleanup_stale_entries().await.unwrap(), 1);
    let ids: Vec<String> = store.list_info().await.unwrap().into_iter().map(|i| i.id).collect();
    assert_eq!(ids, vec!["here"]);
    assert_eq!(store.cleanup_stale_entries().await.unwrap(), 0);
}

#[tokio::test]
async fn retention_prunes_trims_and_compresses() {
    let (_dir, store) = store().await;
    for (id, days) in [("d40", 40), ("d20", 20), ("d10", 10), ("d5", 5), ("d1", 1)] {
        store.save(&checkpoint(id, days)).await.unwrap();
    }

    let policy = RetentionPolicy {
        retention_days: Some(30),
        max_checkpoints: Some(3),
        compress_after_days: Some(7),
    };
    let report = store.apply_retention(Utc::now(), &policy).await.unwrap();

    assert_eq!(report.pruned.succeeded, 1);
    assert_eq!(report.trimmed.succeeded, 1);
    assert_eq!(report.compressed.succeeded, 1);

    let infos = store.list_info().await.unwrap();
    let ids: Vec<&str> = infos.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["d1", "d5", "d10"]);
    assert!(infos.iter().find(|i| i.id == "d10").unwrap().compressed);
    assert!(!infos.iter().find(|i| i.id == "d5").unwrap().compressed);
}

fn day_dir(root: &std::path::Path, cp: &Checkpoint) -> std::path::PathBuf {
    root.join(cp.timestamp.format("%Y-%m-%d").to_string())
}

#[tokio::test]
async fn compressed_file_is_found_when_the_index_still_says_plaintext() {
    use std::io::Write;

    let (dir, store) = store().await;
    let cp = checkpoint("cp1", 0);
    store.save(&cp).await.unwrap();
    drop(store);

    // Leave the store as a compress interrupted after the .gz was written
    // but before the index caught up, with the plaintext already gone.
    let root = dir.path().join("checkpoints");
    let plain = day_dir(&root, &cp).join("checkpoint-cp1.json");
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&std::fs::read(&plain).unwrap()).unwrap();
    std::fs::write(day_dir(&root, &cp).join("checkpoint-cp1.json.gz"), encoder.finish().unwrap())
        .unwrap();
    std::fs::remove_file(&plain).unwrap();

    let store = CheckpointStore::new(&root);
    store.initialize().await.unwrap();
    assert!(!store.get_checkpoint_info("cp1").await.unwrap().unwrap().compressed);

    assert!(store.exists("cp1").await.unwrap());
    assert_eq!(store.load("cp1").await.unwrap().unwrap(), cp);
    assert!(!store.compress("cp1").await.unwrap(), "already compressed on disk");

    let info = store.get_checkpoint_info("cp1").await.unwrap().unwrap();
    assert!(info.compressed, "index repaired");
    assert_index_consistent(&store).await;
}

#[tokio::test]
async fn corrupt_checkpoint_file_reports_its_id() {
    let (dir, store) = store().await;
    let cp = checkpoint("garbled", 0);
    store.save(&cp).await.unwrap();

    let path = day_dir(&dir.path().join("checkpoints"), &cp).join("checkpoint-garbled.json");
    std::fs::write(&path, "{ truncated").unwrap();

    match store.load("garbled").await {
        Err(PhasedagError::Checkpoint { operation, id, .. }) => {
            assert_eq!(operation, "load");
            assert_eq!(id, "garbled");
        }
        other => panic!("Expected Checkpoint error, got: {:?}", other),
    }
    assert!(matches!(
        store.compress("garbled").await,
        Err(PhasedagError::Checkpoint { operation: "compress", .. })
    ));
}

#[tokio::test]
async fn prune_continues_past_a_failed_deletion() {
    let (dir, store) = store().await;
    let stuck = checkpoint("stuck", 10);
    for cp in [stuck.clone(), checkpoint("old", 10), checkpoint("recent", 1)] {
        store.save(&cp).await.unwrap();
    }

    // A non-empty directory where the checkpoint file should be cannot be
    // removed as a file.
    let path = day_dir(&dir.path().join("checkpoints"), &stuck).join("checkpoint-stuck.json");
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("keep"), "x").unwrap();

    let outcome = store.prune_older_than(Utc::now() - Duration::days(7)).await.unwrap();

    assert_eq!(outcome.succeeded, 1, "only the real deletion counts");
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].0, "stuck");
    let warning = outcome.warning().expect("partial failure is reported");
    assert!(warning.contains("stuck"));

    let ids: Vec<String> = store.list_info().await.unwrap().into_iter().map(|i| i.id).collect();
    assert_eq!(ids, vec!["recent", "stuck"]);
    assert!(!store.exists("old").await.unwrap());
    assert_index_consistent(&store).await;
}
