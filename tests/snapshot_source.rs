// tests/snapshot_source.rs

use phasedag::checkpoint::verify_file_snapshot;
use phasedag::engine::{PathSnapshotSource, SnapshotSource};
use phasedag_test_utils::builders::{PhaseBuilder, PlanBuilder};
use phasedag_test_utils::init_tracing;

#[tokio::test]
async fn path_source_captures_existing_files_and_skips_missing_ones() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let present = dir.path().join("main.rs");
    std::fs::write(&present, "fn main() {}\n").unwrap();
    let missing = dir.path().join("gone.rs");

    let plan = PlanBuilder::new("p").phase(PhaseBuilder::new("edit")).build();
    let source = PathSnapshotSource::new([present.clone(), missing]);

    let files = source.snapshot(&plan, plan.phase("edit")).await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path, present.to_string_lossy());
    assert_eq!(files[0].content, "fn main() {}\n");
    assert!(verify_file_snapshot(&files[0]));

    let empty = PathSnapshotSource::default();
    assert!(empty.snapshot(&plan, None).await.unwrap().is_empty());
}
