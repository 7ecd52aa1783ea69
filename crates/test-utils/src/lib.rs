pub mod builders;
pub mod fake_runner;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use phasedag::checkpoint::CheckpointStore;
use tempfile::TempDir;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Upper bound for any single async test step.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialise tracing for tests.
///
/// Output goes through the test writer, so it only shows for failing tests
/// (or with `--nocapture`). `RUST_LOG=phasedag=debug cargo test` turns on
/// executor and store internals.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("phasedag=info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Await `f`, failing the test if it takes longer than [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(TEST_TIMEOUT, f)
        .await
        .unwrap_or_else(|_| panic!("test step exceeded {TEST_TIMEOUT:?}"))
}

/// Initialised checkpoint store under a fresh temp dir.
///
/// Keep the returned `TempDir` alive for as long as the store is used.
pub async fn temp_store() -> (TempDir, CheckpointStore) {
    init_tracing();
    let dir = TempDir::new().expect("create temp dir");
    let store = CheckpointStore::new(dir.path().join("checkpoints"));
    store.initialize().await.expect("initialize checkpoint store");
    (dir, store)
}
