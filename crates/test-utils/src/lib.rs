pub mod builders;

use std::path::Path;
use std::sync::Once;

use tokio::task::JoinHandle;
use tracing_subscriber::{EnvFilter, fmt};

use swarmstate::engine::{CoreOptions, JournalWriter, ManagerCore, ManagerHandle};
use swarmstate::errors::Result;
use swarmstate::journal::Journal;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=swarmstate=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Recover whatever is journaled under `state_dir` and start a manager on it.
///
/// Recovery clean-up ops are written before the handle is returned.
pub async fn start_manager(
    state_dir: &Path,
    options: CoreOptions,
) -> Result<(ManagerHandle, JoinHandle<Result<()>>)> {
    let journal = Journal::new(state_dir);
    let recovered = journal.recover_all()?;
    let (core, ops) = ManagerCore::from_recovered(recovered, options)?;

    let (mut writer, fatal_rx) = JournalWriter::new(journal, 4);
    writer.submit(ops, Ok(swarmstate::engine::Reply::Ack), None);
    writer.flush().await;

    Ok(ManagerHandle::spawn(core, writer, fatal_rx, None))
}
