// tests/runtime_end_to_end.rs

use std::error::Error;

use tempfile::tempdir;
use tokio::io::BufReader;

use swarmstate::engine::{CoreOptions, ManagerEvent, Reply};
use swarmstate::journal::Journal;
use swarmstate::serve::serve_lines;
use swarmstate::store::{FileState, TaskState};
use swarmstate::types::{GcMethod, TaskOutcome};
use swarmstate_test_utils::builders::{TaskRequestBuilder, file_request};
use swarmstate_test_utils::{init_tracing, start_manager, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn options(devices: usize, gc_method: GcMethod) -> CoreOptions {
    CoreOptions {
        devices,
        gc_method,
        ..CoreOptions::default()
    }
}

#[tokio::test]
async fn task_lifecycle_is_durable_across_restart() -> TestResult {
    init_tracing();
    let dir = tempdir()?;

    let (handle, runtime) = start_manager(dir.path(), options(2, GcMethod::None)).await?;
    let input = handle.declare_file(file_request("file")).await?;
    assert_eq!(handle.commit_file(input.as_str(), "data").await?, Some(FileState::Immutable));

    let task = handle
        .submit_task(TaskRequestBuilder::new("process").input(&input).devices(1).build())
        .await?;
    assert_eq!(handle.dispatch_task(task, "w1").await?.as_deref(), Some("0"));
    assert_eq!(handle.task_started(task).await?, Some(TaskState::Running));

    // Replies arrive only after the journal has the new state.
    let on_disk = Journal::new(dir.path()).recover_all()?;
    assert_eq!(on_disk.tasks[0].state, TaskState::Running);

    // Stop without finishing the task.
    drop(handle);
    with_timeout(runtime).await??;

    let (handle, runtime) = start_manager(dir.path(), options(2, GcMethod::None)).await?;
    // Nothing can be on a worker after a restart.
    let on_disk = Journal::new(dir.path()).recover_all()?;
    assert_eq!(on_disk.tasks[0].state, TaskState::Submitted);
    assert_eq!(on_disk.tasks[0].worker, None);

    assert_eq!(handle.dispatch_task(task, "w2").await?.as_deref(), Some("0"));
    assert_eq!(
        handle.task_completed(task, TaskOutcome::Success).await?,
        Some(TaskState::Done)
    );
    assert_eq!(handle.retire_task(task).await?, Some(TaskState::Retired));

    handle.shutdown().await?;
    with_timeout(runtime).await??;

    let on_disk = Journal::new(dir.path()).recover_all()?;
    assert!(on_disk.tasks.is_empty());
    assert_eq!(on_disk.files.len(), 1);
    Ok(())
}

#[tokio::test]
async fn over_allocation_stops_the_manager() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let (handle, runtime) = start_manager(dir.path(), options(1, GcMethod::None)).await?;

    let task = handle
        .submit_task(TaskRequestBuilder::new("big").devices(2).build())
        .await?;
    assert!(handle.dispatch_task(task, "w").await.is_err());

    let err = with_timeout(runtime).await?.unwrap_err();
    assert!(err.is_fatal());
    // Further requests find the manager gone.
    assert!(handle.submit_task(TaskRequestBuilder::new("x").build()).await.is_err());
    Ok(())
}

#[tokio::test]
async fn validation_errors_leave_state_untouched() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let (handle, runtime) = start_manager(dir.path(), options(0, GcMethod::None)).await?;

    let bad = serde_json::json!({"type": "file", "foo": 1});
    assert!(handle.declare_file(bad).await.is_err());
    assert!(
        handle
            .submit_task(TaskRequestBuilder::new("x").input("missing").build())
            .await
            .is_err()
    );

    // Still running and empty.
    let reply = handle.request(ManagerEvent::ForceGc).await?;
    assert_eq!(reply, Reply::Collected(Default::default()));
    handle.shutdown().await?;
    with_timeout(runtime).await??;

    let on_disk = Journal::new(dir.path()).recover_all()?;
    assert!(on_disk.files.is_empty() && on_disk.tasks.is_empty());
    Ok(())
}

#[tokio::test]
async fn ref_count_gc_removes_consumed_inputs_from_disk() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let (handle, runtime) = start_manager(dir.path(), options(0, GcMethod::RefCount)).await?;

    let input = handle.declare_file(file_request("file")).await?;
    handle.commit_file(input.as_str(), "abc").await?;
    let keep = handle.declare_file(file_request("file")).await?;
    handle.commit_file(keep.as_str(), "keep").await?;

    let task = handle
        .submit_task(TaskRequestBuilder::new("cat").input(&input).build())
        .await?;
    handle.dispatch_task(task, "w").await?;
    handle.task_completed(task, TaskOutcome::Success).await?;

    let on_disk = Journal::new(dir.path()).recover_all()?;
    let ids: Vec<_> = on_disk.files.iter().map(|f| f.file_id.as_str()).collect();
    assert_eq!(ids, vec![keep.as_str()]);

    handle.shutdown().await?;
    with_timeout(runtime).await??;
    Ok(())
}

#[tokio::test]
async fn line_protocol_round_trip() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let (handle, runtime) = start_manager(dir.path(), options(0, GcMethod::None)).await?;

    let input = concat!(
        r#"{"method": "file-declare", "params": {"type": "file", "project": "p"}}"#,
        "\n",
        r#"{"method": "file-declare", "params": {"foo": 1}}"#,
        "\n\n",
        r#"{"method": "no-such-method"}"#,
        "\n",
        r#"{"method": "task-submit", "params": {"command": "echo hi"}}"#,
        "\n",
        r#"{"method": "task-remove", "params": {"task-id": 1}}"#,
        "\n",
    );
    let mut output = Vec::new();
    let handled = serve_lines(&handle, BufReader::new(input.as_bytes()), &mut output).await?;
    assert_eq!(handled, 5);

    let lines: Vec<serde_json::Value> = std::str::from_utf8(&output)?
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert!(lines[0]["ok"]["file_declared"].is_string());
    assert!(lines[1]["error"].as_str().unwrap().contains("foo"));
    assert!(lines[2]["error"].as_str().unwrap().contains("no-such-method"));
    assert_eq!(lines[3]["ok"]["task_submitted"], 1);
    assert_eq!(lines[4]["ok"]["task_removed"], true);

    handle.shutdown().await?;
    with_timeout(runtime).await??;
    Ok(())
}
