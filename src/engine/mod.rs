// src/engine/mod.rs

//! Orchestration engine for the manager.
//!
//! The pure core state machine lives in [`core`]: it owns the object store,
//! the device pool and the garbage collector, consumes [`ManagerEvent`]s,
//! and returns a reply plus the journal ops that must be durable before the
//! reply is released. The async shell in [`runtime`] feeds it requests from
//! a channel and hands journal ops to the bounded [`writer`]. [`handle`] is
//! the client side of that channel.

use serde::Serialize;
use serde_json::Value;

use crate::dag::FileDag;
use crate::errors::{Result, SwarmError};
use crate::gc::GcReport;
use crate::store::schema::{file_id_from_request, task_id_from_request};
use crate::store::{FileState, TaskState};
use crate::types::{FileId, NodeId, TaskId, TaskOutcome, WorkerId};

pub mod core;
pub mod handle;
pub mod runtime;
pub mod writer;

pub use self::core::{CoreOptions, CoreStep, ManagerCore};
pub use handle::ManagerHandle;
pub use runtime::{Request, Runtime};
pub use writer::JournalWriter;

/// Events flowing into the manager core.
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    DeclareFile { request: Value },
    AllocateFile { file: FileId },
    CommitFile { file: FileId, content: Vec<u8> },
    DeleteFile { file: FileId },
    SubmitTask { request: Value },
    DispatchTask { task: TaskId, worker: WorkerId },
    TaskStarted { task: TaskId },
    TaskCompleted { task: TaskId, outcome: TaskOutcome },
    /// A worker disconnected; everything on it goes back in line.
    WorkerLost { worker: WorkerId },
    /// Resubmit a failed task.
    RetryTask { task: TaskId },
    RetireTask { task: TaskId },
    RemoveTask { task: TaskId },
    DagPrepare { dag: FileDag },
    DagNodeCompleted { node: NodeId, files: Vec<FileId> },
    PreserveFile { file: FileId },
    /// Periodic collection with the configured method.
    GcSweep,
    ForceGc,
    Shutdown,
}

impl ManagerEvent {
    /// Translate a client request document into an event.
    ///
    /// Methods follow the client protocol names (`file-declare`,
    /// `file-commit`, `file-delete`, `task-submit`, `task-retire`,
    /// `task-remove`). `content` is the payload of a `file-commit`.
    pub fn from_client(method: &str, params: &Value, content: Option<Vec<u8>>) -> Result<Self> {
        let event = match method {
            "file-declare" => ManagerEvent::DeclareFile {
                request: params.clone(),
            },
            "file-commit" => ManagerEvent::CommitFile {
                file: file_id_from_request(params)?,
                content: content.unwrap_or_default(),
            },
            "file-delete" => ManagerEvent::DeleteFile {
                file: file_id_from_request(params)?,
            },
            "task-submit" => ManagerEvent::SubmitTask {
                request: params.clone(),
            },
            "task-retire" => ManagerEvent::RetireTask {
                task: task_id_from_request(params)?,
            },
            "task-remove" => ManagerEvent::RemoveTask {
                task: task_id_from_request(params)?,
            },
            other => {
                return Err(SwarmError::Validation(format!("unknown method '{other}'")));
            }
        };
        Ok(event)
    }
}

/// What the requester gets back once the step is durable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    FileDeclared(FileId),
    /// State after a file operation; `None` if the file was absent.
    File(Option<FileState>),
    TaskSubmitted(TaskId),
    /// State after a task operation; `None` if the task was absent.
    Task(Option<TaskState>),
    Dispatched { task: TaskId, devices: String },
    TaskRemoved(bool),
    Requeued(Vec<TaskId>),
    Prepared { files: usize },
    Collected(GcReport),
    Ack,
}
