// src/engine/handle.rs

use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::errors::{Result, SwarmError};
use crate::store::{FileState, TaskState};
use crate::types::{FileId, TaskId, TaskOutcome};

use super::core::ManagerCore;
use super::runtime::{Request, Runtime};
use super::writer::JournalWriter;
use super::{ManagerEvent, Reply};

/// Capacity of the request channel.
const REQUEST_BUFFER: usize = 64;

/// Cloneable client of a running [`Runtime`].
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    tx: mpsc::Sender<Request>,
}

impl ManagerHandle {
    /// Spawn the runtime on the current Tokio runtime.
    pub fn spawn(
        core: ManagerCore,
        writer: JournalWriter,
        fatal_rx: mpsc::UnboundedReceiver<SwarmError>,
        sweep_interval: Option<Duration>,
    ) -> (Self, JoinHandle<Result<()>>) {
        let (tx, rx) = mpsc::channel(REQUEST_BUFFER);
        let runtime = Runtime::new(core, writer, fatal_rx, rx).with_sweep_interval(sweep_interval);
        let join = tokio::spawn(runtime.run());
        (Self { tx }, join)
    }

    pub fn from_sender(tx: mpsc::Sender<Request>) -> Self {
        Self { tx }
    }

    /// Send `event` and wait until its effects are durable.
    pub async fn request(&self, event: ManagerEvent) -> Result<Reply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Request::new(event, reply_tx))
            .await
            .map_err(|_| stopped())?;
        reply_rx.await.map_err(|_| stopped())?
    }

    /// Send `event` without waiting for the outcome.
    pub async fn notify(&self, event: ManagerEvent) -> Result<()> {
        self.tx
            .send(Request::notify(event))
            .await
            .map_err(|_| stopped())
    }

    pub async fn declare_file(&self, request: Value) -> Result<FileId> {
        match self.request(ManagerEvent::DeclareFile { request }).await? {
            Reply::FileDeclared(id) => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    pub async fn allocate_file(&self, file: impl Into<FileId>) -> Result<Option<FileState>> {
        let file = file.into();
        self.file_reply(ManagerEvent::AllocateFile { file }).await
    }

    pub async fn commit_file(
        &self,
        file: impl Into<FileId>,
        content: impl Into<Vec<u8>>,
    ) -> Result<Option<FileState>> {
        self.file_reply(ManagerEvent::CommitFile {
            file: file.into(),
            content: content.into(),
        })
        .await
    }

    pub async fn delete_file(&self, file: impl Into<FileId>) -> Result<Option<FileState>> {
        let file = file.into();
        self.file_reply(ManagerEvent::DeleteFile { file }).await
    }

    pub async fn submit_task(&self, request: Value) -> Result<TaskId> {
        match self.request(ManagerEvent::SubmitTask { request }).await? {
            Reply::TaskSubmitted(id) => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    /// Dispatch `task` to `worker`; returns the device list handed to it.
    pub async fn dispatch_task(&self, task: TaskId, worker: impl Into<String>) -> Result<Option<String>> {
        let event = ManagerEvent::DispatchTask {
            task,
            worker: worker.into(),
        };
        match self.request(event).await? {
            Reply::Dispatched { devices, .. } => Ok(Some(devices)),
            Reply::Task(None) => Ok(None),
            other => Err(unexpected(other)),
        }
    }

    pub async fn task_started(&self, task: TaskId) -> Result<Option<TaskState>> {
        self.task_reply(ManagerEvent::TaskStarted { task }).await
    }

    pub async fn task_completed(&self, task: TaskId, outcome: TaskOutcome) -> Result<Option<TaskState>> {
        self.task_reply(ManagerEvent::TaskCompleted { task, outcome }).await
    }

    pub async fn retire_task(&self, task: TaskId) -> Result<Option<TaskState>> {
        self.task_reply(ManagerEvent::RetireTask { task }).await
    }

    pub async fn worker_lost(&self, worker: impl Into<String>) -> Result<Vec<TaskId>> {
        let worker = worker.into();
        match self.request(ManagerEvent::WorkerLost { worker }).await? {
            Reply::Requeued(ids) => Ok(ids),
            other => Err(unexpected(other)),
        }
    }

    /// Ask the runtime to run the final collection and stop.
    pub async fn shutdown(&self) -> Result<Reply> {
        self.request(ManagerEvent::Shutdown).await
    }

    async fn file_reply(&self, event: ManagerEvent) -> Result<Option<FileState>> {
        match self.request(event).await? {
            Reply::File(state) => Ok(state),
            other => Err(unexpected(other)),
        }
    }

    async fn task_reply(&self, event: ManagerEvent) -> Result<Option<TaskState>> {
        match self.request(event).await? {
            Reply::Task(state) => Ok(state),
            other => Err(unexpected(other)),
        }
    }
}

fn stopped() -> SwarmError {
    SwarmError::Other(anyhow::anyhow!("manager runtime is not running"))
}

fn unexpected(reply: Reply) -> SwarmError {
    SwarmError::Other(anyhow::anyhow!("unexpected reply: {reply:?}"))
}
