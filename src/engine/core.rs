// src/engine/core.rs

//! Pure core of the manager.
//!
//! [`ManagerCore`] is synchronous and deterministic: it consumes a
//! [`ManagerEvent`], mutates the object store, device pool and garbage
//! collector, and returns a [`CoreStep`] with the reply and the journal ops
//! the step produced. It has no channels and performs no IO, so it can be
//! unit tested without Tokio or a filesystem.

use tracing::{debug, info, warn};

use crate::errors::{Result, SwarmError};
use crate::gc::{GarbageCollector, GcReport};
use crate::journal::Recovered;
use crate::resources::DevicePool;
use crate::store::{JournalOp, ObjectStore, TaskState};
use crate::types::{GcMethod, TaskId, TaskOutcome};

use super::{ManagerEvent, Reply};

/// Static settings for the core.
#[derive(Debug, Clone, Copy)]
pub struct CoreOptions {
    /// Exclusive units in the device pool.
    pub devices: usize,
    pub gc_method: GcMethod,
    pub capacity_bytes: u64,
    pub threshold_bytes: u64,
}

impl Default for CoreOptions {
    fn default() -> Self {
        Self {
            devices: 0,
            gc_method: GcMethod::None,
            capacity_bytes: 0,
            threshold_bytes: 0,
        }
    }
}

/// Result of handling one event.
#[derive(Debug)]
pub struct CoreStep {
    pub reply: Result<Reply>,
    /// Ops that must be durable before `reply` is released.
    pub journal: Vec<JournalOp>,
    /// Whether the runtime loop should keep going.
    pub keep_running: bool,
}

#[derive(Debug)]
pub struct ManagerCore {
    store: ObjectStore,
    pool: DevicePool,
    gc: GarbageCollector,
}

impl ManagerCore {
    pub fn new(options: CoreOptions) -> Self {
        let mut pool = DevicePool::new();
        pool.init(options.devices);
        let gc = GarbageCollector::new(options.gc_method)
            .with_storage(options.capacity_bytes, options.threshold_bytes);
        Self {
            store: ObjectStore::new(),
            pool,
            gc,
        }
    }

    /// Rebuild the core from journal contents.
    ///
    /// Records caught mid-transition are settled, and every task that still
    /// holds references re-seeds the collector. The returned step carries
    /// the journal ops of that clean-up.
    pub fn from_recovered(recovered: Recovered, options: CoreOptions) -> Result<(Self, Vec<JournalOp>)> {
        let mut core = Self::new(options);
        core.store = ObjectStore::from_recovered(recovered)?;
        core.store.normalize_recovered()?;

        let held: Vec<Vec<String>> = core
            .store
            .tasks()
            .filter(|t| t.state.holds_references())
            .map(|t| t.named_files())
            .collect();
        for files in &held {
            core.gc.add_references(files);
        }

        let ops = core.store.take_journal_ops();
        info!(
            tasks = core.store.task_count(),
            files = core.store.file_count(),
            pending_journal_ops = ops.len(),
            "manager core restored"
        );
        Ok((core, ops))
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn pool(&self) -> &DevicePool {
        &self.pool
    }

    pub fn gc(&self) -> &GarbageCollector {
        &self.gc
    }

    /// Handle a single event.
    pub fn step(&mut self, event: ManagerEvent) -> CoreStep {
        let keep_running = !matches!(event, ManagerEvent::Shutdown);
        let reply = self.handle(event);
        if let Err(e) = &reply {
            if e.is_fatal() {
                warn!(error = %e, "fatal error in manager core");
            } else {
                debug!(error = %e, "request rejected");
            }
        }
        CoreStep {
            reply,
            journal: self.store.take_journal_ops(),
            keep_running,
        }
    }

    fn handle(&mut self, event: ManagerEvent) -> Result<Reply> {
        match event {
            ManagerEvent::DeclareFile { request } => {
                self.store.declare_file(&request).map(Reply::FileDeclared)
            }
            ManagerEvent::AllocateFile { file } => self.store.allocate_file(&file).map(Reply::File),
            ManagerEvent::CommitFile { file, content } => {
                let state = self.store.commit_file(&file, content.as_slice())?;
                self.collect_inline()?;
                Ok(Reply::File(state))
            }
            ManagerEvent::DeleteFile { file } => {
                let state = self.store.delete_file(&file)?;
                if state.is_some() {
                    self.gc.forget(&file);
                }
                Ok(Reply::File(state))
            }
            ManagerEvent::SubmitTask { request } => {
                let id = self.store.submit_task(&request)?;
                if let Some(task) = self.store.task(id) {
                    let files = task.named_files();
                    self.gc.add_references(&files);
                }
                Ok(Reply::TaskSubmitted(id))
            }
            ManagerEvent::DispatchTask { task, worker } => self.dispatch(task, worker),
            ManagerEvent::TaskStarted { task } => self.store.start_task(task).map(Reply::Task),
            ManagerEvent::TaskCompleted { task, outcome } => self.complete(task, outcome),
            ManagerEvent::WorkerLost { worker } => {
                let tasks = self.store.tasks_on_worker(&worker);
                for &id in &tasks {
                    self.pool.free(id);
                    self.store.requeue_task(id)?;
                }
                if !tasks.is_empty() {
                    warn!(worker = %worker, requeued = tasks.len(), "worker lost; tasks requeued");
                }
                Ok(Reply::Requeued(tasks))
            }
            ManagerEvent::RetryTask { task } => {
                let state = match self.store.task(task).map(|t| t.state) {
                    Some(TaskState::Failed) => self.store.requeue_task(task)?,
                    Some(other) => {
                        return Err(SwarmError::IllegalTransition {
                            object: format!("task {task}"),
                            from: other.to_string(),
                            to: TaskState::Submitted.to_string(),
                        });
                    }
                    None => None,
                };
                Ok(Reply::Task(state))
            }
            ManagerEvent::RetireTask { task } => {
                let prior = self.store.task(task).map(|t| t.state);
                let retired = self.store.retire_task(task)?;
                if let (Some(record), Some(prior)) = (&retired, prior) {
                    if prior.holds_references() {
                        self.gc.release_references(&record.named_files());
                        self.collect_inline()?;
                    }
                }
                Ok(Reply::Task(retired.map(|t| t.state)))
            }
            ManagerEvent::RemoveTask { task } => {
                self.pool.free(task);
                let removed = self.store.remove_task(task)?;
                if let Some(record) = &removed {
                    if record.state.holds_references() {
                        self.gc.release_references(&record.named_files());
                        self.collect_inline()?;
                    }
                }
                Ok(Reply::TaskRemoved(removed.is_some()))
            }
            ManagerEvent::DagPrepare { dag } => {
                dag.validate()?;
                let files = self.gc.prepare(dag.memberships());
                Ok(Reply::Prepared { files })
            }
            ManagerEvent::DagNodeCompleted { node, files } => {
                debug!(node = %node, files = files.len(), "dag node completed");
                self.gc.release_references(&files);
                self.collect_inline()?;
                Ok(Reply::Ack)
            }
            ManagerEvent::PreserveFile { file } => {
                self.gc.preserve(file);
                Ok(Reply::Ack)
            }
            ManagerEvent::GcSweep => {
                let method = self.gc.method();
                self.gc.collect(&mut self.store, method).map(Reply::Collected)
            }
            ManagerEvent::ForceGc => self
                .gc
                .collect(&mut self.store, GcMethod::Force)
                .map(Reply::Collected),
            ManagerEvent::Shutdown => self.shutdown().map(Reply::Collected),
        }
    }

    fn dispatch(&mut self, task: TaskId, worker: String) -> Result<Reply> {
        let units = match self.store.check_dispatchable(task)? {
            Some(record) => record.resources.exclusive_units(),
            None => return Ok(Reply::Task(None)),
        };
        self.pool.allocate(units, task)?;
        self.store.mark_dispatched(task, worker)?;
        let devices = self.pool.describe(task);
        debug!(task, devices = %devices, "task dispatched");
        Ok(Reply::Dispatched { task, devices })
    }

    fn complete(&mut self, task: TaskId, outcome: TaskOutcome) -> Result<Reply> {
        let state = self.store.complete_task(task, outcome)?;
        if state.is_none() {
            return Ok(Reply::Task(None));
        }
        self.pool.free(task);

        if state == Some(TaskState::Done) {
            if let Some(record) = self.store.task(task) {
                let files = record.named_files();
                self.gc.release_references(&files);
            }
            self.collect_inline()?;
        }
        Ok(Reply::Task(state))
    }

    /// `RefCount` deletes eligible files as soon as something changes.
    fn collect_inline(&mut self) -> Result<()> {
        if self.gc.method() == GcMethod::RefCount {
            self.gc.collect(&mut self.store, GcMethod::RefCount)?;
        }
        Ok(())
    }

    /// Final collection and pool teardown.
    fn shutdown(&mut self) -> Result<GcReport> {
        let report = if self.gc.method() != GcMethod::None {
            self.gc.collect(&mut self.store, GcMethod::Force)?
        } else {
            GcReport::default()
        };
        self.pool.teardown();
        info!(collected = report.collected.len(), "manager core shut down");
        Ok(report)
    }
}
