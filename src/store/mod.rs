// src/store/mod.rs

//! Object store: the in-memory tables of files and tasks.
//!
//! This is the single source of truth for record state. Every accepted
//! mutation validates its transition against the lifecycle tables in
//! [`state`] before touching anything, then queues a [`JournalOp`] in the
//! outbox. The store itself performs no IO: whoever drives it drains the
//! outbox with [`ObjectStore::take_journal_ops`] and makes those ops
//! durable before acknowledging the request.
//!
//! Operations on identifiers that are not in the tables are no-ops and
//! return `Ok(None)`.

pub mod file;
pub mod meta;
pub mod schema;
pub mod state;
pub mod task;

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::{Result, SwarmError};
use crate::journal::{Record, RecordKey, Recovered};
use crate::types::{FileId, TaskId, TaskOutcome, WorkerId};

pub use file::{FileRecord, fingerprint};
pub use meta::StoreMeta;
pub use state::{FileState, Lifecycle, TaskState};
pub use task::TaskRecord;

/// A durable change the journal must apply, in order, per record.
#[derive(Debug, Clone, PartialEq)]
pub enum JournalOp {
    CommitFile(FileRecord),
    CommitTask(TaskRecord),
    CommitMeta(StoreMeta),
    Remove(RecordKey),
}

impl JournalOp {
    pub fn key(&self) -> RecordKey {
        match self {
            JournalOp::CommitFile(f) => f.record_key(),
            JournalOp::CommitTask(t) => t.record_key(),
            JournalOp::CommitMeta(m) => m.record_key(),
            JournalOp::Remove(key) => key.clone(),
        }
    }
}

/// Counts of records fixed up after a restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Normalized {
    pub files_rolled_back: usize,
    pub files_deleted: usize,
    pub tasks_requeued: usize,
}

#[derive(Debug)]
pub struct ObjectStore {
    files: HashMap<FileId, FileRecord>,
    tasks: BTreeMap<TaskId, TaskRecord>,
    next_task_id: TaskId,
    /// Per-process seed mixed into generated file ids.
    id_seed: u128,
    file_counter: u64,
    outbox: Vec<JournalOp>,
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore {
    pub fn new() -> Self {
        let id_seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        Self {
            files: HashMap::new(),
            tasks: BTreeMap::new(),
            next_task_id: 1,
            id_seed,
            file_counter: 0,
            outbox: Vec::new(),
        }
    }

    /// Load recovered records.
    ///
    /// Task ids resume after the largest one ever issued: the persisted
    /// high-water mark or the largest surviving task, whichever is later.
    pub fn from_recovered(recovered: Recovered) -> Result<Self> {
        let mut store = Self::new();

        for file in recovered.files {
            if !file.is_consistent() {
                return Err(SwarmError::Accounting(format!(
                    "recovered file {} is {} but fingerprint is {}",
                    file.file_id,
                    file.state,
                    if file.fingerprint.is_some() { "set" } else { "missing" }
                )));
            }
            store.files.insert(file.file_id.clone(), file);
        }

        for task in recovered.tasks {
            store.next_task_id = store.next_task_id.max(task.task_id + 1);
            store.tasks.insert(task.task_id, task);
        }
        if let Some(meta) = recovered.meta {
            store.next_task_id = store.next_task_id.max(meta.next_task_id);
        }

        Ok(store)
    }

    /// Settle records caught mid-transition by a crash.
    ///
    /// Nothing can be on a worker after a restart, and any reservation or
    /// commit in flight is lost. Files that were being deleted finish
    /// deleting.
    pub fn normalize_recovered(&mut self) -> Result<Normalized> {
        let mut out = Normalized::default();

        let mut file_ids: Vec<FileId> = self.files.keys().cloned().collect();
        file_ids.sort();
        for id in file_ids {
            let state = self.files[&id].state;
            match state {
                FileState::Allocating => {
                    self.walk_file(&id, &[FileState::Pending])?;
                    out.files_rolled_back += 1;
                }
                FileState::Committing => {
                    self.walk_file(&id, &[FileState::Mutable])?;
                    out.files_rolled_back += 1;
                }
                FileState::Deleting => {
                    self.finish_delete(&id)?;
                    out.files_deleted += 1;
                }
                _ => {}
            }
        }

        let on_worker: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|t| t.state.is_on_worker())
            .map(|t| t.task_id)
            .collect();
        for id in on_worker {
            self.requeue_task(id)?;
            out.tasks_requeued += 1;
        }

        if out != Normalized::default() {
            info!(
                files_rolled_back = out.files_rolled_back,
                files_deleted = out.files_deleted,
                tasks_requeued = out.tasks_requeued,
                "normalised recovered records"
            );
        }
        Ok(out)
    }

    pub fn file(&self, id: &str) -> Option<&FileRecord> {
        self.files.get(id)
    }

    pub fn files(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskRecord> {
        self.tasks.get(&id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.values()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Sum of the recorded sizes of every file in the table.
    pub fn live_bytes(&self) -> u64 {
        self.files.values().map(FileRecord::stored_bytes).sum()
    }

    /// Tasks currently dispatched to (or running on) `worker`.
    pub fn tasks_on_worker(&self, worker: &str) -> Vec<TaskId> {
        self.tasks
            .values()
            .filter(|t| t.state.is_on_worker() && t.worker.as_deref() == Some(worker))
            .map(|t| t.task_id)
            .collect()
    }

    /// Drain the journal ops queued by mutations so far.
    pub fn take_journal_ops(&mut self) -> Vec<JournalOp> {
        std::mem::take(&mut self.outbox)
    }

    // ---- files -----------------------------------------------------------

    /// Create a `PENDING` file from a `file-declare` document.
    pub fn declare_file(&mut self, doc: &Value) -> Result<FileId> {
        // Validate before generating an id so a rejected request changes nothing.
        crate::store::schema::FILE_DECLARE.validate(doc)?;
        let id = self.new_file_id();
        let record = FileRecord::from_request(id.clone(), doc)?;
        debug!(file = %id, "declared file");
        self.outbox.push(JournalOp::CommitFile(record.clone()));
        self.files.insert(id.clone(), record);
        Ok(id)
    }

    /// Reserve storage: `PENDING -> ALLOCATING -> MUTABLE`.
    pub fn allocate_file(&mut self, id: &str) -> Result<Option<FileState>> {
        if !self.files.contains_key(id) {
            return Ok(None);
        }
        self.walk_file(id, &[FileState::Allocating, FileState::Mutable])?;
        Ok(Some(FileState::Mutable))
    }

    /// Seal a file with the content read from `content`.
    ///
    /// A `PENDING` file passes through allocation first. The content is
    /// hashed before any state changes, so a read failure leaves the file
    /// untouched.
    pub fn commit_file<R: Read>(&mut self, id: &str, content: R) -> Result<Option<FileState>> {
        let Some(file) = self.files.get(id) else {
            return Ok(None);
        };

        let path: &[FileState] = match file.state {
            FileState::Pending => &[
                FileState::Allocating,
                FileState::Mutable,
                FileState::Committing,
                FileState::Immutable,
            ],
            _ => &[FileState::Committing, FileState::Immutable],
        };
        self.check_file_path(id, path)?;

        let (hash, size) = fingerprint(content)?;

        // Everything up to COMMITTING, then seal.
        let seal_at = path.len() - 1;
        self.walk_file(id, &path[..seal_at])?;
        if let Some(file) = self.files.get_mut(id) {
            file.fingerprint = Some(hash);
            file.size = size;
        }
        self.walk_file(id, &path[seal_at..])?;

        info!(file = %id, size, "file committed");
        Ok(Some(FileState::Immutable))
    }

    /// Tear a file down: `* -> DELETING -> DELETED`, then drop its record.
    ///
    /// Refused while a task on a worker names the file.
    pub fn delete_file(&mut self, id: &str) -> Result<Option<FileState>> {
        let Some(file) = self.files.get(id) else {
            return Ok(None);
        };

        if let Some(task) = self
            .tasks
            .values()
            .find(|t| t.state.is_on_worker() && t.named_files().iter().any(|f| f == id))
        {
            return Err(SwarmError::Validation(format!(
                "file {id} is in use by task {} ({})",
                task.task_id, task.state
            )));
        }

        if file.state != FileState::Deleting {
            self.walk_file(id, &[FileState::Deleting])?;
        }
        self.finish_delete(id)?;
        Ok(Some(FileState::Deleted))
    }

    fn finish_delete(&mut self, id: &str) -> Result<()> {
        self.check_file_path(id, &[FileState::Deleted])?;
        if let Some(file) = self.files.remove(id) {
            self.outbox.push(JournalOp::Remove(file.record_key()));
            info!(file = %id, "file deleted");
        }
        Ok(())
    }

    /// Validate every edge of `path` starting from the file's current state.
    fn check_file_path(&self, id: &str, path: &[FileState]) -> Result<()> {
        let Some(file) = self.files.get(id) else {
            return Ok(());
        };
        let object = format!("file {id}");
        let mut state = file.state;
        for next in path {
            state = state.transition(*next, &object)?;
        }
        Ok(())
    }

    /// Apply `path` one state at a time, journaling each snapshot.
    fn walk_file(&mut self, id: &str, path: &[FileState]) -> Result<()> {
        self.check_file_path(id, path)?;
        let Some(file) = self.files.get_mut(id) else {
            return Ok(());
        };
        for next in path {
            debug!(file = %id, from = %file.state, to = %next, "file transition");
            file.state = *next;
            if !next.is_sealed() {
                file.fingerprint = None;
            }
            self.outbox.push(JournalOp::CommitFile(file.clone()));
        }
        Ok(())
    }

    fn new_file_id(&mut self) -> FileId {
        loop {
            self.file_counter += 1;
            let mut hasher = blake3::Hasher::new();
            hasher.update(&self.id_seed.to_le_bytes());
            hasher.update(&self.file_counter.to_le_bytes());
            let hex = hasher.finalize().to_hex();
            let id = hex[..32].to_string();
            if !self.files.contains_key(&id) {
                return id;
            }
        }
    }

    // ---- tasks -----------------------------------------------------------

    /// Accept a `task-submit` document. Every named file must be declared.
    pub fn submit_task(&mut self, doc: &Value) -> Result<TaskId> {
        let task = TaskRecord::from_request(self.next_task_id, doc)?;
        if let Some(missing) = task
            .named_files()
            .into_iter()
            .find(|f| !self.files.contains_key(f))
        {
            return Err(SwarmError::Validation(format!(
                "task-submit: unknown file '{missing}'"
            )));
        }

        let id = task.task_id;
        self.next_task_id += 1;
        debug!(task = id, command = %task.command, "submitted task");
        self.outbox.push(JournalOp::CommitTask(task.clone()));
        self.outbox.push(JournalOp::CommitMeta(StoreMeta {
            next_task_id: self.next_task_id,
        }));
        self.tasks.insert(id, task);
        Ok(id)
    }

    /// Check that `id` may be dispatched right now: the transition is legal
    /// and every input file is `IMMUTABLE`.
    pub fn check_dispatchable(&self, id: TaskId) -> Result<Option<&TaskRecord>> {
        let Some(task) = self.tasks.get(&id) else {
            return Ok(None);
        };
        task.state
            .transition(TaskState::Dispatched, &format!("task {id}"))?;
        for input in &task.inputs {
            let ready = self
                .files
                .get(input)
                .is_some_and(|f| f.state == FileState::Immutable);
            if !ready {
                return Err(SwarmError::InputsNotReady {
                    task: id,
                    file: input.clone(),
                });
            }
        }
        Ok(Some(task))
    }

    /// Record that `id` was sent to `worker`.
    pub fn mark_dispatched(&mut self, id: TaskId, worker: WorkerId) -> Result<Option<TaskState>> {
        if self.check_dispatchable(id)?.is_none() {
            return Ok(None);
        }
        self.update_task(id, TaskState::Dispatched, |t| {
            t.worker = Some(worker);
            t.attempts += 1;
            t.outcome = None;
        })
    }

    pub fn start_task(&mut self, id: TaskId) -> Result<Option<TaskState>> {
        self.update_task(id, TaskState::Running, |_| {})
    }

    pub fn complete_task(&mut self, id: TaskId, outcome: TaskOutcome) -> Result<Option<TaskState>> {
        let next = match outcome {
            TaskOutcome::Success => TaskState::Done,
            TaskOutcome::Failed(_) => TaskState::Failed,
        };
        self.update_task(id, next, |t| t.outcome = Some(outcome))
    }

    /// Put a task back in line (worker lost, or a failed task resubmitted).
    pub fn requeue_task(&mut self, id: TaskId) -> Result<Option<TaskState>> {
        self.update_task(id, TaskState::Submitted, |t| t.worker = None)
    }

    /// Client acknowledged a finished task: `DONE|FAILED -> RETIRED`, and
    /// the record is dropped.
    pub fn retire_task(&mut self, id: TaskId) -> Result<Option<TaskRecord>> {
        let Some(task) = self.tasks.get(&id) else {
            return Ok(None);
        };
        task.state.transition(TaskState::Retired, &format!("task {id}"))?;
        let mut task = self.drop_task(id);
        if let Some(t) = task.as_mut() {
            t.state = TaskState::Retired;
            info!(task = id, "task retired");
        }
        Ok(task)
    }

    /// Drop a task in whatever state it is in.
    pub fn remove_task(&mut self, id: TaskId) -> Result<Option<TaskRecord>> {
        let task = self.drop_task(id);
        if let Some(t) = &task {
            if t.state.is_on_worker() {
                warn!(task = id, state = %t.state, "removing task still on a worker");
            }
            info!(task = id, "task removed");
        }
        Ok(task)
    }

    fn drop_task(&mut self, id: TaskId) -> Option<TaskRecord> {
        let task = self.tasks.remove(&id)?;
        self.outbox.push(JournalOp::Remove(task.record_key()));
        Some(task)
    }

    fn update_task(
        &mut self,
        id: TaskId,
        next: TaskState,
        apply: impl FnOnce(&mut TaskRecord),
    ) -> Result<Option<TaskState>> {
        let Some(task) = self.tasks.get_mut(&id) else {
            return Ok(None);
        };
        let next = task.state.transition(next, &format!("task {id}"))?;
        debug!(task = id, from = %task.state, to = %next, "task transition");
        task.state = next;
        apply(task);
        self.outbox.push(JournalOp::CommitTask(task.clone()));
        Ok(Some(next))
    }
}
