// src/store/task.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Result, SwarmError};
use crate::journal::{Record, RecordKind};
use crate::resources::Resources;
use crate::store::schema::TASK_SUBMIT;
use crate::store::state::TaskState;
use crate::types::{FileId, TaskId, TaskOutcome, WorkerId};

/// Snapshot of one managed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub state: TaskState,
    pub command: String,
    #[serde(default)]
    pub inputs: Vec<FileId>,
    #[serde(default)]
    pub outputs: Vec<FileId>,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Worker the task is dispatched to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<WorkerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TaskOutcome>,
    /// Number of times the task has been dispatched.
    #[serde(default)]
    pub attempts: u32,
}

impl TaskRecord {
    /// Build a `SUBMITTED` record from a `task-submit` document.
    pub fn from_request(task_id: TaskId, doc: &Value) -> Result<Self> {
        let obj = TASK_SUBMIT.validate(doc)?;

        let strings = |key: &str| -> Vec<String> {
            obj.get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        };

        let resources = match obj.get("resources") {
            Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
                SwarmError::Validation(format!("task-submit: invalid 'resources': {e}"))
            })?,
            None => Resources::default(),
        };

        let environment = match obj.get("environment") {
            Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
                SwarmError::Validation(format!("task-submit: invalid 'environment': {e}"))
            })?,
            None => BTreeMap::new(),
        };

        Ok(Self {
            task_id,
            state: TaskState::Submitted,
            command: obj
                .get("command")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            inputs: strings("inputs"),
            outputs: strings("outputs"),
            resources,
            environment,
            project: obj.get("project").and_then(Value::as_str).map(str::to_string),
            worker: None,
            outcome: None,
            attempts: 0,
        })
    }

    /// Every distinct file this task names, inputs first.
    pub fn named_files(&self) -> Vec<FileId> {
        let mut files: Vec<FileId> = Vec::with_capacity(self.inputs.len() + self.outputs.len());
        for f in self.inputs.iter().chain(self.outputs.iter()) {
            if !files.contains(f) {
                files.push(f.clone());
            }
        }
        files
    }
}

impl Record for TaskRecord {
    const KIND: RecordKind = RecordKind::Task;

    fn record_id(&self) -> String {
        self.task_id.to_string()
    }
}
