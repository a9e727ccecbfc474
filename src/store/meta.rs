// src/store/meta.rs

use serde::{Deserialize, Serialize};

use crate::journal::{Record, RecordKind};
use crate::types::TaskId;

/// File name of the single store-wide snapshot under `<root>/meta/`.
pub const META_ID: &str = "store";

/// Counters that must outlive the records they were handed out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMeta {
    /// Smallest task id never issued.
    pub next_task_id: TaskId,
}

impl Record for StoreMeta {
    const KIND: RecordKind = RecordKind::Meta;

    fn record_id(&self) -> String {
        META_ID.to_string()
    }
}
