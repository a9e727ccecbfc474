use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Manager-wide task identifier (monotonically increasing).
pub type TaskId = u64;

/// Opaque file identifier, unique for the lifetime of the manager.
pub type FileId = String;

/// Identifier of a node in an external DAG.
pub type NodeId = String;

/// Identifier of a remote worker a task has been dispatched to.
pub type WorkerId = String;

/// Garbage collection policy.
///
/// - `None`: collection disabled.
/// - `RefCount`: delete a file as soon as it becomes eligible.
/// - `OnDemand`: let eligible files pile up and only delete them once
///   available storage drops below the configured threshold.
/// - `Force`: delete every eligible file whenever a collection runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GcMethod {
    #[default]
    None,
    RefCount,
    OnDemand,
    Force,
}

impl FromStr for GcMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(GcMethod::None),
            "ref_count" | "refcount" => Ok(GcMethod::RefCount),
            "on_demand" | "ondemand" => Ok(GcMethod::OnDemand),
            "force" => Ok(GcMethod::Force),
            other => Err(format!(
                "invalid gc method: {other} (expected \"none\", \"ref_count\", \"on_demand\" or \"force\")"
            )),
        }
    }
}

impl fmt::Display for GcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GcMethod::None => "none",
            GcMethod::RefCount => "ref_count",
            GcMethod::OnDemand => "on_demand",
            GcMethod::Force => "force",
        };
        f.write_str(s)
    }
}

/// Outcome reported by a worker for a finished task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Success,
    Failed(i32),
}
