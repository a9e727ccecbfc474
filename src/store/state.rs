// src/store/state.rs

//! Lifecycle states for files and tasks, with their transition tables.
//!
//! Every mutation in the object store goes through [`Lifecycle::transition`],
//! so an edge missing from a table can never be written.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SwarmError};

/// A closed set of states with an explicit table of legal edges.
pub trait Lifecycle: Copy + Eq + fmt::Debug + fmt::Display + 'static {
    /// States reachable from `self` in one step.
    fn successors(self) -> &'static [Self];

    fn can_transition_to(self, next: Self) -> bool {
        self.successors().contains(&next)
    }

    /// Validate the edge `self -> next` for the object named `object`.
    fn transition(self, next: Self, object: &str) -> Result<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(SwarmError::IllegalTransition {
                object: object.to_string(),
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

/// Lifecycle of a managed file.
///
/// Declaration order matters: `state >= FileState::Immutable` means
/// "immutable or later".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    /// Declared; no storage reserved yet.
    Pending,
    /// Storage reservation in progress.
    Allocating,
    /// Storage reserved; a producer may write.
    Mutable,
    /// Content is being hashed and sealed.
    Committing,
    /// Sealed and readable; carries a fingerprint.
    Immutable,
    Deleting,
    Deleted,
}

impl FileState {
    /// Whether a fingerprint must be present in this state.
    pub fn is_sealed(self) -> bool {
        self >= FileState::Immutable
    }
}

impl Lifecycle for FileState {
    fn successors(self) -> &'static [Self] {
        use FileState::*;
        match self {
            Pending => &[Allocating, Deleting],
            // The backward edges are rollbacks for interrupted work.
            Allocating => &[Mutable, Pending, Deleting],
            Mutable => &[Committing, Deleting],
            Committing => &[Immutable, Mutable, Deleting],
            Immutable => &[Deleting],
            Deleting => &[Deleted],
            Deleted => &[],
        }
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileState::Pending => "PENDING",
            FileState::Allocating => "ALLOCATING",
            FileState::Mutable => "MUTABLE",
            FileState::Committing => "COMMITTING",
            FileState::Immutable => "IMMUTABLE",
            FileState::Deleting => "DELETING",
            FileState::Deleted => "DELETED",
        };
        f.write_str(s)
    }
}

/// Lifecycle of a managed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Accepted from the client, waiting for a worker.
    Submitted,
    /// Sent to a worker; devices are held.
    Dispatched,
    /// The worker reported the task as started.
    Running,
    Done,
    Failed,
    /// Completion acknowledged by the client.
    Retired,
}

impl TaskState {
    /// Whether the task currently sits on a worker.
    pub fn is_on_worker(self) -> bool {
        matches!(self, TaskState::Dispatched | TaskState::Running)
    }

    /// Whether the task still names its files as live references.
    ///
    /// A failed task may be resubmitted, so it keeps its references until
    /// it is retired or removed.
    pub fn holds_references(self) -> bool {
        !matches!(self, TaskState::Done | TaskState::Retired)
    }
}

impl Lifecycle for TaskState {
    fn successors(self) -> &'static [Self] {
        use TaskState::*;
        match self {
            Submitted => &[Dispatched],
            Dispatched => &[Running, Done, Failed, Submitted],
            Running => &[Done, Failed, Submitted],
            Done => &[Retired],
            Failed => &[Retired, Submitted],
            Retired => &[],
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Submitted => "SUBMITTED",
            TaskState::Dispatched => "DISPATCHED",
            TaskState::Running => "RUNNING",
            TaskState::Done => "DONE",
            TaskState::Failed => "FAILED",
            TaskState::Retired => "RETIRED",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_happy_path_is_legal() {
        use FileState::*;
        let path = [Pending, Allocating, Mutable, Committing, Immutable, Deleting, Deleted];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn file_skipping_states_is_rejected() {
        let err = FileState::Pending
            .transition(FileState::Immutable, "file f1")
            .unwrap_err();
        match err {
            SwarmError::IllegalTransition { object, from, to } => {
                assert_eq!(object, "file f1");
                assert_eq!(from, "PENDING");
                assert_eq!(to, "IMMUTABLE");
            }
            other => panic!("expected IllegalTransition, got {other:?}"),
        }
        assert!(!FileState::Immutable.can_transition_to(FileState::Mutable));
        assert!(FileState::Deleted.successors().is_empty());
    }

    #[test]
    fn sealed_states_are_immutable_or_later() {
        assert!(!FileState::Committing.is_sealed());
        assert!(FileState::Immutable.is_sealed());
        assert!(FileState::Deleting.is_sealed());
    }

    #[test]
    fn task_retry_edge_only_from_failed_or_worker() {
        assert!(TaskState::Failed.can_transition_to(TaskState::Submitted));
        assert!(TaskState::Running.can_transition_to(TaskState::Submitted));
        assert!(!TaskState::Done.can_transition_to(TaskState::Submitted));
        assert!(!TaskState::Submitted.can_transition_to(TaskState::Running));
    }

    #[test]
    fn states_serialize_as_upper_case() {
        assert_eq!(serde_json::to_string(&FileState::Immutable).unwrap(), "\"IMMUTABLE\"");
        assert_eq!(serde_json::to_string(&TaskState::Dispatched).unwrap(), "\"DISPATCHED\"");
    }
}
