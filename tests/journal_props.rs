// tests/journal_props.rs

use std::collections::BTreeMap;

use proptest::prelude::*;
use serde_json::json;
use tempfile::tempdir;

use swarmstate::journal::{Journal, RecordKey, RecordKind};
use swarmstate::resources::Resources;
use swarmstate::store::{FileRecord, FileState, TaskRecord, TaskState};
use swarmstate::types::TaskOutcome;

#[derive(Debug, Clone)]
enum Op {
    CommitFile(FileRecord),
    CommitTask(TaskRecord),
    RemoveFile(String),
    RemoveTask(u64),
}

fn file_id() -> impl Strategy<Value = String> {
    (0..4u8).prop_map(|n| format!("f{n}"))
}

fn file_state() -> impl Strategy<Value = FileState> {
    prop_oneof![
        Just(FileState::Pending),
        Just(FileState::Allocating),
        Just(FileState::Mutable),
        Just(FileState::Committing),
        Just(FileState::Immutable),
        Just(FileState::Deleting),
    ]
}

fn task_state() -> impl Strategy<Value = TaskState> {
    prop_oneof![
        Just(TaskState::Submitted),
        Just(TaskState::Dispatched),
        Just(TaskState::Running),
        Just(TaskState::Done),
        Just(TaskState::Failed),
    ]
}

fn file_record() -> impl Strategy<Value = FileRecord> {
    (
        file_id(),
        file_state(),
        -1..100_000i64,
        proptest::option::of("[a-z]{1,8}"),
        proptest::option::of("[a-z]{1,8}"),
        proptest::option::of("[a-z]{0,6}"),
        proptest::option::of("[0-9a-f]{64}"),
    )
        .prop_map(|(file_id, state, size, file_type, project, owner, fingerprint)| FileRecord {
            file_id,
            state,
            size,
            file_type,
            project,
            metadata: owner.map(|o| json!({"owner": o})),
            fingerprint,
        })
}

fn resources() -> impl Strategy<Value = Resources> {
    (-1..64i64, -1..4096i64, -1..4096i64, -1..8i64).prop_map(|(cores, memory, disk, devices)| {
        Resources {
            cores,
            memory,
            disk,
            devices,
        }
    })
}

fn outcome() -> impl Strategy<Value = TaskOutcome> {
    prop_oneof![
        Just(TaskOutcome::Success),
        any::<i32>().prop_map(TaskOutcome::Failed),
    ]
}

fn task_record() -> impl Strategy<Value = TaskRecord> {
    (
        (1..6u64, task_state(), "[a-z][a-z ./-]{0,16}", 0..5u32),
        (
            proptest::collection::vec(file_id(), 0..3),
            proptest::collection::vec(file_id(), 0..3),
            resources(),
            proptest::collection::btree_map("[A-Z]{1,6}", "[ -~]{0,8}", 0..3),
        ),
        (
            proptest::option::of("[a-z]{1,8}"),
            proptest::option::of("w[0-9]{1,3}"),
            proptest::option::of(outcome()),
        ),
    )
        .prop_map(
            |(
                (task_id, state, command, attempts),
                (inputs, outputs, resources, environment),
                (project, worker, outcome),
            )| TaskRecord {
                task_id,
                state,
                command,
                inputs,
                outputs,
                resources,
                environment,
                project,
                worker,
                outcome,
                attempts,
            },
        )
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => file_record().prop_map(Op::CommitFile),
        3 => task_record().prop_map(Op::CommitTask),
        1 => file_id().prop_map(Op::RemoveFile),
        1 => (1..6u64).prop_map(Op::RemoveTask),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn recovery_returns_last_committed_snapshots(
        ops in proptest::collection::vec(op_strategy(), 1..24),
    ) {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path());
        journal.ensure_layout().unwrap();

        let mut files: BTreeMap<String, FileRecord> = BTreeMap::new();
        let mut tasks: BTreeMap<u64, TaskRecord> = BTreeMap::new();

        for op in ops {
            match op {
                Op::CommitFile(record) => {
                    journal.commit(&record).unwrap();
                    files.insert(record.file_id.clone(), record);
                }
                Op::CommitTask(record) => {
                    journal.commit(&record).unwrap();
                    tasks.insert(record.task_id, record);
                }
                Op::RemoveFile(id) => {
                    journal.remove(&RecordKey { kind: RecordKind::File, id: id.clone() }).unwrap();
                    files.remove(&id);
                }
                Op::RemoveTask(id) => {
                    journal.remove(&RecordKey { kind: RecordKind::Task, id: id.to_string() }).unwrap();
                    tasks.remove(&id);
                }
            }
        }

        let recovered = journal.recover_all().unwrap();
        prop_assert_eq!(recovered.files, files.into_values().collect::<Vec<_>>());
        prop_assert_eq!(recovered.tasks, tasks.into_values().collect::<Vec<_>>());

        // Nothing staged survives a successful commit.
        for kind in [RecordKind::File, RecordKind::Task] {
            for entry in std::fs::read_dir(journal.dir_for(kind)).unwrap() {
                let entry = entry.unwrap();
                prop_assert!(!entry.file_name().to_string_lossy().ends_with(".tmp"));
            }
        }
    }
}
