// src/journal/recover.rs

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::errors::{Result, SwarmError};
use crate::store::meta::META_ID;
use crate::store::{FileRecord, StoreMeta, TaskRecord};

use super::staged::is_staged;
use super::{Journal, Record, RecordKey, RecordKind};

/// Everything read back from the journal at startup.
#[derive(Debug, Default)]
pub struct Recovered {
    pub tasks: Vec<TaskRecord>,
    pub files: Vec<FileRecord>,
    /// Absent for a journal that never accepted a task.
    pub meta: Option<StoreMeta>,
}

impl Journal {
    /// Rebuild every task and file record from disk.
    ///
    /// Staged `.tmp` entries are skipped. A record that cannot be parsed, or
    /// whose id differs from its file name, aborts the whole recovery with
    /// [`SwarmError::CorruptRecord`]; a directory that cannot be read is
    /// reported as [`SwarmError::Journal`].
    pub fn recover_all(&self) -> Result<Recovered> {
        self.ensure_layout()?;

        let mut tasks: Vec<TaskRecord> = self.load_kind(RecordKind::Task)?;
        let mut files: Vec<FileRecord> = self.load_kind(RecordKind::File)?;
        tasks.sort_by_key(|t| t.task_id);
        files.sort_by(|a, b| a.file_id.cmp(&b.file_id));
        let meta = self.load_meta()?;

        info!(
            root = ?self.root(),
            tasks = tasks.len(),
            files = files.len(),
            next_task_id = meta.map(|m| m.next_task_id),
            "journal recovery complete"
        );

        Ok(Recovered { tasks, files, meta })
    }

    fn load_meta(&self) -> Result<Option<StoreMeta>> {
        let path = self.path_for(&RecordKey {
            kind: RecordKind::Meta,
            id: META_ID.to_string(),
        });
        if !path.is_file() {
            return Ok(None);
        }
        load_record(&path).map(Some)
    }

    fn load_kind<R: Record>(&self, kind: RecordKind) -> Result<Vec<R>> {
        let dir = self.dir_for(kind);
        let entries = fs::read_dir(&dir).map_err(|source| SwarmError::Journal {
            path: dir.clone(),
            source,
        })?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| SwarmError::Journal {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();

            if is_staged(&path) {
                warn!(path = ?path, "skipping uncommitted journal entry");
                continue;
            }
            if !path.is_file() {
                debug!(path = ?path, "skipping non-file journal entry");
                continue;
            }

            let record = load_record::<R>(&path)?;
            let id = record.record_id();
            if entry.file_name().to_str() != Some(id.as_str()) {
                return Err(SwarmError::CorruptRecord {
                    path,
                    source: <serde_json::Error as serde::de::Error>::custom(format!(
                        "snapshot holds {kind} {id}"
                    )),
                });
            }
            records.push(record);
        }

        debug!(kind = %kind, count = records.len(), "loaded journal records");
        Ok(records)
    }
}

/// Parse a single snapshot.
pub fn load_record<R: Record>(path: &Path) -> Result<R> {
    let bytes = fs::read(path).map_err(|source| SwarmError::Journal {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| SwarmError::CorruptRecord {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_root_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested/state");
        let journal = Journal::new(&root);

        let recovered = journal.recover_all().unwrap();
        assert!(recovered.tasks.is_empty());
        assert!(recovered.files.is_empty());
        assert!(root.join("tasks").is_dir());
        assert!(root.join("files").is_dir());
    }

    #[test]
    fn corrupt_record_aborts_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path());
        journal.ensure_layout().unwrap();
        fs::write(dir.path().join("tasks/3"), b"{ not json").unwrap();

        match journal.recover_all() {
            Err(SwarmError::CorruptRecord { path, .. }) => {
                assert!(path.ends_with("tasks/3"));
            }
            other => panic!("expected CorruptRecord, got {other:?}"),
        }
    }

    #[test]
    fn staged_entries_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path());
        journal.ensure_layout().unwrap();
        fs::write(dir.path().join("files/abc.tmp"), b"{ half").unwrap();

        let recovered = journal.recover_all().unwrap();
        assert!(recovered.files.is_empty());
    }

    #[test]
    fn misnamed_snapshot_aborts_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path());
        journal.ensure_layout().unwrap();

        // A copy of file "a" saved under the name "b".
        let record = FileRecord::new("a".into());
        journal.commit(&record).unwrap();
        fs::copy(dir.path().join("files/a"), dir.path().join("files/b")).unwrap();

        match journal.recover_all() {
            Err(SwarmError::CorruptRecord { path, source }) => {
                assert!(path.ends_with("files/b"));
                assert!(source.to_string().contains("file a"));
            }
            other => panic!("expected CorruptRecord, got {other:?}"),
        }
    }

    #[test]
    fn meta_snapshot_is_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path());
        assert!(journal.recover_all().unwrap().meta.is_none());

        journal.commit(&StoreMeta { next_task_id: 12 }).unwrap();
        assert!(dir.path().join("meta/store").is_file());
        let recovered = journal.recover_all().unwrap();
        assert_eq!(recovered.meta, Some(StoreMeta { next_task_id: 12 }));
    }
}
