// src/journal/mod.rs

//! Persistence journal.
//!
//! One file per record under `<root>/tasks/` and `<root>/files/`, holding a
//! JSON snapshot of the in-memory record. Store-wide counters live in
//! `<root>/meta/`. Writes are staged at
//! `<path>.tmp` and renamed into place, so a crash leaves either the old or
//! the new snapshot on disk.
//!
//! - [`staged`] owns the temporary file and removes it on every failure path.
//! - [`recover`] rebuilds the record tables from the directories at startup.

pub mod recover;
pub mod staged;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::errors::{Result, SwarmError};
use crate::store::JournalOp;

pub use recover::Recovered;
pub use staged::StagedFile;

/// Suffix of staged, not yet committed snapshots.
pub const TMP_SUFFIX: &str = ".tmp";

const TASKS_DIR: &str = "tasks";
const FILES_DIR: &str = "files";
const META_DIR: &str = "meta";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    Task,
    File,
    Meta,
}

impl RecordKind {
    fn dir_name(self) -> &'static str {
        match self {
            RecordKind::Task => TASKS_DIR,
            RecordKind::File => FILES_DIR,
            RecordKind::Meta => META_DIR,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Task => f.write_str("task"),
            RecordKind::File => f.write_str("file"),
            RecordKind::Meta => f.write_str("meta"),
        }
    }
}

/// Identity of one journaled record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub kind: RecordKind,
    pub id: String,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// A record the journal knows how to store.
pub trait Record: Serialize + DeserializeOwned {
    const KIND: RecordKind;

    /// Identifier used as the on-disk file name.
    fn record_id(&self) -> String;

    fn record_key(&self) -> RecordKey {
        RecordKey {
            kind: Self::KIND,
            id: self.record_id(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Journal {
    root: PathBuf,
    /// Extra attempts of a whole commit before it is reported as fatal.
    commit_retries: u32,
    retry_delay: Duration,
}

impl Journal {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            commit_retries: 0,
            retry_delay: Duration::from_millis(50),
        }
    }

    pub fn with_retries(mut self, commit_retries: u32) -> Self {
        self.commit_retries = commit_retries;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir_for(&self, kind: RecordKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// Final on-disk path of a record.
    pub fn path_for(&self, key: &RecordKey) -> PathBuf {
        self.dir_for(key.kind).join(&key.id)
    }

    /// Create `<root>/tasks`, `<root>/files` and `<root>/meta` if missing.
    pub fn ensure_layout(&self) -> Result<()> {
        for kind in [RecordKind::Task, RecordKind::File, RecordKind::Meta] {
            let dir = self.dir_for(kind);
            create_dir(&dir).map_err(|source| SwarmError::Journal { path: dir, source })?;
        }
        Ok(())
    }

    /// Durably replace the snapshot of `record`.
    ///
    /// The whole stage-then-rename sequence is retried up to
    /// `commit_retries` times; after that the failure is fatal. A record
    /// that cannot be serialized is fatal without retrying.
    pub fn commit<R: Record>(&self, record: &R) -> Result<()> {
        let key = record.record_key();
        let path = self.path_for(&key);
        let bytes = serde_json::to_vec_pretty(record).map_err(|e| SwarmError::Journal {
            path: path.clone(),
            source: e.into(),
        })?;

        let mut attempt = 0;
        loop {
            match self.write_snapshot(&path, &bytes) {
                Ok(()) => {
                    debug!(record = %key, path = ?path, "journal commit");
                    return Ok(());
                }
                Err(source) if attempt < self.commit_retries => {
                    attempt += 1;
                    warn!(record = %key, attempt, error = %source, "journal commit failed; retrying");
                    thread::sleep(self.retry_delay);
                }
                Err(source) => return Err(SwarmError::Journal { path, source }),
            }
        }
    }

    /// Remove the snapshot of a record. Removing an absent record is a no-op.
    pub fn remove(&self, key: &RecordKey) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(record = %key, "journal remove");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SwarmError::Journal { path, source }),
        }
    }

    /// Apply one operation produced by the object store.
    pub fn apply(&self, op: &JournalOp) -> Result<()> {
        match op {
            JournalOp::CommitFile(record) => self.commit(record),
            JournalOp::CommitTask(record) => self.commit(record),
            JournalOp::CommitMeta(meta) => self.commit(meta),
            JournalOp::Remove(key) => self.remove(key),
        }
    }

    fn write_snapshot(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            create_dir(parent)?;
        }
        let mut staged = StagedFile::create(path)?;
        staged.write_all(bytes)?;
        // Also syncs the parent directory so the rename itself is durable.
        staged.persist()
    }
}

fn create_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(dir)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serializer};

    use super::*;
    use crate::store::{FileRecord, FileState};

    /// Serializes to an error.
    #[derive(Deserialize)]
    struct Unwritable;

    impl Serialize for Unwritable {
        fn serialize<S: Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("no representation"))
        }
    }

    impl Record for Unwritable {
        const KIND: RecordKind = RecordKind::File;

        fn record_id(&self) -> String {
            "unwritable".to_string()
        }
    }

    #[test]
    fn commit_then_remove() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path());
        journal.ensure_layout().unwrap();

        let record = FileRecord::new("abc".into());
        journal.commit(&record).unwrap();

        let path = journal.path_for(&record.record_key());
        assert!(path.is_file());
        assert!(!dir.path().join("files/abc.tmp").exists());

        journal.remove(&record.record_key()).unwrap();
        assert!(!path.exists());
        // Second removal is a no-op.
        journal.remove(&record.record_key()).unwrap();
    }

    #[test]
    fn commit_replaces_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path());

        let mut record = FileRecord::new("abc".into());
        journal.commit(&record).unwrap();
        record.state = FileState::Allocating;
        journal.commit(&record).unwrap();

        let text = fs::read_to_string(journal.path_for(&record.record_key())).unwrap();
        let back: FileRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back.state, FileState::Allocating);
    }

    #[test]
    fn commit_failure_is_fatal_and_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path()).with_retries(1);
        journal.ensure_layout().unwrap();

        // A directory squatting on the final path makes the rename fail.
        let record = FileRecord::new("blocked".into());
        let path = journal.path_for(&record.record_key());
        fs::create_dir_all(path.join("child")).unwrap();

        let err = journal.commit(&record).unwrap_err();
        assert!(err.is_fatal());
        assert!(!dir.path().join("files/blocked.tmp").exists());
    }

    #[test]
    fn unserializable_record_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path()).with_retries(3);
        journal.ensure_layout().unwrap();

        let err = journal.commit(&Unwritable).unwrap_err();
        assert!(err.is_fatal());
        match err {
            SwarmError::Journal { path, .. } => assert!(path.ends_with("files/unwritable")),
            other => panic!("expected Journal, got {other:?}"),
        }
        assert!(!dir.path().join("files/unwritable").exists());
        assert!(!dir.path().join("files/unwritable.tmp").exists());
    }
}
