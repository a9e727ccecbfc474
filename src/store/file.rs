// src/store/file.rs

use std::io::Read;

use anyhow::Context;
use blake3::Hasher;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::Result;
use crate::journal::{Record, RecordKind};
use crate::store::schema::FILE_DECLARE;
use crate::store::state::FileState;
use crate::types::FileId;

/// Snapshot of one managed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: FileId,
    pub state: FileState,
    /// Byte size, `-1` until content is committed.
    pub size: i64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Content hash; present iff the state is immutable or later.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl FileRecord {
    pub fn new(file_id: FileId) -> Self {
        Self {
            file_id,
            state: FileState::Pending,
            size: -1,
            file_type: None,
            project: None,
            metadata: None,
            fingerprint: None,
        }
    }

    /// Build a `PENDING` record from a `file-declare` document.
    pub fn from_request(file_id: FileId, doc: &Value) -> Result<Self> {
        let obj = FILE_DECLARE.validate(doc)?;
        let mut record = Self::new(file_id);
        record.file_type = obj.get("type").and_then(Value::as_str).map(str::to_string);
        record.project = obj.get("project").and_then(Value::as_str).map(str::to_string);
        record.metadata = obj.get("metadata").cloned();
        Ok(record)
    }

    /// The declared attributes, keyed the way the request named them.
    pub fn declared_attributes(&self) -> Map<String, Value> {
        let mut attrs = Map::new();
        if let Some(t) = &self.file_type {
            attrs.insert("type".into(), Value::String(t.clone()));
        }
        if let Some(p) = &self.project {
            attrs.insert("project".into(), Value::String(p.clone()));
        }
        if let Some(m) = &self.metadata {
            attrs.insert("metadata".into(), m.clone());
        }
        attrs
    }

    /// Whether the fingerprint invariant holds for this snapshot.
    ///
    /// An `IMMUTABLE` file always has one and nothing before it does. A file
    /// being torn down keeps whatever it had.
    pub fn is_consistent(&self) -> bool {
        match self.state {
            FileState::Immutable => self.fingerprint.is_some(),
            s if !s.is_sealed() => self.fingerprint.is_none(),
            _ => true,
        }
    }

    /// Recorded size, counting unmeasured files as empty.
    pub fn stored_bytes(&self) -> u64 {
        self.size.max(0) as u64
    }
}

impl Record for FileRecord {
    const KIND: RecordKind = RecordKind::File;

    fn record_id(&self) -> String {
        self.file_id.clone()
    }
}

/// Hash everything `reader` yields. Returns the hex fingerprint and the
/// number of bytes read.
pub fn fingerprint<R: Read>(mut reader: R) -> Result<(String, i64)> {
    let mut hasher = Hasher::new();
    let mut buf = [0u8; 8192];
    let mut total: i64 = 0;
    loop {
        let n = reader.read(&mut buf).context("reading file content for fingerprint")?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as i64;
    }
    Ok((hasher.finalize().to_hex().to_string(), total))
}
