// src/gc/mod.rs

//! Reference-counted garbage collection of files.
//!
//! A file's reference count is the number of live tasks and DAG nodes that
//! name it. A file is *eligible* once it has been referenced, its count has
//! dropped back to zero, it is not preserved, and it is `IMMUTABLE` (or
//! later). Files still being produced are never collected, and neither is
//! anything a live task or node still names.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::store::{FileRecord, ObjectStore};
use crate::types::{FileId, GcMethod, NodeId};

/// Result of a single collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GcReport {
    pub collected: Vec<FileId>,
    pub bytes_reclaimed: u64,
}

impl GcReport {
    pub fn is_empty(&self) -> bool {
        self.collected.is_empty()
    }
}

/// Running totals across collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GcStats {
    pub runs: u64,
    pub files_collected: u64,
    pub bytes_reclaimed: u64,
}

#[derive(Debug, Clone)]
pub struct GarbageCollector {
    method: GcMethod,
    capacity_bytes: u64,
    threshold_bytes: u64,
    ref_counts: HashMap<FileId, usize>,
    preserved: HashSet<FileId>,
    stats: GcStats,
}

impl GarbageCollector {
    pub fn new(method: GcMethod) -> Self {
        Self {
            method,
            capacity_bytes: 0,
            threshold_bytes: 0,
            ref_counts: HashMap::new(),
            preserved: HashSet::new(),
            stats: GcStats::default(),
        }
    }

    /// Storage budget used by `OnDemand`.
    pub fn with_storage(mut self, capacity_bytes: u64, threshold_bytes: u64) -> Self {
        self.capacity_bytes = capacity_bytes;
        self.threshold_bytes = threshold_bytes;
        self
    }

    pub fn method(&self) -> GcMethod {
        self.method
    }

    pub fn stats(&self) -> GcStats {
        self.stats
    }

    /// Seed counts from `(node, file)` membership pairs: each file counts
    /// once per distinct node naming it. Returns the number of files touched.
    pub fn prepare<I>(&mut self, pairs: I) -> usize
    where
        I: IntoIterator<Item = (NodeId, FileId)>,
    {
        let mut seen: HashSet<(NodeId, FileId)> = HashSet::new();
        let mut touched: HashSet<FileId> = HashSet::new();
        for (node, file) in pairs {
            if seen.insert((node, file.clone())) {
                *self.ref_counts.entry(file.clone()).or_insert(0) += 1;
                touched.insert(file);
            }
        }
        debug!(files = touched.len(), memberships = seen.len(), "gc prepared");
        touched.len()
    }

    /// One more live holder for each of `files`.
    pub fn add_references(&mut self, files: &[FileId]) {
        for f in files {
            *self.ref_counts.entry(f.clone()).or_insert(0) += 1;
        }
    }

    /// One holder of each of `files` is gone. Returns the files whose count
    /// just reached zero.
    pub fn release_references(&mut self, files: &[FileId]) -> Vec<FileId> {
        let mut zeroed = Vec::new();
        for f in files {
            match self.ref_counts.get_mut(f) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    debug!(file = %f, count = *count, "released reference");
                    if *count == 0 {
                        zeroed.push(f.clone());
                    }
                }
                _ => warn!(file = %f, "released a file that holds no references"),
            }
        }
        zeroed
    }

    /// Current count, or `None` for a file that was never referenced.
    pub fn ref_count(&self, file: &str) -> Option<usize> {
        self.ref_counts.get(file).copied()
    }

    /// Never collect `file`.
    pub fn preserve(&mut self, file: impl Into<FileId>) {
        self.preserved.insert(file.into());
    }

    /// Stop tracking a file that no longer exists.
    pub fn forget(&mut self, file: &str) {
        self.ref_counts.remove(file);
        self.preserved.remove(file);
    }

    pub fn is_eligible(&self, file: &FileRecord) -> bool {
        self.ref_counts.get(&file.file_id) == Some(&0)
            && !self.preserved.contains(&file.file_id)
            && file.state.is_sealed()
    }

    /// Eligible files in the store, sorted by id.
    pub fn eligible(&self, store: &ObjectStore) -> Vec<FileId> {
        let mut ids: Vec<FileId> = store
            .files()
            .filter(|f| self.is_eligible(f))
            .map(|f| f.file_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Configured capacity minus what live files occupy.
    pub fn available_bytes(&self, store: &ObjectStore) -> u64 {
        self.capacity_bytes.saturating_sub(store.live_bytes())
    }

    /// Run one collection as `trigger` asks.
    ///
    /// Nothing happens when collection is disabled. `OnDemand` only acts
    /// while available storage is below the threshold; `RefCount` and
    /// `Force` delete every eligible file.
    pub fn collect(&mut self, store: &mut ObjectStore, trigger: GcMethod) -> Result<GcReport> {
        let mut report = GcReport::default();
        if self.method == GcMethod::None {
            return Ok(report);
        }

        match trigger {
            GcMethod::None => return Ok(report),
            GcMethod::OnDemand => {
                let available = self.available_bytes(store);
                if available >= self.threshold_bytes {
                    debug!(available, threshold = self.threshold_bytes, "gc not needed");
                    return Ok(report);
                }
                info!(available, threshold = self.threshold_bytes, "storage low; collecting");
            }
            GcMethod::RefCount | GcMethod::Force => {}
        }

        for id in self.eligible(store) {
            let size = store.file(&id).map(FileRecord::stored_bytes).unwrap_or(0);
            match store.delete_file(&id) {
                Ok(Some(_)) => {
                    self.forget(&id);
                    report.bytes_reclaimed += size;
                    report.collected.push(id);
                }
                Ok(None) => self.forget(&id),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(file = %id, error = %e, "gc could not delete file"),
            }
        }

        self.stats.runs += 1;
        self.stats.files_collected += report.collected.len() as u64;
        self.stats.bytes_reclaimed += report.bytes_reclaimed;
        if !report.is_empty() {
            info!(
                method = %trigger,
                files = report.collected.len(),
                bytes = report.bytes_reclaimed,
                "gc collected files"
            );
        }
        Ok(report)
    }
}
