//! File resources and deletion markers
//!
//! A [`FileResource`] describes one sealed data file: its per-device time
//! ranges, the set of historical versions merged into it, and any deletion
//! markers recorded in its mod file. Resources are what snapshots ship
//! between groups and what the snapshot applier reconciles locally.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A deletion recorded against a file's mod file. Content-addressed by
/// `(path, start_time, end_time)` so replaying it twice is a no-op.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Deletion {
    /// Path prefix the deletion applies to (a series or a whole device)
    pub path: String,
    pub start_time: i64,
    pub end_time: i64,
}

impl Deletion {
    #[must_use]
    pub fn new(path: impl Into<String>, start_time: i64, end_time: i64) -> Self {
        Self {
            path: path.into(),
            start_time,
            end_time,
        }
    }
}

/// Descriptor of one sealed data file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileResource {
    /// File name, unique within the storage group
    pub path: String,
    /// Storage group the file belongs to
    pub storage_group: String,
    /// Source file generation numbers merged into this file. A file whose
    /// set strictly contains another's subsumes it.
    pub historical_versions: BTreeSet<u64>,
    /// Earliest timestamp per device
    pub start_times: HashMap<String, i64>,
    /// Latest timestamp per device
    pub end_times: HashMap<String, i64>,
    /// Deletion markers in the mod file
    pub deletions: Vec<Deletion>,
}

impl FileResource {
    #[must_use]
    pub fn new(path: impl Into<String>, storage_group: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            storage_group: storage_group.into(),
            historical_versions: BTreeSet::new(),
            start_times: HashMap::new(),
            end_times: HashMap::new(),
            deletions: Vec::new(),
        }
    }

    /// Widen the recorded time range of `device` to include `time`.
    pub fn update_time(&mut self, device: &str, time: i64) {
        self.start_times
            .entry(device.to_string())
            .and_modify(|t| *t = (*t).min(time))
            .or_insert(time);
        self.end_times
            .entry(device.to_string())
            .and_modify(|t| *t = (*t).max(time))
            .or_insert(time);
    }

    /// Whether the versions of `other` are a strict subset of this file's.
    #[must_use]
    pub fn subsumes(&self, other: &Self) -> bool {
        self.historical_versions.len() > other.historical_versions.len()
            && other.historical_versions.is_subset(&self.historical_versions)
    }

    /// Whether this file carries deletion markers.
    #[must_use]
    pub fn has_deletions(&self) -> bool {
        !self.deletions.is_empty()
    }

    /// Record a deletion if an identical one is not already present.
    pub fn add_deletion(&mut self, deletion: Deletion) {
        if !self.deletions.contains(&deletion) {
            self.deletions.push(deletion);
        }
    }
}
