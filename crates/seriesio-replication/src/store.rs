//! In-memory ordered log with snapshot checkpointing
//!
//! The leader appends entries with contiguous indices; followers accept
//! entries whose `prev` pointer matches their tail. Apply runs strictly in
//! index order through a caller-supplied hook and is at-least-once: hooks
//! must be idempotent.

use crate::entry::{EntryBody, LogEntry};
use crate::snapshot::PartitionedSnapshot;
use parking_lot::Mutex;
use seriesio_common::{Result, Slot};
use std::collections::HashMap;
use tracing::{debug, info};

/// Hook invoked for every committed entry, in index order.
pub trait LogApplier: Send + Sync {
    fn apply(&self, entry: &LogEntry) -> Result<()>;
}

/// Read-only view of a log's tail, used for election freshness checks.
pub trait LogView: Send + Sync {
    fn last_log_index(&self) -> i64;
    fn last_log_term(&self) -> i64;
}

struct Inner {
    /// entries[i] carries curr_index == first_index + i
    entries: Vec<LogEntry>,
    first_index: i64,
    last_index: i64,
    last_term: i64,
    commit_index: i64,
    applied_index: i64,
    applied_term: i64,
    snapshot: Option<PartitionedSnapshot>,
}

/// Append-only ordered log held in memory.
pub struct MemoryLogStore {
    inner: Mutex<Inner>,
}

impl MemoryLogStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: Vec::new(),
                first_index: 0,
                last_index: -1,
                last_term: -1,
                commit_index: -1,
                applied_index: -1,
                applied_term: -1,
                snapshot: None,
            }),
        }
    }

    /// Leader side: build and append a new entry whose `prev` pointer is
    /// the current tail.
    pub fn append_new(&self, term: i64, body: EntryBody) -> LogEntry {
        let mut inner = self.inner.lock();
        let entry = LogEntry::new(
            inner.last_index,
            inner.last_term,
            inner.last_index + 1,
            term,
            body,
        );
        inner.last_index = entry.curr_index;
        inner.last_term = entry.curr_term;
        inner.entries.push(entry.clone());
        entry
    }

    /// Follower side: accept a replicated entry if its `prev` pointer
    /// matches a position in this log. On a matching earlier position the
    /// conflicting suffix is dropped first. Returns `false` on mismatch so
    /// the leader can back off.
    pub fn try_append(&self, entry: LogEntry) -> bool {
        let mut inner = self.inner.lock();
        if entry.prev_index == inner.last_index && entry.prev_term == inner.last_term {
            inner.last_index = entry.curr_index;
            inner.last_term = entry.curr_term;
            inner.entries.push(entry);
            return true;
        }
        // overwrite path: the entry lands inside the existing log
        if entry.prev_index < inner.last_index && entry.prev_index >= inner.first_index - 1 {
            let keep = (entry.prev_index + 1 - inner.first_index) as usize;
            let prev_matches = entry.prev_index < inner.first_index
                || inner
                    .entries
                    .get(keep.wrapping_sub(1))
                    .is_none_or(|e| e.curr_term == entry.prev_term);
            if prev_matches {
                inner.entries.truncate(keep);
                inner.last_index = entry.curr_index;
                inner.last_term = entry.curr_term;
                inner.entries.push(entry);
                return true;
            }
        }
        false
    }

    #[must_use]
    pub fn commit_index(&self) -> i64 {
        self.inner.lock().commit_index
    }

    #[must_use]
    pub fn applied_index(&self) -> i64 {
        self.inner.lock().applied_index
    }

    /// Advance the commit watermark, clamped to the tail.
    pub fn commit_to(&self, index: i64) {
        let mut inner = self.inner.lock();
        inner.commit_index = inner.commit_index.max(index.min(inner.last_index));
    }

    /// Apply entries up to `index` through `applier`, in order. Entries
    /// already applied (or compacted into a snapshot) are skipped, making
    /// repeated calls idempotent; a failing hook halts the watermark at the
    /// failed entry so the next call retries it.
    pub fn apply_up_to(&self, index: i64, applier: &dyn LogApplier) -> Result<()> {
        loop {
            let entry = {
                let inner = self.inner.lock();
                let next = inner.applied_index + 1;
                if next > index.min(inner.last_index) {
                    return Ok(());
                }
                if next < inner.first_index {
                    // compacted into a snapshot, nothing to run
                    None
                } else {
                    Some(inner.entries[(next - inner.first_index) as usize].clone())
                }
            };
            if let Some(entry) = &entry {
                applier.apply(entry)?;
                debug!(entry = %entry, "entry applied");
            }
            let mut inner = self.inner.lock();
            inner.applied_index += 1;
            if let Some(entry) = entry {
                inner.applied_term = entry.curr_term;
                inner.commit_index = inner.commit_index.max(inner.applied_index);
            }
        }
    }

    /// Install a snapshot: discard entries at or below its watermark, set
    /// the tail to `(last_log_index, last_log_term)`, and cache the
    /// snapshot for later pulls.
    pub fn install_snapshot(&self, snapshot: PartitionedSnapshot) {
        let mut inner = self.inner.lock();
        let watermark = snapshot.last_log_index;
        let term = snapshot.last_log_term;
        if watermark >= inner.first_index {
            let drop = ((watermark + 1 - inner.first_index) as usize).min(inner.entries.len());
            inner.entries.drain(..drop);
            inner.first_index = watermark + 1;
        }
        if inner.last_index < watermark {
            inner.last_index = watermark;
            inner.last_term = term;
        }
        inner.commit_index = inner.commit_index.max(watermark);
        inner.applied_index = inner.applied_index.max(watermark);
        inner.applied_term = inner.applied_term.max(term);
        info!(last_log_index = watermark, last_log_term = term, "snapshot installed");
        inner.snapshot = Some(snapshot);
    }

    /// Produce a snapshot of the given per-slot content stamped with the
    /// current applied watermark.
    #[must_use]
    pub fn take_snapshot(
        &self,
        per_slot: HashMap<Slot, crate::snapshot::FileSnapshot>,
    ) -> PartitionedSnapshot {
        let inner = self.inner.lock();
        let mut snapshot = PartitionedSnapshot::new(inner.applied_index, inner.applied_term);
        for (slot, file_snapshot) in per_slot {
            snapshot.put(slot, file_snapshot);
        }
        snapshot
    }

    /// The most recently installed snapshot, if any.
    #[must_use]
    pub fn cached_snapshot(&self) -> Option<PartitionedSnapshot> {
        self.inner.lock().snapshot.clone()
    }
}

impl Default for MemoryLogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LogView for MemoryLogStore {
    fn last_log_index(&self) -> i64 {
        self.inner.lock().last_index
    }

    fn last_log_term(&self) -> i64 {
        self.inner.lock().last_term
    }
}
