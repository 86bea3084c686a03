//! Replication log entries

use seriesio_common::Node;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Variant body of a log entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EntryBody {
    /// A write or schema-mutation plan, carried as an opaque payload
    PhysicalPlan(Vec<u8>),
    /// Membership change: a node joined the cluster
    AddNode(Node),
    /// Membership change: a node left the cluster
    RemoveNode(Node),
    /// Flush boundary: seal one storage group partition
    CloseFile {
        storage_group: String,
        partition_id: i64,
        is_seq: bool,
    },
    /// Heartbeat filler, no effect on apply
    EmptyContent,
}

/// One entry of a replica group's log.
///
/// Within one group's log `curr_index = prev_index + 1` and terms are
/// monotonically non-decreasing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub prev_index: i64,
    pub prev_term: i64,
    pub curr_index: i64,
    pub curr_term: i64,
    pub body: EntryBody,
}

impl LogEntry {
    #[must_use]
    pub fn new(
        prev_index: i64,
        prev_term: i64,
        curr_index: i64,
        curr_term: i64,
        body: EntryBody,
    ) -> Self {
        Self {
            prev_index,
            prev_term,
            curr_index,
            curr_term,
            body,
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.body {
            EntryBody::PhysicalPlan(_) => "PhysicalPlan",
            EntryBody::AddNode(_) => "AddNode",
            EntryBody::RemoveNode(_) => "RemoveNode",
            EntryBody::CloseFile { .. } => "CloseFile",
            EntryBody::EmptyContent => "EmptyContent",
        };
        write!(f, "{}@({},{})", kind, self.curr_term, self.curr_index)
    }
}
