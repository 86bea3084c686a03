//! Logical request/response contracts of the replica RPC surface
//!
//! The wire transport itself is out of scope; these are the messages a
//! transport layer would carry. Everything is serde-serializable so any
//! codec can frame them.

use seriesio_common::{Node, Slot};
use seriesio_storage::Filter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Vote request sent by an elector to every member of its group.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ElectionRequest {
    pub term: i64,
    pub elector: Node,
    /// Tail of the elector's meta log
    pub last_log_index: i64,
    pub last_log_term: i64,
    /// Tail of the elector's data log
    pub data_log_last_index: i64,
    pub data_log_last_term: i64,
}

/// One replicated log entry, already framed by the log codec.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppendEntryRequest {
    pub term: i64,
    pub leader: Node,
    pub leader_commit: i64,
    pub entry: Vec<u8>,
}

/// Periodic leader liveness signal carrying the commit watermark.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub term: i64,
    pub leader: Node,
    pub commit_index: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub term: i64,
    pub follower: Node,
}

/// Request for the file snapshots of a set of slots.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PullSnapshotRequest {
    pub required_slots: Vec<Slot>,
}

/// Per-slot serialized `FileSnapshot`s. Slots the responder does not hold
/// are absent from the map, not empty.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PullSnapshotResponse {
    pub snapshot_bytes: HashMap<Slot, Vec<u8>>,
}

/// Reader open request for one series.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SingleSeriesQueryRequest {
    pub path: String,
    pub requester: Node,
    pub query_id: i64,
    pub time_filter: Option<Filter>,
    pub value_filter: Option<Filter>,
}

/// Group-by aggregation executor request for one series.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupByRequest {
    pub path: String,
    pub requester: Node,
    pub query_id: i64,
    pub aggregations: Vec<AggregationType>,
    pub time_filter: Option<Filter>,
}

/// Supported aggregation kinds, in wire order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationType {
    Count,
    Avg,
    Sum,
    FirstValue,
    LastValue,
    MaxTime,
    MinTime,
    MaxValue,
    MinValue,
}

impl AggregationType {
    /// All kinds, in wire order.
    pub const ALL: [Self; 9] = [
        Self::Count,
        Self::Avg,
        Self::Sum,
        Self::FirstValue,
        Self::LastValue,
        Self::MaxTime,
        Self::MinTime,
        Self::MaxValue,
        Self::MinValue,
    ];
}

/// One aggregation outcome; `None` when the window held no points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub aggregation: AggregationType,
    pub value: Option<f64>,
}
