//! Outbound RPC seam
//!
//! A [`DataClient`] reaches one remote replica. The production transport
//! implements this trait over its connection pool; tests implement it with
//! in-process doubles. Every call is bounded by the connection timeout at
//! the call site, not inside the client.

use crate::rpc::{
    AppendEntryRequest, ElectionRequest, HeartbeatRequest, HeartbeatResponse, PullSnapshotRequest,
    PullSnapshotResponse,
};
use async_trait::async_trait;
use seriesio_common::{Node, Result, TimeseriesSchema};
use seriesio_storage::PhysicalPlan;

/// Client side of the replica RPC surface.
#[async_trait]
pub trait DataClient: Send + Sync {
    /// Ask `target` for its vote. The reply is a response code or the
    /// responder's term when the elector's term was stale.
    async fn start_election(&self, target: &Node, request: ElectionRequest) -> Result<i64>;

    /// Replicate one log entry to `target`.
    async fn append_entry(&self, target: &Node, request: AppendEntryRequest) -> Result<i64>;

    /// Leader liveness signal.
    async fn send_heartbeat(
        &self,
        target: &Node,
        request: HeartbeatRequest,
    ) -> Result<HeartbeatResponse>;

    /// Install a serialized partitioned snapshot on `target`.
    async fn send_snapshot(&self, target: &Node, snapshot: Vec<u8>) -> Result<()>;

    /// Fetch the file snapshots of a set of slots from `target`.
    async fn pull_snapshot(
        &self,
        target: &Node,
        request: PullSnapshotRequest,
    ) -> Result<PullSnapshotResponse>;

    /// Enumerate timeseries schemas under the prefixes on `target`.
    async fn pull_timeseries_schema(
        &self,
        target: &Node,
        prefixes: Vec<String>,
    ) -> Result<Vec<TimeseriesSchema>>;

    /// Commit watermark of `target` (normally the leader).
    async fn request_commit_index(&self, target: &Node) -> Result<i64>;

    /// Forward a non-query plan to `target` (normally the leader).
    async fn execute_non_query(&self, target: &Node, plan: PhysicalPlan) -> Result<i32>;
}
