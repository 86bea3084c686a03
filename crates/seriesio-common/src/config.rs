//! Configuration types for SeriesIO
//!
//! Cluster-level knobs shared by every component. The node binary loads a
//! TOML file into [`ClusterConfig`] and passes it down at construction time;
//! there is no process-global configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Size of the slot universe. Slot ids are `0 <= s < SLOT_NUM`.
pub const SLOT_NUM: u32 = 10_000;

/// Cluster configuration for a single node
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Upper bound for any single outbound RPC
    pub connection_timeout_ms: u64,
    /// How long a follower waits to catch up with the leader's commit index
    /// before forwarding a read instead
    pub sync_leader_max_wait_ms: u64,
    /// Interval between leader heartbeats
    pub heartbeat_interval_ms: u64,
    /// Election timeout range; each elector samples a timeout in
    /// `[election_timeout_min_ms, election_timeout_max_ms)`
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    /// Number of replicas per data group
    pub replication_num: usize,
    /// Backoff between retries of a failed slot snapshot pull
    pub pull_snapshot_retry_ms: u64,
    /// Directory for node-local state (registration log, etc.)
    pub data_dir: PathBuf,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            connection_timeout_ms: 20_000,
            sync_leader_max_wait_ms: 20_000,
            heartbeat_interval_ms: 1_000,
            election_timeout_min_ms: 2_000,
            election_timeout_max_ms: 4_000,
            replication_num: 3,
            pull_snapshot_retry_ms: 500,
            data_dir: PathBuf::from("/var/lib/seriesio"),
        }
    }
}
