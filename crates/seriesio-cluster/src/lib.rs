//! SeriesIO Cluster - the data group replica
//!
//! Ties the partition table, the replication log, and the storage seams
//! together into a [`DataMember`]: one node's replica of one data group. A
//! member campaigns and votes, replicates the group log, sheds or adopts
//! slots on membership changes, transfers snapshots, and serves reads for
//! the series its group owns. Outbound RPC goes through the [`DataClient`]
//! seam so any transport (or a test double) can carry it.

pub mod applier;
pub mod client;
pub mod group_by;
pub mod member;
pub mod puller;
pub mod query;
pub mod rpc;
pub mod snapshot_applier;

pub use applier::DataLogApplier;
pub use client::DataClient;
pub use group_by::GroupByExecutor;
pub use member::{DataMember, NodeCharacter};
pub use puller::SlotPuller;
pub use query::QueryRouter;
pub use snapshot_applier::SnapshotApplier;
