//! SeriesIO cluster node
//!
//! Hosts this node's data group replica together with the UDF registration
//! service. The wire transport between nodes is pluggable behind the
//! `DataClient` seam; this binary ships with a loopback client, so a
//! single-node cluster is fully functional and multi-node deployments plug
//! a transport in.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use seriesio_cluster::client::DataClient;
use seriesio_cluster::rpc::{
    AppendEntryRequest, ElectionRequest, HeartbeatRequest, HeartbeatResponse,
    PullSnapshotRequest, PullSnapshotResponse,
};
use seriesio_cluster::DataMember;
use seriesio_common::{ClusterConfig, Error, Node, TimeseriesSchema};
use seriesio_partition::SlotPartitionTable;
use seriesio_replication::MemoryLogStore;
use seriesio_storage::{MemSchemaStore, MemStorageEngine, PhysicalPlan};
use seriesio_udf::UdfRegistrationService;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "seriesio-node")]
#[command(about = "SeriesIO cluster node")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/seriesio/node.toml")]
    config: String,

    /// Cluster-wide unique node id
    #[arg(long, default_value = "0")]
    node_id: i32,

    /// Hostname or address other nodes reach this node at
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port of the metadata group service
    #[arg(long, default_value = "9003")]
    meta_port: u16,

    /// Port of the data group service
    #[arg(long, default_value = "40010")]
    data_port: u16,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// On-disk node configuration.
#[derive(Debug, Default, Deserialize)]
struct NodeConfig {
    #[serde(default)]
    cluster: Option<ClusterConfig>,
    /// Other cluster members forming the initial ring
    #[serde(default)]
    seeds: Vec<Node>,
}

/// Loopback client: every outbound call fails as unreachable, which is
/// correct for a single-node ring where no call is ever made. Multi-node
/// deployments replace this with a real transport.
struct LoopbackClient;

#[async_trait]
impl DataClient for LoopbackClient {
    async fn start_election(&self, target: &Node, _request: ElectionRequest) -> seriesio_common::Result<i64> {
        Err(Error::ConnectionFailed(format!("no transport to {target}")))
    }

    async fn append_entry(&self, target: &Node, _request: AppendEntryRequest) -> seriesio_common::Result<i64> {
        Err(Error::ConnectionFailed(format!("no transport to {target}")))
    }

    async fn send_heartbeat(
        &self,
        target: &Node,
        _request: HeartbeatRequest,
    ) -> seriesio_common::Result<HeartbeatResponse> {
        Err(Error::ConnectionFailed(format!("no transport to {target}")))
    }

    async fn send_snapshot(&self, target: &Node, _snapshot: Vec<u8>) -> seriesio_common::Result<()> {
        Err(Error::ConnectionFailed(format!("no transport to {target}")))
    }

    async fn pull_snapshot(
        &self,
        target: &Node,
        _request: PullSnapshotRequest,
    ) -> seriesio_common::Result<PullSnapshotResponse> {
        Err(Error::ConnectionFailed(format!("no transport to {target}")))
    }

    async fn pull_timeseries_schema(
        &self,
        target: &Node,
        _prefixes: Vec<String>,
    ) -> seriesio_common::Result<Vec<TimeseriesSchema>> {
        Err(Error::ConnectionFailed(format!("no transport to {target}")))
    }

    async fn request_commit_index(&self, target: &Node) -> seriesio_common::Result<i64> {
        Err(Error::ConnectionFailed(format!("no transport to {target}")))
    }

    async fn execute_non_query(&self, target: &Node, _plan: PhysicalPlan) -> seriesio_common::Result<i32> {
        Err(Error::ConnectionFailed(format!("no transport to {target}")))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting SeriesIO node {}", args.node_id);

    let node_config = match std::fs::read_to_string(&args.config) {
        Ok(raw) => toml::from_str::<NodeConfig>(&raw)
            .with_context(|| format!("invalid configuration file {}", args.config))?,
        Err(_) => {
            info!("no configuration file at {}, using defaults", args.config);
            NodeConfig::default()
        }
    };
    let config = node_config.cluster.unwrap_or_default();

    let this_node = Node::new(args.host, args.meta_port, args.node_id, args.data_port);
    let mut ring = node_config.seeds;
    if !ring.contains(&this_node) {
        ring.push(this_node.clone());
    }
    info!(nodes = ring.len(), replication = config.replication_num, "forming ring");

    let table = Arc::new(parking_lot::RwLock::new(SlotPartitionTable::new(
        ring,
        config.replication_num,
    )));
    let group = table
        .read()
        .header_group(&this_node)
        .context("this node is not on the ring")?;
    info!(group = %group, "hosting data group");

    let storage = Arc::new(MemStorageEngine::new());
    let schema = Arc::new(MemSchemaStore::new());
    let meta_log = Arc::new(MemoryLogStore::new());
    let member = Arc::new(DataMember::new(
        this_node,
        group,
        meta_log,
        storage,
        schema,
        table,
        Arc::new(LoopbackClient),
        config.clone(),
    ));

    let udf = UdfRegistrationService::new(&config.data_dir);
    udf.start().context("UDF registration service failed to start")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let driver = member.start(shutdown_rx);

    tokio::signal::ctrl_c().await.ok();
    info!("Shutting down...");
    shutdown_tx.send(true).ok();
    driver.await.ok();
    udf.stop().context("UDF registration service failed to stop")?;

    info!("SeriesIO node shut down gracefully");
    Ok(())
}
