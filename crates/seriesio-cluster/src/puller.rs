//! Slot snapshot pulling
//!
//! After a membership change moves slots to this node's group, the puller
//! fetches their file snapshots from the previous owner group and applies
//! them locally. Holders are tried round-robin; a slot the contacted
//! holder does not have yet is retried after a backoff rather than treated
//! as empty, since the holder may still be applying its own snapshot.

use crate::client::DataClient;
use crate::rpc::PullSnapshotRequest;
use crate::snapshot_applier::SnapshotApplier;
use dashmap::DashSet;
use seriesio_common::{ClusterConfig, Error, Node, Result, Slot};
use seriesio_partition::PartitionGroup;
use seriesio_replication::FileSnapshot;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Rounds over the holder group before giving up on a slot.
const MAX_PULL_ROUNDS: usize = 30;

/// Pulls the file snapshots of newly owned slots from their previous
/// holders.
pub struct SlotPuller {
    client: Arc<dyn DataClient>,
    applier: Arc<SnapshotApplier>,
    /// Slots whose snapshots have been fully applied locally
    pulled: Arc<DashSet<Slot>>,
    config: ClusterConfig,
}

impl SlotPuller {
    #[must_use]
    pub fn new(
        client: Arc<dyn DataClient>,
        applier: Arc<SnapshotApplier>,
        pulled: Arc<DashSet<Slot>>,
        config: ClusterConfig,
    ) -> Self {
        Self {
            client,
            applier,
            pulled,
            config,
        }
    }

    /// Pull and apply every slot in `slots` from `previous_holders`.
    /// Completed slots are recorded in the shared pulled set even when a
    /// later slot ultimately fails.
    pub async fn pull(&self, slots: Vec<Slot>, previous_holders: &PartitionGroup) -> Result<()> {
        let mut remaining: HashSet<Slot> = slots
            .into_iter()
            .filter(|s| !self.pulled.contains(s))
            .collect();
        if remaining.is_empty() {
            return Ok(());
        }
        info!(
            slots = remaining.len(),
            holders = %previous_holders,
            "pulling slot snapshots"
        );

        for round in 0..MAX_PULL_ROUNDS {
            let holder = &previous_holders[round % previous_holders.len()];
            match self.pull_round(holder, &remaining).await {
                Ok(applied) => {
                    for slot in &applied {
                        remaining.remove(slot);
                        self.pulled.insert(*slot);
                    }
                    if remaining.is_empty() {
                        return Ok(());
                    }
                    debug!(
                        holder = %holder,
                        outstanding = remaining.len(),
                        "holder did not have all requested slots yet"
                    );
                }
                Err(e) if e.is_retryable() => {
                    warn!(holder = %holder, error = %e, "slot pull attempt failed");
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(Duration::from_millis(self.config.pull_snapshot_retry_ms)).await;
        }
        Err(Error::snapshot(format!(
            "{} slots still unavailable after {MAX_PULL_ROUNDS} rounds",
            remaining.len()
        )))
    }

    /// One pull attempt against one holder. Returns the slots that were
    /// present in the response and applied.
    async fn pull_round(&self, holder: &Node, remaining: &HashSet<Slot>) -> Result<Vec<Slot>> {
        let request = PullSnapshotRequest {
            required_slots: remaining.iter().copied().collect(),
        };
        let response = tokio::time::timeout(
            Duration::from_millis(self.config.connection_timeout_ms),
            self.client.pull_snapshot(holder, request),
        )
        .await
        .map_err(|_| Error::Timeout)??;
        let mut applied = Vec::new();
        for (slot, bytes) in response.snapshot_bytes {
            let snapshot = FileSnapshot::deserialize(&bytes)?;
            self.applier.apply(&snapshot, slot)?;
            applied.push(slot);
        }
        Ok(applied)
    }
}
