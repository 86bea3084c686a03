//! Committed-entry apply hook
//!
//! Bridges the replication log to storage: committed entries are decoded
//! and dispatched to the schema tree, the data engine, or the partition
//! table. The hook is idempotent because the log store may replay a suffix
//! after a snapshot install.

use parking_lot::RwLock;
use seriesio_common::Result;
use seriesio_partition::SlotPartitionTable;
use seriesio_replication::{EntryBody, LogApplier, LogEntry};
use seriesio_storage::{PhysicalPlan, SchemaStore, StorageEngine};
use std::sync::Arc;
use tracing::{debug, info};

/// Applies committed data-group entries to local state.
pub struct DataLogApplier {
    storage: Arc<dyn StorageEngine>,
    schema: Arc<dyn SchemaStore>,
    table: Arc<RwLock<SlotPartitionTable>>,
}

impl DataLogApplier {
    #[must_use]
    pub fn new(
        storage: Arc<dyn StorageEngine>,
        schema: Arc<dyn SchemaStore>,
        table: Arc<RwLock<SlotPartitionTable>>,
    ) -> Self {
        Self {
            storage,
            schema,
            table,
        }
    }

    fn apply_plan(&self, plan: &PhysicalPlan) -> Result<()> {
        match plan {
            PhysicalPlan::SetStorageGroup(sg) => {
                self.schema.set_storage_group(sg)?;
                self.storage.execute(plan)
            }
            PhysicalPlan::CreateTimeseries(schema) => self.schema.register(schema.clone()),
            PhysicalPlan::Insert(_) | PhysicalPlan::Delete { .. } => self.storage.execute(plan),
        }
    }
}

impl LogApplier for DataLogApplier {
    fn apply(&self, entry: &LogEntry) -> Result<()> {
        debug!(entry = %entry, "applying committed entry");
        match &entry.body {
            EntryBody::PhysicalPlan(bytes) => self.apply_plan(&PhysicalPlan::decode(bytes)?),
            EntryBody::CloseFile {
                storage_group,
                partition_id,
                is_seq,
            } => self
                .storage
                .close_partition(storage_group, *partition_id, *is_seq),
            EntryBody::AddNode(node) => {
                info!(node = %node, "applying membership addition");
                self.table.write().add_node(node.clone());
                Ok(())
            }
            EntryBody::RemoveNode(node) => {
                info!(node = %node, "applying membership removal");
                self.table.write().remove_node(node);
                Ok(())
            }
            EntryBody::EmptyContent => Ok(()),
        }
    }
}
