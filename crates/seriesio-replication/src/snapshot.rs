//! Partitioned snapshots
//!
//! A [`FileSnapshot`] captures everything one slot needs to be rebuilt
//! elsewhere: the timeseries schemas plus the sealed file descriptors with
//! their source node. A [`PartitionedSnapshot`] stamps a map of per-slot
//! file snapshots with the log watermark it compacts.

use seriesio_common::{Error, Node, Result, Slot, TimeseriesSchema};
use seriesio_storage::FileResource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Snapshot of a single slot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileSnapshot {
    schemas: Vec<TimeseriesSchema>,
    files: Vec<(FileResource, Node)>,
}

impl FileSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a schema, keeping set semantics.
    pub fn add_schema(&mut self, schema: TimeseriesSchema) {
        if !self.schemas.contains(&schema) {
            self.schemas.push(schema);
        }
    }

    /// Record a file together with the node it can be fetched from.
    pub fn add_file(&mut self, resource: FileResource, source: Node) {
        self.files.push((resource, source));
    }

    #[must_use]
    pub fn schemas(&self) -> &[TimeseriesSchema] {
        &self.schemas
    }

    #[must_use]
    pub fn files(&self) -> &[(FileResource, Node)] {
        &self.files
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty() && self.files.is_empty()
    }

    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        bincode::serialize(self).expect("snapshot serialization is infallible")
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Compacted state of a group's log: the watermark `(last_log_index,
/// last_log_term)` plus the per-slot file snapshots reconstructing the data
/// up to that point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartitionedSnapshot {
    pub last_log_index: i64,
    pub last_log_term: i64,
    slots: HashMap<Slot, FileSnapshot>,
}

impl PartitionedSnapshot {
    #[must_use]
    pub fn new(last_log_index: i64, last_log_term: i64) -> Self {
        Self {
            last_log_index,
            last_log_term,
            slots: HashMap::new(),
        }
    }

    pub fn put(&mut self, slot: Slot, snapshot: FileSnapshot) {
        self.slots.insert(slot, snapshot);
    }

    #[must_use]
    pub fn get(&self, slot: Slot) -> Option<&FileSnapshot> {
        self.slots.get(&slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, &FileSnapshot)> {
        self.slots.iter().map(|(slot, snap)| (*slot, snap))
    }

    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        bincode::serialize(self).expect("snapshot serialization is infallible")
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl Default for PartitionedSnapshot {
    fn default() -> Self {
        Self::new(-1, -1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seriesio_common::TsDataType;

    #[test]
    fn test_file_snapshot_round_trip() {
        let mut snapshot = FileSnapshot::new();
        snapshot.add_schema(TimeseriesSchema::new("root.sg0.d0.s0", TsDataType::Double));
        let mut resource = FileResource::new("0-1-0.tsf", "root.sg0");
        resource.historical_versions.insert(1);
        resource.update_time("root.sg0.d0", 0);
        resource.update_time("root.sg0.d0", 99);
        snapshot.add_file(resource, Node::new("127.0.0.1", 9003, 0, 40010));

        let restored = FileSnapshot::deserialize(&snapshot.serialize()).unwrap();
        assert_eq!(snapshot, restored);
    }

    #[test]
    fn test_schema_set_semantics() {
        let mut snapshot = FileSnapshot::new();
        let schema = TimeseriesSchema::new("root.sg0.d0.s0", TsDataType::Double);
        snapshot.add_schema(schema.clone());
        snapshot.add_schema(schema);
        assert_eq!(snapshot.schemas().len(), 1);
    }

    #[test]
    fn test_partitioned_snapshot_round_trip() {
        let mut snapshot = PartitionedSnapshot::new(100, 100);
        for slot in 0..3 {
            snapshot.put(slot, FileSnapshot::new());
        }
        let restored = PartitionedSnapshot::deserialize(&snapshot.serialize()).unwrap();
        assert_eq!(restored.last_log_index, 100);
        assert_eq!(restored.last_log_term, 100);
        assert_eq!(restored.slot_count(), 3);
    }
}
