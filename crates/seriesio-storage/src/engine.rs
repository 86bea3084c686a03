//! In-memory storage engine
//!
//! Points live in per-series ordered maps; sealing a partition turns the
//! working time ranges into a sealed [`FileResource`] with a fresh version
//! number. Ingested external files are classified as sequence or
//! unsequence against the already-sealed sequence files, matching the
//! engine contract the snapshot applier relies on.

use crate::filter::Filter;
use crate::plan::PhysicalPlan;
use crate::resource::{Deletion, FileResource};
use crate::traits::StorageEngine;
use parking_lot::RwLock;
use seriesio_common::{storage_group_of, Error, Result, TimeValuePair, TsValue};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

#[derive(Default)]
struct SgData {
    /// All points per series path, ordered by timestamp
    series: BTreeMap<String, BTreeMap<i64, TsValue>>,
    /// Per-device time range of data not yet sealed into a file
    working: HashMap<String, (i64, i64)>,
    seq: Vec<FileResource>,
    unseq: Vec<FileResource>,
}

/// Storage engine held entirely in memory.
pub struct MemStorageEngine {
    groups: RwLock<HashMap<String, SgData>>,
    next_version: AtomicU64,
}

impl MemStorageEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            next_version: AtomicU64::new(1),
        }
    }

    fn with_group<T>(
        &self,
        storage_group: &str,
        f: impl FnOnce(&mut SgData) -> Result<T>,
    ) -> Result<T> {
        let mut groups = self.groups.write();
        let data = groups
            .get_mut(storage_group)
            .ok_or_else(|| Error::StorageGroupNotSet(storage_group.to_string()))?;
        f(data)
    }

    /// Latest sealed end time of `device` across the sequence files.
    fn last_sequence_end(data: &SgData, device: &str) -> Option<i64> {
        data.seq
            .iter()
            .filter_map(|r| r.end_times.get(device).copied())
            .max()
    }
}

impl Default for MemStorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine for MemStorageEngine {
    fn execute(&self, plan: &PhysicalPlan) -> Result<()> {
        match plan {
            PhysicalPlan::SetStorageGroup(sg) => {
                self.groups.write().entry(sg.clone()).or_default();
                info!(storage_group = %sg, "storage group set");
                Ok(())
            }
            PhysicalPlan::CreateTimeseries(_) => Ok(()),
            PhysicalPlan::Insert(insert) => {
                let sg = storage_group_of(&insert.device);
                self.with_group(&sg, |data| {
                    for (measurement, value) in
                        insert.measurements.iter().zip(insert.values.iter())
                    {
                        let path = format!("{}.{}", insert.device, measurement);
                        data.series
                            .entry(path)
                            .or_default()
                            .insert(insert.time, value.clone());
                    }
                    data.working
                        .entry(insert.device.clone())
                        .and_modify(|(min, max)| {
                            *min = (*min).min(insert.time);
                            *max = (*max).max(insert.time);
                        })
                        .or_insert((insert.time, insert.time));
                    Ok(())
                })
            }
            PhysicalPlan::Delete {
                path,
                start_time,
                end_time,
            } => {
                let sg = storage_group_of(path);
                self.with_group(&sg, |data| {
                    for (series, points) in &mut data.series {
                        if series == path || series.starts_with(&format!("{path}.")) {
                            points.retain(|t, _| *t < *start_time || *t > *end_time);
                        }
                    }
                    let deletion = Deletion::new(path.clone(), *start_time, *end_time);
                    for resource in data.seq.iter_mut().chain(data.unseq.iter_mut()) {
                        resource.add_deletion(deletion.clone());
                    }
                    Ok(())
                })
            }
        }
    }

    fn close_partition(&self, storage_group: &str, partition_id: i64, is_seq: bool) -> Result<()> {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        self.with_group(storage_group, |data| {
            if data.working.is_empty() {
                return Ok(());
            }
            let mut resource = FileResource::new(
                format!("{partition_id}-{version}-0.tsf"),
                storage_group.to_string(),
            );
            resource.historical_versions.insert(version);
            for (device, (min, max)) in data.working.drain() {
                resource.start_times.insert(device.clone(), min);
                resource.end_times.insert(device, max);
            }
            debug!(storage_group, partition_id, version, is_seq, "partition sealed");
            if is_seq {
                data.seq.push(resource);
            } else {
                data.unseq.push(resource);
            }
            Ok(())
        })
    }

    fn query(&self, path: &str, filter: Option<&Filter>) -> Result<Vec<TimeValuePair>> {
        let sg = storage_group_of(path);
        let groups = self.groups.read();
        let data = groups
            .get(&sg)
            .ok_or_else(|| Error::StorageGroupNotSet(sg.clone()))?;
        let Some(points) = data.series.get(path) else {
            return Ok(Vec::new());
        };
        Ok(points
            .iter()
            .filter(|(t, v)| filter.is_none_or(|f| f.satisfies(**t, v)))
            .map(|(t, v)| TimeValuePair {
                timestamp: *t,
                value: v.clone(),
            })
            .collect())
    }

    fn sequence_resources(&self, storage_group: &str) -> Result<Vec<FileResource>> {
        self.with_group(storage_group, |data| Ok(data.seq.clone()))
    }

    fn unsequence_resources(&self, storage_group: &str) -> Result<Vec<FileResource>> {
        self.with_group(storage_group, |data| Ok(data.unseq.clone()))
    }

    fn ingest_resource(&self, resource: FileResource) -> Result<()> {
        let sg = resource.storage_group.clone();
        self.groups.write().entry(sg.clone()).or_default();
        self.with_group(&sg, |data| {
            let already_present = data
                .seq
                .iter()
                .chain(data.unseq.iter())
                .any(|r| r.historical_versions == resource.historical_versions);
            if already_present {
                return Ok(());
            }
            let overlaps_sealed = resource.start_times.iter().any(|(device, start)| {
                Self::last_sequence_end(data, device).is_some_and(|end| *start <= end)
            });
            debug!(
                storage_group = %sg,
                path = %resource.path,
                unsequence = overlaps_sealed,
                "external file ingested"
            );
            if overlaps_sealed {
                data.unseq.push(resource);
            } else {
                data.seq.push(resource);
            }
            Ok(())
        })
    }

    fn remove_resource(&self, storage_group: &str, path: &str) -> Result<()> {
        self.with_group(storage_group, |data| {
            data.seq.retain(|r| r.path != path);
            data.unseq.retain(|r| r.path != path);
            Ok(())
        })
    }

    fn apply_deletion(&self, storage_group: &str, path: &str, deletion: Deletion) -> Result<()> {
        self.with_group(storage_group, |data| {
            let resource = data
                .seq
                .iter_mut()
                .chain(data.unseq.iter_mut())
                .find(|r| r.path == path)
                .ok_or_else(|| Error::storage(format!("no such resource: {path}")))?;
            resource.add_deletion(deletion);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::InsertPlan;

    fn engine_with_sg() -> MemStorageEngine {
        let engine = MemStorageEngine::new();
        engine
            .execute(&PhysicalPlan::SetStorageGroup("root.sg0".to_string()))
            .unwrap();
        engine
    }

    fn insert(engine: &MemStorageEngine, time: i64, value: f64) {
        engine
            .execute(&PhysicalPlan::Insert(InsertPlan {
                device: "root.sg0.d0".to_string(),
                time,
                measurements: vec!["s0".to_string()],
                values: vec![TsValue::Double(value)],
            }))
            .unwrap();
    }

    #[test]
    fn test_insert_and_query_with_filter() {
        let engine = engine_with_sg();
        for i in 0..10 {
            insert(&engine, i, i as f64);
        }
        let filter = Filter::time_gt_eq(5);
        let points = engine.query("root.sg0.d0.s0", Some(&filter)).unwrap();
        assert_eq!(points.len(), 5);
        for (offset, pair) in points.iter().enumerate() {
            assert_eq!(pair.timestamp, 5 + offset as i64);
            assert_eq!(pair.value, TsValue::Double((5 + offset) as f64));
        }
    }

    #[test]
    fn test_query_unknown_storage_group() {
        let engine = MemStorageEngine::new();
        assert!(matches!(
            engine.query("root.nosg.d0.s0", None),
            Err(Error::StorageGroupNotSet(_))
        ));
    }

    #[test]
    fn test_close_partition_seals_working_range() {
        let engine = engine_with_sg();
        insert(&engine, 0, 1.0);
        insert(&engine, 100, 2.0);
        engine.close_partition("root.sg0", 0, true).unwrap();

        let seq = engine.sequence_resources("root.sg0").unwrap();
        assert_eq!(seq.len(), 1);
        assert_eq!(seq[0].start_times["root.sg0.d0"], 0);
        assert_eq!(seq[0].end_times["root.sg0.d0"], 100);
        // working range is consumed; sealing again produces nothing
        engine.close_partition("root.sg0", 0, true).unwrap();
        assert_eq!(engine.sequence_resources("root.sg0").unwrap().len(), 1);
    }

    #[test]
    fn test_ingest_classifies_overlapping_file_as_unsequence() {
        let engine = engine_with_sg();
        insert(&engine, 0, 1.0);
        insert(&engine, 100, 2.0);
        engine.close_partition("root.sg0", 0, true).unwrap();

        // overlaps the sealed range [0, 100]
        let mut overlapping = FileResource::new("ext-1.tsf", "root.sg0");
        overlapping.historical_versions.insert(100);
        overlapping.update_time("root.sg0.d0", 50);
        overlapping.update_time("root.sg0.d0", 150);
        engine.ingest_resource(overlapping).unwrap();

        // entirely after the sealed range
        let mut later = FileResource::new("ext-2.tsf", "root.sg0");
        later.historical_versions.insert(101);
        later.update_time("root.sg0.d0", 200);
        later.update_time("root.sg0.d0", 300);
        engine.ingest_resource(later).unwrap();

        assert_eq!(engine.unsequence_resources("root.sg0").unwrap().len(), 1);
        assert_eq!(engine.sequence_resources("root.sg0").unwrap().len(), 2);
    }

    #[test]
    fn test_ingest_same_versions_is_idempotent() {
        let engine = engine_with_sg();
        let mut resource = FileResource::new("ext-1.tsf", "root.sg0");
        resource.historical_versions.insert(7);
        engine.ingest_resource(resource.clone()).unwrap();
        engine.ingest_resource(resource).unwrap();
        assert_eq!(engine.sequence_resources("root.sg0").unwrap().len(), 1);
    }

    #[test]
    fn test_apply_deletion_reaches_mod_file() {
        let engine = engine_with_sg();
        let mut resource = FileResource::new("ext-1.tsf", "root.sg0");
        resource.historical_versions.insert(7);
        engine.ingest_resource(resource).unwrap();

        let deletion = Deletion::new("root.sg0", 0, 10);
        engine
            .apply_deletion("root.sg0", "ext-1.tsf", deletion.clone())
            .unwrap();
        let seq = engine.sequence_resources("root.sg0").unwrap();
        assert!(seq[0].deletions.contains(&deletion));
    }
}
