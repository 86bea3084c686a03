//! Snapshot application
//!
//! Reconciles an incoming [`FileSnapshot`] against pre-existing local
//! storage: schemas are registered or verified, files are adopted with
//! merge-history deduplication, and deletion markers are replayed onto the
//! adopted files. Application is idempotent at slot granularity so a
//! failed slot can be retried wholesale.

use seriesio_common::{Error, Result, Slot};
use seriesio_replication::FileSnapshot;
use seriesio_storage::{FileResource, SchemaStore, StorageEngine};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Applies pulled or pushed file snapshots to local storage.
pub struct SnapshotApplier {
    storage: Arc<dyn StorageEngine>,
    schema: Arc<dyn SchemaStore>,
}

impl SnapshotApplier {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageEngine>, schema: Arc<dyn SchemaStore>) -> Self {
        Self { storage, schema }
    }

    /// Apply one slot's snapshot. Fails with
    /// [`Error::SnapshotApplication`] on a schema conflict or storage
    /// failure; the caller may retry the whole slot.
    pub fn apply(&self, snapshot: &FileSnapshot, slot: Slot) -> Result<()> {
        self.reconcile_schemas(snapshot)?;
        for (resource, _source) in snapshot.files() {
            self.adopt_file(resource)
                .map_err(|e| Error::snapshot(format!("slot {slot}: {e}")))?;
        }
        info!(slot, files = snapshot.files().len(), "slot snapshot applied");
        Ok(())
    }

    fn reconcile_schemas(&self, snapshot: &FileSnapshot) -> Result<()> {
        for schema in snapshot.schemas() {
            match self.schema.get(&schema.path) {
                Some(existing) if existing == *schema => {}
                Some(existing) => {
                    return Err(Error::snapshot(format!(
                        "schema conflict on {}: local {:?}/{:?}/{:?}, snapshot {:?}/{:?}/{:?}",
                        schema.path,
                        existing.data_type,
                        existing.encoding,
                        existing.compression,
                        schema.data_type,
                        schema.encoding,
                        schema.compression,
                    )));
                }
                None => {
                    self.schema.set_storage_group(&schema.storage_group())?;
                    self.schema
                        .register(schema.clone())
                        .map_err(|e| Error::snapshot(e.to_string()))?;
                }
            }
        }
        Ok(())
    }

    /// Adopt one file, deduplicating against local merge history:
    /// an identical version set means the file is already here; local
    /// files whose versions are a strict subset of the candidate's are
    /// replaced by it; a candidate subsumed by a local file is dropped.
    fn adopt_file(&self, candidate: &FileResource) -> Result<()> {
        let sg = &candidate.storage_group;
        let locals: Vec<FileResource> = self
            .storage
            .sequence_resources(sg)
            .unwrap_or_default()
            .into_iter()
            .chain(
                self.storage
                    .unsequence_resources(sg)
                    .unwrap_or_default(),
            )
            .collect();

        for local in &locals {
            if local.historical_versions == candidate.historical_versions {
                debug!(path = %candidate.path, "file already adopted, skipping");
                return Ok(());
            }
            if local.subsumes(candidate) {
                debug!(path = %candidate.path, merged = %local.path, "file subsumed by local merge result, skipping");
                return Ok(());
            }
        }

        // the candidate may be the merge result of several local files
        for local in &locals {
            if candidate.subsumes(local) {
                warn!(subsumed = %local.path, merged = %candidate.path, "replacing file subsumed by snapshot merge result");
                self.storage.remove_resource(sg, &local.path)?;
            }
        }

        self.storage.ingest_resource(candidate.clone())?;
        for deletion in &candidate.deletions {
            self.storage
                .apply_deletion(sg, &candidate.path, deletion.clone())?;
        }
        Ok(())
    }
}
