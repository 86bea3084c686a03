//! In-memory schema store

use crate::traits::SchemaStore;
use parking_lot::RwLock;
use seriesio_common::{Error, Result, TimeseriesSchema};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Whether `path` lies under `prefix` in the schema tree.
fn under(path: &str, prefix: &str) -> bool {
    path == prefix || (path.starts_with(prefix) && path.as_bytes()[prefix.len()] == b'.')
}

#[derive(Default)]
struct Inner {
    storage_groups: BTreeSet<String>,
    schemas: BTreeMap<String, TimeseriesSchema>,
}

/// Schema tree held entirely in memory. Enumeration order is path order.
#[derive(Default)]
pub struct MemSchemaStore {
    inner: RwLock<Inner>,
}

impl MemSchemaStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchemaStore for MemSchemaStore {
    fn set_storage_group(&self, storage_group: &str) -> Result<()> {
        let mut inner = self.inner.write();
        inner.storage_groups.insert(storage_group.to_string());
        Ok(())
    }

    fn register(&self, schema: TimeseriesSchema) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner
            .storage_groups
            .iter()
            .any(|sg| under(&schema.path, sg))
        {
            return Err(Error::StorageGroupNotSet(schema.storage_group()));
        }
        if let Some(existing) = inner.schemas.get(&schema.path) {
            if *existing == schema {
                return Ok(());
            }
            return Err(Error::QueryProcess(format!(
                "timeseries {} already registered with a different layout",
                schema.path
            )));
        }
        debug!(path = %schema.path, "timeseries registered");
        inner.schemas.insert(schema.path.clone(), schema);
        Ok(())
    }

    fn get(&self, path: &str) -> Option<TimeseriesSchema> {
        self.inner.read().schemas.get(path).cloned()
    }

    fn schemas_under(&self, prefix: &str) -> Vec<TimeseriesSchema> {
        self.inner
            .read()
            .schemas
            .values()
            .filter(|s| under(&s.path, prefix))
            .cloned()
            .collect()
    }

    fn paths_under(&self, prefix: &str) -> Vec<String> {
        self.inner
            .read()
            .schemas
            .keys()
            .filter(|p| under(p, prefix))
            .cloned()
            .collect()
    }
}
