//! Storage and schema seams
//!
//! The consensus core only touches storage through these traits. Production
//! nodes wire in the real engine; tests and single-process deployments use
//! the in-memory implementations from this crate.

use crate::filter::Filter;
use crate::plan::PhysicalPlan;
use crate::resource::{Deletion, FileResource};
use seriesio_common::{Result, TimeValuePair, TimeseriesSchema};

/// Black-box interface of the time-series storage engine.
pub trait StorageEngine: Send + Sync {
    /// Execute a non-query plan against the data files.
    fn execute(&self, plan: &PhysicalPlan) -> Result<()>;

    /// Seal the working data of one storage group partition into a file.
    fn close_partition(&self, storage_group: &str, partition_id: i64, is_seq: bool) -> Result<()>;

    /// All points of `path` matching `filter`, ordered by timestamp.
    fn query(&self, path: &str, filter: Option<&Filter>) -> Result<Vec<TimeValuePair>>;

    /// Sealed sequence files of a storage group.
    fn sequence_resources(&self, storage_group: &str) -> Result<Vec<FileResource>>;

    /// Sealed unsequence files of a storage group.
    fn unsequence_resources(&self, storage_group: &str) -> Result<Vec<FileResource>>;

    /// Adopt an externally produced file. The engine classifies it as
    /// sequence or unsequence against the already-flushed files and skips
    /// files whose historical versions are already present verbatim.
    fn ingest_resource(&self, resource: FileResource) -> Result<()>;

    /// Drop a sealed file from the storage group.
    fn remove_resource(&self, storage_group: &str, path: &str) -> Result<()>;

    /// Replay a deletion onto the mod file of a sealed resource.
    fn apply_deletion(&self, storage_group: &str, path: &str, deletion: Deletion) -> Result<()>;
}

/// Black-box interface of the series schema tree.
pub trait SchemaStore: Send + Sync {
    /// Declare a storage group root.
    fn set_storage_group(&self, storage_group: &str) -> Result<()>;

    /// Register a timeseries. Registering an identical schema twice is a
    /// no-op; a path conflict with a different layout is an error.
    fn register(&self, schema: TimeseriesSchema) -> Result<()>;

    /// Schema of a series, if known.
    fn get(&self, path: &str) -> Option<TimeseriesSchema>;

    /// All schemas under a path prefix, in enumeration order.
    fn schemas_under(&self, prefix: &str) -> Vec<TimeseriesSchema>;

    /// All full series paths under a prefix, in enumeration order.
    fn paths_under(&self, prefix: &str) -> Vec<String>;
}
