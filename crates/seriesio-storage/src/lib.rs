//! SeriesIO Storage - engine and schema interfaces
//!
//! The replication core treats the storage engine and the schema tree as
//! black boxes behind the [`StorageEngine`] and [`SchemaStore`] traits. This
//! crate defines those seams together with the physical plans and filters
//! that travel through them, and provides the in-memory implementations the
//! node and the tests run against.

pub mod engine;
pub mod filter;
pub mod plan;
pub mod resource;
pub mod schema;
pub mod traits;

pub use engine::MemStorageEngine;
pub use filter::Filter;
pub use plan::{InsertPlan, PhysicalPlan};
pub use resource::{Deletion, FileResource};
pub use schema::MemSchemaStore;
pub use traits::{SchemaStore, StorageEngine};
