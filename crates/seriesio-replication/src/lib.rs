//! SeriesIO Replication - the ordered log shared by a replica group
//!
//! Entries are typed ([`EntryBody`]), framed by a one-byte dispatch prefix
//! over a big-endian header ([`codec`]), appended by the group leader,
//! replicated, applied in index order through a caller-supplied hook, and
//! eventually compacted into a partitioned snapshot keyed by slot.

pub mod codec;
pub mod entry;
pub mod snapshot;
pub mod store;

pub use entry::{EntryBody, LogEntry};
pub use snapshot::{FileSnapshot, PartitionedSnapshot};
pub use store::{LogApplier, LogView, MemoryLogStore};
