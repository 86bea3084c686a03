//! SeriesIO Partition - slot ownership across replica groups
//!
//! The slot universe (`[0, SLOT_NUM)`) is divided among replica groups. Each
//! node on the identifier ring heads one group of `replication_num`
//! consecutive nodes; slots are owned by header groups. Membership changes
//! move slots between groups and report the moves so that new owners know
//! which previous holders to pull file snapshots from.

pub mod group;
pub mod table;

pub use group::PartitionGroup;
pub use table::{NodeRemovalResult, SlotPartitionTable};
