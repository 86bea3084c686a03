//! Physical plans
//!
//! A physical plan is the unit of non-query work replicated through the data
//! group log: a write, a schema mutation, or a deletion. Plans are carried
//! as opaque bincode payloads inside `PhysicalPlan` log entries and decoded
//! again by the apply hook.

use seriesio_common::{Error, Result, TimeseriesSchema, TsValue};
use serde::{Deserialize, Serialize};

/// A single-device row write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InsertPlan {
    /// Device path, e.g. `root.sg0.d0`
    pub device: String,
    pub time: i64,
    /// Measurement names, parallel to `values`
    pub measurements: Vec<String>,
    pub values: Vec<TsValue>,
}

/// A write or schema-mutation plan executed through the consensus log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PhysicalPlan {
    Insert(InsertPlan),
    CreateTimeseries(TimeseriesSchema),
    SetStorageGroup(String),
    Delete {
        path: String,
        start_time: i64,
        end_time: i64,
    },
}

impl PhysicalPlan {
    /// Encode the plan for transport inside a log entry.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).expect("plan serialization is infallible")
    }

    /// Decode a plan from a log entry payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Whether this plan targets the schema tree rather than the data files.
    #[must_use]
    pub fn is_schema_plan(&self) -> bool {
        matches!(self, Self::CreateTimeseries(_) | Self::SetStorageGroup(_))
    }
}
