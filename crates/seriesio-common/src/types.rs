//! Core type definitions for SeriesIO
//!
//! This module defines the fundamental types shared across the cluster:
//! node identity, slot ids, and timeseries schema descriptors.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifier of a data slot. Every slot at any instant is owned by exactly
/// one partition group.
pub type Slot = u32;

/// A member of the cluster.
///
/// A node is identified by `node_id` alone; host and ports are transport
/// details that may change across restarts. Equality, ordering, and hashing
/// therefore only consider `node_id`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    /// Hostname or IP address
    pub host: String,
    /// Port of the metadata group service
    pub meta_port: u16,
    /// Cluster-wide unique node identifier
    pub node_id: i32,
    /// Port of the data group service
    pub data_port: u16,
}

impl Node {
    #[must_use]
    pub fn new(host: impl Into<String>, meta_port: u16, node_id: i32, data_port: u16) -> Self {
        Self {
            host: host.into(),
            meta_port,
            node_id,
            data_port,
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.node_id == other.node_id
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node_id.hash(state);
    }
}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        self.node_id.cmp(&other.node_id)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}:{})", self.node_id, self.host, self.data_port)
    }
}

/// Data type of a timeseries
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TsDataType {
    Boolean,
    Int32,
    Int64,
    Float,
    Double,
    Text,
}

/// Column encoding of a timeseries
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TsEncoding {
    Plain,
    Rle,
    TsDiff,
    Gorilla,
}

/// Compression applied to encoded pages
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompressionType {
    Uncompressed,
    Snappy,
    Lz4,
    Gzip,
}

/// Schema of a single timeseries: the full path plus its physical layout.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeseriesSchema {
    /// Full series path, e.g. `root.sg0.d0.s0`
    pub path: String,
    pub data_type: TsDataType,
    pub encoding: TsEncoding,
    pub compression: CompressionType,
}

impl TimeseriesSchema {
    #[must_use]
    pub fn new(path: impl Into<String>, data_type: TsDataType) -> Self {
        Self {
            path: path.into(),
            data_type,
            encoding: TsEncoding::Plain,
            compression: CompressionType::Uncompressed,
        }
    }

    /// Storage group a series belongs to: the first two path segments
    /// (`root.<sg>`).
    #[must_use]
    pub fn storage_group(&self) -> String {
        storage_group_of(&self.path)
    }
}

/// Extract the storage group prefix (`root.<sg>`) of a full series path.
#[must_use]
pub fn storage_group_of(path: &str) -> String {
    path.splitn(3, '.').take(2).collect::<Vec<_>>().join(".")
}

/// A single typed value of a series point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TsValue {
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Text(String),
}

impl TsValue {
    /// Numeric view used by value filters and aggregations. Text and
    /// boolean values have no numeric interpretation.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int32(v) => Some(f64::from(*v)),
            Self::Int64(v) => Some(*v as f64),
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            Self::Boolean(_) | Self::Text(_) => None,
        }
    }
}

/// One (timestamp, value) pair streamed back from a series reader.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeValuePair {
    pub timestamp: i64,
    pub value: TsValue,
}
