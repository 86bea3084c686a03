//! Error types for SeriesIO
//!
//! This module defines the common error taxonomy used throughout the system.
//! Consensus rejections are response codes, not errors (see
//! [`crate::response`]); everything here is surfaced to callers.

use thiserror::Error;

/// Common result type for SeriesIO operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for SeriesIO
#[derive(Debug, Error)]
pub enum Error {
    // Log errors
    #[error("unknown log type: {0}")]
    UnknownLogType(u8),

    #[error("log entry truncated or malformed: {0}")]
    MalformedLog(String),

    // Snapshot errors
    #[error("snapshot application failed: {0}")]
    SnapshotApplication(String),

    // Storage / schema errors
    #[error("storage engine error: {0}")]
    StorageEngine(String),

    #[error("storage group is not set: {0}")]
    StorageGroupNotSet(String),

    #[error("query process error: {0}")]
    QueryProcess(String),

    // Query lifecycle errors
    #[error("The requested reader {0} is not found")]
    ReaderNotFound(i64),

    // Membership / consensus errors
    #[error("no leader is known to this member")]
    NoLeader,

    #[error("leader is unreachable: {0}")]
    LeaderUnreachable(String),

    // Network/RPC errors
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("request timeout")]
    Timeout,

    // UDF registration errors
    #[error("UDF registration error: {0}")]
    UdfRegistration(String),

    // Internal errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a snapshot application error
    pub fn snapshot(msg: impl Into<String>) -> Self {
        Self::SnapshotApplication(msg.into())
    }

    /// Create a storage engine error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageEngine(msg.into())
    }

    /// Create a query process error
    pub fn query(msg: impl Into<String>) -> Self {
        Self::QueryProcess(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is a retryable error
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ConnectionFailed(_) | Self::LeaderUnreachable(_) | Self::NoLeader
        )
    }
}
