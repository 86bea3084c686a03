//! SeriesIO Common - Shared types and utilities
//!
//! This crate provides common types, error definitions, and configuration
//! used across all SeriesIO components.

pub mod config;
pub mod error;
pub mod response;
pub mod types;

pub use config::ClusterConfig;
pub use error::{Error, Result};
pub use types::*;
