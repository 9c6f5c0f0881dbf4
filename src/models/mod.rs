//! Data models for generative-db.
//!
//! This module re-exports all model types used throughout the application.

pub mod catalog;
pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use catalog::{ColumnRow, ConstraintRow, TableRow};
pub use connection::{ConnectionConfig, ConnectionConfigError, DatabaseType};
pub use query::{
    ColumnMetadata, DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_LIMIT, MAX_QUERY_TIMEOUT_SECS,
    MAX_ROW_LIMIT, QueryResult,
};
pub use schema::{Column, Constraint, ConstraintType, Table};
