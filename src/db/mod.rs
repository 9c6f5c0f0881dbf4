//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection management (SQL Server via tiberius, SQLite via sqlx)
//! - Query execution behind the `QueryExecutor` capability
//! - Metadata catalog reading
//! - Type mappings

pub mod catalog;
pub mod executor;
pub mod pool;
pub mod types;

pub use catalog::{CatalogQueries, CatalogReader, CatalogRows};
pub use executor::{PoolExecutor, QueryExecutor};
pub use pool::DbPool;
