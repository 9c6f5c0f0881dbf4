//! Query-related data models.
//!
//! This module defines the result type returned by query execution.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default row limit for query results.
pub const DEFAULT_ROW_LIMIT: u32 = 100;

/// Maximum allowed row limit.
pub const MAX_ROW_LIMIT: u32 = 10000;

/// Default query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u32 = 30;

/// Maximum query timeout in seconds.
pub const MAX_QUERY_TIMEOUT_SECS: u32 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// Database-specific type (e.g., "int", "nvarchar", "TEXT")
    pub type_name: String,
}

impl ColumnMetadata {
    /// Create new column metadata.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub truncated: bool,
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create an empty result.
    pub fn empty(execution_time_ms: u64) -> Self {
        Self {
            execution_time_ms,
            ..Self::default()
        }
    }

    /// Get the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one row in column order. Missing keys read as null.
    pub fn row_values(&self, index: usize) -> Vec<&JsonValue> {
        static NULL: JsonValue = JsonValue::Null;
        match self.rows.get(index) {
            Some(row) => self
                .columns
                .iter()
                .map(|c| row.get(&c.name).unwrap_or(&NULL))
                .collect(),
            None => Vec::new(),
        }
    }
}
