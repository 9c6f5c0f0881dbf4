//! Schema introspection tools.
//!
//! This module implements the `list-tables` and `describe-tables` tools.

use super::{Capability, ToolOutcome};
use crate::db::QueryExecutor;
use crate::error::{DbError, DbResult};
use crate::schema::SchemaSnapshot;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub const LIST_TABLES: &str = "list-tables";
pub const DESCRIBE_TABLES: &str = "describe-tables";

const LIST_TABLES_DESCRIPTION: &str = "Input is an empty string, output is the list of tables in the database along with their schema, one per line (e.g. dbo.tablename). A table description follows `--` when one is known.";

const DESCRIBE_TABLES_DESCRIPTION: &str = "Input to this tool is a comma-separated list of qualified table names in the format schema.table, output is the schema and sample rows for those tables.
Be sure that the tables actually exist by calling list-tables first!

Example Input: schema1.table1, schema1.table2, schema2.table3";

/// Input for the describe_tables MCP tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DescribeTablesInput {
    /// Comma-separated table names, schema-qualified or not (e.g. "dbo.Orders, Customers")
    pub tables: String,
}

// =============================================================================
// list-tables
// =============================================================================

pub struct ListTablesTool {
    snapshot: Arc<SchemaSnapshot>,
}

impl ListTablesTool {
    pub fn new(snapshot: Arc<SchemaSnapshot>) -> Self {
        Self { snapshot }
    }

    /// One `schema.name[ -- description]` line per selected table.
    pub fn list(&self) -> String {
        self.snapshot
            .selected()
            .into_iter()
            .map(|table| match self.snapshot.description_of(table) {
                Some(desc) => format!("{} -- {}", table.qualified_name(), desc),
                None => table.qualified_name(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl Capability for ListTablesTool {
    fn name(&self) -> &'static str {
        LIST_TABLES
    }

    fn description(&self) -> &'static str {
        LIST_TABLES_DESCRIPTION
    }

    async fn invoke(&self, _input: &str) -> ToolOutcome {
        ToolOutcome::Success(self.list())
    }
}

// =============================================================================
// describe-tables
// =============================================================================

pub struct DescribeTablesTool {
    snapshot: Arc<SchemaSnapshot>,
    executor: Arc<dyn QueryExecutor>,
}

impl DescribeTablesTool {
    pub fn new(snapshot: Arc<SchemaSnapshot>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { snapshot, executor }
    }

    /// Render the named tables.
    ///
    /// Schema qualifiers are dropped since tables are matched by bare name.
    pub async fn describe(&self, input: &str) -> DbResult<String> {
        let targets = parse_table_names(input);
        if targets.is_empty() {
            return Err(DbError::invalid_input(
                "Expected a comma-separated list of table names",
            ));
        }

        info!(tables = ?targets, "Describing tables");
        self.snapshot
            .render(self.executor.as_ref(), Some(&targets))
            .await
    }
}

#[async_trait]
impl Capability for DescribeTablesTool {
    fn name(&self) -> &'static str {
        DESCRIBE_TABLES
    }

    fn description(&self) -> &'static str {
        DESCRIBE_TABLES_DESCRIPTION
    }

    async fn invoke(&self, input: &str) -> ToolOutcome {
        self.describe(input).await.into()
    }
}

/// Split `dbo.Orders, [sales].[Customers]` into `["Orders", "Customers"]`.
pub fn parse_table_names(input: &str) -> Vec<String> {
    input
        .split(',')
        .filter_map(|part| part.rsplit('.').next())
        .map(|name| {
            name.trim()
                .trim_matches(|c| matches!(c, '[' | ']' | '"' | '`'))
                .trim()
                .to_string()
        })
        .filter(|name| !name.is_empty())
        .collect()
}
