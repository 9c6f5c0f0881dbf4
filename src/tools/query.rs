//! Query tools.
//!
//! This module implements the `run-query` tool for executing SELECT queries
//! and the `check-query` tool that has the completion engine review a
//! statement before it runs. Write operations are blocked by the read-only
//! guard in [`sql_validator`].

use super::format::format_as_table;
use super::{Capability, ToolOutcome, sql_validator};
use crate::db::QueryExecutor;
use crate::error::{DbError, DbResult};
use crate::llm::{ChatMessage, Completion, CompletionEngine};
use crate::models::{DatabaseType, MAX_ROW_LIMIT};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

pub const RUN_QUERY: &str = "run-query";
pub const CHECK_QUERY: &str = "check-query";

const RUN_QUERY_DESCRIPTION: &str = "Input to this tool is a detailed and correct SQL query, output is a result from the database. If the query is not correct, an error message will be returned. If an error is returned, rewrite the query, check the query, and try again.";

const CHECK_QUERY_DESCRIPTION: &str = "Use this tool to double check if your query is correct before executing it. Always use this tool before executing a query with run-query!";

const MSSQL_CHECKER_TEMPLATE: &str = "{query}

Double check the SQL query above for common mistakes, including:
- Being written in any SQL dialect other than mssql
- Using NOT IN with NULL values
- Using UNION when UNION ALL should have been used
- Using BETWEEN for exclusive ranges
- Data type mismatch in predicates
- Properly quoting identifiers
- Using the correct number of arguments for functions
- Casting to the correct data type
- Using the proper columns for joins
- Using the correct schema for tables that are not in the default schema (typically dbo)
- When using string_agg in a returned query and the field that is being aggregated is not of type NVARCHAR(MAX) then make sure to cast the data to be of type
NVARCHAR(MAX) to prevent LOB errors.
- Forgetting to put a ; sign in front of CTEs to ensure they run correctly
- Using Limit instead of Top to restrict the number of records returned

If there are any of the above mistakes, rewrite the query. If there are no mistakes, just reproduce the original query.";

const GENERIC_CHECKER_TEMPLATE: &str = "{query}

Double check the {dialect} query above for common mistakes, including:
- Using NOT IN with NULL values
- Using UNION when UNION ALL should have been used
- Using BETWEEN for exclusive ranges
- Data type mismatch in predicates
- Properly quoting identifiers
- Using the correct number of arguments for functions
- Casting to the correct data type
- Using the proper columns for joins

If there are any of the above mistakes, rewrite the query. If there are no mistakes, just reproduce the original query.";

/// Input for the run_query and check_query MCP tools.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryInput {
    /// SQL SELECT statement. A surrounding ```sql fence is removed. Write operations are blocked.
    pub sql: String,
}

/// Remove a Markdown code fence around a statement.
///
/// Drops a leading "```" or "```sql" line and a trailing "```" line, then
/// surrounding whitespace. Input without a fence is only trimmed.
pub fn strip_fence(input: &str) -> &str {
    let mut sql = input.trim();

    if let Some(rest) = sql.strip_prefix("```") {
        let rest = rest.strip_prefix("sql").unwrap_or(rest);
        if let Some(body) = rest.strip_prefix('\n') {
            sql = body;
        }
    }

    if let Some(body) = sql.strip_suffix("```") {
        if body.is_empty() || body.ends_with('\n') {
            sql = body;
        }
    }

    sql.trim()
}

// =============================================================================
// run-query
// =============================================================================

pub struct RunQueryTool {
    executor: Arc<dyn QueryExecutor>,
    row_limit: u32,
}

impl RunQueryTool {
    pub fn new(executor: Arc<dyn QueryExecutor>, row_limit: u32) -> Self {
        Self {
            executor,
            row_limit: row_limit.clamp(1, MAX_ROW_LIMIT),
        }
    }

    /// Strip, guard and execute `input`, echoing the statement with its result.
    pub async fn run(&self, input: &str) -> DbResult<String> {
        let sql = strip_fence(input);
        if sql.is_empty() {
            return Err(DbError::invalid_input("SQL query cannot be empty"));
        }

        match sql_validator::validate_readonly(sql, self.executor.dialect()) {
            Ok(()) => {}
            Err(e @ DbError::Permission { .. }) => return Err(e),
            Err(e) => {
                // The parser does not cover all of T-SQL; let the database decide.
                debug!(error = %e, "Read-only check could not parse statement");
            }
        }

        let result = self.executor.fetch(sql, self.row_limit).await?;
        info!(
            rows = result.row_count(),
            truncated = result.truncated,
            execution_time_ms = result.execution_time_ms,
            "Query executed"
        );

        Ok(format!(
            "SQL QUERY:\n{}\n\nRESULT:\n{}",
            sql,
            format_as_table(&result)
        ))
    }
}

#[async_trait]
impl Capability for RunQueryTool {
    fn name(&self) -> &'static str {
        RUN_QUERY
    }

    fn description(&self) -> &'static str {
        RUN_QUERY_DESCRIPTION
    }

    async fn invoke(&self, input: &str) -> ToolOutcome {
        self.run(input).await.into()
    }
}

// =============================================================================
// check-query
// =============================================================================

pub struct CheckQueryTool {
    engine: Arc<dyn CompletionEngine>,
    dialect: DatabaseType,
}

impl CheckQueryTool {
    pub fn new(engine: Arc<dyn CompletionEngine>, dialect: DatabaseType) -> Self {
        Self { engine, dialect }
    }

    /// Review prompt sent to the completion engine for `query`.
    pub fn prompt(&self, query: &str) -> String {
        let template = match self.dialect {
            DatabaseType::MsSql => MSSQL_CHECKER_TEMPLATE,
            DatabaseType::SQLite => GENERIC_CHECKER_TEMPLATE,
        };
        template
            .replace("{dialect}", self.dialect.dialect_name())
            .replace("{query}", query)
    }

    /// The reviewed statement, unchanged or corrected.
    pub async fn check(&self, input: &str) -> DbResult<String> {
        let query = input.trim();
        if query.is_empty() {
            return Err(DbError::invalid_input("SQL query cannot be empty"));
        }

        let messages = [ChatMessage::user(self.prompt(query))];
        match self.engine.complete(&messages, &[]).await? {
            Completion::Answer(text) => Ok(text),
            Completion::ToolCalls(_) => Err(DbError::llm(
                "Query review returned tool calls instead of text",
            )),
        }
    }
}

#[async_trait]
impl Capability for CheckQueryTool {
    fn name(&self) -> &'static str {
        CHECK_QUERY
    }

    fn description(&self) -> &'static str {
        CHECK_QUERY_DESCRIPTION
    }

    async fn invoke(&self, input: &str) -> ToolOutcome {
        self.check(input).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolSpec;
    use crate::models::{ColumnMetadata, QueryResult};
    use crate::tools::ToolErrorKind;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        queries: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl QueryExecutor for Recorder {
        fn dialect(&self) -> DatabaseType {
            DatabaseType::MsSql
        }

        async fn fetch(&self, sql: &str, _limit: u32) -> DbResult<QueryResult> {
            self.queries.lock().unwrap().push(sql.to_string());
            if self.fail {
                return Err(DbError::database(
                    "Invalid column name 'Totl'.",
                    None,
                    "Check the column names",
                ));
            }
            let mut row = serde_json::Map::new();
            row.insert("Total".into(), json!(42));
            Ok(QueryResult {
                columns: vec![ColumnMetadata::new("Total", "INT")],
                rows: vec![row],
                truncated: false,
                execution_time_ms: 3,
            })
        }
    }

    struct Echo;

    #[async_trait]
    impl CompletionEngine for Echo {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            tools: &[ToolSpec],
        ) -> DbResult<Completion> {
            assert!(tools.is_empty());
            Ok(Completion::Answer(messages[0].content.clone()))
        }
    }

    #[test]
    fn test_strip_fence() {
        assert_eq!(strip_fence("```sql\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_fence("  ```\nSELECT 1\n```\n"), "SELECT 1");
        assert_eq!(strip_fence("SELECT 1"), "SELECT 1");
        assert_eq!(
            strip_fence("```sql\nSELECT a\nFROM t\n```"),
            "SELECT a\nFROM t"
        );
        assert_eq!(strip_fence("```sql SELECT 1```"), "```sql SELECT 1```");
        assert_eq!(strip_fence("```sql\n```"), "");
    }

    #[tokio::test]
    async fn test_run_query_echoes_stripped_sql() {
        let executor = Arc::new(Recorder::default());
        let tool = RunQueryTool::new(executor.clone(), 100);

        let output = tool
            .run("```sql\nSELECT COUNT(*) AS Total FROM dbo.Orders\n```")
            .await
            .unwrap();

        // Numbers are right-aligned to the header width
        assert_eq!(
            output,
            "SQL QUERY:\nSELECT COUNT(*) AS Total FROM dbo.Orders\n\nRESULT:\n\
             +-------+\n\
             | Total |\n\
             +-------+\n\
             |    42 |\n\
             +-------+\n\
             1 row in set (0.00 sec)\n"
        );
        assert_eq!(
            *executor.queries.lock().unwrap(),
            vec!["SELECT COUNT(*) AS Total FROM dbo.Orders"]
        );
    }

    #[tokio::test]
    async fn test_run_query_rejects_writes_without_executing() {
        let executor = Arc::new(Recorder::default());
        let tool = RunQueryTool::new(executor.clone(), 100);

        match tool.invoke("DELETE FROM dbo.Orders").await {
            ToolOutcome::Failure { kind, .. } => assert_eq!(kind, ToolErrorKind::Rejected),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(executor.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_query_database_error_is_failure_outcome() {
        let executor = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let tool = RunQueryTool::new(executor, 100);

        let outcome = tool.invoke("SELECT Totl FROM dbo.Orders").await;
        assert!(matches!(
            outcome,
            ToolOutcome::Failure {
                kind: ToolErrorKind::Execution,
                ..
            }
        ));
        assert!(outcome.text().contains("Invalid column name"));
    }

    #[tokio::test]
    async fn test_run_query_empty_input() {
        let tool = RunQueryTool::new(Arc::new(Recorder::default()), 100);
        assert!(matches!(
            tool.run("```sql\n\n```").await,
            Err(DbError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_check_query_uses_mssql_checklist() {
        let tool = CheckQueryTool::new(Arc::new(Echo), DatabaseType::MsSql);
        let reviewed = tool.check("SELECT * FROM Orders LIMIT 5").await.unwrap();

        assert!(reviewed.starts_with("SELECT * FROM Orders LIMIT 5\n\nDouble check"));
        assert!(reviewed.contains("Using Limit instead of Top"));
    }

    #[test]
    fn test_check_query_generic_prompt_names_dialect() {
        let tool = CheckQueryTool::new(Arc::new(Echo), DatabaseType::SQLite);
        let prompt = tool.prompt("SELECT 1");
        assert!(prompt.contains("Double check the sqlite query above"));
        assert!(!prompt.contains("{query}"));
    }
}
