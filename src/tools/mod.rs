//! Agent tools.
//!
//! Four capabilities are handed to the completion engine, each taking one
//! string input and producing one string output:
//! - `list-tables`: selected tables, one per line
//! - `describe-tables`: pseudo-DDL with sample rows for named tables
//! - `run-query`: execute a read-only statement and echo it with its result
//! - `check-query`: ask the completion engine to review a statement
//!
//! Failures are returned as [`ToolOutcome::Failure`] so the agent can read
//! them and try again instead of the whole request failing.

pub mod format;
pub mod query;
pub mod schema;
pub mod sql_validator;

pub use query::{CheckQueryTool, QueryInput, RunQueryTool, strip_fence};
pub use schema::{DescribeTablesInput, DescribeTablesTool, ListTablesTool};

use crate::db::QueryExecutor;
use crate::error::{DbError, DbResult};
use crate::llm::{CompletionEngine, ToolSpec};
use crate::models::{DEFAULT_ROW_LIMIT, DatabaseType};
use crate::schema::SchemaSnapshot;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Why a tool invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// The input could not be used (empty, malformed).
    InvalidInput,
    /// A named table does not exist.
    NotFound,
    /// The statement was refused by the read-only guard.
    Rejected,
    /// The database reported an error or timed out.
    Execution,
    /// The completion engine failed.
    Engine,
    Internal,
}

/// Result of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Success(String),
    Failure { kind: ToolErrorKind, message: String },
}

impl ToolOutcome {
    pub fn failure(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }

    /// Classify an error raised while a tool was running.
    pub fn from_error(error: &DbError) -> Self {
        let kind = match error {
            DbError::TableNotFound { .. } => ToolErrorKind::NotFound,
            DbError::InvalidInput { .. } => ToolErrorKind::InvalidInput,
            DbError::Permission { .. } => ToolErrorKind::Rejected,
            DbError::Database { .. }
            | DbError::Timeout { .. }
            | DbError::Connection { .. }
            | DbError::Schema { .. } => ToolErrorKind::Execution,
            DbError::Llm { .. } => ToolErrorKind::Engine,
            _ => ToolErrorKind::Internal,
        };
        Self::failure(kind, error.to_string())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Text handed back to the completion engine.
    pub fn text(&self) -> String {
        match self {
            Self::Success(output) => output.clone(),
            Self::Failure { message, .. } => format!("Error: {}", message),
        }
    }
}

impl From<DbResult<String>> for ToolOutcome {
    fn from(result: DbResult<String>) -> Self {
        match result {
            Ok(output) => Self::Success(output),
            Err(e) => Self::from_error(&e),
        }
    }
}

/// A named tool the agent can call.
#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &'static str;

    /// Description shown to the completion engine when choosing a tool.
    fn description(&self) -> &'static str;

    async fn invoke(&self, input: &str) -> ToolOutcome;

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(self.name(), self.description())
    }
}

/// The four tools bound to one snapshot, executor and completion engine.
pub struct Toolkit {
    run_query: RunQueryTool,
    describe_tables: DescribeTablesTool,
    list_tables: ListTablesTool,
    check_query: CheckQueryTool,
    dialect: DatabaseType,
}

impl Toolkit {
    pub fn new(
        snapshot: Arc<SchemaSnapshot>,
        executor: Arc<dyn QueryExecutor>,
        engine: Arc<dyn CompletionEngine>,
    ) -> Self {
        Self::with_row_limit(snapshot, executor, engine, DEFAULT_ROW_LIMIT)
    }

    /// Same as [`Toolkit::new`] with an explicit run-query row limit.
    pub fn with_row_limit(
        snapshot: Arc<SchemaSnapshot>,
        executor: Arc<dyn QueryExecutor>,
        engine: Arc<dyn CompletionEngine>,
        row_limit: u32,
    ) -> Self {
        let dialect = executor.dialect();
        Self {
            run_query: RunQueryTool::new(executor.clone(), row_limit),
            describe_tables: DescribeTablesTool::new(snapshot.clone(), executor),
            list_tables: ListTablesTool::new(snapshot),
            check_query: CheckQueryTool::new(engine, dialect),
            dialect,
        }
    }

    /// Dialect of the database the tools run against.
    pub fn dialect(&self) -> DatabaseType {
        self.dialect
    }

    pub fn run_query(&self) -> &RunQueryTool {
        &self.run_query
    }

    pub fn describe_tables(&self) -> &DescribeTablesTool {
        &self.describe_tables
    }

    pub fn list_tables(&self) -> &ListTablesTool {
        &self.list_tables
    }

    pub fn check_query(&self) -> &CheckQueryTool {
        &self.check_query
    }

    fn all(&self) -> [&dyn Capability; 4] {
        [
            &self.run_query,
            &self.describe_tables,
            &self.list_tables,
            &self.check_query,
        ]
    }

    /// Look a tool up by the name the completion engine used.
    pub fn get(&self, name: &str) -> Option<&dyn Capability> {
        self.all().into_iter().find(|t| t.name() == name)
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.all().iter().map(|t| t.spec()).collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.all().iter().map(|t| t.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_error_kinds() {
        let cases = [
            (
                DbError::table_not_found("Wrong target table name:", "X"),
                ToolErrorKind::NotFound,
            ),
            (DbError::invalid_input("empty"), ToolErrorKind::InvalidInput),
            (
                DbError::permission("DELETE", "no writes"),
                ToolErrorKind::Rejected,
            ),
            (DbError::timeout("Query", 30), ToolErrorKind::Execution),
            (DbError::llm("down"), ToolErrorKind::Engine),
            (DbError::internal("bug"), ToolErrorKind::Internal),
        ];

        for (error, expected) in cases {
            match ToolOutcome::from_error(&error) {
                ToolOutcome::Failure { kind, message } => {
                    assert_eq!(kind, expected);
                    assert_eq!(message, error.to_string());
                }
                other => panic!("expected failure, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_outcome_text() {
        assert_eq!(ToolOutcome::Success("ok".into()).text(), "ok");
        let failure = ToolOutcome::failure(ToolErrorKind::Execution, "Invalid column name 'x'.");
        assert!(!failure.is_success());
        assert_eq!(failure.text(), "Error: Invalid column name 'x'.");
    }
}
