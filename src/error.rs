//! Error types for generative-db.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Each variant carries enough context for the agent (or the person at the CLI)
//! to understand what went wrong and how to recover.

use crate::agent::AgentStep;
use crate::tools::ToolOutcome;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// SQL Server error number or SQLite extended code
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Permission denied: {operation} - {reason}")]
    Permission { operation: String, reason: String },

    #[error("Schema error: {message} (object: {object})")]
    Schema { message: String, object: String },

    #[error("{context} the table {table} was not found in the database")]
    TableNotFound { context: String, table: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u32,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Completion engine error: {message}")]
    Llm { message: String },

    #[error(
        "Agent stopped after {max_iterations} tool invocations without producing a final answer{}",
        last_failure(.steps)
    )]
    AgentExhausted {
        max_iterations: usize,
        /// Every tool invocation made before the cap, in order.
        steps: Vec<AgentStep>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a permission error.
    pub fn permission(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Permission {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create a table-not-found error. `context` is prepended to the message.
    pub fn table_not_found(context: impl Into<String>, table: impl Into<String>) -> Self {
        Self::TableNotFound {
            context: context.into(),
            table: table.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u32) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a completion engine error.
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
        }
    }

    /// Create an agent exhaustion error carrying the steps taken so far.
    pub fn agent_exhausted(max_iterations: usize, steps: Vec<AgentStep>) -> Self {
        Self::AgentExhausted {
            max_iterations,
            steps,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::TableNotFound { .. } => Some("Call list_tables to see the available tables"),
            Self::AgentExhausted { .. } => {
                Some("Rephrase the question or raise the iteration cap")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire", 30),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check that the database file exists and is readable",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::schema(format!("Column not found: {}", col), col.to_string())
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Convert SQL Server (TDS) errors to DbError.
impl From<tiberius::error::Error> for DbError {
    fn from(err: tiberius::error::Error) -> Self {
        use tiberius::error::Error as TdsError;

        match err {
            TdsError::Server(token) => DbError::database(
                token.message().to_string(),
                Some(token.code().to_string()),
                "Check the SQL syntax and referenced objects",
            ),
            TdsError::Io { message, .. } => DbError::connection(
                format!("I/O error: {}", message),
                "Check network connectivity and SQL Server status",
            ),
            TdsError::Tls(msg) => DbError::connection(
                format!("TLS error: {}", msg),
                "Set trust_server_certificate=true for self-signed certificates",
            ),
            TdsError::Routing { host, port } => DbError::connection(
                format!("Server requested routing to {}:{}", host, port),
                "Connect to the routed host directly",
            ),
            TdsError::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check SQL Server version compatibility",
            ),
            other => DbError::internal(format!("SQL Server client error: {}", other)),
        }
    }
}

/// Convert HTTP client errors raised while talking to the completion engine.
impl From<reqwest::Error> for DbError {
    fn from(err: reqwest::Error) -> Self {
        DbError::llm(err.to_string())
    }
}

/// Message suffix naming the most recent failed step, if any.
fn last_failure(steps: &[AgentStep]) -> String {
    steps
        .iter()
        .rev()
        .find_map(|step| match &step.outcome {
            ToolOutcome::Failure { message, .. } => {
                Some(format!(". Last tool error ({}): {}", step.tool, message))
            }
            ToolOutcome::Success(_) => None,
        })
        .unwrap_or_default()
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Build suggestion data as JSON value.
fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Convert DbError to MCP ErrorData for semantic error categorization.
/// Includes the suggestion field in the `data` object when available.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        match &err {
            DbError::InvalidInput { .. }
            | DbError::Permission { .. }
            | DbError::Schema { .. }
            | DbError::Configuration { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), suggestion_data(err.suggestion()))
            }

            DbError::TableNotFound { .. } => rmcp::ErrorData::resource_not_found(
                err.to_string(),
                suggestion_data(err.suggestion()),
            ),

            DbError::Connection { suggestion, .. } => {
                rmcp::ErrorData::internal_error(err.to_string(), suggestion_data(Some(suggestion)))
            }
            DbError::Timeout { .. } => rmcp::ErrorData::internal_error(
                err.to_string(),
                suggestion_data(Some(
                    "Consider increasing the timeout or optimizing the operation",
                )),
            ),

            DbError::Database {
                message,
                sql_state,
                suggestion,
            } => {
                let msg = match sql_state {
                    Some(code) => format!("{} (error: {})", message, code),
                    None => message.clone(),
                };
                rmcp::ErrorData::invalid_params(msg, suggestion_data(Some(suggestion)))
            }

            DbError::AgentExhausted { steps, .. } => rmcp::ErrorData::internal_error(
                err.to_string(),
                Some(serde_json::json!({
                    "suggestion": err.suggestion(),
                    "steps": steps,
                })),
            ),

            DbError::Llm { .. } | DbError::Internal { .. } => {
                rmcp::ErrorData::internal_error(err.to_string(), suggestion_data(err.suggestion()))
            }
        }
    }
}
