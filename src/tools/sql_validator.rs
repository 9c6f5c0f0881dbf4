//! SQL statement validation for read-only enforcement.
//!
//! The run-query tool only executes read-only statements. Write operations
//! (INSERT, UPDATE, DELETE, DDL, etc.) are rejected with a message the agent
//! can act on.
//!
//! Uses [sqlparser](https://docs.rs/sqlparser/) for AST-based classification,
//! so formatting tricks and comments cannot smuggle a write past the check.

use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, MsSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

/// What a statement would do if executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlStatementType {
    Select,
    DmlWrite,
    Ddl,
    Transaction,
    /// EXEC / CALL: the procedure body is opaque
    ProcedureCall,
    Administrative,
    Unknown,
}

/// Error messages for each statement type category.
mod error_messages {
    pub const DML_WRITE: &str =
        "Write operations are not allowed. Only read-only SELECT queries can be run.";
    pub const DDL: &str = "Schema modifications are not allowed. Only read-only SELECT queries can be run.";
    pub const TRANSACTION: &str = "Transaction control is not allowed. Send a single SELECT query.";
    pub const PROCEDURE: &str =
        "Stored procedure calls are not allowed because their effects cannot be verified.";
    pub const ADMINISTRATIVE: &str = "Administrative statements are not allowed.";
    pub const UNKNOWN: &str = "Unrecognized SQL statement. Only SELECT queries are allowed.";
    pub const PARSE_ERROR: &str = "Failed to parse SQL statement.";
}

/// Get the appropriate SQL dialect for the given database type.
fn get_dialect(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::MsSql => Box::new(MsSqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

/// Validate SQL for read-only execution.
///
/// Returns `Ok(())` if every statement is read-only, `Err(DbError::Permission)`
/// if any statement writes, and `Err(DbError::InvalidInput)` if the text does
/// not parse in the target dialect.
///
/// # Examples
///
/// ```
/// use generative_db::tools::sql_validator::validate_readonly;
/// use generative_db::models::DatabaseType;
///
/// // SELECT is allowed
/// assert!(validate_readonly("SELECT TOP 5 * FROM dbo.Orders", DatabaseType::MsSql).is_ok());
///
/// // INSERT is blocked
/// assert!(validate_readonly("INSERT INTO dbo.Orders VALUES (1)", DatabaseType::MsSql).is_err());
/// ```
pub fn validate_readonly(sql: &str, db_type: DatabaseType) -> DbResult<()> {
    let dialect = get_dialect(db_type);

    let statements = Parser::parse_sql(dialect.as_ref(), sql).map_err(|e| {
        DbError::invalid_input(format!("{} Error: {}", error_messages::PARSE_ERROR, e))
    })?;

    if statements.is_empty() {
        return Err(DbError::invalid_input("Empty SQL statement"));
    }

    for stmt in statements {
        validate_statement(&stmt)?;
    }

    Ok(())
}

/// Validate a single parsed statement.
fn validate_statement(stmt: &Statement) -> DbResult<()> {
    let reason = match classify_statement(stmt) {
        SqlStatementType::Select => return Ok(()),
        SqlStatementType::DmlWrite => error_messages::DML_WRITE,
        SqlStatementType::Ddl => error_messages::DDL,
        SqlStatementType::Transaction => error_messages::TRANSACTION,
        SqlStatementType::ProcedureCall => error_messages::PROCEDURE,
        SqlStatementType::Administrative => error_messages::ADMINISTRATIVE,
        SqlStatementType::Unknown => error_messages::UNKNOWN,
    };
    Err(DbError::permission(operation_name(stmt), reason))
}

/// Classify a parsed statement. Anything not listed is `Unknown` and refused.
fn classify_statement(stmt: &Statement) -> SqlStatementType {
    match stmt {
        Statement::Query(_) => SqlStatementType::Select,
        // EXPLAIN is as safe as the statement it wraps
        Statement::Explain { statement, .. } => classify_statement(statement),

        Statement::Insert { .. }
        | Statement::Update { .. }
        | Statement::Delete { .. }
        | Statement::Merge { .. } => SqlStatementType::DmlWrite,

        Statement::CreateTable { .. }
        | Statement::CreateView { .. }
        | Statement::CreateIndex { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateDatabase { .. }
        | Statement::CreateFunction { .. }
        | Statement::CreateProcedure { .. }
        | Statement::CreateTrigger { .. }
        | Statement::AlterTable { .. }
        | Statement::AlterView { .. }
        | Statement::AlterIndex { .. }
        | Statement::Drop { .. }
        | Statement::DropFunction { .. }
        | Statement::DropProcedure { .. }
        | Statement::DropTrigger { .. }
        | Statement::Truncate { .. } => SqlStatementType::Ddl,

        Statement::StartTransaction { .. }
        | Statement::Commit { .. }
        | Statement::Rollback { .. }
        | Statement::Savepoint { .. } => SqlStatementType::Transaction,

        Statement::Call { .. } | Statement::Execute { .. } => SqlStatementType::ProcedureCall,

        Statement::Grant { .. }
        | Statement::Revoke { .. }
        | Statement::Deny { .. }
        | Statement::Set { .. }
        | Statement::Use { .. }
        | Statement::Kill { .. }
        | Statement::Pragma { .. }
        | Statement::AttachDatabase { .. } => SqlStatementType::Administrative,

        _ => SqlStatementType::Unknown,
    }
}

/// Leading keywords of the statement, e.g. `INSERT` or `DROP TABLE`.
fn operation_name(stmt: &Statement) -> String {
    let text = stmt.to_string();
    let mut words = text.split_whitespace().map(str::to_uppercase);
    let first = words.next().unwrap_or_default();
    match (first.as_str(), words.next()) {
        ("CREATE" | "ALTER" | "DROP", Some(object)) => format!("{} {}", first, object),
        _ => first,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_DB_TYPE: DatabaseType = DatabaseType::MsSql;

    #[test]
    fn test_validate_readonly_select_ok() {
        assert!(validate_readonly("SELECT TOP 10 Name FROM dbo.Products", TEST_DB_TYPE).is_ok());
        assert!(validate_readonly("SELECT [Order Id] FROM [sales].[Orders]", TEST_DB_TYPE).is_ok());
    }

    #[test]
    fn test_validate_readonly_insert_error() {
        let err = validate_readonly("INSERT INTO users VALUES (1)", TEST_DB_TYPE).unwrap_err();
        assert!(matches!(err, DbError::Permission { .. }));
        assert!(err.to_string().contains("INSERT"));
    }

    #[test]
    fn test_validate_readonly_update_error() {
        let result = validate_readonly("UPDATE users SET name = 'test'", TEST_DB_TYPE);
        assert!(matches!(result, Err(DbError::Permission { .. })));
    }

    #[test]
    fn test_validate_readonly_ddl_error() {
        assert!(validate_readonly("CREATE TABLE test (id INT)", TEST_DB_TYPE).is_err());
        assert!(validate_readonly("DROP TABLE users", TEST_DB_TYPE).is_err());
        assert!(validate_readonly("TRUNCATE TABLE users", TEST_DB_TYPE).is_err());
    }

    #[test]
    fn test_error_message_ddl_mentions_schema() {
        let err = validate_readonly("CREATE TABLE test (id INT)", TEST_DB_TYPE).unwrap_err();
        assert!(err.to_string().contains("Schema modifications"));
    }

    #[test]
    fn test_transaction_control_blocked() {
        let err = validate_readonly("COMMIT", TEST_DB_TYPE).unwrap_err();
        assert!(err.to_string().contains("Transaction control"));
    }

    #[test]
    fn test_complex_select_with_cte_and_subquery() {
        let sql = r#"
            WITH recent AS (
                SELECT CustomerId, COUNT(*) AS n FROM dbo.Orders GROUP BY CustomerId
            )
            SELECT c.Name, r.n
            FROM dbo.Customers c
            JOIN recent r ON r.CustomerId = c.Id
            WHERE c.Id IN (SELECT CustomerId FROM dbo.ActiveCustomers)
        "#;
        assert!(validate_readonly(sql, TEST_DB_TYPE).is_ok());
    }

    #[test]
    fn test_select_with_union() {
        let sql = "SELECT a FROM t1 UNION ALL SELECT b FROM t2";
        assert!(validate_readonly(sql, TEST_DB_TYPE).is_ok());
    }

    #[test]
    fn test_multiple_statements_blocked() {
        let sql = "SELECT 1; DELETE FROM users";
        assert!(validate_readonly(sql, TEST_DB_TYPE).is_err());
    }

    #[test]
    fn test_insert_select_blocked() {
        let sql = "INSERT INTO archive SELECT * FROM users WHERE created_at < '2020-01-01'";
        assert!(validate_readonly(sql, TEST_DB_TYPE).is_err());
    }

    #[test]
    fn test_sqlite_dialect() {
        assert!(validate_readonly("SELECT * FROM t LIMIT 3", DatabaseType::SQLite).is_ok());
        assert!(validate_readonly("DELETE FROM t", DatabaseType::SQLite).is_err());
    }

    #[test]
    fn test_parse_failure_is_invalid_input() {
        let err = validate_readonly("SELEKT nonsense FROM", TEST_DB_TYPE).unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }

    #[test]
    fn test_operation_name_in_message() {
        let err = validate_readonly("DROP TABLE dbo.Users", TEST_DB_TYPE).unwrap_err();
        assert!(err.to_string().starts_with("Permission denied: DROP TABLE - "));

        let err = validate_readonly("INSERT INTO dbo.Users VALUES (1)", TEST_DB_TYPE).unwrap_err();
        assert!(err.to_string().starts_with("Permission denied: INSERT - "));
    }

    #[test]
    fn test_empty_statement() {
        let err = validate_readonly("   ", TEST_DB_TYPE).unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }
}
