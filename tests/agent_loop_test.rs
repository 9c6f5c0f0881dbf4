//! Integration tests for the agent loop driving the four tools.

use async_trait::async_trait;
use generative_db::agent::{Agent, AgentOptions, DEFAULT_MAX_ITERATIONS};
use generative_db::db::{DbPool, PoolExecutor, QueryExecutor};
use generative_db::error::{DbError, DbResult};
use generative_db::llm::{ChatMessage, Completion, CompletionEngine, Role, ToolCall, ToolSpec};
use generative_db::models::{ConnectionConfig, DatabaseType, QueryResult};
use generative_db::schema::{SchemaOptions, SchemaSnapshot};
use generative_db::tools::Toolkit;
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// Replays canned completions and records every conversation it was sent.
struct Script {
    replies: Mutex<VecDeque<Completion>>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl Script {
    fn new(replies: Vec<Completion>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl CompletionEngine for Script {
    async fn complete(&self, messages: &[ChatMessage], _tools: &[ToolSpec]) -> DbResult<Completion> {
        self.seen.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| DbError::llm("script exhausted"))
    }
}

/// Always asks for the same query again.
struct Stubborn;

#[async_trait]
impl CompletionEngine for Stubborn {
    async fn complete(&self, _messages: &[ChatMessage], _tools: &[ToolSpec]) -> DbResult<Completion> {
        Ok(Completion::ToolCalls(vec![ToolCall::new(
            "call",
            "run-query",
            "SELECT TOP 1 Id FROM dbo.Orders",
        )]))
    }
}

/// Counts executions and returns no rows.
#[derive(Default)]
struct Counting {
    calls: AtomicUsize,
}

#[async_trait]
impl QueryExecutor for Counting {
    fn dialect(&self) -> DatabaseType {
        DatabaseType::MsSql
    }

    async fn fetch(&self, _sql: &str, _limit: u32) -> DbResult<QueryResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(QueryResult::empty(0))
    }
}

async fn setup_test_db() -> Arc<PoolExecutor> {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file
        .into_temp_path()
        .keep()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let writer = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await
        .unwrap();
    for statement in [
        "CREATE TABLE Products (Id INTEGER NOT NULL PRIMARY KEY, Name TEXT, Price REAL)",
        "INSERT INTO Products VALUES (1, 'Widget', 2.5), (2, 'Gadget', 10.0), (3, 'Gizmo', 7.25)",
    ] {
        sqlx::query(statement).execute(&writer).await.unwrap();
    }
    writer.close().await;

    let config = ConnectionConfig::new(format!("sqlite:{}", db_path), 5).unwrap();
    Arc::new(PoolExecutor::new(DbPool::connect(&config).await.unwrap()))
}

fn call(id: &str, tool: &str, input: &str) -> Completion {
    Completion::ToolCalls(vec![ToolCall::new(id, tool, input)])
}

/// The cap counts tool invocations and stops the run once reached.
#[tokio::test]
async fn test_agent_stops_at_iteration_cap() {
    let executor = Arc::new(Counting::default());
    let snapshot = Arc::new(SchemaSnapshot::from_tables(vec![], SchemaOptions::default()).unwrap());
    let engine: Arc<dyn CompletionEngine> = Arc::new(Stubborn);
    let toolkit = Toolkit::new(snapshot, executor.clone(), engine.clone());
    let agent = Agent::new(engine, toolkit, AgentOptions::default());

    let err = agent.run("How many orders?").await.unwrap_err();

    match err {
        DbError::AgentExhausted {
            max_iterations,
            steps,
        } => {
            assert_eq!(max_iterations, DEFAULT_MAX_ITERATIONS);
            assert_eq!(steps.len(), DEFAULT_MAX_ITERATIONS);
            assert!(steps.iter().all(|s| s.tool == "run-query"
                && s.input == "SELECT TOP 1 Id FROM dbo.Orders"
                && s.outcome.is_success()));
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
    assert_eq!(executor.calls.load(Ordering::SeqCst), DEFAULT_MAX_ITERATIONS);
}

/// A full exploration against a real database ends with the answer and its SQL.
#[tokio::test]
async fn test_agent_full_flow() {
    let executor = setup_test_db().await;
    let snapshot = Arc::new(
        SchemaSnapshot::capture(executor.as_ref(), SchemaOptions::default())
            .await
            .unwrap(),
    );
    let query = "SELECT Name FROM Products ORDER BY Price DESC LIMIT 1";
    let script = Script::new(vec![
        call("c1", "list-tables", ""),
        call("c2", "describe-tables", "Products"),
        call("c3", "check-query", query),
        // Consumed by check-query itself
        Completion::Answer(query.to_string()),
        call("c4", "run-query", &format!("```sql\n{}\n```", query)),
        Completion::Answer("The most expensive product is Gadget.".into()),
    ]);
    let engine: Arc<dyn CompletionEngine> = script.clone();
    let toolkit = Toolkit::new(snapshot, executor, engine.clone());
    let agent = Agent::new(engine, toolkit, AgentOptions::default());

    let response = agent.run("Which product costs the most?").await.unwrap();

    assert_eq!(response.answer, "The most expensive product is Gadget.");
    assert_eq!(response.sql.as_deref(), Some(query));
    let tools: Vec<&str> = response.steps.iter().map(|s| s.tool.as_str()).collect();
    assert_eq!(tools, vec!["list-tables", "describe-tables", "check-query", "run-query"]);
    assert!(response.steps.iter().all(|s| s.outcome.is_success()));

    assert_eq!(response.steps[0].outcome.text(), "main.Products");
    assert!(response.steps[1]
        .outcome
        .text()
        .starts_with("CREATE TABLE [main].[Products] (\n"));
    let run = response.steps[3].outcome.text();
    assert!(run.starts_with(&format!("SQL QUERY:\n{}\n\nRESULT:\n", query)));
    assert!(run.contains("Gadget"));

    let seen = script.seen.lock().unwrap();
    // Four agent turns, one review prompt, one final turn
    assert_eq!(seen.len(), 6);
    assert_eq!(seen[0][0].role, Role::System);
    assert!(seen[0][0].content.contains("sqlite query"));
    assert_eq!(seen[3].len(), 1);
    assert!(seen[3][0].content.contains(query));
    let last = seen[5].last().unwrap();
    assert_eq!(last.role, Role::Tool);
    assert_eq!(last.tool_call_id.as_deref(), Some("c4"));
}

/// Rejected writes and database errors are fed back so the agent can retry.
#[tokio::test]
async fn test_agent_recovers_from_failed_queries() {
    let executor = setup_test_db().await;
    let snapshot = Arc::new(
        SchemaSnapshot::capture(executor.as_ref(), SchemaOptions::default())
            .await
            .unwrap(),
    );
    let script = Script::new(vec![
        call("c1", "run-query", "DELETE FROM Products"),
        call("c2", "run-query", "SELECT Nmae FROM Products"),
        call("c3", "run-query", "SELECT COUNT(*) AS n FROM Products"),
        Completion::Answer("There are 3 products.".into()),
    ]);
    let engine: Arc<dyn CompletionEngine> = script.clone();
    let toolkit = Toolkit::new(snapshot, executor, engine.clone());
    let agent = Agent::new(engine, toolkit, AgentOptions::default());

    let response = agent.run("How many products are there?").await.unwrap();

    let outcomes: Vec<bool> = response.steps.iter().map(|s| s.outcome.is_success()).collect();
    assert_eq!(outcomes, vec![false, false, true]);
    assert!(response.steps[0].outcome.text().starts_with("Error: "));
    assert_eq!(response.sql.as_deref(), Some("SELECT COUNT(*) AS n FROM Products"));

    let seen = script.seen.lock().unwrap();
    let fed_back = &seen[1].last().unwrap().content;
    assert!(fed_back.contains("DELETE"), "{}", fed_back);
}
