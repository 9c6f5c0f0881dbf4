//! Tool-calling agent that turns a question into SQL and an answer.
//!
//! Each run sends the system prompt and the question to the completion
//! engine, executes whatever tools it asks for, feeds the results back and
//! repeats until the engine answers. Tool invocations are capped; running
//! out is reported as [`DbError::AgentExhausted`], which keeps the steps
//! taken so far.

pub mod prompt;

use crate::error::{DbError, DbResult};
use crate::llm::{ChatMessage, Completion, CompletionEngine};
use crate::tools::query::RUN_QUERY;
use crate::tools::{ToolErrorKind, ToolOutcome, Toolkit, strip_fence};
use serde::Serialize;
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Default cap on tool invocations per question.
pub const DEFAULT_MAX_ITERATIONS: usize = 15;
/// Default row count the prompt asks queries to be limited to.
pub const DEFAULT_TOP_K: u32 = 10;

#[derive(Debug, Clone, Copy)]
pub struct AgentOptions {
    pub max_iterations: usize,
    pub top_k: u32,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// One tool invocation made during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentStep {
    pub tool: String,
    pub input: String,
    pub outcome: ToolOutcome,
}

/// Final answer of a run with the steps that led to it.
#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub answer: String,
    /// Last statement run-query executed successfully, fence removed.
    pub sql: Option<String>,
    pub steps: Vec<AgentStep>,
}

impl AgentResponse {
    fn new(answer: String, steps: Vec<AgentStep>) -> Self {
        let sql = steps
            .iter()
            .rev()
            .find(|s| s.tool == RUN_QUERY && s.outcome.is_success())
            .map(|s| strip_fence(&s.input).to_string());
        Self { answer, sql, steps }
    }
}

pub struct Agent {
    engine: Arc<dyn CompletionEngine>,
    toolkit: Toolkit,
    options: AgentOptions,
}

impl Agent {
    pub fn new(engine: Arc<dyn CompletionEngine>, toolkit: Toolkit, options: AgentOptions) -> Self {
        Self {
            engine,
            toolkit,
            options,
        }
    }

    pub fn toolkit(&self) -> &Toolkit {
        &self.toolkit
    }

    /// Answer `question`, calling tools as the completion engine requests.
    pub async fn run(&self, question: &str) -> DbResult<AgentResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DbError::invalid_input("Question cannot be empty"));
        }

        let run_id = Uuid::new_v4();
        let span = info_span!("agent_run", %run_id);
        self.run_loop(question).instrument(span).await
    }

    async fn run_loop(&self, question: &str) -> DbResult<AgentResponse> {
        let max_iterations = self.options.max_iterations;
        let specs = self.toolkit.specs();
        let mut messages = vec![
            ChatMessage::system(prompt::system_prompt(
                self.toolkit.dialect(),
                self.options.top_k,
            )),
            ChatMessage::user(question),
        ];
        let mut steps: Vec<AgentStep> = Vec::new();

        info!(max_iterations, "Agent run started");

        loop {
            let calls = match self.engine.complete(&messages, &specs).await? {
                Completion::Answer(answer) => {
                    info!(steps = steps.len(), "Agent produced final answer");
                    return Ok(AgentResponse::new(answer, steps));
                }
                Completion::ToolCalls(calls) if calls.is_empty() => {
                    return Err(DbError::llm(
                        "Completion contained neither an answer nor tool calls",
                    ));
                }
                Completion::ToolCalls(calls) => calls,
            };

            messages.push(ChatMessage::assistant_tool_calls(calls.clone()));

            for call in calls {
                if steps.len() >= max_iterations {
                    warn!(max_iterations, "Agent stopped at iteration cap");
                    return Err(DbError::agent_exhausted(max_iterations, steps));
                }

                debug!(tool = %call.name, input = %call.input, "Invoking tool");
                let outcome = match self.toolkit.get(&call.name) {
                    Some(tool) => tool.invoke(&call.input).await,
                    None => ToolOutcome::failure(
                        ToolErrorKind::InvalidInput,
                        format!(
                            "{} is not a valid tool, try one of [{}].",
                            call.name,
                            self.toolkit.names().join(", ")
                        ),
                    ),
                };
                if let ToolOutcome::Failure { kind, message } = &outcome {
                    debug!(tool = %call.name, ?kind, %message, "Tool reported failure");
                }

                messages.push(ChatMessage::tool_result(&call.id, outcome.text()));
                steps.push(AgentStep {
                    tool: call.name,
                    input: call.input,
                    outcome,
                });
            }

            if steps.len() >= max_iterations {
                warn!(max_iterations, "Agent stopped at iteration cap");
                return Err(DbError::agent_exhausted(max_iterations, steps));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::QueryExecutor;
    use crate::llm::{ToolCall, ToolSpec};
    use crate::models::{ColumnMetadata, DatabaseType, QueryResult, Table};
    use crate::schema::{SchemaOptions, SchemaSnapshot};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct OneRow;

    #[async_trait]
    impl QueryExecutor for OneRow {
        fn dialect(&self) -> DatabaseType {
            DatabaseType::MsSql
        }

        async fn fetch(&self, _sql: &str, _limit: u32) -> DbResult<QueryResult> {
            let mut row = serde_json::Map::new();
            row.insert("n".into(), json!(7));
            Ok(QueryResult {
                columns: vec![ColumnMetadata::new("n", "INT")],
                rows: vec![row],
                truncated: false,
                execution_time_ms: 1,
            })
        }
    }

    /// Replays canned completions and records what it was sent.
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
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _tools: &[ToolSpec],
        ) -> DbResult<Completion> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| DbError::llm("script exhausted"))
        }
    }

    fn agent(engine: Arc<Script>, options: AgentOptions) -> Agent {
        let snapshot = Arc::new(
            SchemaSnapshot::from_tables(
                vec![Table::new("dbo", "Orders")],
                SchemaOptions::default(),
            )
            .unwrap(),
        );
        let toolkit = Toolkit::new(snapshot, Arc::new(OneRow), engine.clone());
        Agent::new(engine, toolkit, options)
    }

    fn call(id: &str, name: &str, input: &str) -> Completion {
        Completion::ToolCalls(vec![ToolCall::new(id, name, input)])
    }

    #[tokio::test]
    async fn test_run_returns_answer_and_sql() {
        let engine = Script::new(vec![
            call("1", "list-tables", ""),
            call("2", "run-query", "```sql\nSELECT COUNT(*) AS n FROM dbo.Orders\n```"),
            Completion::Answer("There are 7 orders.".into()),
        ]);
        let response = agent(engine.clone(), AgentOptions::default())
            .run("How many orders?")
            .await
            .unwrap();

        assert_eq!(response.answer, "There are 7 orders.");
        assert_eq!(
            response.sql.as_deref(),
            Some("SELECT COUNT(*) AS n FROM dbo.Orders")
        );
        assert_eq!(response.steps.len(), 2);
        assert_eq!(
            response.steps[0].outcome,
            ToolOutcome::Success("dbo.Orders".into())
        );

        let seen = engine.seen.lock().unwrap();
        let last = seen.last().unwrap();
        assert_eq!(last[0].role, crate::llm::Role::System);
        assert_eq!(last[1].content, "How many orders?");
        assert_eq!(last.last().unwrap().tool_call_id.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fed_back() {
        let engine = Script::new(vec![
            call("1", "drop-database", "now"),
            Completion::Answer("I don't know".into()),
        ]);
        let response = agent(engine.clone(), AgentOptions::default())
            .run("Drop everything")
            .await
            .unwrap();

        assert!(response.sql.is_none());
        match &response.steps[0].outcome {
            ToolOutcome::Failure { kind, message } => {
                assert_eq!(*kind, ToolErrorKind::InvalidInput);
                assert!(message.starts_with("drop-database is not a valid tool"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cap_counts_tool_invocations() {
        let engine = Script::new(vec![Completion::ToolCalls(vec![
            ToolCall::new("a", "list-tables", ""),
            ToolCall::new("b", "list-tables", ""),
            ToolCall::new("c", "list-tables", ""),
        ])]);
        let options = AgentOptions {
            max_iterations: 2,
            ..Default::default()
        };

        let err = agent(engine, options).run("loop").await.unwrap_err();
        match err {
            DbError::AgentExhausted {
                max_iterations,
                steps,
            } => {
                assert_eq!(max_iterations, 2);
                let ids: Vec<&str> = steps.iter().map(|s| s.tool.as_str()).collect();
                assert_eq!(ids, vec!["list-tables", "list-tables"]);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_question_skips_engine() {
        let engine = Script::new(vec![]);
        let err = agent(engine.clone(), AgentOptions::default())
            .run("   ")
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::InvalidInput { .. }));
        assert!(engine.seen.lock().unwrap().is_empty());
    }
}
