//! MCP service implementation using rmcp.
//!
//! This module defines the QueryService struct exposing the agent and its
//! four tools via the MCP protocol using the rmcp framework's macros.

use crate::agent::{Agent, AgentResponse};
use crate::tools::{DescribeTablesInput, QueryInput};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    schemars::JsonSchema,
    tool, tool_handler, tool_router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Input for the generate_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GenerateQueryInput {
    /// Natural-language question about the data
    pub question: String,
}

/// One tool call made by the agent.
#[derive(Debug, Serialize, JsonSchema)]
pub struct StepSummary {
    pub tool: String,
    pub input: String,
    pub success: bool,
    /// Tool output, or the error text on failure
    pub output: String,
}

/// Output for the generate_query tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct GenerateQueryOutput {
    pub answer: String,
    /// Last query the agent executed successfully
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    pub steps: Vec<StepSummary>,
}

impl From<AgentResponse> for GenerateQueryOutput {
    fn from(response: AgentResponse) -> Self {
        Self {
            answer: response.answer,
            sql: response.sql,
            steps: response
                .steps
                .into_iter()
                .map(|step| StepSummary {
                    success: step.outcome.is_success(),
                    output: step.outcome.text(),
                    tool: step.tool,
                    input: step.input,
                })
                .collect(),
        }
    }
}

#[derive(Clone)]
pub struct QueryService {
    /// Agent and the toolkit it drives
    agent: Arc<Agent>,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl QueryService {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self {
            agent,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl QueryService {
    #[tool(
        description = "Answer a natural-language question about the database.\nAn agent explores the schema, writes and checks a read-only SQL query, runs it and answers.\nReturns the answer, the SQL that produced it and every tool call made."
    )]
    async fn generate_query(
        &self,
        Parameters(input): Parameters<GenerateQueryInput>,
    ) -> Result<Json<GenerateQueryOutput>, McpError> {
        info!("generate_query called");
        self.agent
            .run(&input.question)
            .await
            .map(|response| Json(response.into()))
            .map_err(McpError::from)
    }

    #[tool(
        description = "List the tables available to the agent as schema.name, one per line, with their description when known."
    )]
    async fn list_tables(&self) -> String {
        self.agent.toolkit().list_tables().list()
    }

    #[tool(
        description = "Describe tables as CREATE TABLE statements with constraints, followed by sample rows.\nInput is a comma-separated list of table names, schema-qualified or not."
    )]
    async fn describe_tables(
        &self,
        Parameters(input): Parameters<DescribeTablesInput>,
    ) -> Result<String, McpError> {
        self.agent
            .toolkit()
            .describe_tables()
            .describe(&input.tables)
            .await
            .map_err(McpError::from)
    }

    #[tool(
        description = "Execute a read-only SQL query and return it with its result as a text table.\nWrite operations (INSERT/UPDATE/DELETE/DDL) are blocked."
    )]
    async fn run_query(
        &self,
        Parameters(input): Parameters<QueryInput>,
    ) -> Result<String, McpError> {
        self.agent
            .toolkit()
            .run_query()
            .run(&input.sql)
            .await
            .map_err(McpError::from)
    }

    #[tool(
        description = "Have the language model review a SQL query for common mistakes.\nReturns the query unchanged or a corrected version."
    )]
    async fn check_query(
        &self,
        Parameters(input): Parameters<QueryInput>,
    ) -> Result<String, McpError> {
        self.agent
            .toolkit()
            .check_query()
            .check(&input.sql)
            .await
            .map_err(McpError::from)
    }
}

#[tool_handler]
impl ServerHandler for QueryService {
    fn get_info(&self) -> ServerInfo {
        let dialect = self.agent.toolkit().dialect();
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "generative-db".to_owned(),
                title: Some("Generative DB".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(format!(
                "Natural-language access to one {} database.\n\
                \n\
                ## Workflow\n\
                - Call `generate_query` with a question to let the agent do everything.\n\
                - Or drive the tools yourself: `list_tables`, then `describe_tables`,\n\
                  then `check_query`, then `run_query`.\n\
                \n\
                ## Notes\n\
                - Queries are read-only. Write statements are rejected.\n\
                - Table names are matched without their schema.\n\
                - The schema is read once at startup.",
                dialect.display_name()
            )),
        }
    }
}
