//! Generative DB - Main entry point.
//!
//! `generative-db ask "<question>"` answers one question on the terminal;
//! `generative-db serve` exposes the agent and its tools as an MCP server on
//! stdio.

use clap::Parser;
use generative_db::agent::{Agent, AgentResponse, AgentStep};
use generative_db::config::{Command, Config};
use generative_db::db::{DbPool, PoolExecutor, QueryExecutor};
use generative_db::error::DbError;
use generative_db::llm::{CompletionEngine, OpenAiClient};
use generative_db::schema::SchemaSnapshot;
use generative_db::tools::Toolkit;
use generative_db::transport::{StdioTransport, Transport};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr so they never mix with MCP traffic on stdout.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn print_response(response: &AgentResponse) {
    println!("{}", response.answer);

    if let Some(sql) = &response.sql {
        println!();
        println!("SQL:");
        println!("{}", sql);
    }

    print_steps(&response.steps);
}

fn print_steps(steps: &[AgentStep]) {
    if !steps.is_empty() {
        println!();
        println!("Steps:");
        for (i, step) in steps.iter().enumerate() {
            let status = if step.outcome.is_success() { "ok" } else { "failed" };
            println!("  {}. {} [{}] {}", i + 1, step.tool, status, step.input.trim());
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine; the environment may already be set.
    dotenv::dotenv().ok();

    let config = Config::parse();
    init_tracing(&config);

    info!("Starting generative-db v{}", env!("CARGO_PKG_VERSION"));

    // Build the completion client first so a bad key fails before connecting
    let engine: Arc<dyn CompletionEngine> = Arc::new(OpenAiClient::new(config.openai_config())?);

    let connection = config.connection_config()?;
    let pool = DbPool::connect(&connection).await?;
    let executor: Arc<dyn QueryExecutor> = Arc::new(PoolExecutor::with_defaults(
        pool.clone(),
        config.query_timeout,
        config.row_limit,
    ));

    let snapshot = match SchemaSnapshot::capture(executor.as_ref(), config.schema_options()).await
    {
        Ok(snapshot) => Arc::new(snapshot),
        Err(e) => {
            error!(error = %e, "Failed to read database schema");
            pool.close().await;
            return Err(e.into());
        }
    };

    let toolkit = Toolkit::with_row_limit(snapshot, executor, engine.clone(), config.row_limit);
    let agent = Arc::new(Agent::new(engine, toolkit, config.agent_options()));

    let result = match &config.command {
        Command::Ask { question } => {
            let result = agent.run(question).await;
            pool.close().await;
            if let Err(DbError::AgentExhausted { steps, .. }) = &result {
                print_steps(steps);
            }
            result.map(|response| print_response(&response))
        }
        Command::Serve => {
            let transport = StdioTransport::new(agent, pool);
            info!(transport = transport.name(), "Serving MCP");
            transport.run().await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Request failed");
        return Err(e.into());
    }

    info!("Shutdown complete");
    Ok(())
}
