//! Generative DB Library
//!
//! Answers natural-language questions about a SQL Server (or SQLite)
//! database. The schema is read once into a [`schema::SchemaSnapshot`],
//! rendered as pseudo-DDL with sample rows, and handed to a tool-calling
//! [`agent::Agent`] that writes, checks and runs read-only queries.

pub mod agent;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod models;
pub mod schema;
pub mod tools;
pub mod transport;

pub use agent::{Agent, AgentResponse};
pub use config::Config;
pub use error::DbError;
pub use mcp::QueryService;
