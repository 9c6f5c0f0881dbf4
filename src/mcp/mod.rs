//! MCP server integration module.
//!
//! Exposes the agent and its tools over the MCP protocol using the rmcp
//! framework.

pub mod service;

pub use service::QueryService;
