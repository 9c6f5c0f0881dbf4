//! Transport layer for the MCP server.
//!
//! Only stdio is provided: the server is launched by an MCP client as a
//! subprocess and speaks JSON-RPC over standard input/output.

pub mod stdio;

pub use stdio::StdioTransport;

use crate::error::DbResult;
use std::future::Future;

/// Trait for MCP transport implementations.
pub trait Transport: Send + Sync {
    /// Start the transport and block until it shuts down.
    fn run(&self) -> impl Future<Output = DbResult<()>> + Send;

    /// Get the name of this transport for logging.
    fn name(&self) -> &'static str;
}
