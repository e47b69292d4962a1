//! MCP (Model Context Protocol) server for Recfile
//!
//! Implements an MCP server over stdio, exposing recfile databases to AI
//! agents as CRUD tools.
//!
//! ## Tools Exposed
//!
//! - `recutils_query` - Select records, optionally filtered and reshaped
//! - `recutils_insert` - Append a record (creates the database if needed)
//! - `recutils_update` - Change fields of every matching record
//! - `recutils_delete` - Remove every matching record
//! - `recutils_info` - Record types and counts
//!
//! ## Usage
//!
//! ```rust,no_run
//! use recfile::mcp::McpServer;
//! use recfile::EngineConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = McpServer::new(EngineConfig::default());
//!     server.run().await.unwrap();
//! }
//! ```

mod protocol;
mod server;
pub mod tools;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, ToolDefinition, ToolResult};
pub use server::McpServer;
