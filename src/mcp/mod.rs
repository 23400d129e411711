//! MCP Server for the dataset catalog
//!
//! Exposes post search, post details and similarity queries to AI clients
//! over stdio.

mod server;

pub use server::run_mcp_server;
