//! datashare library
//!
//! A research dataset sharing board with keyword-similarity recommendations.
//!
//! # Modules
//!
//! - `core`: Catalog of users, posts, comments and likes over TSV files
//! - `search`: Keyword embeddings, 2-D projection and co-occurrence graphs
//! - `http`: REST API server
//! - `mcp`: MCP server for AI clients

pub mod core;
pub mod http;
#[cfg(feature = "mcp")]
pub mod mcp;
pub mod search;
pub mod state;

// Re-exports for convenience
pub use core::catalog::Catalog;
pub use core::config::Config;
pub use core::error::{CatalogError, CatalogResult};
pub use core::model::{Comment, Post, PostId, User, UserId};
pub use core::paths::DataPaths;
pub use core::query::{SearchFilters, SortOrder};
pub use search::SimilarityEngine;
pub use state::AppState;
