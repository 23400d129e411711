//! Catalog MCP Server implementation

use std::sync::Arc;

use anyhow::Result;
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::error::CatalogError;
use crate::core::model::{Comment, Post, PostId};
use crate::core::query::{SearchFilters, SortOrder};
use crate::state::AppState;

/// Parameters for catalog_search tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchParams {
    #[schemars(description = "Case-insensitive text to find in titles, descriptions, keywords and comments; empty matches all")]
    #[serde(default)]
    pub query: String,
    #[schemars(description = "Sort order: date (default), popularity, comments")]
    #[serde(default)]
    pub sort: Option<String>,
    #[schemars(description = "Earliest post date, YYYY-MM-DD")]
    #[serde(default)]
    pub start_date: Option<String>,
    #[schemars(description = "Latest post date, YYYY-MM-DD")]
    #[serde(default)]
    pub end_date: Option<String>,
    #[schemars(description = "Filename suffix such as .csv")]
    #[serde(default)]
    pub file_type: Option<String>,
    #[schemars(description = "Author department")]
    #[serde(default)]
    pub department: Option<String>,
    #[schemars(description = "Part of the author's name, case-insensitive")]
    #[serde(default)]
    pub user: Option<String>,
    #[schemars(description = "Maximum number of results (default: 20)")]
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// Parameters for catalog_get_post tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetPostParams {
    #[schemars(description = "Numeric post ID")]
    #[serde(default)]
    pub id: Option<u64>,
    #[schemars(description = "Exact post title (used when no ID is given)")]
    #[serde(default)]
    pub title: Option<String>,
}

/// Parameters for catalog_closest and catalog_graph tools
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SimilarityParams {
    #[schemars(description = "Exact title of the post to start from")]
    pub title: String,
    #[schemars(description = "Neighborhood size; n returns n-1 posts (default from config)")]
    #[serde(default)]
    pub n_closest: Option<usize>,
}

#[derive(Debug, Serialize)]
struct PostJson {
    post: Post,
    comments: Vec<Comment>,
}

#[derive(Debug, Serialize)]
struct NeighborJson {
    id: PostId,
    title: String,
    keywords: Vec<String>,
    distance: f64,
}

/// Catalog MCP Service
#[derive(Clone)]
pub struct CatalogService {
    state: Arc<AppState>,
    tool_router: ToolRouter<Self>,
}

impl CatalogService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            tool_router: Self::tool_router(),
        }
    }

    fn n_closest(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.state.config.similarity.n_closest)
    }
}

fn to_mcp_error(e: CatalogError) -> McpError {
    match e {
        CatalogError::NotFound(_) | CatalogError::InvalidInput(_) | CatalogError::SelfReference => {
            McpError::invalid_params(e.to_string(), None)
        }
        _ => McpError::internal_error(e.to_string(), None),
    }
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let output = serde_json::to_string_pretty(value).map_err(|e| {
        McpError::internal_error(format!("JSON serialization failed: {}", e), None)
    })?;
    Ok(CallToolResult::success(vec![Content::text(output)]))
}

#[tool_router]
impl CatalogService {
    /// Search posts by text with optional filters
    #[tool(description = "Search shared dataset posts by text, with optional date range, file type and department filters and a sort order.")]
    async fn catalog_search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let sort: SortOrder = p.sort.as_deref().unwrap_or_default().parse().map_err(to_mcp_error)?;
        let filters = SearchFilters {
            start_date: p.start_date,
            end_date: p.end_date,
            file_type: p.file_type,
            department: p.department,
            user: p.user,
        };
        // Clamp limit: max 200
        let limit = p.limit.clamp(1, 200);

        let posts: Vec<Post> = {
            let catalog = self.state.catalog();
            let found: Vec<Post> = catalog
                .search(&p.query, &filters, sort)
                .map_err(to_mcp_error)?
                .into_iter()
                .take(limit)
                .cloned()
                .collect();
            found
        };
        json_result(&posts)
    }

    /// Get a post with its comments
    #[tool(description = "Get a dataset post with all of its metadata and comments, by ID or exact title.")]
    async fn catalog_get_post(
        &self,
        params: Parameters<GetPostParams>,
    ) -> Result<CallToolResult, McpError> {
        let result = {
            let catalog = self.state.catalog();
            let post = match (params.0.id, params.0.title.as_deref()) {
                (Some(id), _) => catalog.post(PostId(id)),
                (None, Some(title)) => catalog.post_by_title(title),
                (None, None) => Err(CatalogError::invalid("either id or title is required")),
            }
            .map_err(to_mcp_error)?;
            let comments: Vec<Comment> = catalog.comments_for(post.id).into_iter().cloned().collect();
            PostJson {
                post: post.clone(),
                comments,
            }
        };
        json_result(&result)
    }

    /// Posts whose keywords embed closest to a given post
    #[tool(description = "Find the posts most similar to a given post by keyword embedding. Returns n_closest - 1 neighbors, nearest first.")]
    async fn catalog_closest(
        &self,
        params: Parameters<SimilarityParams>,
    ) -> Result<CallToolResult, McpError> {
        let state = Arc::clone(&self.state);
        let n = self.n_closest(params.0.n_closest);
        let title = params.0.title;

        let neighbors = tokio::task::spawn_blocking(move || -> Result<Vec<NeighborJson>, CatalogError> {
            let catalog = state.catalog();
            let mut engine = state.engine();
            let neighbors: Vec<NeighborJson> = engine
                .closest(&catalog, &title, n)?
                .into_iter()
                .map(|nb| NeighborJson {
                    id: nb.post.id,
                    title: nb.post.title.clone(),
                    keywords: nb.post.keywords.clone(),
                    distance: nb.distance,
                })
                .collect();
            Ok(neighbors)
        })
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?
        .map_err(to_mcp_error)?;

        json_result(&neighbors)
    }

    /// Keyword co-occurrence graph around a post, as HTML
    #[tool(description = "Render the keyword/title co-occurrence graph of a post's nearest neighbors as a standalone vis-network HTML page.")]
    async fn catalog_graph(
        &self,
        params: Parameters<SimilarityParams>,
    ) -> Result<CallToolResult, McpError> {
        let state = Arc::clone(&self.state);
        let n = self.n_closest(params.0.n_closest);
        let title = params.0.title;

        let html = tokio::task::spawn_blocking(move || -> Result<String, CatalogError> {
            let catalog = state.catalog();
            let mut engine = state.engine();
            let html = engine.graph(&catalog, &title, n, &state.config.graph)?;
            Ok(html)
        })
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?
        .map_err(to_mcp_error)?;

        Ok(CallToolResult::success(vec![Content::text(html)]))
    }

    /// Catalog status summary
    #[tool(description = "Get catalog status: counts of posts, users, comments and likes, and the state of the similarity index.")]
    async fn catalog_status(&self) -> Result<CallToolResult, McpError> {
        let mut output = {
            let catalog = self.state.catalog();
            let users = catalog.users().count();
            let summary = serde_json::json!({
                "data_dir": self.state.paths.root.display().to_string(),
                "posts": catalog.posts().len(),
                "users": users,
                "comments": catalog.comments().len(),
                "likes": catalog.like_count(),
                "fingerprint": catalog.fingerprint(),
            });
            summary
        };

        let index = self
            .state
            .engine()
            .index()
            .and_then(|index| index.get_stats().ok());
        output["index"] = serde_json::to_value(index).unwrap_or_default();

        json_result(&output)
    }
}

#[tool_handler]
impl ServerHandler for CatalogService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Research dataset catalog MCP Server. Provides post search, post details and keyword-similarity recommendations.".to_string()
            ),
            ..Default::default()
        }
    }
}

/// Run the MCP server
pub async fn run_mcp_server(state: Arc<AppState>) -> Result<()> {
    use tokio::io::{stdin, stdout};

    tracing::info!(
        "MCP server starting for {}",
        state.paths.root.display()
    );
    let service = CatalogService::new(state);
    let transport = (stdin(), stdout());
    let server = service.serve(transport).await?;
    server.waiting().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::tests::post;
    use crate::core::catalog::Catalog;
    use crate::core::config::{Config, SimilarityConfig};
    use crate::core::paths::DataPaths;

    fn service() -> CatalogService {
        let mut catalog = Catalog::new();
        for (title, keywords, author) in [
            ("Liver atlas", "rna-seq liver", "Ada"),
            ("Liver proteome", "proteomics liver", "Ada"),
            ("Brain MRI", "mri brain", "Bob"),
            ("Brain EEG", "eeg brain", "Bob"),
        ] {
            catalog.create_post(post(title, keywords, author)).unwrap();
        }
        let config = Config {
            similarity: SimilarityConfig {
                seed: Some(1),
                projection_iterations: 250,
                ..SimilarityConfig::default()
            },
            ..Config::default()
        };
        CatalogService::new(AppState::ephemeral(
            DataPaths::from_root(std::env::temp_dir()),
            config,
            catalog,
        ))
    }

    fn text(result: &CallToolResult) -> String {
        let value = serde_json::to_value(result).unwrap();
        value["content"][0]["text"].as_str().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn test_search_tool() {
        let svc = service();
        let result = svc
            .catalog_search(Parameters(SearchParams {
                query: "liver".into(),
                sort: None,
                start_date: None,
                end_date: None,
                file_type: None,
                department: None,
                user: None,
                limit: 20,
            }))
            .await
            .unwrap();
        let posts: Vec<serde_json::Value> = serde_json::from_str(&text(&result)).unwrap();
        assert_eq!(posts.len(), 2);
    }

    #[tokio::test]
    async fn test_search_tool_filters_by_author() {
        let svc = service();
        let result = svc
            .catalog_search(Parameters(SearchParams {
                query: String::new(),
                sort: None,
                start_date: None,
                end_date: None,
                file_type: None,
                department: None,
                user: Some("bo".into()),
                limit: 20,
            }))
            .await
            .unwrap();
        let posts: Vec<serde_json::Value> = serde_json::from_str(&text(&result)).unwrap();
        assert_eq!(posts.len(), 2);
        assert!(posts.iter().all(|p| p["author"] == "Bob"));
    }

    #[test]
    fn test_tools_are_advertised() {
        let svc = service();
        assert!(svc.get_info().capabilities.tools.is_some());

        let names: Vec<String> = svc
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        for name in [
            "catalog_search",
            "catalog_get_post",
            "catalog_closest",
            "catalog_graph",
            "catalog_status",
        ] {
            assert!(names.iter().any(|n| n == name), "missing tool {}", name);
        }
    }

    #[tokio::test]
    async fn test_closest_tool() {
        let svc = service();
        let result = svc
            .catalog_closest(Parameters(SimilarityParams {
                title: "Brain MRI".into(),
                n_closest: Some(3),
            }))
            .await
            .unwrap();
        let neighbors: Vec<serde_json::Value> = serde_json::from_str(&text(&result)).unwrap();
        assert_eq!(neighbors.len(), 2);

        let missing = svc
            .catalog_closest(Parameters(SimilarityParams {
                title: "Nope".into(),
                n_closest: None,
            }))
            .await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn test_get_post_requires_key() {
        let svc = service();
        let err = svc
            .catalog_get_post(Parameters(GetPostParams { id: None, title: None }))
            .await;
        assert!(err.is_err());

        let ok = svc
            .catalog_get_post(Parameters(GetPostParams {
                id: Some(2),
                title: None,
            }))
            .await
            .unwrap();
        assert!(text(&ok).contains("Liver proteome"));
    }
}
