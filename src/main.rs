mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use datashare::core::paths::DataPaths;
use datashare::core::query::SearchFilters;

#[derive(Parser)]
#[command(name = "datashare")]
#[command(about = "Research dataset sharing board with keyword-similarity recommendations", long_about = None)]
#[command(version)]
struct Cli {
    /// Data directory holding the TSV files (default: current directory)
    #[arg(long, global = true, value_name = "DIR")]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    // ===== Servers =====
    /// Start the HTTP API server
    Serve {
        #[arg(short, long, help = "Port to listen on (overrides config)")]
        port: Option<u16>,
    },
    /// Start MCP server for AI client integration
    #[cfg(feature = "mcp")]
    Mcp {
        #[arg(long, help = "Show client configuration instructions")]
        install: bool,
    },

    // ===== Catalog =====
    /// Search posts by text and filters
    Search {
        #[arg(default_value = "")]
        query: String,
        #[arg(long, default_value = "date", help = "date, popularity or comments")]
        sort: String,
        #[arg(long, help = "Earliest post date (YYYY-MM-DD)")]
        start_date: Option<String>,
        #[arg(long, help = "Latest post date (YYYY-MM-DD)")]
        end_date: Option<String>,
        #[arg(long, help = "Filename suffix, e.g. .csv")]
        file_type: Option<String>,
        #[arg(long, help = "Author department")]
        department: Option<String>,
        #[arg(long, help = "Author name")]
        user: Option<String>,
        #[arg(long, help = "Limit results")]
        limit: Option<usize>,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Search users by name
    Users {
        #[arg(default_value = "")]
        query: String,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Show catalog status
    Status {
        #[arg(long, help = "JSON output")]
        json: bool,
        #[arg(long, help = "Exit 1 on warnings")]
        strict: bool,
    },
    /// Renumber post IDs densely from 1
    Renumber {
        #[arg(long, help = "Posts file to renumber (default: posts.tsv)")]
        file: Option<PathBuf>,
        #[arg(long, help = "JSON output")]
        json: bool,
    },

    // ===== Similarity =====
    /// Build the projection index
    Index {
        #[arg(long, help = "Show index status only")]
        status: bool,
        #[arg(long, help = "Force rebuild index")]
        rebuild: bool,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Posts most similar to a given post
    Closest {
        title: String,
        #[arg(short, long, help = "Neighborhood size (returns n-1 posts)")]
        n: Option<usize>,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Render the keyword graph around a post as HTML
    Graph {
        title: String,
        #[arg(short, long, help = "Neighborhood size")]
        n: Option<usize>,
        #[arg(short, long, help = "Write HTML to file instead of stdout")]
        output: Option<PathBuf>,
    },
}

fn init_tracing(to_stderr: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    // stdout carries the MCP protocol and command output
    if to_stderr {
        builder.with_writer(std::io::stderr).init();
    } else {
        builder.init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let paths = match cli.data {
        Some(root) => DataPaths::from_root(root),
        None => DataPaths::new(),
    };

    let is_server = matches!(cli.command, Commands::Serve { .. });
    init_tracing(!is_server);

    match cli.command {
        Commands::Serve { port } => commands::serve::run(paths, port),
        #[cfg(feature = "mcp")]
        Commands::Mcp { install } => {
            if install {
                print_mcp_install_instructions(&paths);
                Ok(())
            } else {
                run_mcp_server(paths)
            }
        }
        Commands::Search {
            query,
            sort,
            start_date,
            end_date,
            file_type,
            department,
            user,
            limit,
            json,
        } => {
            let filters = SearchFilters {
                start_date,
                end_date,
                file_type,
                department,
                user,
            };
            commands::search::run(&paths, &query, &sort, filters, limit, json)
        }
        Commands::Users { query, json } => commands::users::run(&paths, &query, json),
        Commands::Status { json, strict } => commands::status::run(&paths, json, strict),
        Commands::Renumber { file, json } => {
            commands::renumber::run(&paths, file.as_deref(), json)
        }
        Commands::Index {
            status,
            rebuild,
            json,
        } => commands::index::run(&paths, status, rebuild, json),
        Commands::Closest { title, n, json } => commands::closest::run(&paths, &title, n, json),
        Commands::Graph { title, n, output } => {
            commands::graph::run(&paths, &title, n, output.as_deref())
        }
    }
}

#[cfg(feature = "mcp")]
fn run_mcp_server(paths: DataPaths) -> anyhow::Result<()> {
    let state = datashare::AppState::load(paths)?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(datashare::mcp::run_mcp_server(state))
}

#[cfg(feature = "mcp")]
fn print_mcp_install_instructions(paths: &DataPaths) {
    use colored::Colorize;

    let data_dir = paths.root.to_string_lossy().to_string();
    let binary_path = std::env::current_exe()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| "datashare".to_string());

    println!("{}", "MCP Server Installation Guide".bold().cyan());
    println!();
    println!("Add the following to your MCP client configuration:");
    println!();
    println!(r#"{{
  "mcpServers": {{
    "datashare": {{
      "command": "{}",
      "args": ["--data", "{}", "mcp"]
    }}
  }}
}}"#, binary_path, data_dir);
    println!();
    println!("{}", "Available tools:".bold());
    println!("  • {} - Search posts with filters and sort order", "catalog_search".green());
    println!("  • {} - Get a post with its comments", "catalog_get_post".green());
    println!("  • {} - Most similar posts by keyword embedding", "catalog_closest".green());
    println!("  • {} - Keyword co-occurrence graph as HTML", "catalog_graph".green());
    println!("  • {} - Catalog and index status", "catalog_status".green());
}
