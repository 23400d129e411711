use anyhow::Result;
use tracing::info;

use datashare::core::config::Config;
use datashare::core::paths::DataPaths;
use datashare::http::start_server;
use datashare::state::AppState;

pub fn run(paths: DataPaths, port: Option<u16>) -> Result<()> {
    let mut config = Config::load(&paths.config)?;
    if let Some(port) = port {
        config.port = port;
    }

    info!("Loading catalog from {}", paths.root.display());
    let state = AppState::with_config(paths, config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(start_server(state))
}
