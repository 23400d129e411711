pub mod closest;
pub mod graph;
pub mod index;
pub mod renumber;
pub mod search;
pub mod serve;
pub mod status;
pub mod users;

use anyhow::{Context, Result};

use datashare::core::catalog::Catalog;
use datashare::core::config::Config;
use datashare::core::paths::DataPaths;
use datashare::search::engine::SimilarityEngine;
use datashare::search::vectordb::IndexStore;

pub(crate) fn load(paths: &DataPaths) -> Result<(Config, Catalog)> {
    let config = Config::load(&paths.config)?;
    let catalog = Catalog::load(paths)
        .with_context(|| format!("Failed to load catalog from {}", paths.root.display()))?;
    Ok((config, catalog))
}

/// Similarity engine backed by the data directory's projection index
pub(crate) fn open_engine(paths: &DataPaths, config: &Config) -> Result<SimilarityEngine> {
    let index = IndexStore::open(&paths.index_db)
        .with_context(|| format!("Failed to open index {}", paths.index_db.display()))?;
    Ok(SimilarityEngine::with_index(config.similarity.clone(), index))
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    }
}
