//! Process-wide state shared by the HTTP and MCP servers.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};

use crate::core::catalog::Catalog;
use crate::core::config::Config;
use crate::core::error::CatalogResult;
use crate::core::paths::DataPaths;
use crate::search::engine::SimilarityEngine;
use crate::search::vectordb::IndexStore;

pub struct AppState {
    pub paths: DataPaths,
    pub config: Config,
    /// Resolved uploads directory
    pub uploads: PathBuf,
    /// When false, mutations stay in memory (tests)
    persist: bool,
    catalog: Mutex<Catalog>,
    engine: Mutex<SimilarityEngine>,
}

impl AppState {
    /// Load config and catalog from the data directory and attach the
    /// on-disk projection index.
    pub fn load(paths: DataPaths) -> Result<Arc<Self>> {
        let config = Config::load(&paths.config)?;
        Self::with_config(paths, config)
    }

    pub fn with_config(paths: DataPaths, config: Config) -> Result<Arc<Self>> {
        let catalog = Catalog::load(&paths)
            .with_context(|| format!("Failed to load catalog from {}", paths.root.display()))?;
        let index = IndexStore::open(&paths.index_db)
            .with_context(|| format!("Failed to open index {}", paths.index_db.display()))?;
        let engine = SimilarityEngine::with_index(config.similarity.clone(), index);

        Ok(Arc::new(Self {
            uploads: paths.uploads(&config.uploads_dir),
            persist: true,
            catalog: Mutex::new(catalog),
            engine: Mutex::new(engine),
            config,
            paths,
        }))
    }

    /// State over an already built catalog; nothing is written back.
    pub fn ephemeral(paths: DataPaths, config: Config, catalog: Catalog) -> Arc<Self> {
        let engine = SimilarityEngine::new(config.similarity.clone());
        Arc::new(Self {
            uploads: paths.uploads(&config.uploads_dir),
            persist: false,
            catalog: Mutex::new(catalog),
            engine: Mutex::new(engine),
            config,
            paths,
        })
    }

    // A panic while holding a lock leaves the data usable; recover the guard
    pub fn catalog(&self) -> MutexGuard<'_, Catalog> {
        self.catalog.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn engine(&self) -> MutexGuard<'_, SimilarityEngine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write the catalog back to the data directory after a mutation.
    pub fn save(&self, catalog: &Catalog) -> CatalogResult<()> {
        if self.persist {
            catalog.save(&self.paths)?;
        }
        Ok(())
    }
}
