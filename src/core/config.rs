//! Optional `datashare.yaml` settings. Every field has a default, so a data
//! directory without a config file behaves like the stock deployment.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 5001;

const DEFAULT_EXTENSIONS: &[&str] = &[
    "txt", "pdf", "png", "jpg", "jpeg", "gif", "edf", "zip", "csv", "fasta", "hdf5", "gct", "tsv",
    "h5ad", "feather", "parquet", "vcf", "bam", "sam", "crm", "tiff", "xlsx", "bed",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub uploads_dir: PathBuf,
    pub allowed_extensions: BTreeSet<String>,
    pub similarity: SimilarityConfig,
    pub graph: GraphConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            uploads_dir: PathBuf::from("uploads"),
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            similarity: SimilarityConfig::default(),
            graph: GraphConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        config.allowed_extensions = config
            .allowed_extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        Ok(config)
    }
}

/// Parameters of the embedding, projection and neighbor query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub vector_size: usize,
    pub window: usize,
    pub epochs: usize,
    pub negative: usize,
    pub perplexity: f64,
    pub projection_iterations: usize,
    /// Fixed seed for training and projection. `None` draws a fresh seed per
    /// computation, so results only reproduce within one cached space.
    pub seed: Option<u64>,
    pub n_closest: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            vector_size: 5,
            window: 2,
            epochs: 10,
            negative: 5,
            perplexity: 30.0,
            projection_iterations: 1000,
            seed: None,
            n_closest: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub wrap_width: usize,
    pub layout_iterations: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            wrap_width: 20,
            layout_iterations: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() -> Result<()> {
        let config = Config::load(Path::new("/tmp/definitely-not-here/datashare.yaml"))?;
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.allowed_extensions.contains("h5ad"));
        assert_eq!(config.similarity.n_closest, 5);
        Ok(())
    }

    #[test]
    fn test_partial_yaml_overrides() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("datashare.yaml");
        fs::write(
            &path,
            "port: 8080\nallowed_extensions: ['.CSV', tsv]\nsimilarity:\n  seed: 42\n",
        )?;

        let config = Config::load(&path)?;
        assert_eq!(config.port, 8080);
        assert_eq!(config.similarity.seed, Some(42));
        assert_eq!(config.similarity.vector_size, 5);
        assert!(config.allowed_extensions.contains("csv"));
        assert_eq!(config.allowed_extensions.len(), 2);
        Ok(())
    }
}
