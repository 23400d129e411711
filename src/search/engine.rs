//! Similarity engine - embedding, projection and nearest-neighbor queries
//!
//! The embedding space is corpus-global: adding one post changes every
//! vector. The engine therefore caches the whole space against the
//! catalog's corpus version and only rebuilds when that version moves.
//! With an [`IndexStore`] attached, a rebuild first checks the on-disk
//! index for a space computed from the same corpus fingerprint.

use std::sync::Arc;

use super::embedding::{embed_documents, DocVecParams};
use super::projection::{tsne, TsneParams};
use super::render::render_graph;
use super::vectordb::IndexStore;
use crate::core::catalog::Catalog;
use crate::core::config::{GraphConfig, SimilarityConfig};
use crate::core::error::CatalogResult;
use crate::core::model::{Post, PostId};

/// Embedding vectors and 2D projections for every post, in catalog order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingSpace {
    pub ids: Vec<PostId>,
    pub vectors: Vec<Vec<f32>>,
    pub points: Vec<[f64; 2]>,
    /// Seed every stochastic step was run with
    pub seed: u64,
}

impl EmbeddingSpace {
    pub fn build(posts: &[Post], config: &SimilarityConfig, seed: u64) -> Self {
        let docs: Vec<Vec<String>> = posts.iter().map(|p| p.keywords.clone()).collect();
        let vectors = embed_documents(&docs, DocVecParams::from(config), seed);
        let points = tsne(
            &vectors,
            TsneParams {
                perplexity: config.perplexity,
                iterations: config.projection_iterations,
            },
            seed,
        );

        Self {
            ids: posts.iter().map(|p| p.id).collect(),
            vectors,
            points,
            seed,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn position(&self, id: PostId) -> Option<usize> {
        self.ids.iter().position(|&p| p == id)
    }

    /// Closest points to `index` by Euclidean distance in the projection,
    /// nearest first. The point itself is excluded and at most
    /// `n_closest - 1` neighbors are returned.
    pub fn nearest(&self, index: usize, n_closest: usize) -> Vec<(usize, f64)> {
        let Some(origin) = self.points.get(index) else {
            return Vec::new();
        };

        let mut ranked: Vec<(usize, f64)> = self
            .points
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(i, p)| {
                let dx = p[0] - origin[0];
                let dy = p[1] - origin[1];
                (i, (dx * dx + dy * dy).sqrt())
            })
            .collect();

        ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        ranked.truncate(n_closest.saturating_sub(1));
        ranked
    }
}

#[derive(Debug, Clone)]
pub struct Neighbor<'a> {
    pub post: &'a Post,
    pub distance: f64,
}

pub struct SimilarityEngine {
    config: SimilarityConfig,
    cached: Option<(u64, Arc<EmbeddingSpace>)>,
    index: Option<IndexStore>,
}

impl SimilarityEngine {
    pub fn new(config: SimilarityConfig) -> Self {
        Self {
            config,
            cached: None,
            index: None,
        }
    }

    /// Engine backed by a persistent index
    pub fn with_index(config: SimilarityConfig, index: IndexStore) -> Self {
        Self {
            index: Some(index),
            ..Self::new(config)
        }
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    pub fn index(&self) -> Option<&IndexStore> {
        self.index.as_ref()
    }

    /// Space for the catalog's current corpus, computing it on cache miss.
    pub fn space(&mut self, catalog: &Catalog) -> Arc<EmbeddingSpace> {
        if let Some((version, space)) = &self.cached {
            if *version == catalog.version() {
                return Arc::clone(space);
            }
        }

        let space = Arc::new(self.load_or_build(catalog));
        self.cached = Some((catalog.version(), Arc::clone(&space)));
        space
    }

    /// Recompute unconditionally, replacing both caches.
    pub fn rebuild(&mut self, catalog: &Catalog) -> Arc<EmbeddingSpace> {
        let space = Arc::new(self.build_and_store(catalog));
        self.cached = Some((catalog.version(), Arc::clone(&space)));
        space
    }

    /// Posts nearest to the first post titled `title`.
    pub fn closest<'c>(
        &mut self,
        catalog: &'c Catalog,
        title: &str,
        n_closest: usize,
    ) -> CatalogResult<Vec<Neighbor<'c>>> {
        let query = catalog.post_by_title(title)?;
        if n_closest == 0 {
            return Ok(Vec::new());
        }

        let space = self.space(catalog);
        let Some(index) = space.position(query.id) else {
            return Ok(Vec::new());
        };

        let mut neighbors = Vec::new();
        for (i, distance) in space.nearest(index, n_closest) {
            neighbors.push(Neighbor {
                post: catalog.post(space.ids[i])?,
                distance,
            });
        }
        Ok(neighbors)
    }

    /// HTML keyword graph over the neighbors of `title`.
    pub fn graph(
        &mut self,
        catalog: &Catalog,
        title: &str,
        n_closest: usize,
        graph_config: &GraphConfig,
    ) -> CatalogResult<String> {
        let neighbors = self.closest(catalog, title, n_closest)?;
        let posts: Vec<&Post> = neighbors.iter().map(|n| n.post).collect();
        let seed = self.space(catalog).seed;
        Ok(render_graph(&posts, graph_config, seed))
    }

    fn load_or_build(&mut self, catalog: &Catalog) -> EmbeddingSpace {
        let fingerprint = catalog.fingerprint();
        let params = self.params_key();

        if let Some(index) = &self.index {
            match index.load_space(&fingerprint, &params) {
                Ok(Some(space)) if self.seed_matches(&space) => {
                    tracing::debug!(posts = space.len(), "reusing stored projection index");
                    return space;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("failed to read projection index: {:#}", e),
            }
        }

        self.build_and_store(catalog)
    }

    fn build_and_store(&mut self, catalog: &Catalog) -> EmbeddingSpace {
        let seed = self.config.seed.unwrap_or_else(rand::random);
        let start = std::time::Instant::now();
        let space = EmbeddingSpace::build(catalog.posts(), &self.config, seed);
        tracing::info!(
            posts = space.len(),
            seed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "computed embedding space"
        );

        let params = self.params_key();
        if let Some(index) = &mut self.index {
            let titles: Vec<&str> = catalog.posts().iter().map(|p| p.title.as_str()).collect();
            if let Err(e) = index.save_space(&space, &titles, &catalog.fingerprint(), &params) {
                tracing::warn!("failed to write projection index: {:#}", e);
            }
        }

        space
    }

    fn seed_matches(&self, space: &EmbeddingSpace) -> bool {
        self.config.seed.map_or(true, |seed| seed == space.seed)
    }

    /// Model parameters a stored space must have been computed with
    fn params_key(&self) -> String {
        let c = &self.config;
        format!(
            "pvdm:{}:{}:{}:{};tsne:{}:{}",
            c.vector_size, c.window, c.epochs, c.negative, c.perplexity, c.projection_iterations
        )
    }
}
