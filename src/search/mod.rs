//! Keyword similarity for posts
//!
//! Keyword lists are embedded with a paragraph-vector model, projected to
//! 2D with t-SNE, and compared by distance in the projection. Neighbor sets
//! feed a keyword/title co-occurrence graph rendered as HTML.

pub mod embedding;
pub mod engine;
pub mod graph;
pub mod layout;
pub mod projection;
pub mod render;
pub mod vectordb;

pub use engine::{EmbeddingSpace, Neighbor, SimilarityEngine};
pub use graph::CooccurrenceGraph;
pub use render::render_graph;
pub use vectordb::{IndexStats, IndexStore};
