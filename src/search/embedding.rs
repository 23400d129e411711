//! Paragraph-vector (PV-DM) document embeddings
//!
//! Each post's keyword list is one document. The model learns word vectors,
//! an output layer and one vector per document jointly, by predicting every
//! keyword from the document vector averaged with the keywords around it,
//! with negative sampling:
//!
//! - `l1 = mean(doc, context words)`
//! - for the target word (label 1) and `negative` noise words (label 0):
//!   `g = (label - σ(l1 · out[w])) * α`, `out[w] += g * l1`
//! - the accumulated error is spread back over the doc and context vectors
//!
//! Training is corpus-global: there is no way to add a document without
//! retraining. After training, vectors are re-inferred per document against
//! the frozen word and output weights.

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::core::config::SimilarityConfig;

const START_ALPHA: f32 = 0.025;
const MIN_ALPHA: f32 = 0.0001;
/// Unigram counts are raised to this power to build the noise distribution
const NOISE_EXPONENT: f64 = 0.75;
const MAX_EXP: f32 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocVecParams {
    pub vector_size: usize,
    pub window: usize,
    pub epochs: usize,
    pub negative: usize,
}

impl From<&SimilarityConfig> for DocVecParams {
    fn from(config: &SimilarityConfig) -> Self {
        Self {
            vector_size: config.vector_size.max(1),
            window: config.window,
            epochs: config.epochs.max(1),
            negative: config.negative,
        }
    }
}

/// Trained paragraph-vector model.
pub struct DocVecModel {
    params: DocVecParams,
    vocab: HashMap<String, usize>,
    word_vecs: Vec<Vec<f32>>,
    out_vecs: Vec<Vec<f32>>,
    doc_vecs: Vec<Vec<f32>>,
    /// Cumulative noise weights, one per vocabulary word
    noise: Vec<f64>,
}

impl DocVecModel {
    /// Train over the whole corpus. Every token is kept (min_count = 1).
    pub fn train(docs: &[Vec<String>], params: DocVecParams, rng: &mut ChaCha8Rng) -> Self {
        let mut vocab: HashMap<String, usize> = HashMap::new();
        let mut counts: Vec<u64> = Vec::new();
        for doc in docs {
            for word in doc {
                let next = vocab.len();
                let idx = *vocab.entry(word.clone()).or_insert(next);
                if idx == counts.len() {
                    counts.push(0);
                }
                counts[idx] += 1;
            }
        }

        let mut total = 0.0;
        let noise: Vec<f64> = counts
            .iter()
            .map(|&c| {
                total += (c as f64).powf(NOISE_EXPONENT);
                total
            })
            .collect();

        let dim = params.vector_size;
        let word_vecs = (0..vocab.len()).map(|_| random_vector(dim, rng)).collect();
        let doc_vecs = (0..docs.len()).map(|_| random_vector(dim, rng)).collect();
        let out_vecs = vec![vec![0.0; dim]; vocab.len()];

        let mut model = Self {
            params,
            vocab,
            word_vecs,
            out_vecs,
            doc_vecs,
            noise,
        };

        let encoded: Vec<Vec<usize>> = docs.iter().map(|d| model.encode(d)).collect();
        for epoch in 0..params.epochs {
            let alpha = decayed_alpha(epoch, params.epochs);
            for (doc_idx, words) in encoded.iter().enumerate() {
                let mut doc_vec = std::mem::take(&mut model.doc_vecs[doc_idx]);
                model.train_document(&mut doc_vec, words, alpha, true, rng);
                model.doc_vecs[doc_idx] = doc_vec;
            }
        }

        model
    }

    /// Infer a vector for `doc` with the word and output weights frozen.
    pub fn infer_vector(&mut self, doc: &[String], rng: &mut ChaCha8Rng) -> Vec<f32> {
        let words = self.encode(doc);
        let mut doc_vec = random_vector(self.params.vector_size, rng);
        for epoch in 0..self.params.epochs {
            let alpha = decayed_alpha(epoch, self.params.epochs);
            self.train_document(&mut doc_vec, &words, alpha, false, rng);
        }
        doc_vec
    }

    /// Vector learned for the `index`-th training document.
    pub fn doc_vector(&self, index: usize) -> Option<&[f32]> {
        self.doc_vecs.get(index).map(|v| v.as_slice())
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    fn encode(&self, doc: &[String]) -> Vec<usize> {
        doc.iter().filter_map(|w| self.vocab.get(w).copied()).collect()
    }

    /// One PV-DM pass over a document. With `learn_words` false only the
    /// document vector moves.
    fn train_document(
        &mut self,
        doc_vec: &mut [f32],
        words: &[usize],
        alpha: f32,
        learn_words: bool,
        rng: &mut ChaCha8Rng,
    ) {
        let dim = self.params.vector_size;
        let window = self.params.window;

        for (pos, &target) in words.iter().enumerate() {
            let start = pos.saturating_sub(window);
            let end = (pos + window + 1).min(words.len());
            let context: Vec<usize> = (start..end)
                .filter(|&i| i != pos)
                .map(|i| words[i])
                .collect();

            let count = (context.len() + 1) as f32;
            let mut l1 = doc_vec.to_vec();
            for &w in &context {
                for (a, b) in l1.iter_mut().zip(&self.word_vecs[w]) {
                    *a += b;
                }
            }
            for a in &mut l1 {
                *a /= count;
            }

            let mut neu1e = vec![0.0f32; dim];
            for sample in 0..=self.params.negative {
                let (word, label) = if sample == 0 {
                    (target, 1.0)
                } else {
                    let noise_word = self.sample_noise(rng);
                    if noise_word == target {
                        continue;
                    }
                    (noise_word, 0.0)
                };

                let out = &mut self.out_vecs[word];
                let f: f32 = l1.iter().zip(out.iter()).map(|(a, b)| a * b).sum();
                let g = (label - sigmoid(f)) * alpha;
                for i in 0..dim {
                    neu1e[i] += g * out[i];
                }
                if learn_words {
                    for i in 0..dim {
                        out[i] += g * l1[i];
                    }
                }
            }

            for i in 0..dim {
                doc_vec[i] += neu1e[i] / count;
            }
            if learn_words {
                for &w in &context {
                    for i in 0..dim {
                        self.word_vecs[w][i] += neu1e[i] / count;
                    }
                }
            }
        }
    }

    fn sample_noise(&self, rng: &mut ChaCha8Rng) -> usize {
        let total = self.noise.last().copied().unwrap_or(0.0);
        if total <= 0.0 {
            return 0;
        }
        let r = rng.random::<f64>() * total;
        self.noise
            .partition_point(|&c| c <= r)
            .min(self.noise.len() - 1)
    }
}

/// Train a model and return one inferred vector per document, in order.
pub fn embed_documents(docs: &[Vec<String>], params: DocVecParams, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut model = DocVecModel::train(docs, params, &mut rng);
    docs.iter()
        .map(|doc| model.infer_vector(doc, &mut rng))
        .collect()
}

fn decayed_alpha(epoch: usize, epochs: usize) -> f32 {
    let progress = epoch as f32 / epochs as f32;
    START_ALPHA - (START_ALPHA - MIN_ALPHA) * progress
}

fn random_vector(dim: usize, rng: &mut ChaCha8Rng) -> Vec<f32> {
    (0..dim)
        .map(|_| (rng.random::<f32>() - 0.5) / dim as f32)
        .collect()
}

fn sigmoid(x: f32) -> f32 {
    let x = x.clamp(-MAX_EXP, MAX_EXP);
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(raw: &[&str]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|d| d.split_whitespace().map(String::from).collect())
            .collect()
    }

    fn params() -> DocVecParams {
        DocVecParams::from(&SimilarityConfig::default())
    }

    #[test]
    fn test_embedding_shape() {
        let corpus = docs(&["rna-seq mouse liver", "mri brain", "rna-seq human"]);
        let vectors = embed_documents(&corpus, params(), 7);
        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|v| v.len() == 5));
        assert!(vectors.iter().flatten().all(|x| x.is_finite()));
    }

    #[test]
    fn test_same_seed_same_vectors() {
        let corpus = docs(&["a b c", "b c d", "x y"]);
        assert_eq!(
            embed_documents(&corpus, params(), 11),
            embed_documents(&corpus, params(), 11)
        );
        assert_ne!(
            embed_documents(&corpus, params(), 11),
            embed_documents(&corpus, params(), 12)
        );
    }

    #[test]
    fn test_empty_documents_still_get_vectors() {
        let corpus = docs(&["", "solo"]);
        let vectors = embed_documents(&corpus, params(), 3);
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), 5);
    }

    #[test]
    fn test_vocabulary_counts_distinct_tokens() {
        let corpus = docs(&["a b a", "b c"]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let model = DocVecModel::train(&corpus, params(), &mut rng);
        assert_eq!(model.vocab_size(), 3);
        assert!(model.doc_vector(1).is_some());
        assert!(model.doc_vector(2).is_none());
    }

    #[test]
    fn test_sigmoid_is_clamped() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(100.0) < 1.0);
        assert!(sigmoid(-100.0) > 0.0);
    }
}
