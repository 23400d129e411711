//! Exact t-SNE projection to two dimensions
//!
//! Input affinities are Gaussian with a per-point bandwidth found by binary
//! search so that each conditional distribution has the requested
//! perplexity. Output affinities use a Student-t kernel. Optimisation is
//! plain gradient descent with momentum and per-parameter gains, with early
//! exaggeration for the first iterations.
//!
//! The projection is computed jointly for the whole corpus and depends on
//! the seed: two runs with different seeds place points differently.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const EARLY_EXAGGERATION: f64 = 12.0;
const EXAGGERATION_ITERS: usize = 250;
const INITIAL_MOMENTUM: f64 = 0.5;
const FINAL_MOMENTUM: f64 = 0.8;
const MIN_GAIN: f64 = 0.01;
const MIN_PROBABILITY: f64 = 1e-12;
const PERPLEXITY_TOLERANCE: f64 = 1e-5;
const BANDWIDTH_STEPS: usize = 100;
/// Standard deviation of the initial embedding
const INIT_SCALE: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TsneParams {
    pub perplexity: f64,
    pub iterations: usize,
}

impl Default for TsneParams {
    fn default() -> Self {
        Self {
            perplexity: 30.0,
            iterations: 1000,
        }
    }
}

/// Project `data` to 2D. Every point gets a coordinate, in input order.
pub fn tsne(data: &[Vec<f32>], params: TsneParams, seed: u64) -> Vec<[f64; 2]> {
    let n = data.len();
    if n < 2 {
        return vec![[0.0, 0.0]; n];
    }

    // Perplexity must stay below the number of neighbours a point has
    let perplexity = params.perplexity.min((n - 1) as f64 / 3.0).max(1.0);

    let distances = squared_distances(data);
    let p = joint_probabilities(&distances, n, perplexity);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut y: Vec<[f64; 2]> = (0..n)
        .map(|_| [gaussian(&mut rng) * INIT_SCALE, gaussian(&mut rng) * INIT_SCALE])
        .collect();
    let mut update = vec![[0.0f64; 2]; n];
    let mut gains = vec![[1.0f64; 2]; n];
    let learning_rate = (n as f64 / EARLY_EXAGGERATION / 4.0).max(50.0);

    let mut num = vec![0.0f64; n * n];
    let mut grad = vec![[0.0f64; 2]; n];

    for iter in 0..params.iterations {
        let (exaggeration, momentum) = if iter < EXAGGERATION_ITERS {
            (EARLY_EXAGGERATION, INITIAL_MOMENTUM)
        } else {
            (1.0, FINAL_MOMENTUM)
        };

        // Student-t numerators and their sum
        let mut sum_q = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = y[i][0] - y[j][0];
                let dy = y[i][1] - y[j][1];
                let v = 1.0 / (1.0 + dx * dx + dy * dy);
                num[i * n + j] = v;
                num[j * n + i] = v;
                sum_q += 2.0 * v;
            }
        }
        let sum_q = sum_q.max(MIN_PROBABILITY);

        for i in 0..n {
            let mut g = [0.0f64; 2];
            for j in 0..n {
                if i == j {
                    continue;
                }
                let v = num[i * n + j];
                let q = (v / sum_q).max(MIN_PROBABILITY);
                let mult = (exaggeration * p[i * n + j] - q) * v;
                g[0] += mult * (y[i][0] - y[j][0]);
                g[1] += mult * (y[i][1] - y[j][1]);
            }
            grad[i] = [4.0 * g[0], 4.0 * g[1]];
        }

        for i in 0..n {
            for d in 0..2 {
                let gain = &mut gains[i][d];
                if update[i][d] * grad[i][d] < 0.0 {
                    *gain += 0.2;
                } else {
                    *gain = (*gain * 0.8).max(MIN_GAIN);
                }
                update[i][d] = momentum * update[i][d] - learning_rate * *gain * grad[i][d];
                y[i][d] += update[i][d];
            }
        }

        // Re-centre so the embedding does not drift
        let mean = y.iter().fold([0.0, 0.0], |acc, p| [acc[0] + p[0], acc[1] + p[1]]);
        let mean = [mean[0] / n as f64, mean[1] / n as f64];
        for point in &mut y {
            point[0] -= mean[0];
            point[1] -= mean[1];
        }
    }

    y
}

fn squared_distances(data: &[Vec<f32>]) -> Vec<f64> {
    let n = data.len();
    let mut d = vec![0.0f64; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let dist: f64 = data[i]
                .iter()
                .zip(&data[j])
                .map(|(a, b)| {
                    let diff = f64::from(*a) - f64::from(*b);
                    diff * diff
                })
                .sum();
            d[i * n + j] = dist;
            d[j * n + i] = dist;
        }
    }
    d
}

/// Symmetrised input affinities `P = (P_j|i + P_i|j) / 2n`.
fn joint_probabilities(distances: &[f64], n: usize, perplexity: f64) -> Vec<f64> {
    let target_entropy = perplexity.ln();
    let mut conditional = vec![0.0f64; n * n];

    for i in 0..n {
        let row = &distances[i * n..(i + 1) * n];
        let mut beta = 1.0;
        let mut beta_min: Option<f64> = None;
        let mut beta_max: Option<f64> = None;
        let mut probs = vec![0.0f64; n];

        for _ in 0..BANDWIDTH_STEPS {
            let mut sum_p = 0.0;
            let mut weighted = 0.0;
            for j in 0..n {
                probs[j] = if i == j { 0.0 } else { (-row[j] * beta).exp() };
                sum_p += probs[j];
                weighted += row[j] * probs[j];
            }
            let sum_p = sum_p.max(f64::MIN_POSITIVE);
            let entropy = sum_p.ln() + beta * weighted / sum_p;
            for prob in &mut probs {
                *prob /= sum_p;
            }

            let diff = entropy - target_entropy;
            if diff.abs() < PERPLEXITY_TOLERANCE {
                break;
            }
            if diff > 0.0 {
                beta_min = Some(beta);
                beta = match beta_max {
                    Some(max) => (beta + max) / 2.0,
                    None => beta * 2.0,
                };
            } else {
                beta_max = Some(beta);
                beta = match beta_min {
                    Some(min) => (beta + min) / 2.0,
                    None => beta / 2.0,
                };
            }
        }

        conditional[i * n..(i + 1) * n].copy_from_slice(&probs);
    }

    let mut p = vec![0.0f64; n * n];
    let norm = 2.0 * n as f64;
    for i in 0..n {
        for j in 0..n {
            if i != j {
                p[i * n + j] =
                    ((conditional[i * n + j] + conditional[j * n + i]) / norm).max(MIN_PROBABILITY);
            }
        }
    }
    p
}

/// Standard normal sample (Box-Muller).
fn gaussian(rng: &mut ChaCha8Rng) -> f64 {
    let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
        ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
    }

    #[test]
    fn test_small_inputs() {
        assert!(tsne(&[], TsneParams::default(), 1).is_empty());
        assert_eq!(tsne(&[vec![1.0, 2.0]], TsneParams::default(), 1), vec![[0.0, 0.0]]);
        let two = tsne(&[vec![0.0], vec![1.0]], TsneParams::default(), 1);
        assert_eq!(two.len(), 2);
        assert!(two.iter().flatten().all(|x| x.is_finite()));
    }

    #[test]
    fn test_clusters_stay_apart() {
        // Two tight, well separated clusters of five points each
        let mut data = Vec::new();
        for i in 0..5 {
            data.push(vec![0.0 + i as f32 * 0.01, 0.0, 0.0]);
        }
        for i in 0..5 {
            data.push(vec![10.0 + i as f32 * 0.01, 10.0, 10.0]);
        }

        let y = tsne(&data, TsneParams { perplexity: 3.0, iterations: 500 }, 42);
        assert!(y.iter().flatten().all(|x| x.is_finite()));

        let within = distance(y[0], y[1]);
        let across = distance(y[0], y[5]);
        assert!(within < across, "within {} across {}", within, across);
    }

    #[test]
    fn test_seeded_runs_repeat() {
        let data: Vec<Vec<f32>> = (0..6).map(|i| vec![i as f32, (i * i) as f32]).collect();
        let params = TsneParams { perplexity: 2.0, iterations: 100 };
        assert_eq!(tsne(&data, params, 9), tsne(&data, params, 9));
    }

    #[test]
    fn test_joint_probabilities_sum_to_one() {
        let data: Vec<Vec<f32>> = (0..4).map(|i| vec![i as f32]).collect();
        let d = squared_distances(&data);
        let p = joint_probabilities(&d, 4, 1.5);
        let total: f64 = p.iter().sum();
        assert!((total - 1.0).abs() < 1e-3, "total {}", total);
    }
}
