//! Fruchterman-Reingold force-directed layout.
//!
//! Every pair of nodes repels with `k² / d`, every edge attracts with
//! `d² / k`, and each step is capped by a temperature that cools linearly
//! to zero. Initial positions come from the seed, so a given seed always
//! yields the same picture.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::graph::CooccurrenceGraph;

/// Side of the square the layout is computed in
const FRAME: f64 = 1000.0;
const MIN_DISTANCE: f64 = 0.01;

pub fn force_layout(graph: &CooccurrenceGraph, iterations: usize, seed: u64) -> Vec<[f64; 2]> {
    let n = graph.nodes.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![[0.0, 0.0]];
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let half = FRAME / 2.0;
    let mut pos: Vec<[f64; 2]> = (0..n)
        .map(|_| [rng.random_range(-half..half), rng.random_range(-half..half)])
        .collect();

    let k = (FRAME * FRAME / n as f64).sqrt();
    let start_temperature = FRAME / 10.0;
    let mut disp = vec![[0.0f64; 2]; n];

    for step in 0..iterations {
        let temperature = start_temperature * (1.0 - step as f64 / iterations as f64);
        for d in disp.iter_mut() {
            *d = [0.0, 0.0];
        }

        for i in 0..n {
            for j in (i + 1)..n {
                let delta = [pos[i][0] - pos[j][0], pos[i][1] - pos[j][1]];
                let dist = (delta[0] * delta[0] + delta[1] * delta[1])
                    .sqrt()
                    .max(MIN_DISTANCE);
                let force = k * k / dist;
                let push = [delta[0] / dist * force, delta[1] / dist * force];
                disp[i][0] += push[0];
                disp[i][1] += push[1];
                disp[j][0] -= push[0];
                disp[j][1] -= push[1];
            }
        }

        for &(a, b) in &graph.edges {
            let delta = [pos[a][0] - pos[b][0], pos[a][1] - pos[b][1]];
            let dist = (delta[0] * delta[0] + delta[1] * delta[1])
                .sqrt()
                .max(MIN_DISTANCE);
            let force = dist * dist / k;
            let pull = [delta[0] / dist * force, delta[1] / dist * force];
            disp[a][0] -= pull[0];
            disp[a][1] -= pull[1];
            disp[b][0] += pull[0];
            disp[b][1] += pull[1];
        }

        for (p, d) in pos.iter_mut().zip(&disp) {
            let len = (d[0] * d[0] + d[1] * d[1]).sqrt().max(MIN_DISTANCE);
            let step_len = len.min(temperature);
            p[0] = (p[0] + d[0] / len * step_len).clamp(-half, half);
            p[1] = (p[1] + d[1] / len * step_len).clamp(-half, half);
        }
    }

    pos
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::graph::{Node, NodeKind};

    fn node(kind: NodeKind, name: &str) -> Node {
        Node {
            kind,
            name: name.to_string(),
            label: name.to_string(),
        }
    }

    fn star() -> CooccurrenceGraph {
        CooccurrenceGraph {
            nodes: vec![
                node(NodeKind::Keyword, "k"),
                node(NodeKind::Title, "A"),
                node(NodeKind::Title, "B"),
                node(NodeKind::Title, "C"),
            ],
            edges: vec![(0, 1), (0, 2), (0, 3)],
        }
    }

    #[test]
    fn test_layout_is_seeded() {
        let graph = star();
        assert_eq!(force_layout(&graph, 50, 5), force_layout(&graph, 50, 5));
    }

    #[test]
    fn test_layout_stays_in_frame() {
        let positions = force_layout(&star(), 200, 1);
        assert_eq!(positions.len(), 4);
        for p in positions {
            assert!(p[0].abs() <= FRAME / 2.0 && p[1].abs() <= FRAME / 2.0);
        }
    }

    #[test]
    fn test_degenerate_graphs() {
        assert!(force_layout(&CooccurrenceGraph::default(), 10, 1).is_empty());
        let single = CooccurrenceGraph {
            nodes: vec![node(NodeKind::Keyword, "k")],
            edges: vec![],
        };
        assert_eq!(force_layout(&single, 10, 1), vec![[0.0, 0.0]]);
    }
}
