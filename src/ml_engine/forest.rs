//! Bagged regression-tree ensemble (random forest regressor)
//!
//! Each tree is grown on a bootstrap resample of the training rows using
//! variance-reduction splits. Trees are independent, so they are fitted in
//! parallel on the rayon pool. Every tree seeds its own `StdRng` from the
//! forest seed plus its index, which keeps fits reproducible regardless of
//! thread scheduling.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;

/// Number of input features per row.
pub const NUM_FEATURES: usize = 5;

pub type FeatureVector = [f64; NUM_FEATURES];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FitError {
    #[error("no training rows")]
    Empty,
    #[error("{rows} rows but {targets} targets")]
    LengthMismatch { rows: usize, targets: usize },
    #[error("non-finite value in training row {index}")]
    NonFinite { index: usize },
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn fit(rows: &[FeatureVector], targets: &[f64], sample: Vec<usize>, params: &ForestParams) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(rows, targets, sample, 0, params);
        tree
    }

    /// Grow the subtree for `idx`, returning its node index.
    fn grow(
        &mut self,
        rows: &[FeatureVector],
        targets: &[f64],
        idx: Vec<usize>,
        depth: usize,
        params: &ForestParams,
    ) -> usize {
        let mean = idx.iter().map(|&i| targets[i]).sum::<f64>() / idx.len().max(1) as f64;
        let slot = self.nodes.len();
        self.nodes.push(Node::Leaf(mean));

        let min_leaf = params.min_samples_leaf.max(1);
        if depth >= params.max_depth || idx.len() < 2 * min_leaf {
            return slot;
        }
        let Some((feature, threshold)) = best_split(rows, targets, &idx, min_leaf) else {
            return slot;
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            idx.into_iter().partition(|&i| rows[i][feature] <= threshold);
        if left_idx.is_empty() || right_idx.is_empty() {
            return slot;
        }

        let left = self.grow(rows, targets, left_idx, depth + 1, params);
        let right = self.grow(rows, targets, right_idx, depth + 1, params);
        self.nodes[slot] = Node::Split { feature, threshold, left, right };
        slot
    }

    fn predict(&self, x: &FeatureVector) -> f64 {
        let mut i = 0;
        loop {
            match self.nodes[i] {
                Node::Leaf(value) => return value,
                Node::Split { feature, threshold, left, right } => {
                    i = if x[feature] <= threshold { left } else { right };
                }
            }
        }
    }
}

/// Split minimising the summed squared error of both children.
///
/// Returns `None` when no split improves on the parent.
fn best_split(
    rows: &[FeatureVector],
    targets: &[f64],
    idx: &[usize],
    min_leaf: usize,
) -> Option<(usize, f64)> {
    let n = idx.len();
    let total_sum: f64 = idx.iter().map(|&i| targets[i]).sum();
    let total_sq: f64 = idx.iter().map(|&i| targets[i] * targets[i]).sum();
    let parent_sse = total_sq - total_sum * total_sum / n as f64;

    let mut best: Option<(f64, usize, f64)> = None;
    let mut order = idx.to_vec();

    for feature in 0..NUM_FEATURES {
        order.sort_by(|&a, &b| rows[a][feature].total_cmp(&rows[b][feature]));

        let (mut left_sum, mut left_sq) = (0.0, 0.0);
        for k in 0..n - 1 {
            let y = targets[order[k]];
            left_sum += y;
            left_sq += y * y;

            let n_left = k + 1;
            let n_right = n - n_left;
            if n_left < min_leaf || n_right < min_leaf {
                continue;
            }
            let x_here = rows[order[k]][feature];
            let x_next = rows[order[k + 1]][feature];
            if x_next <= x_here {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / n_left as f64)
                + (right_sq - right_sum * right_sum / n_right as f64);
            if best.map_or(true, |(b, _, _)| sse < b) {
                best = Some((sse, feature, 0.5 * (x_here + x_next)));
            }
        }
    }

    best.filter(|(sse, _, _)| *sse < parent_sse - 1e-12)
        .map(|(_, feature, threshold)| (feature, threshold))
}

/// Fitted ensemble.
#[derive(Debug, Clone)]
pub struct RegressionForest {
    trees: Vec<RegressionTree>,
}

impl RegressionForest {
    pub fn fit(rows: &[FeatureVector], targets: &[f64], params: &ForestParams) -> Result<Self, FitError> {
        if rows.is_empty() {
            return Err(FitError::Empty);
        }
        if rows.len() != targets.len() {
            return Err(FitError::LengthMismatch { rows: rows.len(), targets: targets.len() });
        }
        if let Some(index) = rows
            .iter()
            .zip(targets)
            .position(|(row, y)| !y.is_finite() || row.iter().any(|v| !v.is_finite()))
        {
            return Err(FitError::NonFinite { index });
        }

        let n = rows.len();
        let trees = (0..params.n_trees.max(1))
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(t as u64));
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(rows, targets, sample, params)
            })
            .collect();

        Ok(Self { trees })
    }

    /// Ensemble mean prediction.
    pub fn predict(&self, x: &FeatureVector) -> f64 {
        self.trees.iter().map(|t| t.predict(x)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
