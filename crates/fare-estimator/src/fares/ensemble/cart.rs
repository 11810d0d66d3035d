use serde::{Deserialize, Serialize};

use super::tree::{Node, RegressionTree};

const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

/// Least-squares CART learner fitted to boosting gradients.
pub(crate) struct CartBuilder<'a> {
    rows: &'a [Vec<f64>],
    features: &'a [usize],
    config: TreeConfig,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl<'a> CartBuilder<'a> {
    pub(crate) fn new(rows: &'a [Vec<f64>], features: &'a [usize], config: TreeConfig) -> Self {
        Self {
            rows,
            features,
            config,
        }
    }

    /// `samples` index into `rows` and may repeat (bootstrap draws);
    /// `gradients` is indexed by row.
    pub(crate) fn fit(&self, samples: &[usize], gradients: &[f64]) -> RegressionTree {
        let mut nodes = Vec::new();
        self.grow(&mut nodes, samples.to_vec(), gradients, 0);
        RegressionTree::new(nodes)
    }

    fn grow(
        &self,
        nodes: &mut Vec<Node>,
        samples: Vec<usize>,
        gradients: &[f64],
        depth: usize,
    ) -> usize {
        let index = nodes.len();
        let value = mean(&samples, gradients);
        nodes.push(Node::Leaf { value });

        let min_leaf = self.config.min_samples_leaf.max(1);
        if depth >= self.config.max_depth || samples.len() < 2 * min_leaf {
            return index;
        }

        let Some(split) = self.best_split(&samples, gradients, min_leaf) else {
            return index;
        };

        let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .partition(|&&sample| self.value(sample, split.feature) <= split.threshold);
        if left_samples.is_empty() || right_samples.is_empty() {
            return index;
        }

        let left = self.grow(nodes, left_samples, gradients, depth + 1);
        let right = self.grow(nodes, right_samples, gradients, depth + 1);
        nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }

    fn best_split(
        &self,
        samples: &[usize],
        gradients: &[f64],
        min_leaf: usize,
    ) -> Option<SplitCandidate> {
        let count = samples.len();
        let total: f64 = samples.iter().map(|&sample| gradients[sample]).sum();
        let parent_score = total * total / count as f64;
        let mut best: Option<SplitCandidate> = None;

        for &feature in self.features {
            let mut pairs: Vec<(f64, f64)> = samples
                .iter()
                .map(|&sample| (self.value(sample, feature), gradients[sample]))
                .collect();
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_sum = 0.0;
            for position in 0..count - 1 {
                left_sum += pairs[position].1;
                let left_count = position + 1;
                let right_count = count - left_count;

                if pairs[position].0 == pairs[position + 1].0 {
                    continue;
                }
                if left_count < min_leaf || right_count < min_leaf {
                    continue;
                }

                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / left_count as f64
                    + right_sum * right_sum / right_count as f64
                    - parent_score;

                let improves = match &best {
                    Some(current) => gain > current.gain + MIN_GAIN,
                    None => gain > MIN_GAIN,
                };
                if improves {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: (pairs[position].0 + pairs[position + 1].0) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }

    fn value(&self, sample: usize, feature: usize) -> f64 {
        self.rows[sample].get(feature).copied().unwrap_or(0.0)
    }
}

fn mean(samples: &[usize], gradients: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|&sample| gradients[sample]).sum::<f64>() / samples.len() as f64
}
