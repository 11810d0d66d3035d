use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cart::{CartBuilder, TreeConfig};
use super::tree::{RegressionTree, TreeError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoosterConfig {
    pub trees: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

impl Default for BoosterConfig {
    fn default() -> Self {
        Self {
            trees: 120,
            learning_rate: 0.1,
            max_depth: 5,
            min_samples_leaf: 10,
        }
    }
}

/// Squared-loss gradient boosting over CART regression trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    base_score: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedTrees {
    pub fn new(base_score: f64, learning_rate: f64, trees: Vec<RegressionTree>) -> Self {
        Self {
            base_score,
            learning_rate,
            trees,
        }
    }

    /// Fit on `samples` (row indices, repeats allowed), splitting only on
    /// `features`.
    pub fn fit(
        rows: &[Vec<f64>],
        targets: &[f64],
        samples: &[usize],
        features: &[usize],
        config: &BoosterConfig,
    ) -> Self {
        let base_score = if samples.is_empty() {
            0.0
        } else {
            samples.iter().map(|&sample| targets[sample]).sum::<f64>() / samples.len() as f64
        };

        let builder = CartBuilder::new(
            rows,
            features,
            TreeConfig {
                max_depth: config.max_depth,
                min_samples_leaf: config.min_samples_leaf,
            },
        );

        let mut predictions = vec![base_score; rows.len()];
        let mut gradients = vec![0.0; rows.len()];
        let mut trees = Vec::with_capacity(config.trees);

        for round in 0..config.trees {
            for (row, gradient) in gradients.iter_mut().enumerate() {
                *gradient = targets[row] - predictions[row];
            }

            let tree = builder.fit(samples, &gradients);
            for (row, prediction) in predictions.iter_mut().enumerate() {
                *prediction += config.learning_rate * tree.evaluate(&rows[row]);
            }

            if round % 20 == 0 {
                debug!(round, nodes = tree.nodes().len(), "fitted boosting round");
            }
            trees.push(tree);
        }

        Self {
            base_score,
            learning_rate: config.learning_rate,
            trees,
        }
    }

    pub fn predict(&self, features: &[f64]) -> f64 {
        self.base_score
            + self.learning_rate
                * self
                    .trees
                    .iter()
                    .map(|tree| tree.evaluate(features))
                    .sum::<f64>()
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn validate(&self, feature_count: usize) -> Result<(), TreeError> {
        if !self.base_score.is_finite() || !self.learning_rate.is_finite() {
            return Err(TreeError::NonFinite { node: 0 });
        }
        self.trees
            .iter()
            .try_for_each(|tree| tree.validate(feature_count))
    }
}
