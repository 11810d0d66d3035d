//! Residual fare ensemble: several gradient-boosted tree models, each fitted
//! on its own bootstrap sample and feature subset, combined by a fixed rule.

mod booster;
mod cart;
mod tree;

pub use booster::{BoosterConfig, GradientBoostedTrees};
pub use cart::TreeConfig;
pub use tree::{Node, RegressionTree, TreeError};

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::PredictionError;
use super::training::TrainingError;

/// How member predictions are folded into one residual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum CombinationRule {
    Mean,
    WeightedMean { weights: Vec<f64> },
}

impl CombinationRule {
    fn validate(&self, members: usize) -> Result<(), EnsembleError> {
        if members == 0 {
            return Err(EnsembleError::NoMembers);
        }
        if let CombinationRule::WeightedMean { weights } = self {
            if weights.len() != members {
                return Err(EnsembleError::WeightCount {
                    expected: members,
                    found: weights.len(),
                });
            }
            if let Some((index, weight)) = weights
                .iter()
                .enumerate()
                .find(|(_, weight)| !weight.is_finite() || **weight <= 0.0)
            {
                return Err(EnsembleError::InvalidWeight {
                    index,
                    weight: *weight,
                });
            }
        }
        Ok(())
    }

    /// Per-member weights normalized to sum to one.
    fn normalized(&self, members: usize) -> Vec<f64> {
        match self {
            CombinationRule::Mean => vec![1.0 / members as f64; members],
            CombinationRule::WeightedMean { weights } => {
                let total: f64 = weights.iter().sum();
                weights.iter().map(|weight| weight / total).collect()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleConfig {
    pub members: usize,
    pub combination: CombinationRule,
    pub booster: BoosterConfig,
    pub bootstrap: bool,
    pub feature_fraction: f64,
    pub seed: u64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            members: 5,
            combination: CombinationRule::Mean,
            booster: BoosterConfig::default(),
            bootstrap: true,
            feature_fraction: 0.8,
            seed: 42,
        }
    }
}

impl EnsembleConfig {
    pub fn validate(&self) -> Result<(), EnsembleError> {
        self.combination.validate(self.members)?;
        if !(self.feature_fraction > 0.0 && self.feature_fraction <= 1.0) {
            return Err(EnsembleError::InvalidParameter("feature_fraction"));
        }
        if !(self.booster.learning_rate.is_finite() && self.booster.learning_rate > 0.0) {
            return Err(EnsembleError::InvalidParameter("learning_rate"));
        }
        if self.booster.trees == 0 {
            return Err(EnsembleError::InvalidParameter("trees"));
        }
        Ok(())
    }
}

/// Rows and residual targets handed to the trainer.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    rows: Vec<Vec<f64>>,
    targets: Vec<f64>,
    feature_count: usize,
}

impl Dataset {
    pub fn new(rows: Vec<Vec<f64>>, targets: Vec<f64>) -> Result<Self, TrainingError> {
        if rows.len() != targets.len() {
            return Err(TrainingError::InvalidDataset(format!(
                "{} rows but {} targets",
                rows.len(),
                targets.len()
            )));
        }
        let Some(first) = rows.first() else {
            return Err(TrainingError::InvalidDataset("no rows".to_string()));
        };
        let feature_count = first.len();
        if rows.iter().any(|row| row.len() != feature_count) {
            return Err(TrainingError::InvalidDataset(
                "rows have differing feature counts".to_string(),
            ));
        }
        if rows.iter().flatten().chain(&targets).any(|v| !v.is_finite()) {
            return Err(TrainingError::InvalidDataset(
                "non-finite feature or target".to_string(),
            ));
        }

        Ok(Self {
            rows,
            targets,
            feature_count,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleMember {
    pub features: Vec<usize>,
    pub model: GradientBoostedTrees,
}

/// Immutable once trained; shared read-only across requests.
///
/// Inputs far outside the training distribution (an unseen zone, a
/// 300 mile trip) are not rejected: trees route them to their boundary
/// leaves, so the estimate stays finite but carries no accuracy guarantee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ensemble {
    feature_count: usize,
    combination: CombinationRule,
    members: Vec<EnsembleMember>,
}

impl Ensemble {
    pub fn from_members(
        feature_count: usize,
        combination: CombinationRule,
        members: Vec<EnsembleMember>,
    ) -> Result<Self, EnsembleError> {
        let ensemble = Self {
            feature_count,
            combination,
            members,
        };
        ensemble.validate()?;
        Ok(ensemble)
    }

    pub fn train(dataset: &Dataset, config: &EnsembleConfig) -> Result<Self, TrainingError> {
        config.validate()?;

        let mut members = Vec::with_capacity(config.members);
        for index in 0..config.members {
            let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(index as u64));
            let samples = draw_samples(&mut rng, dataset.len(), config.bootstrap);
            let features =
                draw_features(&mut rng, dataset.feature_count(), config.feature_fraction);

            let model = GradientBoostedTrees::fit(
                dataset.rows(),
                dataset.targets(),
                &samples,
                &features,
                &config.booster,
            );
            info!(
                member = index,
                trees = model.tree_count(),
                features = features.len(),
                "trained ensemble member"
            );
            members.push(EnsembleMember { features, model });
        }

        Ok(Self::from_members(
            dataset.feature_count(),
            config.combination.clone(),
            members,
        )?)
    }

    pub fn validate(&self) -> Result<(), EnsembleError> {
        self.combination.validate(self.members.len())?;
        for (index, member) in self.members.iter().enumerate() {
            if member
                .features
                .iter()
                .any(|feature| *feature >= self.feature_count)
            {
                return Err(EnsembleError::InvalidParameter("member feature subset"));
            }
            member
                .model
                .validate(self.feature_count)
                .map_err(|source| EnsembleError::Tree {
                    member: index,
                    source,
                })?;
        }
        Ok(())
    }

    pub fn members(&self) -> &[EnsembleMember] {
        &self.members
    }

    pub fn combination(&self) -> &CombinationRule {
        &self.combination
    }

    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    /// Combined member output before clipping; may be negative.
    pub fn predict_raw(&self, features: &[f64]) -> Result<f64, PredictionError> {
        if features.len() != self.feature_count {
            return Err(PredictionError::FeatureMismatch {
                expected: self.feature_count,
                found: features.len(),
            });
        }

        let weights = self.combination.normalized(self.members.len());
        let value: f64 = self
            .members
            .iter()
            .zip(weights)
            .map(|(member, weight)| weight * member.model.predict(features))
            .sum();

        if value.is_finite() {
            Ok(value)
        } else {
            Err(PredictionError::NonFiniteOutput { value })
        }
    }

    /// Residual prediction clipped at zero.
    pub fn predict(&self, features: &[f64]) -> Result<f64, PredictionError> {
        self.predict_raw(features).map(|value| value.max(0.0))
    }
}

fn draw_samples<R: Rng>(rng: &mut R, rows: usize, bootstrap: bool) -> Vec<usize> {
    if !bootstrap || rows == 0 {
        return (0..rows).collect();
    }
    (0..rows).map(|_| rng.random_range(0..rows)).collect()
}

/// Feature subset without replacement, returned sorted.
fn draw_features<R: Rng>(rng: &mut R, feature_count: usize, fraction: f64) -> Vec<usize> {
    let keep = ((feature_count as f64 * fraction).ceil() as usize).clamp(1, feature_count.max(1));
    let mut features = index::sample(rng, feature_count, keep.min(feature_count)).into_vec();
    features.sort_unstable();
    features
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnsembleError {
    #[error("ensemble needs at least one member")]
    NoMembers,
    #[error("expected {expected} weights, found {found}")]
    WeightCount { expected: usize, found: usize },
    #[error("weight {index} must be positive and finite (found {weight})")]
    InvalidWeight { index: usize, weight: f64 },
    #[error("invalid ensemble parameter: {0}")]
    InvalidParameter(&'static str),
    #[error("member {member} has an invalid tree: {source}")]
    Tree {
        member: usize,
        #[source]
        source: TreeError,
    },
}
