//! Per-trip division of the predicted residual into tip, variable tolls and
//! metered fare.
//!
//! Tips and tolls beyond the fixed crossings are zero on many trips and
//! roughly proportional to the residual on the rest, so each is a hurdle
//! model: a gate ensemble fitted on whether the item was present, and a share
//! ensemble fitted on the item's share of the residual where it was.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::decomposition::ResidualTarget;
use super::domain::PredictionError;
use super::ensemble::{Dataset, Ensemble, EnsembleConfig, EnsembleError};
use super::features::{build_split_features, SplitFeatures, SPLIT_FEATURE_COUNT};
use super::recompose::ResidualSplit;
use super::rules::RuleEngine;
use super::training::TrainingError;

const GATE_THRESHOLD: f64 = 0.5;
const PRESENT_EPSILON: f64 = 1e-9;

const TIP_SEED_OFFSET: u64 = 0x7469_7073;
const TOLL_SEED_OFFSET: u64 = 0x746f_6c6c;
const SHARE_SEED_OFFSET: u64 = 0x5348;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShareModel {
    /// Never seen in training; always predicts a zero share.
    Absent,
    Hurdle { gate: Ensemble, share: Ensemble },
}

impl ShareModel {
    /// Fit on split feature rows and the observed share of each row's
    /// residual.
    pub fn fit(
        rows: &[Vec<f64>],
        shares: &[f64],
        config: &EnsembleConfig,
    ) -> Result<Self, TrainingError> {
        let present: Vec<usize> = shares
            .iter()
            .enumerate()
            .filter(|(_, share)| **share > PRESENT_EPSILON)
            .map(|(index, _)| index)
            .collect();
        if present.is_empty() {
            return Ok(Self::Absent);
        }

        let gate_targets = shares
            .iter()
            .map(|share| if *share > PRESENT_EPSILON { 1.0 } else { 0.0 })
            .collect();
        let gate = Ensemble::train(&Dataset::new(rows.to_vec(), gate_targets)?, config)?;

        let share_rows = present.iter().map(|&index| rows[index].clone()).collect();
        let share_targets = present.iter().map(|&index| shares[index]).collect();
        let share = Ensemble::train(
            &Dataset::new(share_rows, share_targets)?,
            &reseeded(config, SHARE_SEED_OFFSET),
        )?;

        Ok(Self::Hurdle { gate, share })
    }

    /// Share of the residual in `[0, 1]`.
    pub fn predict(&self, features: &[f64]) -> Result<f64, PredictionError> {
        match self {
            ShareModel::Absent => Ok(0.0),
            ShareModel::Hurdle { gate, share } => {
                if gate.predict(features)? < GATE_THRESHOLD {
                    return Ok(0.0);
                }
                Ok(share.predict(features)?.min(1.0))
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ShareModel::Absent => "absent",
            ShareModel::Hurdle { .. } => "hurdle",
        }
    }

    fn validate(&self) -> Result<(), EnsembleError> {
        let ShareModel::Hurdle { gate, share } = self else {
            return Ok(());
        };
        for ensemble in [gate, share] {
            if ensemble.feature_count() != SPLIT_FEATURE_COUNT {
                return Err(EnsembleError::InvalidParameter("split feature count"));
            }
            ensemble.validate()?;
        }
        Ok(())
    }
}

/// Tip and variable-toll models persisted next to the residual ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitModel {
    pub tip: ShareModel,
    pub tolls: ShareModel,
}

impl Default for SplitModel {
    fn default() -> Self {
        Self {
            tip: ShareModel::Absent,
            tolls: ShareModel::Absent,
        }
    }
}

impl SplitModel {
    pub fn fit(
        targets: &[ResidualTarget],
        rules: &RuleEngine,
        config: &EnsembleConfig,
    ) -> Result<Self, TrainingError> {
        let rows: Vec<Vec<f64>> = targets
            .iter()
            .map(|target| {
                build_split_features(&target.trip, rules, target.residual)
                    .as_slice()
                    .to_vec()
            })
            .collect();

        let tip_shares: Vec<f64> = targets
            .iter()
            .map(|target| share_of(target.tip, target.residual))
            .collect();
        let toll_shares: Vec<f64> = targets
            .iter()
            .map(|target| share_of(target.variable_tolls, target.residual))
            .collect();

        let model = Self {
            tip: ShareModel::fit(&rows, &tip_shares, &reseeded(config, TIP_SEED_OFFSET))?,
            tolls: ShareModel::fit(&rows, &toll_shares, &reseeded(config, TOLL_SEED_OFFSET))?,
        };
        info!(
            tip_model = model.tip.kind(),
            toll_model = model.tolls.kind(),
            "trained residual split models"
        );
        Ok(model)
    }

    /// Shares for one trip; scaled down together if they exceed the residual.
    pub fn predict(&self, features: &SplitFeatures) -> Result<ResidualSplit, PredictionError> {
        let mut tip_share = self.tip.predict(features.as_slice())?;
        let mut toll_share = self.tolls.predict(features.as_slice())?;

        let combined = tip_share + toll_share;
        if combined > 1.0 {
            tip_share /= combined;
            toll_share /= combined;
        }

        Ok(ResidualSplit {
            tip_share,
            toll_share,
        })
    }

    pub fn validate(&self) -> Result<(), EnsembleError> {
        self.tip.validate()?;
        self.tolls.validate()
    }
}

fn share_of(part: f64, residual: f64) -> f64 {
    if residual > 0.0 {
        (part.min(residual) / residual).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn reseeded(config: &EnsembleConfig, offset: u64) -> EnsembleConfig {
    EnsembleConfig {
        seed: config.seed.wrapping_add(offset),
        ..config.clone()
    }
}
