use chrono::{DateTime, Utc};
use tracing::info;

use super::artifact::{ArtifactError, BundlePayload, ModelBundle};
use super::decomposition::{decompose_batch, DecompositionReport};
use super::domain::TripRecord;
use super::ensemble::{Dataset, Ensemble, EnsembleConfig, EnsembleError};
use super::features::{build_features, ZoneEncoding};
use super::rules::RuleEngine;
use super::split::SplitModel;

/// Result of an offline training run.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub bundle: ModelBundle,
    pub report: DecompositionReport,
    /// Root mean squared error of the clipped residual on the training rows.
    pub training_rmse: f64,
}

/// Decompose the history, fit the encoding, the residual ensemble and the
/// tip and toll models, and package them into a bundle.
pub fn train_bundle(
    records: &[TripRecord],
    rules: &RuleEngine,
    config: &EnsembleConfig,
    trained_at: DateTime<Utc>,
) -> Result<TrainingOutcome, TrainingError> {
    config.validate()?;

    let (targets, report) = decompose_batch(records, rules);
    if targets.is_empty() {
        return Err(TrainingError::EmptyTrainingSet {
            excluded: report.excluded_total(),
        });
    }

    let zone_encoding = ZoneEncoding::fit(targets.iter().map(|target| &target.trip));
    let rows: Vec<Vec<f64>> = targets
        .iter()
        .map(|target| {
            build_features(&target.trip, &zone_encoding, rules)
                .as_slice()
                .to_vec()
        })
        .collect();
    let residuals: Vec<f64> = targets.iter().map(|target| target.residual).collect();

    let dataset = Dataset::new(rows, residuals)?;
    let ensemble = Ensemble::train(&dataset, config)?;
    let training_rmse = rmse(&ensemble, &dataset)?;

    info!(
        rows = dataset.len(),
        members = ensemble.members().len(),
        training_rmse,
        "trained fare ensemble"
    );

    let split_model = SplitModel::fit(&targets, rules, config)?;

    let bundle = ModelBundle::new(
        BundlePayload {
            schedule: rules.schedule().clone(),
            zone_encoding,
            ensemble,
            split_model,
        },
        trained_at,
        dataset.len(),
    )?;

    Ok(TrainingOutcome {
        bundle,
        report,
        training_rmse,
    })
}

fn rmse(ensemble: &Ensemble, dataset: &Dataset) -> Result<f64, TrainingError> {
    let mut squared = 0.0;
    for (row, target) in dataset.rows().iter().zip(dataset.targets()) {
        let prediction = ensemble
            .predict(row)
            .map_err(|err| TrainingError::InvalidDataset(err.to_string()))?;
        squared += (prediction - target).powi(2);
    }
    Ok((squared / dataset.len() as f64).sqrt())
}

#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("no usable training records ({excluded} excluded)")]
    EmptyTrainingSet { excluded: usize },
    #[error("invalid training dataset: {0}")]
    InvalidDataset(String),
    #[error("invalid ensemble configuration: {0}")]
    InvalidEnsemble(#[from] EnsembleError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}
