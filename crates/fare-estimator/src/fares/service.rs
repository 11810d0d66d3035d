use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use super::artifact::ModelBundle;
use super::domain::{FareBreakdown, PredictionError, TripInput, TripRequest, ValidationError};
use super::features::{build_features, build_split_features};
use super::model::{FareModel, ModelRegistry, ModelUnavailableError};
use super::recompose::recompose;
use super::rules::RuleEngine;

/// Successful `/predict` payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FareEstimate {
    pub total_amount: f64,
    pub breakdown: FareBreakdown,
}

/// Service composing the rule engine with whichever model is published.
pub struct FareEstimationService<M> {
    rules: Arc<RuleEngine>,
    models: Arc<ModelRegistry<M>>,
}

impl<M> FareEstimationService<M>
where
    M: FareModel + 'static,
{
    pub fn new(rules: RuleEngine, models: Arc<ModelRegistry<M>>) -> Self {
        Self {
            rules: Arc::new(rules),
            models,
        }
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn models(&self) -> &Arc<ModelRegistry<M>> {
        &self.models
    }

    pub fn model_version(&self) -> Option<String> {
        self.models
            .current()
            .ok()
            .map(|model| model.version().to_string())
    }

    /// Validate a raw request, then estimate. Invalid requests never reach
    /// the model.
    pub fn estimate(&self, request: &TripRequest) -> Result<FareEstimate, EstimationError> {
        let trip = TripInput::from_request(request)?;
        self.estimate_trip(&trip)
    }

    pub fn estimate_trip(&self, trip: &TripInput) -> Result<FareEstimate, EstimationError> {
        let model = self.models.current()?;

        let deterministic = self.rules.compute_deterministic(trip);
        let features = build_features(trip, model.zone_encoding(), &self.rules);

        let residual = model.predict_residual(&features).map_err(|err| {
            error!(error = %err, model_version = model.version(), "residual prediction failed");
            EstimationError::Prediction(err)
        })?;

        let split_features = build_split_features(trip, &self.rules, residual);
        let split = model.residual_split(&split_features).map_err(|err| {
            error!(error = %err, model_version = model.version(), "residual split failed");
            EstimationError::Prediction(err)
        })?;

        let breakdown = recompose(&deterministic, residual, split).map_err(|err| {
            error!(error = %err, residual, "fare recomposition failed");
            EstimationError::Prediction(err)
        })?;

        Ok(FareEstimate {
            total_amount: breakdown.total,
            breakdown,
        })
    }
}

impl FareEstimationService<ModelBundle> {
    /// Load and verify a bundle, then publish it. The current model keeps
    /// serving if anything fails.
    pub fn reload_from(&self, path: &Path) -> Result<String, ModelUnavailableError> {
        let bundle = ModelBundle::load(path)
            .and_then(|bundle| bundle.ensure_schedule(self.rules.schedule()).map(|_| bundle))
            .map_err(|err| {
                warn!(path = %path.display(), error = %err, "model reload rejected");
                ModelUnavailableError::LoadFailed(err)
            })?;

        let version = bundle.version().to_string();
        let previous = self.models.publish(bundle);
        info!(
            model_version = %version,
            replaced = previous.as_deref().map(|model| model.version()).unwrap_or("none"),
            "published fare model"
        );
        Ok(version)
    }
}

/// Error raised by the estimation service.
#[derive(Debug, thiserror::Error)]
pub enum EstimationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    ModelUnavailable(#[from] ModelUnavailableError),
    #[error("prediction failed")]
    Prediction(#[source] PredictionError),
}
