use std::sync::{Arc, PoisonError, RwLock};

use super::artifact::ArtifactError;
use super::domain::PredictionError;
use super::features::{FeatureVector, SplitFeatures, ZoneEncoding};
use super::recompose::ResidualSplit;

/// Residual predictor abstraction so the service can be exercised without a
/// trained bundle.
pub trait FareModel: Send + Sync {
    fn version(&self) -> &str;
    fn zone_encoding(&self) -> &ZoneEncoding;
    /// Residual fare for the trip, already clipped at zero.
    fn predict_residual(&self, features: &FeatureVector) -> Result<f64, PredictionError>;
    /// Tip and variable-toll shares of this trip's predicted residual.
    fn residual_split(&self, features: &SplitFeatures) -> Result<ResidualSplit, PredictionError>;
}

/// Holds the published model. Loading happens outside the lock; publishing
/// swaps one `Arc`, so readers see either the old model or the new one.
pub struct ModelRegistry<M> {
    current: RwLock<Option<Arc<M>>>,
}

impl<M> ModelRegistry<M> {
    pub fn empty() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    pub fn with_model(model: M) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(model))),
        }
    }

    /// Publish a fully loaded model, returning the one it replaces.
    pub fn publish(&self, model: M) -> Option<Arc<M>> {
        let model = Arc::new(model);
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.replace(model)
    }

    pub fn current(&self) -> Result<Arc<M>, ModelUnavailableError> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ModelUnavailableError::NotLoaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<M> Default for ModelRegistry<M> {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelUnavailableError {
    #[error("no fare model has been loaded")]
    NotLoaded,
    #[error("fare model failed to load: {0}")]
    LoadFailed(#[from] ArtifactError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_reports_unavailable() {
        let registry: ModelRegistry<u32> = ModelRegistry::empty();
        assert!(!registry.is_loaded());
        assert!(matches!(
            registry.current(),
            Err(ModelUnavailableError::NotLoaded)
        ));
    }

    #[test]
    fn publish_swaps_the_shared_model() {
        let registry = ModelRegistry::with_model(1u32);
        let before = registry.current().expect("loaded");

        let previous = registry.publish(2);
        assert_eq!(previous.as_deref(), Some(&1));
        assert_eq!(*before, 1);
        assert_eq!(*registry.current().expect("loaded"), 2);
    }
}
