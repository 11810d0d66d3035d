use fare_estimator::error::AppError;
use fare_estimator::fares::{
    FareEstimationService, ModelBundle, ModelRegistry, ModelUnavailableError, RuleEngine,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) type BundleService = FareEstimationService<ModelBundle>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) service: Arc<BundleService>,
    pub(crate) bundle_path: PathBuf,
}

/// Load and verify the bundle at `path`, then wrap it in a service. Any
/// failure is fatal for the caller.
pub(crate) fn load_service(path: &Path, rules: RuleEngine) -> Result<Arc<BundleService>, AppError> {
    let bundle = ModelBundle::load(path)
        .and_then(|bundle| bundle.ensure_schedule(rules.schedule()).map(|_| bundle))
        .map_err(ModelUnavailableError::LoadFailed)?;

    Ok(Arc::new(FareEstimationService::new(
        rules,
        Arc::new(ModelRegistry::with_model(bundle)),
    )))
}
