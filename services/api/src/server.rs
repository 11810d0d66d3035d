use crate::cli::ServeArgs;
use crate::infra::{load_service, AppState};
use crate::routes::with_fare_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use fare_estimator::config::AppConfig;
use fare_estimator::error::AppError;
use fare_estimator::fares::RuleEngine;
use fare_estimator::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(model) = args.model.take() {
        config.model.bundle_path = model;
    }

    telemetry::init(&config.telemetry)?;

    // A missing or corrupt bundle stops startup.
    let service = load_service(&config.model.bundle_path, RuleEngine::default())?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        service: service.clone(),
        bundle_path: config.model.bundle_path.clone(),
    };

    let app = with_fare_routes(service.clone())
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        model_version = service.model_version().as_deref().unwrap_or("none"),
        "fare estimator ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
