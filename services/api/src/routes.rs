use crate::infra::{AppState, BundleService};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use fare_estimator::error::AppError;
use fare_estimator::fares::fare_router;
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
    pub(crate) models_loaded: bool,
    pub(crate) model_version: Option<String>,
}

pub(crate) fn with_fare_routes(service: Arc<BundleService>) -> axum::Router {
    fare_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/model/reload",
            axum::routing::post(reload_endpoint),
        )
}

pub(crate) async fn healthcheck(Extension(state): Extension<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        models_loaded: state.service.models().is_loaded(),
        model_version: state.service.model_version(),
    })
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Acquire) && state.service.models().is_loaded();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Re-read the configured bundle; the running model keeps serving on failure.
pub(crate) async fn reload_endpoint(
    Extension(state): Extension<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let path = state.bundle_path.clone();
    let service = state.service.clone();
    let version = tokio::task::spawn_blocking(move || service.reload_from(&path))
        .await
        .map_err(|err| AppError::Io(std::io::Error::other(err)))??;

    Ok(Json(json!({ "model_version": version })))
}
