use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;

use super::domain::TripRequest;
use super::model::FareModel;
use super::service::{EstimationError, FareEstimationService};

/// Router exposing the prediction endpoints consumed by the UI.
pub fn fare_router<M>(service: Arc<FareEstimationService<M>>) -> Router
where
    M: FareModel + 'static,
{
    Router::new()
        .route("/predict", post(predict_handler::<M>))
        .route("/predict/simple", post(predict_simple_handler::<M>))
        .with_state(service)
}

pub(crate) async fn predict_handler<M>(
    State(service): State<Arc<FareEstimationService<M>>>,
    payload: Result<Json<TripRequest>, JsonRejection>,
) -> Response
where
    M: FareModel + 'static,
{
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return rejection_response(rejection),
    };

    match service.estimate(&request) {
        Ok(estimate) => (StatusCode::OK, Json(estimate)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn predict_simple_handler<M>(
    State(service): State<Arc<FareEstimationService<M>>>,
    payload: Result<Json<TripRequest>, JsonRejection>,
) -> Response
where
    M: FareModel + 'static,
{
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return rejection_response(rejection),
    };

    match service.estimate(&request) {
        Ok(estimate) => {
            let payload = json!({ "total_amount": estimate.total_amount });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

fn rejection_response(rejection: JsonRejection) -> Response {
    let payload = json!({ "detail": rejection.body_text() });
    (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
}

fn error_response(err: EstimationError) -> Response {
    let (status, detail) = match &err {
        EstimationError::Validation(validation) => {
            (StatusCode::UNPROCESSABLE_ENTITY, validation.to_string())
        }
        EstimationError::ModelUnavailable(unavailable) => {
            (StatusCode::SERVICE_UNAVAILABLE, unavailable.to_string())
        }
        EstimationError::Prediction(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "prediction failed".to_string(),
        ),
    };

    (status, Json(json!({ "detail": detail }))).into_response()
}
