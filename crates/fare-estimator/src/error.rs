use crate::config::ConfigError;
use crate::fares::{
    ArtifactError, EstimationError, HistoryError, ModelUnavailableError, TrainingError,
};
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Artifact(ArtifactError),
    Model(ModelUnavailableError),
    Training(TrainingError),
    History(HistoryError),
    Estimation(EstimationError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Artifact(err) => write!(f, "model bundle error: {}", err),
            AppError::Model(err) => write!(f, "model unavailable: {}", err),
            AppError::Training(err) => write!(f, "training error: {}", err),
            AppError::History(err) => write!(f, "trip history error: {}", err),
            AppError::Estimation(err) => write!(f, "estimation error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Artifact(err) => Some(err),
            AppError::Model(err) => Some(err),
            AppError::Training(err) => Some(err),
            AppError::History(err) => Some(err),
            AppError::Estimation(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Estimation(EstimationError::Validation(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Model(_) | AppError::Estimation(EstimationError::ModelUnavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Artifact(_)
            | AppError::Training(_)
            | AppError::History(_)
            | AppError::Estimation(EstimationError::Prediction(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ArtifactError> for AppError {
    fn from(value: ArtifactError) -> Self {
        Self::Artifact(value)
    }
}

impl From<ModelUnavailableError> for AppError {
    fn from(value: ModelUnavailableError) -> Self {
        Self::Model(value)
    }
}

impl From<TrainingError> for AppError {
    fn from(value: TrainingError) -> Self {
        Self::Training(value)
    }
}

impl From<HistoryError> for AppError {
    fn from(value: HistoryError) -> Self {
        Self::History(value)
    }
}

impl From<EstimationError> for AppError {
    fn from(value: EstimationError) -> Self {
        Self::Estimation(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fares::ValidationError;

    #[test]
    fn validation_failures_map_to_unprocessable() {
        let err = AppError::from(EstimationError::Validation(
            ValidationError::NegativeOrNonFinite {
                field: "trip_distance",
                found: -1.0,
            },
        ));
        assert_eq!(
            err.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn missing_model_maps_to_service_unavailable() {
        let err = AppError::from(ModelUnavailableError::NotLoaded);
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
