use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::leads::{FlagStoreError, RelayError};
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
    Relay(RelayError),
    FlagStore(FlagStoreError),
    UnknownForm(String),
    InvalidInput(String),
    SubmissionFailed(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Relay(err) => write!(f, "relay error: {}", err),
            AppError::FlagStore(err) => write!(f, "flag store error: {}", err),
            AppError::UnknownForm(form) => write!(f, "unknown form '{}'", form),
            AppError::InvalidInput(message) => write!(f, "invalid input: {}", message),
            AppError::SubmissionFailed(reason) => write!(f, "submission failed: {}", reason),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Relay(err) => Some(err),
            AppError::FlagStore(err) => Some(err),
            AppError::UnknownForm(_)
            | AppError::InvalidInput(_)
            | AppError::SubmissionFailed(_) => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::UnknownForm(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::SubmissionFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Relay(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::FlagStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
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

impl From<RelayError> for AppError {
    fn from(value: RelayError) -> Self {
        Self::Relay(value)
    }
}

impl From<FlagStoreError> for AppError {
    fn from(value: FlagStoreError) -> Self {
        Self::FlagStore(value)
    }
}
