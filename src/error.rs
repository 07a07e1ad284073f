use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;

use crate::incidents::IncidentError;
use crate::ingest::{CsvError, SyncError};
use crate::month::MonthError;
use crate::presence::{PresenceError, TransitionError};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden")
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "resource not found")
    }

    pub fn internal<E: Display>(error: E) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        }
        let status = self.status;
        let body = Json(ErrorResponse {
            ok: false,
            error: self.message,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    ok: bool,
    error: String,
}

impl From<diesel::result::Error> for AppError {
    fn from(value: diesel::result::Error) -> Self {
        match value {
            diesel::result::Error::NotFound => AppError::not_found(),
            _ => AppError::internal(value),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<MonthError> for AppError {
    fn from(value: MonthError) -> Self {
        AppError::bad_request(value.to_string())
    }
}

impl From<CsvError> for AppError {
    fn from(value: CsvError) -> Self {
        AppError::bad_request(value.to_string())
    }
}

impl From<TransitionError> for AppError {
    fn from(value: TransitionError) -> Self {
        AppError::bad_request(value.to_string())
    }
}

impl From<SyncError> for AppError {
    fn from(value: SyncError) -> Self {
        match value {
            SyncError::Csv(err) => err.into(),
            SyncError::Database(err) => err.into(),
        }
    }
}

impl From<PresenceError> for AppError {
    fn from(value: PresenceError) -> Self {
        match value {
            PresenceError::Transition(err) => err.into(),
            PresenceError::Incident(err) => err.into(),
            PresenceError::Database(err) => err.into(),
        }
    }
}

impl From<IncidentError> for AppError {
    fn from(value: IncidentError) -> Self {
        match value {
            IncidentError::Database(err) => err.into(),
            IncidentError::UnknownStatus(_) => AppError::internal(value),
            other => AppError::bad_request(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn error_body_carries_ok_false() {
        let response = AppError::forbidden().into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"], "forbidden");
    }

    #[test]
    fn diesel_not_found_maps_to_404() {
        let err = AppError::from(diesel::result::Error::NotFound);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn closed_incidents_are_client_errors() {
        use crate::incidents::IncidentStatus;
        let err = AppError::from(IncidentError::NotPending(IncidentStatus::Cancelled));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "incident is already cancelled");
    }

    #[test]
    fn missing_rows_inside_presence_errors_stay_404() {
        let err = AppError::from(PresenceError::Database(diesel::result::Error::NotFound));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn month_errors_are_client_errors() {
        let err = AppError::from(MonthError::Format("2024-13".into()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.message().contains("YYYY-MM-01"));
    }
}
