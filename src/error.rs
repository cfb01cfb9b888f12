use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;
use thiserror::Error;

use crate::store::StoreError;

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
        Self::new(StatusCode::FORBIDDEN, "access denied")
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "resource not found")
    }

    pub fn internal<E: Display>(error: E) -> Self {
        tracing::error!(error = %error, "internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
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
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("{0} is not configured")]
    Configuration(String),
    #[error("vendor request failed: {0}")]
    Vendor(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("classification failed: {0}")]
    Oracle(String),
    #[error("access denied")]
    Permission,
    #[error("unauthorized")]
    Unauthorized,
    #[error("concurrent update conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type VerificationResult<T> = Result<T, VerificationError>;

impl From<VerificationError> for AppError {
    fn from(value: VerificationError) -> Self {
        match value {
            VerificationError::Configuration(what) => {
                tracing::error!(missing = %what, "verification service misconfigured");
                AppError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "verification service unavailable",
                )
            }
            VerificationError::Vendor(message) => {
                tracing::error!(error = %message, "vendor request failed");
                AppError::new(StatusCode::BAD_GATEWAY, "verification initialization failed")
            }
            VerificationError::NotFound(what) => {
                AppError::new(StatusCode::NOT_FOUND, format!("{what} not found"))
            }
            VerificationError::Validation(message) => AppError::bad_request(message),
            VerificationError::Oracle(message) => {
                tracing::error!(error = %message, "document classification failed");
                AppError::new(StatusCode::BAD_GATEWAY, "document classification failed")
            }
            VerificationError::Permission => AppError::forbidden(),
            VerificationError::Unauthorized => AppError::unauthorized(),
            VerificationError::Conflict(message) => AppError::internal(message),
            VerificationError::Store(err) => AppError::internal(err),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        AppError::internal(value)
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

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::bad_request(format!("invalid payload: {value}"))
    }
}
