use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Failed validation: {0:?}")]
    FailedValidation(BTreeMap<String, String>),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Invalid or missing authentication token")]
    InvalidAuthenticationToken,

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Too many requests: {0}")]
    TooManyRequests(String, Option<u64>),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Service Unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::FailedValidation(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) | AppError::InvalidAuthenticationToken => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TooManyRequests(..) => StatusCode::TOO_MANY_REQUESTS,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalError(_) | AppError::DatabaseError(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        #[serde(untagged)]
        enum ErrorBody {
            Message(String),
            Fields(BTreeMap<String, String>),
        }

        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        let status = self.status();
        let mut retry_after = None;
        let mut challenge = false;

        let error = match self {
            AppError::ValidationError(err) => ErrorBody::Fields(
                err.field_errors()
                    .into_iter()
                    .map(|(field, errors)| {
                        let message = errors
                            .first()
                            .and_then(|e| e.message.as_ref())
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| "is invalid".to_string());
                        (field.to_string(), message)
                    })
                    .collect(),
            ),
            AppError::FailedValidation(fields) => ErrorBody::Fields(fields),
            AppError::BadRequest(err) => ErrorBody::Message(err.to_string()),
            AppError::NotFound(err) => ErrorBody::Message(err.to_string()),
            AppError::Unauthorized(err) => ErrorBody::Message(err.to_string()),
            AppError::InvalidAuthenticationToken => {
                challenge = true;
                ErrorBody::Message("invalid or missing authentication token".to_string())
            }
            AppError::Forbidden(err) => ErrorBody::Message(err.to_string()),
            AppError::Conflict(err) => ErrorBody::Message(err.to_string()),
            AppError::TooManyRequests(msg, retry) => {
                retry_after = retry;
                ErrorBody::Message(msg)
            }
            AppError::ServiceUnavailable(msg) => ErrorBody::Message(msg),
            AppError::InternalError(err) => {
                tracing::error!(error = %format!("{:#}", err), "Internal server error");
                ErrorBody::Message("the server could not process your request".to_string())
            }
            AppError::DatabaseError(err) => {
                tracing::error!(error = %err, "Database error");
                ErrorBody::Message("the server could not process your request".to_string())
            }
            AppError::ConfigError(err) => {
                tracing::error!(error = %err, "Configuration error");
                ErrorBody::Message("the server could not process your request".to_string())
            }
        };

        let mut res = (status, Json(ErrorResponse { error })).into_response();

        if let Some(retry) = retry_after {
            res.headers_mut().insert(header::RETRY_AFTER, retry.into());
        }

        if challenge {
            res.headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        res
    }
}
