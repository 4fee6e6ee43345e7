use service_core::error::AppError;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("malformed authorization credentials")]
    InvalidCredentialFormat,

    #[error("invalid or expired authentication token")]
    InvalidOrExpiredToken,

    #[error("authentication required")]
    Unauthenticated,

    #[error("account not activated")]
    InactiveAccount,

    #[error("permission denied")]
    PermissionDenied,

    #[error("edit conflict")]
    EditConflict,

    #[error("store unavailable")]
    StoreUnavailable,

    #[error("resource not found")]
    NotFound,

    #[error("invalid authentication credentials")]
    InvalidCredentials,

    #[error("validation failed: {0:?}")]
    Validation(BTreeMap<String, String>),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Single-field validation failure.
    pub fn invalid(field: &str, message: &str) -> Self {
        ServiceError::Validation(BTreeMap::from([(field.to_string(), message.to_string())]))
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServiceError::NotFound,
            StoreError::DuplicateEmail => {
                ServiceError::invalid("email", "a user with this email address already exists")
            }
            StoreError::MissingReference(field) => {
                ServiceError::invalid(field, "must reference an existing record")
            }
            StoreError::Unavailable(_) | StoreError::Timeout => ServiceError::StoreUnavailable,
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::RateLimited { retry_after_secs } => {
                AppError::TooManyRequests("rate limit exceeded".to_string(), retry_after_secs)
            }
            ServiceError::InvalidCredentialFormat | ServiceError::InvalidOrExpiredToken => {
                AppError::InvalidAuthenticationToken
            }
            ServiceError::Unauthenticated => AppError::Unauthorized(anyhow::anyhow!(
                "you must be authenticated to access this resource"
            )),
            ServiceError::InactiveAccount => AppError::Forbidden(anyhow::anyhow!(
                "your user account must be activated to access this resource"
            )),
            ServiceError::PermissionDenied => AppError::Forbidden(anyhow::anyhow!(
                "your user account doesn't have the necessary permissions to access this resource"
            )),
            ServiceError::EditConflict => AppError::Conflict(anyhow::anyhow!(
                "unable to update the record due to an edit conflict, please try again"
            )),
            ServiceError::StoreUnavailable => AppError::ServiceUnavailable(
                "the service is temporarily unavailable, please try again later".to_string(),
            ),
            ServiceError::NotFound => AppError::NotFound(anyhow::anyhow!(
                "the requested resource could not be found"
            )),
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("invalid authentication credentials"))
            }
            ServiceError::Validation(fields) => AppError::FailedValidation(fields),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
