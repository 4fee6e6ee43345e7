use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use service_core::error::AppError;
use tracing::{info, instrument, warn};

use crate::auth::TokenCodec;
use crate::dtos::{ActivationTokenRequest, AuthenticationTokenRequest};
use crate::models::user::normalize_email;
use crate::models::TokenScope;
use crate::services::{deliver_in_background, ServiceError};
use crate::startup::AppState;
use crate::utils::{password_matches, Password, ValidatedJson};

/// Issue a fresh activation token for an account that is not yet activated.
#[instrument(skip(state, req))]
pub async fn create_activation_token(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ActivationTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store
        .user_by_email(&normalize_email(&req.email))
        .await
        .map_err(ServiceError::from)?
        .ok_or_else(|| ServiceError::invalid("email", "no matching email address found"))?;

    if user.activated {
        return Err(ServiceError::invalid("email", "user has already been activated").into());
    }

    let (issued, record) = TokenCodec::issue(user.id, state.config.token_ttl, TokenScope::Activation);
    state
        .store
        .insert_token(&record)
        .await
        .map_err(ServiceError::from)?;

    deliver_in_background(
        state.mailer.clone(),
        user.email.clone(),
        "token_activation",
        json!({ "activation_token": issued.plaintext }),
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "an email will be sent to you containing activation instructions"
        })),
    ))
}

/// Exchange email and password for an authentication token.
#[instrument(skip(state, req))]
pub async fn create_authentication_token(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<AuthenticationTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let Some(user) = state
        .store
        .user_by_email(&normalize_email(&req.email))
        .await
        .map_err(ServiceError::from)?
    else {
        warn!("Authentication attempt for unknown email");
        return Err(ServiceError::InvalidCredentials.into());
    };

    let matches = password_matches(&Password::new(req.password), &user.password_hash)
        .map_err(ServiceError::from)?;
    if !matches {
        warn!(user_id = user.id, "Authentication attempt with wrong password");
        return Err(ServiceError::InvalidCredentials.into());
    }

    let (issued, record) =
        TokenCodec::issue(user.id, state.config.token_ttl, TokenScope::Authentication);
    state
        .store
        .insert_token(&record)
        .await
        .map_err(ServiceError::from)?;

    info!(user_id = user.id, "Authentication token issued");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "authentication_token": issued })),
    ))
}
