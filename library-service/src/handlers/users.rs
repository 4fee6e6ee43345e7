use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use service_core::error::AppError;
use tracing::{info, instrument};

use crate::auth::TokenCodec;
use crate::dtos::{ActivateUserRequest, RegisterUserRequest};
use crate::models::permission::DEFAULT_GRANTS;
use crate::models::user::normalize_email;
use crate::models::{NewUser, TokenScope};
use crate::services::{deliver_in_background, ServiceError};
use crate::startup::AppState;
use crate::utils::{hash_password, Password, ValidatedJson};

/// Register an unactivated account and mail it an activation token.
#[instrument(skip(state, req))]
pub async fn register_user(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let password_hash = hash_password(&Password::new(req.password)).map_err(ServiceError::from)?;

    let user = state
        .store
        .insert_user(NewUser {
            name: req.name,
            email: normalize_email(&req.email),
            password_hash,
        })
        .await
        .map_err(ServiceError::from)?;

    state
        .store
        .grant_permissions(user.id, DEFAULT_GRANTS)
        .await
        .map_err(ServiceError::from)?;

    let (issued, record) = TokenCodec::issue(user.id, state.config.token_ttl, TokenScope::Activation);
    state
        .store
        .insert_token(&record)
        .await
        .map_err(ServiceError::from)?;

    deliver_in_background(
        state.mailer.clone(),
        user.email.clone(),
        "user_welcome",
        json!({ "activation_token": issued.plaintext, "user_id": user.id }),
    );

    info!(user_id = user.id, "User registered");

    Ok((StatusCode::ACCEPTED, Json(json!({ "user": user }))))
}

/// Consume an activation token: make sure the owner holds the default
/// grants, mark them activated and drop all of their activation tokens.
#[instrument(skip(state, req))]
pub async fn activate_user(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ActivateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !TokenCodec::validate_format(&req.token) {
        return Err(ServiceError::invalid("token", "must be 22 bytes long").into());
    }

    let mut user = state
        .authenticator
        .user_for_token(TokenScope::Activation, &req.token)
        .await?
        .ok_or_else(|| ServiceError::invalid("token", "invalid or expired activation token"))?;

    // Idempotent; also covers a registration interrupted before its grant.
    state
        .store
        .grant_permissions(user.id, DEFAULT_GRANTS)
        .await
        .map_err(ServiceError::from)?;

    let expected_version = user.version;
    user.activated = true;

    user.version = state
        .guard
        .apply_versioned_update(
            "user",
            user.id,
            expected_version,
            state.store.update_user(&user, expected_version),
        )
        .await?;

    state
        .store
        .delete_tokens_for_user(user.id, TokenScope::Activation)
        .await
        .map_err(ServiceError::from)?;

    info!(user_id = user.id, "User activated");

    Ok(Json(json!({ "user": user })))
}
