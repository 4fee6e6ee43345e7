//! Request extractors that resolve and check the caller's identity.
//!
//! A handler states what it needs in its signature (`Permitted<EventsWrite>`)
//! and only runs once that requirement holds.
//! `authenticate_middleware` resolves the [`Identity`] up front and caches it
//! in the request extensions; the extractors reuse it.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use std::marker::PhantomData;

use crate::auth::{Authorizer, Identity};
use crate::models::{Capability, User};
use crate::services::ServiceError;
use crate::startup::AppState;

#[axum::async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(identity.clone());
        }

        let identity = resolve_identity(&parts.headers, state).await?;
        parts.extensions.insert(identity.clone());
        Ok(identity)
    }
}

async fn resolve_identity(headers: &HeaderMap, state: &AppState) -> Result<Identity, ServiceError> {
    let header = match headers.get(AUTHORIZATION) {
        None => None,
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| ServiceError::InvalidCredentialFormat)?,
        ),
    };

    state.authenticator.resolve(header).await
}

/// Resolve the caller once for every request. Malformed or unknown
/// credentials are rejected here, whatever the route.
pub async fn authenticate_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = resolve_identity(req.headers(), &state).await?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// An activated user holding capability `P`.
pub struct Permitted<P: Capability> {
    pub user: User,
    _capability: PhantomData<P>,
}

#[axum::async_trait]
impl<P: Capability> FromRequestParts<AppState> for Permitted<P> {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let identity = Identity::from_request_parts(parts, state).await?;
        Authorizer::require_activated(&identity)?;
        let user = state.authorizer.require_permission(&identity, P::CODE).await?;

        Ok(Permitted {
            user: user.clone(),
            _capability: PhantomData,
        })
    }
}
