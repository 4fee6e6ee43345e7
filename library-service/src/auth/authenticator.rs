//! Bearer token resolution.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use super::identity::Identity;
use super::token::TokenCodec;
use crate::models::{TokenScope, User};
use crate::services::metrics::AUTH_OUTCOMES_TOTAL;
use crate::services::ServiceError;
use crate::store::{with_deadline, Store};

/// Turns an `Authorization` header value into an [`Identity`].
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn Store>,
    deadline: Duration,
}

fn record(outcome: &str) {
    AUTH_OUTCOMES_TOTAL.with_label_values(&[outcome]).inc();
}

impl Authenticator {
    pub fn new(store: Arc<dyn Store>, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    /// A missing header yields the anonymous identity. Anything else must be
    /// exactly `Bearer <token>` with a well-formed token that maps to an
    /// unexpired authentication token.
    pub async fn resolve(&self, header: Option<&str>) -> Result<Identity, ServiceError> {
        let header = match header {
            None | Some("") => {
                record("anonymous");
                return Ok(Identity::Anonymous);
            }
            Some(header) => header,
        };

        let token = match header.split(' ').collect::<Vec<_>>().as_slice() {
            ["Bearer", token] => *token,
            _ => {
                debug!("Malformed authorization header");
                record("invalid_format");
                return Err(ServiceError::InvalidCredentialFormat);
            }
        };

        if !TokenCodec::validate_format(token) {
            debug!("Bearer token has the wrong shape");
            record("invalid_format");
            return Err(ServiceError::InvalidCredentialFormat);
        }

        match self.user_for_token(TokenScope::Authentication, token).await {
            Ok(Some(user)) => {
                record("authenticated");
                Ok(Identity::User(user))
            }
            Ok(None) => {
                debug!("Bearer token not found or expired");
                record("invalid_token");
                Err(ServiceError::InvalidOrExpiredToken)
            }
            Err(err) => {
                record("store_unavailable");
                Err(err)
            }
        }
    }

    /// Owner of an unexpired token with the given scope. The plaintext is
    /// hashed before it reaches the store.
    pub async fn user_for_token(
        &self,
        scope: TokenScope,
        plaintext: &str,
    ) -> Result<Option<User>, ServiceError> {
        let hash = TokenCodec::hash(plaintext);

        with_deadline(
            self.deadline,
            self.store.user_by_token_hash(&hash, scope, Utc::now()),
        )
        .await
        .map_err(|err| {
            error!(error = %err, %scope, "Token lookup failed");
            ServiceError::StoreUnavailable
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;
    use crate::store::{CredentialStore, MemoryStore};

    async fn setup() -> (Arc<MemoryStore>, Authenticator) {
        let store = Arc::new(MemoryStore::new());
        let authenticator = Authenticator::new(store.clone(), Duration::from_secs(3));
        (store, authenticator)
    }

    async fn user_with_token(store: &MemoryStore, ttl: chrono::Duration) -> (User, String) {
        let user = store
            .insert_user(NewUser {
                name: "Ada".into(),
                email: "ada@example.com".into(),
                password_hash: "hash".into(),
            })
            .await
            .unwrap();
        let (issued, record) = TokenCodec::issue(user.id, ttl, TokenScope::Authentication);
        store.insert_token(&record).await.unwrap();
        (user, issued.plaintext)
    }

    #[tokio::test]
    async fn test_missing_header_is_anonymous() {
        let (store, authenticator) = setup().await;
        assert!(authenticator.resolve(None).await.unwrap().is_anonymous());
        assert_eq!(store.token_lookups(), 0);
    }

    #[tokio::test]
    async fn test_malformed_headers_are_rejected_without_lookup() {
        let (store, authenticator) = setup().await;
        let valid_shape = "a".repeat(22);

        for header in [
            "Bearer".to_string(),
            "Basic dXNlcjpwYXNz".to_string(),
            format!("bearer {valid_shape}"),
            format!("Bearer  {valid_shape}"),
            format!("Bearer {valid_shape} extra"),
            "Bearer abc".to_string(),
        ] {
            let result = authenticator.resolve(Some(&header)).await;
            assert!(
                matches!(result, Err(ServiceError::InvalidCredentialFormat)),
                "{header:?}"
            );
        }

        assert_eq!(store.token_lookups(), 0);
    }

    #[tokio::test]
    async fn test_valid_token_resolves_to_owner() {
        let (store, authenticator) = setup().await;
        let (user, token) = user_with_token(&store, chrono::Duration::hours(1)).await;

        let identity = authenticator
            .resolve(Some(&format!("Bearer {token}")))
            .await
            .unwrap();
        assert_eq!(identity.user().map(|u| u.id), Some(user.id));
    }

    #[tokio::test]
    async fn test_expired_token_never_resolves() {
        let (store, authenticator) = setup().await;
        let (_, token) = user_with_token(&store, chrono::Duration::seconds(-1)).await;

        let result = authenticator.resolve(Some(&format!("Bearer {token}"))).await;
        assert!(matches!(result, Err(ServiceError::InvalidOrExpiredToken)));
        assert_eq!(store.token_lookups(), 1);
    }

    #[tokio::test]
    async fn test_unknown_token_is_invalid() {
        let (_, authenticator) = setup().await;
        let (unknown, _) = TokenCodec::generate();

        let result = authenticator.resolve(Some(&format!("Bearer {unknown}"))).await;
        assert!(matches!(result, Err(ServiceError::InvalidOrExpiredToken)));
    }

    #[tokio::test]
    async fn test_activation_token_cannot_authenticate() {
        let (store, authenticator) = setup().await;
        let (user, _) = user_with_token(&store, chrono::Duration::hours(1)).await;
        let (issued, record) =
            TokenCodec::issue(user.id, chrono::Duration::hours(1), TokenScope::Activation);
        store.insert_token(&record).await.unwrap();

        let result = authenticator
            .resolve(Some(&format!("Bearer {}", issued.plaintext)))
            .await;
        assert!(matches!(result, Err(ServiceError::InvalidOrExpiredToken)));
    }

    #[tokio::test]
    async fn test_store_failure_is_not_an_invalid_token() {
        let (store, authenticator) = setup().await;
        let (_, token) = user_with_token(&store, chrono::Duration::hours(1)).await;
        store.set_unavailable(true);

        let result = authenticator.resolve(Some(&format!("Bearer {token}"))).await;
        assert!(matches!(result, Err(ServiceError::StoreUnavailable)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_lookup_times_out() {
        let (store, authenticator) = setup().await;
        let (_, token) = user_with_token(&store, chrono::Duration::hours(1)).await;
        store.set_latency(Duration::from_secs(30));

        let result = authenticator.resolve(Some(&format!("Bearer {token}"))).await;
        assert!(matches!(result, Err(ServiceError::StoreUnavailable)));
    }
}
