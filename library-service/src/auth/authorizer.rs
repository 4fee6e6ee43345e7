//! Authorization checks over a resolved [`Identity`].
//!
//! `require_activated` and `require_permission` both start with
//! `require_authenticated`, so an anonymous caller always gets
//! `Unauthenticated` first.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use super::identity::Identity;
use crate::models::User;
use crate::services::ServiceError;
use crate::store::{with_deadline, Store};

#[derive(Clone)]
pub struct Authorizer {
    store: Arc<dyn Store>,
    deadline: Duration,
}

impl Authorizer {
    pub fn new(store: Arc<dyn Store>, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    pub fn require_authenticated(identity: &Identity) -> Result<&User, ServiceError> {
        identity.user().ok_or(ServiceError::Unauthenticated)
    }

    pub fn require_activated(identity: &Identity) -> Result<&User, ServiceError> {
        let user = Self::require_authenticated(identity)?;
        if !user.activated {
            debug!(user_id = user.id, "Inactive account refused");
            return Err(ServiceError::InactiveAccount);
        }
        Ok(user)
    }

    /// Permissions are read from the store on every call.
    pub async fn require_permission<'a>(
        &self,
        identity: &'a Identity,
        code: &str,
    ) -> Result<&'a User, ServiceError> {
        let user = Self::require_authenticated(identity)?;

        let permissions = with_deadline(self.deadline, self.store.permissions_for_user(user.id))
            .await
            .map_err(|err| {
                error!(error = %err, user_id = user.id, "Permission lookup failed");
                ServiceError::StoreUnavailable
            })?;

        if !permissions.includes(code) {
            debug!(user_id = user.id, code, "Permission denied");
            return Err(ServiceError::PermissionDenied);
        }

        Ok(user)
    }
}
