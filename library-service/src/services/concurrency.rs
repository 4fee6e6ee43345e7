//! Optimistic concurrency for versioned records.
//!
//! Callers fetch the record first (answering 404 themselves when it is
//! missing), then hand the guard a conditional update keyed on id and the
//! version they read. The store applies it as a single statement, so there is
//! no locking here. A conditional update that matches nothing therefore means
//! another writer got there first.

use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

use super::error::ServiceError;
use super::metrics::EDIT_CONFLICTS_TOTAL;
use crate::store::{with_deadline, StoreError};

#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyGuard {
    deadline: Duration,
}

impl ConcurrencyGuard {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    /// Run `update` (a conditional write expecting `expected_version`) and
    /// return the new version, which is always `expected_version + 1`.
    pub async fn apply_versioned_update<F>(
        &self,
        entity: &'static str,
        id: i64,
        expected_version: i32,
        update: F,
    ) -> Result<i32, ServiceError>
    where
        F: Future<Output = Result<Option<i32>, StoreError>>,
    {
        let Some(next_version) = expected_version.checked_add(1) else {
            warn!(entity, id, expected_version, "Version counter exhausted");
            EDIT_CONFLICTS_TOTAL.with_label_values(&[entity]).inc();
            return Err(ServiceError::EditConflict);
        };

        match with_deadline(self.deadline, update).await? {
            Some(version) if version == next_version => Ok(version),
            Some(version) => {
                error!(entity, id, expected_version, version, "Store returned an unexpected version");
                Err(ServiceError::Internal(anyhow::anyhow!(
                    "{entity} {id} moved from version {expected_version} to {version}"
                )))
            }
            None => {
                warn!(entity, id, expected_version, "Edit conflict");
                EDIT_CONFLICTS_TOTAL.with_label_values(&[entity]).inc();
                Err(ServiceError::EditConflict)
            }
        }
    }
}
