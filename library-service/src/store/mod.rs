//! Persistence seams. Handlers and the auth components only see these traits;
//! `Database` talks to PostgreSQL and `MemoryStore` backs tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::auth::token::TokenHash;
use crate::models::{
    CardRecord, Event, EventQuery, NewEvent, NewUser, Permissions, TokenRecord, TokenScope, User,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::Database;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("a user with this email address already exists")]
    DuplicateEmail,

    #[error("referenced record does not exist: {0}")]
    MissingReference(&'static str),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation timed out")]
    Timeout,
}

/// Bound a store call by `deadline`. Elapsed deadlines become `Timeout`.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout),
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Owner of a token with this hash and scope whose expiry is after `now`.
    async fn user_by_token_hash(
        &self,
        hash: &TokenHash,
        scope: TokenScope,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError>;

    /// Conditional update keyed on id and version. `None` when no row matched.
    async fn update_user(&self, user: &User, expected_version: i32)
        -> Result<Option<i32>, StoreError>;

    async fn permissions_for_user(&self, user_id: i64) -> Result<Permissions, StoreError>;

    async fn grant_permissions(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError>;

    async fn insert_token(&self, token: &TokenRecord) -> Result<(), StoreError>;

    async fn delete_tokens_for_user(&self, user_id: i64, scope: TokenScope)
        -> Result<u64, StoreError>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_event(&self, event: NewEvent) -> Result<Event, StoreError>;

    async fn event(&self, id: i64) -> Result<Option<Event>, StoreError>;

    /// A page of events and the total number of matches.
    async fn list_events(&self, query: &EventQuery) -> Result<(Vec<Event>, i64), StoreError>;

    async fn events_for_card(&self, card_id: i64) -> Result<Vec<Event>, StoreError>;

    async fn update_event(&self, event: &Event, expected_version: i32)
        -> Result<Option<i32>, StoreError>;

    async fn delete_event(&self, id: i64) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait CardStore: Send + Sync {
    async fn insert_card(&self, title: &str) -> Result<CardRecord, StoreError>;

    async fn card(&self, id: i64) -> Result<Option<CardRecord>, StoreError>;

    async fn update_card(&self, card: &CardRecord, expected_version: i32)
        -> Result<Option<i32>, StoreError>;
}

#[async_trait]
pub trait Store: CredentialStore + EventStore + CardStore {
    async fn health_check(&self) -> Result<(), StoreError>;
}
