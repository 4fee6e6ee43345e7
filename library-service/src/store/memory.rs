//! In-process store with the same semantics as the PostgreSQL one. Used by
//! the test suite and for running the service without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use super::{CardStore, CredentialStore, EventStore, Store, StoreError};
use crate::auth::token::TokenHash;
use crate::models::{
    CardRecord, Event, EventQuery, NewEvent, NewUser, Permissions, SortDirection, TokenRecord,
    TokenScope, User,
};
use crate::models::filters::SortColumn;

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    tokens: Vec<TokenRecord>,
    grants: HashMap<i64, HashSet<String>>,
    cards: BTreeMap<i64, CardRecord>,
    events: BTreeMap<i64, Event>,
    next_user_id: i64,
    next_card_id: i64,
    next_event_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
    token_lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of token-hash lookups served so far.
    pub fn token_lookups(&self) -> usize {
        self.token_lookups.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), StoreError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }

        Ok(())
    }
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn title_matches(title: &str, query: &str) -> bool {
    let wanted = words(query);
    if wanted.is_empty() {
        return true;
    }
    let present = words(title);
    wanted.iter().all(|w| present.contains(w))
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.enter().await?;
        let mut tables = self.tables.write().await;

        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }

        let id = next_id(&mut tables.next_user_id);
        let user = User {
            id,
            created_at: Utc::now(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            activated: false,
            version: 1,
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.enter().await?;
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn user_by_token_hash(
        &self,
        hash: &TokenHash,
        scope: TokenScope,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        self.token_lookups.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        let tables = self.tables.read().await;

        let owner = tables
            .tokens
            .iter()
            .find(|t| t.hash == *hash && t.scope == scope && !t.is_expired(now))
            .and_then(|t| tables.users.get(&t.user_id))
            .cloned();

        Ok(owner)
    }

    async fn update_user(
        &self,
        user: &User,
        expected_version: i32,
    ) -> Result<Option<i32>, StoreError> {
        self.enter().await?;
        let mut tables = self.tables.write().await;

        if tables
            .users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(StoreError::DuplicateEmail);
        }

        match tables.users.get_mut(&user.id) {
            Some(stored) if stored.version == expected_version => {
                let version = stored.version + 1;
                *stored = User {
                    version,
                    ..user.clone()
                };
                Ok(Some(version))
            }
            _ => Ok(None),
        }
    }

    async fn permissions_for_user(&self, user_id: i64) -> Result<Permissions, StoreError> {
        self.enter().await?;
        let tables = self.tables.read().await;
        Ok(tables
            .grants
            .get(&user_id)
            .map(|codes| codes.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn grant_permissions(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError> {
        self.enter().await?;
        let mut tables = self.tables.write().await;

        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::MissingReference("user_id"));
        }

        tables
            .grants
            .entry(user_id)
            .or_default()
            .extend(codes.iter().map(|c| c.to_string()));
        Ok(())
    }

    async fn insert_token(&self, token: &TokenRecord) -> Result<(), StoreError> {
        self.enter().await?;
        let mut tables = self.tables.write().await;

        if !tables.users.contains_key(&token.user_id) {
            return Err(StoreError::MissingReference("user_id"));
        }

        tables.tokens.push(token.clone());
        Ok(())
    }

    async fn delete_tokens_for_user(
        &self,
        user_id: i64,
        scope: TokenScope,
    ) -> Result<u64, StoreError> {
        self.enter().await?;
        let mut tables = self.tables.write().await;

        let before = tables.tokens.len();
        tables
            .tokens
            .retain(|t| !(t.user_id == user_id && t.scope == scope));
        Ok((before - tables.tokens.len()) as u64)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_event(&self, event: NewEvent) -> Result<Event, StoreError> {
        self.enter().await?;
        let mut tables = self.tables.write().await;

        if !tables.cards.contains_key(&event.card_id) {
            return Err(StoreError::MissingReference("card_id"));
        }

        let id = next_id(&mut tables.next_event_id);
        let event = Event {
            id,
            created_at: Utc::now(),
            title: event.title,
            description: event.description,
            text_blocks: event.text_blocks,
            date: event.date,
            version: 1,
            card_id: event.card_id,
        };
        tables.events.insert(id, event.clone());
        Ok(event)
    }

    async fn event(&self, id: i64) -> Result<Option<Event>, StoreError> {
        self.enter().await?;
        Ok(self.tables.read().await.events.get(&id).cloned())
    }

    async fn list_events(&self, query: &EventQuery) -> Result<(Vec<Event>, i64), StoreError> {
        self.enter().await?;
        let tables = self.tables.read().await;

        let mut matched: Vec<Event> = tables
            .events
            .values()
            .filter(|e| title_matches(&e.title, &query.title))
            .filter(|e| query.date.map_or(true, |date| e.date == date))
            .cloned()
            .collect();

        let filters = &query.filters;
        matched.sort_by(|a, b| {
            let ordering = match filters.sort {
                SortColumn::Id => a.id.cmp(&b.id),
                SortColumn::Title => a.title.cmp(&b.title),
                SortColumn::Date => a.date.cmp(&b.date),
            };
            let ordering = match filters.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            ordering.then(a.id.cmp(&b.id))
        });

        let total = matched.len() as i64;
        let page = matched
            .into_iter()
            .skip(filters.offset() as usize)
            .take(filters.limit() as usize)
            .collect();

        Ok((page, total))
    }

    async fn events_for_card(&self, card_id: i64) -> Result<Vec<Event>, StoreError> {
        self.enter().await?;
        let tables = self.tables.read().await;

        let mut events: Vec<Event> = tables
            .events
            .values()
            .filter(|e| e.card_id == card_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        Ok(events)
    }

    async fn update_event(
        &self,
        event: &Event,
        expected_version: i32,
    ) -> Result<Option<i32>, StoreError> {
        self.enter().await?;
        let mut tables = self.tables.write().await;

        if !tables.cards.contains_key(&event.card_id) {
            return Err(StoreError::MissingReference("card_id"));
        }

        match tables.events.get_mut(&event.id) {
            Some(stored) if stored.version == expected_version => {
                let version = stored.version + 1;
                *stored = Event {
                    version,
                    created_at: stored.created_at,
                    ..event.clone()
                };
                Ok(Some(version))
            }
            _ => Ok(None),
        }
    }

    async fn delete_event(&self, id: i64) -> Result<bool, StoreError> {
        self.enter().await?;
        Ok(self.tables.write().await.events.remove(&id).is_some())
    }
}

#[async_trait]
impl CardStore for MemoryStore {
    async fn insert_card(&self, title: &str) -> Result<CardRecord, StoreError> {
        self.enter().await?;
        let mut tables = self.tables.write().await;

        let id = next_id(&mut tables.next_card_id);
        let card = CardRecord {
            id,
            created_at: Utc::now(),
            title: title.to_string(),
            version: 1,
        };
        tables.cards.insert(id, card.clone());
        Ok(card)
    }

    async fn card(&self, id: i64) -> Result<Option<CardRecord>, StoreError> {
        self.enter().await?;
        Ok(self.tables.read().await.cards.get(&id).cloned())
    }

    async fn update_card(
        &self,
        card: &CardRecord,
        expected_version: i32,
    ) -> Result<Option<i32>, StoreError> {
        self.enter().await?;
        let mut tables = self.tables.write().await;

        match tables.cards.get_mut(&card.id) {
            Some(stored) if stored.version == expected_version => {
                stored.version += 1;
                stored.title = card.title.clone();
                Ok(Some(stored.version))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.enter().await
    }
}
