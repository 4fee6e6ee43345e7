//! PostgreSQL store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use super::{with_deadline, CardStore, CredentialStore, EventStore, Store, StoreError};
use crate::auth::token::TokenHash;
use crate::config::DatabaseConfig;
use crate::models::{
    CardRecord, Event, EventQuery, NewEvent, NewUser, Permissions, TokenRecord, TokenScope, User,
};
use crate::services::metrics::STORE_QUERY_DURATION;

const EMAIL_CONSTRAINT: &str = "users_email_key";
const CARD_CONSTRAINT: &str = "events_card_id_fkey";

/// Database connection pool wrapper. Every statement is bounded by the
/// configured deadline.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    deadline: Duration,
}

#[derive(FromRow)]
struct CountedEvent {
    total: i64,
    #[sqlx(flatten)]
    event: Event,
}

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        match db_err.constraint() {
            Some(EMAIL_CONSTRAINT) => return StoreError::DuplicateEmail,
            Some(CARD_CONSTRAINT) => return StoreError::MissingReference("card_id"),
            _ => {}
        }
    }

    error!(operation, error = %err, "Store query failed");
    StoreError::Unavailable(err.to_string())
}

impl Database {
    #[instrument(skip(config), fields(service = "library-service"))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.store_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self {
            pool,
            deadline: config.store_timeout,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn run<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>> + Send,
    {
        let timer = STORE_QUERY_DURATION
            .with_label_values(&[operation])
            .start_timer();

        let result = with_deadline(self.deadline, async {
            fut.await.map_err(|e| map_sqlx_error(operation, e))
        })
        .await;

        timer.observe_duration();

        if matches!(result, Err(StoreError::Timeout)) {
            warn!(operation, deadline_ms = self.deadline.as_millis() as u64, "Store deadline exceeded");
        }

        result
    }
}

#[async_trait]
impl CredentialStore for Database {
    #[instrument(skip(self, user), fields(email = %user.email))]
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.run(
            "insert_user",
            sqlx::query_as::<_, User>(
                r#"
                INSERT INTO users (name, email, password_hash, activated)
                VALUES ($1, $2, $3, FALSE)
                RETURNING id, created_at, name, email, password_hash, activated, version
                "#,
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .fetch_one(&self.pool),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.run(
            "user_by_email",
            sqlx::query_as::<_, User>(
                r#"
                SELECT id, created_at, name, email, password_hash, activated, version
                FROM users
                WHERE email = $1
                "#,
            )
            .bind(email)
            .fetch_optional(&self.pool),
        )
        .await
    }

    #[instrument(skip(self, hash))]
    async fn user_by_token_hash(
        &self,
        hash: &TokenHash,
        scope: TokenScope,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        self.run(
            "user_by_token_hash",
            sqlx::query_as::<_, User>(
                r#"
                SELECT users.id, users.created_at, users.name, users.email,
                       users.password_hash, users.activated, users.version
                FROM users
                INNER JOIN tokens ON users.id = tokens.user_id
                WHERE tokens.hash = $1 AND tokens.scope = $2 AND tokens.expiry > $3
                "#,
            )
            .bind(&hash.as_bytes()[..])
            .bind(scope.as_str())
            .bind(now)
            .fetch_optional(&self.pool),
        )
        .await
    }

    #[instrument(skip(self, user), fields(user_id = user.id))]
    async fn update_user(
        &self,
        user: &User,
        expected_version: i32,
    ) -> Result<Option<i32>, StoreError> {
        self.run(
            "update_user",
            sqlx::query_scalar::<_, i32>(
                r#"
                UPDATE users
                SET name = $1, email = $2, password_hash = $3, activated = $4, version = version + 1
                WHERE id = $5 AND version = $6
                RETURNING version
                "#,
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.activated)
            .bind(user.id)
            .bind(expected_version)
            .fetch_optional(&self.pool),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn permissions_for_user(&self, user_id: i64) -> Result<Permissions, StoreError> {
        let codes = self
            .run(
                "permissions_for_user",
                sqlx::query_scalar::<_, String>(
                    r#"
                    SELECT permissions.code
                    FROM permissions
                    INNER JOIN users_permissions ON users_permissions.permission_id = permissions.id
                    WHERE users_permissions.user_id = $1
                    "#,
                )
                .bind(user_id)
                .fetch_all(&self.pool),
            )
            .await?;

        Ok(codes.into_iter().collect())
    }

    #[instrument(skip(self))]
    async fn grant_permissions(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError> {
        let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();

        self.run(
            "grant_permissions",
            sqlx::query(
                r#"
                INSERT INTO users_permissions (user_id, permission_id)
                SELECT $1, permissions.id FROM permissions WHERE permissions.code = ANY($2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(&codes)
            .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    #[instrument(skip(self, token), fields(user_id = token.user_id, scope = %token.scope))]
    async fn insert_token(&self, token: &TokenRecord) -> Result<(), StoreError> {
        self.run(
            "insert_token",
            sqlx::query(
                r#"
                INSERT INTO tokens (hash, user_id, expiry, scope)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(&token.hash.as_bytes()[..])
            .bind(token.user_id)
            .bind(token.expiry)
            .bind(token.scope.as_str())
            .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_tokens_for_user(
        &self,
        user_id: i64,
        scope: TokenScope,
    ) -> Result<u64, StoreError> {
        let result = self
            .run(
                "delete_tokens_for_user",
                sqlx::query("DELETE FROM tokens WHERE user_id = $1 AND scope = $2")
                    .bind(user_id)
                    .bind(scope.as_str())
                    .execute(&self.pool),
            )
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl EventStore for Database {
    #[instrument(skip(self, event), fields(card_id = event.card_id))]
    async fn insert_event(&self, event: NewEvent) -> Result<Event, StoreError> {
        self.run(
            "insert_event",
            sqlx::query_as::<_, Event>(
                r#"
                INSERT INTO events (title, description, text_blocks, date, card_id)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, created_at, title, description, text_blocks, date, version, card_id
                "#,
            )
            .bind(&event.title)
            .bind(&event.description)
            .bind(&event.text_blocks)
            .bind(event.date)
            .bind(event.card_id)
            .fetch_one(&self.pool),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn event(&self, id: i64) -> Result<Option<Event>, StoreError> {
        self.run(
            "event",
            sqlx::query_as::<_, Event>(
                r#"
                SELECT id, created_at, title, description, text_blocks, date, version, card_id
                FROM events
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_optional(&self.pool),
        )
        .await
    }

    #[instrument(skip(self, query), fields(page = query.filters.page))]
    async fn list_events(&self, query: &EventQuery) -> Result<(Vec<Event>, i64), StoreError> {
        // Sort column and direction come from a closed enum, never from input.
        let sql = format!(
            r#"
            SELECT count(*) OVER() AS total, id, created_at, title, description, text_blocks, date, version, card_id
            FROM events
            WHERE (to_tsvector('simple', title) @@ plainto_tsquery('simple', $1) OR $1 = '')
              AND ($2::date IS NULL OR date = $2)
            ORDER BY {} {}, id ASC
            LIMIT $3 OFFSET $4
            "#,
            query.filters.sort.as_sql(),
            query.filters.direction.as_sql(),
        );

        let rows = self
            .run(
                "list_events",
                sqlx::query_as::<_, CountedEvent>(&sql)
                    .bind(&query.title)
                    .bind(query.date)
                    .bind(query.filters.limit())
                    .bind(query.filters.offset())
                    .fetch_all(&self.pool),
            )
            .await?;

        let total = rows.first().map(|row| row.total).unwrap_or(0);
        Ok((rows.into_iter().map(|row| row.event).collect(), total))
    }

    #[instrument(skip(self))]
    async fn events_for_card(&self, card_id: i64) -> Result<Vec<Event>, StoreError> {
        self.run(
            "events_for_card",
            sqlx::query_as::<_, Event>(
                r#"
                SELECT id, created_at, title, description, text_blocks, date, version, card_id
                FROM events
                WHERE card_id = $1
                ORDER BY date ASC, id ASC
                "#,
            )
            .bind(card_id)
            .fetch_all(&self.pool),
        )
        .await
    }

    #[instrument(skip(self, event), fields(event_id = event.id))]
    async fn update_event(
        &self,
        event: &Event,
        expected_version: i32,
    ) -> Result<Option<i32>, StoreError> {
        self.run(
            "update_event",
            sqlx::query_scalar::<_, i32>(
                r#"
                UPDATE events
                SET title = $1, description = $2, text_blocks = $3, date = $4, card_id = $5,
                    version = version + 1
                WHERE id = $6 AND version = $7
                RETURNING version
                "#,
            )
            .bind(&event.title)
            .bind(&event.description)
            .bind(&event.text_blocks)
            .bind(event.date)
            .bind(event.card_id)
            .bind(event.id)
            .bind(expected_version)
            .fetch_optional(&self.pool),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_event(&self, id: i64) -> Result<bool, StoreError> {
        let result = self
            .run(
                "delete_event",
                sqlx::query("DELETE FROM events WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CardStore for Database {
    #[instrument(skip(self))]
    async fn insert_card(&self, title: &str) -> Result<CardRecord, StoreError> {
        self.run(
            "insert_card",
            sqlx::query_as::<_, CardRecord>(
                r#"
                INSERT INTO cards (title)
                VALUES ($1)
                RETURNING id, created_at, title, version
                "#,
            )
            .bind(title)
            .fetch_one(&self.pool),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn card(&self, id: i64) -> Result<Option<CardRecord>, StoreError> {
        self.run(
            "card",
            sqlx::query_as::<_, CardRecord>(
                "SELECT id, created_at, title, version FROM cards WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool),
        )
        .await
    }

    #[instrument(skip(self, card), fields(card_id = card.id))]
    async fn update_card(
        &self,
        card: &CardRecord,
        expected_version: i32,
    ) -> Result<Option<i32>, StoreError> {
        self.run(
            "update_card",
            sqlx::query_scalar::<_, i32>(
                r#"
                UPDATE cards
                SET title = $1, version = version + 1
                WHERE id = $2 AND version = $3
                RETURNING version
                "#,
            )
            .bind(&card.title)
            .bind(card.id)
            .bind(expected_version)
            .fetch_optional(&self.pool),
        )
        .await
    }
}

#[async_trait]
impl Store for Database {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), StoreError> {
        self.run("health_check", sqlx::query("SELECT 1").execute(&self.pool))
            .await?;
        Ok(())
    }
}
