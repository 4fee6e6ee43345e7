//! Event model: a dated entry attached to a card.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Event {
    pub id: i64,
    #[serde(skip_serializing)]
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub description: String,
    pub text_blocks: Vec<String>,
    pub date: NaiveDate,
    pub version: i32,
    pub card_id: i64,
}

/// Input for creating an event.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub text_blocks: Vec<String>,
    pub date: NaiveDate,
    pub card_id: i64,
}
