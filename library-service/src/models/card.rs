use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::Event;

/// Row of the `cards` table.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct CardRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub version: i32,
}

/// Card together with the events attached to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Card {
    pub id: i64,
    pub title: String,
    pub version: i32,
    #[serde(skip_serializing)]
    pub created_at: DateTime<Utc>,
    pub events: Vec<Event>,
}

impl Card {
    pub fn from_record(record: CardRecord, events: Vec<Event>) -> Self {
        Self {
            id: record.id,
            title: record.title,
            version: record.version,
            created_at: record.created_at,
            events,
        }
    }
}
