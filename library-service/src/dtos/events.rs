use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use validator::Validate;

use crate::models::{Event, EventQuery, Filters, NewEvent};
use crate::services::ServiceError;
use crate::utils::validation::{no_empty_blocks, not_in_past};

/// Complete set of event fields, validated as a whole. Creation takes it
/// straight from the body; updates build it by merging onto the stored event.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EventInput {
    #[validate(length(min = 1, max = 200, message = "must be provided and not more than 200 bytes long"))]
    pub title: String,

    #[validate(length(min = 1, max = 1000, message = "must be provided and not more than 1000 bytes long"))]
    pub description: String,

    #[validate(
        length(min = 1, max = 10, message = "must contain between 1 and 10 text blocks"),
        custom(function = "no_empty_blocks")
    )]
    pub text_blocks: Vec<String>,

    #[validate(custom(function = "not_in_past"))]
    pub date: NaiveDate,

    #[validate(range(min = 1, message = "must be a positive integer"))]
    pub card_id: i64,
}

pub type CreateEventRequest = EventInput;

impl From<EventInput> for NewEvent {
    fn from(input: EventInput) -> Self {
        NewEvent {
            title: input.title,
            description: input.description,
            text_blocks: input.text_blocks,
            date: input.date,
            card_id: input.card_id,
        }
    }
}

/// Partial update. `version`, when present, is the version the client last
/// saw; otherwise the version just read from the store is used.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub text_blocks: Option<Vec<String>>,
    pub date: Option<NaiveDate>,
    pub card_id: Option<i64>,
    pub version: Option<i32>,
}

impl UpdateEventRequest {
    /// Overlay the supplied fields on `current`.
    pub fn merge(self, current: &Event) -> EventInput {
        EventInput {
            title: self.title.unwrap_or_else(|| current.title.clone()),
            description: self
                .description
                .unwrap_or_else(|| current.description.clone()),
            text_blocks: self
                .text_blocks
                .unwrap_or_else(|| current.text_blocks.clone()),
            date: self.date.unwrap_or(current.date),
            card_id: self.card_id.unwrap_or(current.card_id),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListEventsParams {
    pub title: Option<String>,
    pub date: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub sort: Option<String>,
}

impl ListEventsParams {
    pub fn into_query(self) -> Result<EventQuery, ServiceError> {
        let filters = Filters::parse(
            self.page.as_deref(),
            self.page_size.as_deref(),
            self.sort.as_deref(),
        );

        let mut errors = match &filters {
            Ok(_) => BTreeMap::new(),
            Err(errors) => errors.clone(),
        };

        let date = match self.date.as_deref().filter(|d| !d.is_empty()) {
            None => None,
            Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    errors.insert("date".into(), "must be a date in YYYY-MM-DD format".into());
                    None
                }
            },
        };

        match filters {
            Ok(filters) if errors.is_empty() => Ok(EventQuery {
                title: self.title.unwrap_or_default(),
                date,
                filters,
            }),
            _ => Err(ServiceError::Validation(errors)),
        }
    }
}
