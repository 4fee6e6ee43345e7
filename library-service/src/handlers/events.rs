use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use service_core::error::AppError;
use tracing::{info, instrument};
use validator::Validate;

use super::parse_id;
use crate::dtos::{CreateEventRequest, ListEventsParams, UpdateEventRequest};
use crate::middleware::Permitted;
use crate::models::permission::{EventsRead, EventsWrite};
use crate::models::{Event, Metadata};
use crate::services::ServiceError;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

#[instrument(skip(state, permitted, req), fields(user_id = permitted.user.id))]
pub async fn create_event(
    State(state): State<AppState>,
    permitted: Permitted<EventsWrite>,
    ValidatedJson(req): ValidatedJson<CreateEventRequest>,
) -> Result<impl IntoResponse, AppError> {
    let event = state
        .store
        .insert_event(req.into())
        .await
        .map_err(ServiceError::from)?;

    info!(event_id = event.id, "Event created");

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/v1/events/{}", event.id))],
        Json(json!({ "event": event })),
    ))
}

#[instrument(skip(state, _permitted))]
pub async fn show_event(
    State(state): State<AppState>,
    _permitted: Permitted<EventsRead>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let event = state
        .store
        .event(id)
        .await
        .map_err(ServiceError::from)?
        .ok_or(ServiceError::NotFound)?;

    Ok(Json(json!({ "event": event })))
}

/// Partial update guarded by the event's version. The record is read first,
/// so a conditional write that matches nothing is a conflict, not a 404.
#[instrument(skip(state, _permitted, req))]
pub async fn update_event(
    State(state): State<AppState>,
    _permitted: Permitted<EventsWrite>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateEventRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let current = state
        .store
        .event(id)
        .await
        .map_err(ServiceError::from)?
        .ok_or(ServiceError::NotFound)?;

    let expected_version = req.version.unwrap_or(current.version);
    let input = req.merge(&current);
    input.validate()?;

    let mut event = Event {
        title: input.title,
        description: input.description,
        text_blocks: input.text_blocks,
        date: input.date,
        card_id: input.card_id,
        ..current
    };

    event.version = state
        .guard
        .apply_versioned_update(
            "event",
            id,
            expected_version,
            state.store.update_event(&event, expected_version),
        )
        .await?;

    info!(event_id = id, version = event.version, "Event updated");

    Ok(Json(json!({ "event": event })))
}

#[instrument(skip(state, _permitted))]
pub async fn delete_event(
    State(state): State<AppState>,
    _permitted: Permitted<EventsWrite>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let deleted = state
        .store
        .delete_event(id)
        .await
        .map_err(ServiceError::from)?;

    if !deleted {
        return Err(ServiceError::NotFound.into());
    }

    info!(event_id = id, "Event deleted");

    Ok(Json(json!({ "message": "event successfully deleted" })))
}

#[instrument(skip(state, _permitted, params))]
pub async fn list_events(
    State(state): State<AppState>,
    _permitted: Permitted<EventsRead>,
    Query(params): Query<ListEventsParams>,
) -> Result<impl IntoResponse, AppError> {
    let query = params.into_query()?;
    let (events, total) = state
        .store
        .list_events(&query)
        .await
        .map_err(ServiceError::from)?;

    let metadata = Metadata::calculate(total, query.filters.page, query.filters.page_size);

    Ok(Json(json!({ "metadata": metadata, "events": events })))
}
