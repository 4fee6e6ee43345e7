use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use service_core::error::AppError;
use tracing::{info, instrument};

use super::parse_id;
use crate::dtos::{CreateCardRequest, UpdateCardRequest};
use crate::middleware::Permitted;
use crate::models::permission::{CardsRead, CardsWrite};
use crate::models::{Card, CardRecord};
use crate::services::ServiceError;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

#[instrument(skip(state, _permitted, req))]
pub async fn create_card(
    State(state): State<AppState>,
    _permitted: Permitted<CardsWrite>,
    ValidatedJson(req): ValidatedJson<CreateCardRequest>,
) -> Result<impl IntoResponse, AppError> {
    let record = state
        .store
        .insert_card(&req.title)
        .await
        .map_err(ServiceError::from)?;

    info!(card_id = record.id, "Card created");

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/v1/cards/{}", record.id))],
        Json(json!({ "card": Card::from_record(record, Vec::new()) })),
    ))
}

#[instrument(skip(state, _permitted))]
pub async fn show_card(
    State(state): State<AppState>,
    _permitted: Permitted<CardsRead>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let record = state
        .store
        .card(id)
        .await
        .map_err(ServiceError::from)?
        .ok_or(ServiceError::NotFound)?;

    let events = state
        .store
        .events_for_card(id)
        .await
        .map_err(ServiceError::from)?;

    Ok(Json(json!({ "card": Card::from_record(record, events) })))
}

#[instrument(skip(state, _permitted, req))]
pub async fn update_card(
    State(state): State<AppState>,
    _permitted: Permitted<CardsWrite>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateCardRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let current = state
        .store
        .card(id)
        .await
        .map_err(ServiceError::from)?
        .ok_or(ServiceError::NotFound)?;

    let expected_version = req.version.unwrap_or(current.version);
    let title = req.title.unwrap_or_else(|| current.title.clone());
    let mut record = CardRecord { title, ..current };

    record.version = state
        .guard
        .apply_versioned_update(
            "card",
            id,
            expected_version,
            state.store.update_card(&record, expected_version),
        )
        .await?;

    let events = state
        .store
        .events_for_card(id)
        .await
        .map_err(ServiceError::from)?;

    info!(card_id = id, version = record.version, "Card updated");

    Ok(Json(json!({ "card": Card::from_record(record, events) })))
}
