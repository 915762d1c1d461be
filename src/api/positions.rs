use crate::api::{AppState, Caller};
use crate::domain::{Position, PositionId};
use crate::error::AppError;
use crate::orchestration::{Page, PositionForm, PositionLedger};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_positions(
    State(state): State<AppState>,
    caller: Caller,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<PositionLedger>>, AppError> {
    let positions = state
        .manager
        .list_positions(caller.user, page.offset, page.limit)
        .await?;
    Ok(Json(positions))
}

pub async fn create_position(
    State(state): State<AppState>,
    caller: Caller,
    Json(form): Json<PositionForm>,
) -> Result<(StatusCode, Json<Position>), AppError> {
    let position = state
        .manager
        .create_position(caller.user, &form, &caller.timezone)
        .await?;
    Ok((StatusCode::CREATED, Json(position)))
}

pub async fn get_position(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<PositionLedger>, AppError> {
    let ledger = state
        .manager
        .get_ledger_snapshot(PositionId::new(id), caller.user)
        .await?;
    Ok(Json(ledger))
}

pub async fn edit_position(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(form): Json<PositionForm>,
) -> Result<Json<Position>, AppError> {
    let position = state
        .manager
        .edit_position(PositionId::new(id), caller.user, &form, &caller.timezone)
        .await?;
    Ok(Json(position))
}

pub async fn delete_position(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state
        .manager
        .delete_position(PositionId::new(id), caller.user)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn close_position(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<Position>, AppError> {
    let position = state
        .manager
        .close_position(PositionId::new(id), caller.user)
        .await?;
    Ok(Json(position))
}
