use crate::api::positions::PageQuery;
use crate::api::{AppState, Caller};
use crate::domain::{PositionId, Transaction, TransactionId};
use crate::error::AppError;
use crate::orchestration::{Page, TransactionForm};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct DeleteTransactionsRequest {
    #[serde(default)]
    pub ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct DeleteTransactionsResponse {
    pub deleted: u64,
}

pub async fn list_transactions(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<Transaction>>, AppError> {
    let transactions = state
        .manager
        .list_transactions_page(PositionId::new(id), caller.user, page.offset, page.limit)
        .await?;
    Ok(Json(transactions))
}

pub async fn create_transaction(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(form): Json<TransactionForm>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let tx = state
        .manager
        .create_transaction(PositionId::new(id), caller.user, &form, &caller.timezone)
        .await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    caller: Caller,
    Path((id, tx)): Path<(i64, i64)>,
) -> Result<Json<Transaction>, AppError> {
    let tx = state
        .manager
        .get_transaction(PositionId::new(id), caller.user, TransactionId::new(tx))
        .await?;
    Ok(Json(tx))
}

pub async fn edit_transaction(
    State(state): State<AppState>,
    caller: Caller,
    Path((id, tx)): Path<(i64, i64)>,
    Json(form): Json<TransactionForm>,
) -> Result<Json<Transaction>, AppError> {
    let tx = state
        .manager
        .edit_transaction(
            PositionId::new(id),
            caller.user,
            TransactionId::new(tx),
            &form,
            &caller.timezone,
        )
        .await?;
    Ok(Json(tx))
}

pub async fn delete_transactions(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(request): Json<DeleteTransactionsRequest>,
) -> Result<Json<DeleteTransactionsResponse>, AppError> {
    let deleted = state
        .manager
        .delete_transactions(PositionId::new(id), caller.user, &request.ids)
        .await?;
    Ok(Json(DeleteTransactionsResponse { deleted }))
}
