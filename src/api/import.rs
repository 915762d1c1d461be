use crate::api::{AppState, Caller};
use crate::domain::PositionId;
use crate::error::AppError;
use crate::orchestration::{ImportForm, ImportOutcome};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;

/// Upload a broker export as the raw request body.
pub async fn import_csv(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    Query(form): Query<ImportForm>,
    body: Bytes,
) -> Result<Json<ImportOutcome>, AppError> {
    let outcome = state
        .manager
        .import_csv(
            PositionId::new(id),
            caller.user,
            &form,
            &caller.timezone,
            &body,
        )
        .await?;
    Ok(Json(outcome))
}
