pub mod caller;
pub mod health;
pub mod import;
pub mod positions;
pub mod transactions;

use crate::config::Config;
use crate::orchestration::PositionManager;
use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub use caller::Caller;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<PositionManager>,
    pub config: Config,
}

impl AppState {
    pub fn new(manager: Arc<PositionManager>, config: Config) -> Self {
        Self { manager, config }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Leave room above the configured cap so oversized files reach the
    // manager and get a descriptive error.
    let upload_limit = state.config.max_import_bytes.saturating_add(64 * 1024);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route(
            "/v1/positions",
            get(positions::list_positions).post(positions::create_position),
        )
        .route(
            "/v1/positions/:id",
            get(positions::get_position)
                .put(positions::edit_position)
                .delete(positions::delete_position),
        )
        .route("/v1/positions/:id/close", post(positions::close_position))
        .route(
            "/v1/positions/:id/transactions",
            get(transactions::list_transactions).post(transactions::create_transaction),
        )
        .route(
            "/v1/positions/:id/transactions/delete",
            post(transactions::delete_transactions),
        )
        .route(
            "/v1/positions/:id/transactions/:tx",
            get(transactions::get_transaction).put(transactions::edit_transaction),
        )
        .route(
            "/v1/positions/:id/import",
            post(import::import_csv).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .layer(cors)
        .with_state(state)
}
