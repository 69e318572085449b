pub mod health;
pub mod pools;

use axum::{routing::get, Router};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::database::SqliteStore;
use crate::services::QueryService;

pub use health::health_check;
pub use pools::{get_pool, get_pool_history, get_summary, list_pools};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub query: QueryService,
}

impl AppState {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self {
            query: QueryService::new(store.clone()),
            store,
        }
    }

    pub fn db_pool(&self) -> &SqlitePool {
        self.store.pool()
    }
}

/// Read-only query surface.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/pools", get(list_pools))
        .route("/api/v1/pools/:id", get(get_pool))
        .route("/api/v1/pools/:id/history", get(get_pool_history))
        .route("/api/v1/summary", get(get_summary))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
