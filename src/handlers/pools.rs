use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::handlers::AppState;
use crate::models::{MetricPoint, PoolFilter, PoolRiskView, RiskSummary};

#[derive(Serialize, Deserialize)]
pub struct PoolListResponse {
    pub pools: Vec<PoolRiskView>,
    pub total: usize,
}

#[derive(Serialize, Deserialize)]
pub struct PoolHistoryResponse {
    pub pool_id: String,
    pub points: Vec<MetricPoint>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

pub async fn list_pools(
    State(state): State<AppState>,
    Query(filter): Query<PoolFilter>,
) -> Result<Json<PoolListResponse>, AppError> {
    let pools = state.query.list_pools(&filter).await?;
    let total = pools.len();

    Ok(Json(PoolListResponse { pools, total }))
}

pub async fn get_pool(
    State(state): State<AppState>,
    Path(pool_id): Path<String>,
) -> Result<Json<PoolRiskView>, AppError> {
    Ok(Json(state.query.get_pool_view(&pool_id).await?))
}

pub async fn get_pool_history(
    State(state): State<AppState>,
    Path(pool_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<PoolHistoryResponse>, AppError> {
    let points = state.query.history(&pool_id, params.limit).await?;

    Ok(Json(PoolHistoryResponse { pool_id, points }))
}

pub async fn get_summary(State(state): State<AppState>) -> Result<Json<RiskSummary>, AppError> {
    Ok(Json(state.query.summary().await?))
}
