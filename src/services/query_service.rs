use std::sync::Arc;

use crate::database::{MetricRepository, SqliteStore};
use crate::error::AppError;
use crate::models::{MetricPoint, PoolFilter, PoolRiskView, RiskSummary};

pub const DEFAULT_HISTORY_LIMIT: usize = 90;
pub const MAX_HISTORY_LIMIT: usize = 1000;

/// Read-only view of the store for the presentation layer.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<SqliteStore>,
}

impl QueryService {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    pub async fn list_pools(&self, filter: &PoolFilter) -> Result<Vec<PoolRiskView>, AppError> {
        if let (Some(min), Some(max)) = (filter.min_apy, filter.max_apy) {
            if min > max {
                return Err(AppError::ValidationError("min_apy exceeds max_apy".to_string()));
            }
        }
        if let (Some(min), Some(max)) = (filter.min_tvl, filter.max_tvl) {
            if min > max {
                return Err(AppError::ValidationError("min_tvl exceeds max_tvl".to_string()));
            }
        }

        self.store.scored_pools(filter).await
    }

    pub async fn get_pool_view(&self, pool_id: &str) -> Result<PoolRiskView, AppError> {
        self.store
            .scored_pool(pool_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Pool {} not found", pool_id)))
    }

    /// Stored points for an eligible pool, oldest first.
    pub async fn history(&self, pool_id: &str, limit: Option<usize>) -> Result<Vec<MetricPoint>, AppError> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        if limit == 0 || limit > MAX_HISTORY_LIMIT {
            return Err(AppError::ValidationError(format!(
                "limit must be between 1 and {}",
                MAX_HISTORY_LIMIT
            )));
        }

        self.get_pool_view(pool_id).await?;
        self.store.recent_points(pool_id, limit).await
    }

    pub async fn summary(&self) -> Result<RiskSummary, AppError> {
        let views = self.store.scored_pools(&PoolFilter::default()).await?;
        Ok(RiskSummary::from_views(&views))
    }
}
