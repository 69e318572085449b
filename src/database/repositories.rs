//! Storage seams used by the services. Everything above this layer talks to
//! these traits so tests can swap in failing or counting implementations.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;

use crate::error::AppError;
use crate::models::{CollectionCheckpoint, MetricPoint, NewPool, Pool, RiskScore};

/// Outcome of applying one filtered registry snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryChanges {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub marked_ineligible: usize,
}

#[async_trait]
pub trait PoolRepository: Send + Sync {
    /// Upserts `pools` as the complete eligible set and marks every other
    /// eligible pool ineligible. All-or-nothing.
    async fn apply_registry(
        &self,
        pools: &[NewPool],
        observed_at: DateTime<Utc>,
    ) -> Result<RegistryChanges, AppError>;

    async fn get_pool(&self, pool_id: &str) -> Result<Option<Pool>, AppError>;

    async fn pools_by_ids(&self, pool_ids: &[String]) -> Result<Vec<Pool>, AppError>;

    /// Eligible pools in registry order.
    async fn eligible_pools(&self) -> Result<Vec<Pool>, AppError>;

    /// Eligible pools whose metric set changed since they were last scored.
    async fn pools_needing_scoring(&self) -> Result<Vec<Pool>, AppError>;
}

#[async_trait]
pub trait MetricRepository: Send + Sync {
    /// Inserts or replaces points keyed by `(pool_id, date)` in one
    /// transaction. Returns the number of rows that actually changed and flags
    /// the pool for rescoring when that number is non-zero.
    async fn upsert_points(&self, pool_id: &str, points: &[MetricPoint]) -> Result<u64, AppError>;

    /// The `limit` most recent points, returned oldest first.
    async fn recent_points(&self, pool_id: &str, limit: usize) -> Result<Vec<MetricPoint>, AppError>;

    /// Stored dates within `[start, end]`.
    async fn dates_between(
        &self,
        pool_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeSet<NaiveDate>, AppError>;

    async fn count_points(&self, pool_id: &str) -> Result<i64, AppError>;
}

#[async_trait]
pub trait RiskScoreRepository: Send + Sync {
    /// Replaces the pool's score wholesale (`None` removes it) and clears the
    /// rescoring flag.
    async fn replace_score(&self, pool_id: &str, score: Option<&RiskScore>) -> Result<(), AppError>;

    async fn get_score(&self, pool_id: &str) -> Result<Option<RiskScore>, AppError>;
}

#[async_trait]
pub trait CheckpointRepository: Send + Sync {
    async fn load_checkpoint(&self) -> Result<Option<CollectionCheckpoint>, AppError>;

    async fn save_checkpoint(&self, checkpoint: &CollectionCheckpoint) -> Result<(), AppError>;

    async fn clear_checkpoint(&self) -> Result<(), AppError>;
}
