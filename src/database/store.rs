use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

use crate::database::repositories::{
    CheckpointRepository, MetricRepository, PoolRepository, RegistryChanges, RiskScoreRepository,
};
use crate::error::AppError;
use crate::models::{
    CollectionCheckpoint, MetricPoint, NewPool, Pool, PoolFilter, PoolRiskView, RiskLevel,
    RiskScore, RiskStatus,
};

const POOL_COLUMNS: &str = "id, position, chain, project, symbol, tvl, apy, eligible, needs_scoring, first_seen, last_updated";

const METRIC_COLUMNS: &str = "pool_id, date, apy, tvl, apy_base, apy_reward, il_7d";

const SCORE_COLUMNS: &str = "pool_id, liquidity_score, stability_score, composite_score, classification, sample_size, apy_mean, apy_stdev, tvl_mean, tvl_cv, computed_at";

/// SQLite-backed metric store implementing every repository trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Eligible pools joined with their latest score, in registry order.
    pub async fn scored_pools(&self, filter: &PoolFilter) -> Result<Vec<PoolRiskView>, AppError> {
        let mut builder = scored_pool_query();
        push_filter(&mut builder, filter);
        builder.push(" ORDER BY p.position ASC");

        let rows = builder
            .build_query_as::<PoolScoreRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(PoolScoreRow::into_view).collect())
    }

    pub async fn scored_pool(&self, pool_id: &str) -> Result<Option<PoolRiskView>, AppError> {
        let mut builder = scored_pool_query();
        builder.push(" AND p.id = ").push_bind(pool_id.to_string());

        let row = builder
            .build_query_as::<PoolScoreRow>()
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(PoolScoreRow::into_view))
    }
}

fn scored_pool_query() -> QueryBuilder<'static, Sqlite> {
    QueryBuilder::new(
        r#"
        SELECT p.id, p.position, p.chain, p.project, p.symbol, p.tvl, p.apy,
               s.pool_id AS score_pool_id, s.liquidity_score, s.stability_score,
               s.composite_score, s.classification, s.sample_size, s.apy_mean,
               s.apy_stdev, s.tvl_mean, s.tvl_cv, s.computed_at
        FROM pools p
        LEFT JOIN risk_scores s ON s.pool_id = p.id
        WHERE p.eligible = 1
        "#,
    )
}

fn push_filter(builder: &mut QueryBuilder<'static, Sqlite>, filter: &PoolFilter) {
    if let Some(chain) = &filter.chain {
        builder.push(" AND LOWER(p.chain) = LOWER(").push_bind(chain.clone()).push(")");
    }
    if let Some(project) = &filter.project {
        builder.push(" AND LOWER(p.project) = LOWER(").push_bind(project.clone()).push(")");
    }
    if let Some(level) = filter.risk_level {
        builder.push(" AND s.classification = ").push_bind(level.as_str());
    }
    if let Some(min_apy) = filter.min_apy {
        builder.push(" AND p.apy >= ").push_bind(min_apy);
    }
    if let Some(max_apy) = filter.max_apy {
        builder.push(" AND p.apy <= ").push_bind(max_apy);
    }
    if let Some(min_tvl) = filter.min_tvl {
        builder.push(" AND p.tvl >= ").push_bind(min_tvl);
    }
    if let Some(max_tvl) = filter.max_tvl {
        builder.push(" AND p.tvl <= ").push_bind(max_tvl);
    }
    if filter.scored_only {
        builder.push(" AND s.pool_id IS NOT NULL");
    }
}

#[derive(Debug, FromRow)]
struct PoolScoreRow {
    id: String,
    position: i64,
    chain: String,
    project: String,
    symbol: String,
    tvl: f64,
    apy: f64,
    score_pool_id: Option<String>,
    liquidity_score: Option<f64>,
    stability_score: Option<f64>,
    composite_score: Option<f64>,
    classification: Option<RiskLevel>,
    sample_size: Option<i64>,
    apy_mean: Option<f64>,
    apy_stdev: Option<f64>,
    tvl_mean: Option<f64>,
    tvl_cv: Option<f64>,
    computed_at: Option<DateTime<Utc>>,
}

impl PoolScoreRow {
    fn into_view(self) -> PoolRiskView {
        let score = match (
            self.score_pool_id,
            self.liquidity_score,
            self.stability_score,
            self.composite_score,
            self.classification,
            self.sample_size,
            self.computed_at,
        ) {
            (
                Some(pool_id),
                Some(liquidity_score),
                Some(stability_score),
                Some(composite_score),
                Some(classification),
                Some(sample_size),
                Some(computed_at),
            ) => Some(RiskScore {
                pool_id,
                liquidity_score,
                stability_score,
                composite_score,
                classification,
                sample_size,
                apy_mean: self.apy_mean.unwrap_or_default(),
                apy_stdev: self.apy_stdev.unwrap_or_default(),
                tvl_mean: self.tvl_mean.unwrap_or_default(),
                tvl_cv: self.tvl_cv.unwrap_or_default(),
                computed_at,
            }),
            _ => None,
        };

        PoolRiskView {
            id: self.id,
            position: self.position,
            chain: self.chain,
            project: self.project,
            symbol: self.symbol,
            tvl: self.tvl,
            apy: self.apy,
            risk: score.map(RiskStatus::Scored).unwrap_or(RiskStatus::Unscored),
        }
    }
}

fn registry_fields_differ(existing: &Pool, incoming: &NewPool) -> bool {
    existing.chain != incoming.chain
        || existing.project != incoming.project
        || existing.symbol != incoming.symbol
        || existing.tvl != incoming.tvl
        || existing.apy != incoming.apy
}

#[async_trait]
impl PoolRepository for SqliteStore {
    async fn apply_registry(
        &self,
        pools: &[NewPool],
        observed_at: DateTime<Utc>,
    ) -> Result<RegistryChanges, AppError> {
        let mut tx = self.pool.begin().await?;

        let existing: HashMap<String, Pool> =
            sqlx::query_as::<_, Pool>(&format!("SELECT {} FROM pools", POOL_COLUMNS))
                .fetch_all(&mut *tx)
                .await?
                .into_iter()
                .map(|pool| (pool.id.clone(), pool))
                .collect();

        let mut next_position = existing.values().map(|p| p.position).max().unwrap_or(0) + 1;
        let mut changes = RegistryChanges::default();
        let mut incoming_ids: HashSet<&str> = HashSet::with_capacity(pools.len());

        for pool in pools {
            if !incoming_ids.insert(pool.id.as_str()) {
                continue;
            }

            match existing.get(&pool.id) {
                None => {
                    sqlx::query(
                        r#"
                        INSERT INTO pools (
                            id, position, chain, project, symbol, tvl, apy,
                            eligible, needs_scoring, first_seen, last_updated
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, 0, ?8, ?8)
                        "#,
                    )
                    .bind(&pool.id)
                    .bind(next_position)
                    .bind(&pool.chain)
                    .bind(&pool.project)
                    .bind(&pool.symbol)
                    .bind(pool.tvl)
                    .bind(pool.apy)
                    .bind(observed_at)
                    .execute(&mut *tx)
                    .await?;

                    next_position += 1;
                    changes.added += 1;
                }
                Some(current) if !current.eligible || registry_fields_differ(current, pool) => {
                    sqlx::query(
                        r#"
                        UPDATE pools
                        SET chain = ?2, project = ?3, symbol = ?4, tvl = ?5, apy = ?6,
                            eligible = 1, last_updated = ?7
                        WHERE id = ?1
                        "#,
                    )
                    .bind(&pool.id)
                    .bind(&pool.chain)
                    .bind(&pool.project)
                    .bind(&pool.symbol)
                    .bind(pool.tvl)
                    .bind(pool.apy)
                    .bind(observed_at)
                    .execute(&mut *tx)
                    .await?;

                    changes.updated += 1;
                }
                Some(_) => changes.unchanged += 1,
            }
        }

        for current in existing.values() {
            if current.eligible && !incoming_ids.contains(current.id.as_str()) {
                sqlx::query("UPDATE pools SET eligible = 0, last_updated = ?2 WHERE id = ?1")
                    .bind(&current.id)
                    .bind(observed_at)
                    .execute(&mut *tx)
                    .await?;

                changes.marked_ineligible += 1;
            }
        }

        tx.commit().await?;

        info!(
            added = changes.added,
            updated = changes.updated,
            unchanged = changes.unchanged,
            marked_ineligible = changes.marked_ineligible,
            "Registry snapshot applied"
        );

        Ok(changes)
    }

    async fn get_pool(&self, pool_id: &str) -> Result<Option<Pool>, AppError> {
        let pool = sqlx::query_as::<_, Pool>(&format!("SELECT {} FROM pools WHERE id = ?1", POOL_COLUMNS))
            .bind(pool_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(pool)
    }

    async fn pools_by_ids(&self, pool_ids: &[String]) -> Result<Vec<Pool>, AppError> {
        if pool_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM pools WHERE id IN (", POOL_COLUMNS));
        let mut separated = builder.separated(", ");
        for pool_id in pool_ids {
            separated.push_bind(pool_id.clone());
        }
        separated.push_unseparated(") ORDER BY position ASC");

        let pools = builder.build_query_as::<Pool>().fetch_all(&self.pool).await?;
        Ok(pools)
    }

    async fn eligible_pools(&self) -> Result<Vec<Pool>, AppError> {
        let pools = sqlx::query_as::<_, Pool>(&format!(
            "SELECT {} FROM pools WHERE eligible = 1 ORDER BY position ASC",
            POOL_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(pools)
    }

    async fn pools_needing_scoring(&self) -> Result<Vec<Pool>, AppError> {
        let pools = sqlx::query_as::<_, Pool>(&format!(
            "SELECT {} FROM pools WHERE eligible = 1 AND needs_scoring = 1 ORDER BY position ASC",
            POOL_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(pools)
    }
}

#[async_trait]
impl MetricRepository for SqliteStore {
    async fn upsert_points(&self, pool_id: &str, points: &[MetricPoint]) -> Result<u64, AppError> {
        if points.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut changed = 0u64;

        for point in points {
            let result = sqlx::query(
                r#"
                INSERT INTO metric_points (pool_id, date, apy, tvl, apy_base, apy_reward, il_7d)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT (pool_id, date) DO UPDATE SET
                    apy = excluded.apy,
                    tvl = excluded.tvl,
                    apy_base = excluded.apy_base,
                    apy_reward = excluded.apy_reward,
                    il_7d = excluded.il_7d
                WHERE metric_points.apy IS NOT excluded.apy
                   OR metric_points.tvl IS NOT excluded.tvl
                   OR metric_points.apy_base IS NOT excluded.apy_base
                   OR metric_points.apy_reward IS NOT excluded.apy_reward
                   OR metric_points.il_7d IS NOT excluded.il_7d
                "#,
            )
            .bind(pool_id)
            .bind(point.date)
            .bind(point.apy)
            .bind(point.tvl)
            .bind(point.apy_base)
            .bind(point.apy_reward)
            .bind(point.il_7d)
            .execute(&mut *tx)
            .await?;

            changed += result.rows_affected();
        }

        if changed > 0 {
            sqlx::query("UPDATE pools SET needs_scoring = 1 WHERE id = ?1")
                .bind(pool_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        debug!(pool_id, submitted = points.len(), changed, "Metric points upserted");
        Ok(changed)
    }

    async fn recent_points(&self, pool_id: &str, limit: usize) -> Result<Vec<MetricPoint>, AppError> {
        let mut points = sqlx::query_as::<_, MetricPoint>(&format!(
            "SELECT {} FROM metric_points WHERE pool_id = ?1 ORDER BY date DESC LIMIT ?2",
            METRIC_COLUMNS
        ))
        .bind(pool_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        points.reverse();
        Ok(points)
    }

    async fn dates_between(
        &self,
        pool_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeSet<NaiveDate>, AppError> {
        let dates = sqlx::query_scalar::<_, NaiveDate>(
            "SELECT date FROM metric_points WHERE pool_id = ?1 AND date >= ?2 AND date <= ?3",
        )
        .bind(pool_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(dates.into_iter().collect())
    }

    async fn count_points(&self, pool_id: &str) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM metric_points WHERE pool_id = ?1")
            .bind(pool_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[async_trait]
impl RiskScoreRepository for SqliteStore {
    async fn replace_score(&self, pool_id: &str, score: Option<&RiskScore>) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM risk_scores WHERE pool_id = ?1")
            .bind(pool_id)
            .execute(&mut *tx)
            .await?;

        if let Some(score) = score {
            sqlx::query(&format!(
                "INSERT INTO risk_scores ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                SCORE_COLUMNS
            ))
            .bind(pool_id)
            .bind(score.liquidity_score)
            .bind(score.stability_score)
            .bind(score.composite_score)
            .bind(score.classification)
            .bind(score.sample_size)
            .bind(score.apy_mean)
            .bind(score.apy_stdev)
            .bind(score.tvl_mean)
            .bind(score.tvl_cv)
            .bind(score.computed_at)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE pools SET needs_scoring = 0 WHERE id = ?1")
            .bind(pool_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_score(&self, pool_id: &str) -> Result<Option<RiskScore>, AppError> {
        let score = sqlx::query_as::<_, RiskScore>(&format!(
            "SELECT {} FROM risk_scores WHERE pool_id = ?1",
            SCORE_COLUMNS
        ))
        .bind(pool_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(score)
    }
}

#[async_trait]
impl CheckpointRepository for SqliteStore {
    async fn load_checkpoint(&self) -> Result<Option<CollectionCheckpoint>, AppError> {
        let checkpoint = sqlx::query_as::<_, CollectionCheckpoint>(
            "SELECT run_id, run_fingerprint, last_pool_id, last_position, started_at FROM checkpoints WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(checkpoint)
    }

    async fn save_checkpoint(&self, checkpoint: &CollectionCheckpoint) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO checkpoints (id, run_id, run_fingerprint, last_pool_id, last_position, started_at)
            VALUES (1, ?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (id) DO UPDATE SET
                run_id = excluded.run_id,
                run_fingerprint = excluded.run_fingerprint,
                last_pool_id = excluded.last_pool_id,
                last_position = excluded.last_position,
                started_at = excluded.started_at
            "#,
        )
        .bind(&checkpoint.run_id)
        .bind(&checkpoint.run_fingerprint)
        .bind(&checkpoint.last_pool_id)
        .bind(checkpoint.last_position)
        .bind(checkpoint.started_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::CheckpointWriteFailure(e.to_string()))?;

        Ok(())
    }

    async fn clear_checkpoint(&self) -> Result<(), AppError> {
        sqlx::query("DELETE FROM checkpoints WHERE id = 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::CheckpointWriteFailure(e.to_string()))?;

        Ok(())
    }
}
