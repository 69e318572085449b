#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

use defi_yield_risk::{
    database::{
        establish_connection, run_migrations, CheckpointRepository, MetricRepository, PoolRepository,
        RegistryChanges, SqliteStore,
    },
    error::{FetchError, RetryPolicy},
    models::{ChartEntry, CollectionCheckpoint, MetricPoint, NewPool, Pool, PoolListing},
    services::YieldsProvider,
    utils::RequestPacer,
    AppError,
};

pub async fn test_store() -> (Arc<SqliteStore>, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("yields.db").display());
    let pool = establish_connection(&url, 1).await.expect("connect");
    run_migrations(&pool).await.expect("migrate");
    (Arc::new(SqliteStore::new(pool)), dir)
}

/// Same schedule shape as production (3 retries, doubling) but millisecond waits.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(5), 2.0)
}

pub fn no_pacing() -> Arc<RequestPacer> {
    Arc::new(RequestPacer::new(Duration::ZERO))
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
}

pub fn listing(id: &str, chain: &str, symbol: &str, tvl: f64, apy: f64) -> PoolListing {
    PoolListing {
        pool: Some(id.to_string()),
        chain: Some(chain.to_string()),
        project: Some("aave-v3".to_string()),
        symbol: Some(symbol.to_string()),
        tvl_usd: Some(tvl),
        apy: Some(apy),
    }
}

/// One entry per day from `start`, APY drifting by `apy_step` a day.
pub fn daily_chart(start: NaiveDate, days: usize, apy: f64, apy_step: f64, tvl: f64) -> Vec<ChartEntry> {
    (0..days)
        .map(|i| {
            let day = start + ChronoDuration::days(i as i64);
            ChartEntry {
                timestamp: Some(format!("{}T00:00:00.000Z", day)),
                tvl_usd: Some(tvl),
                apy: Some(apy + apy_step * i as f64),
                apy_base: Some(apy),
                apy_reward: None,
                il7d: None,
            }
        })
        .collect()
}

/// Scripted in-process provider. Steady chart responses per pool, optional
/// one-shot scripted results consumed first, and an optional pool on which
/// every request hangs forever.
#[derive(Default)]
pub struct FakeProvider {
    listing: Mutex<VecDeque<Result<Vec<PoolListing>, FetchError>>>,
    charts: Mutex<HashMap<String, Vec<ChartEntry>>>,
    scripted: Mutex<HashMap<String, VecDeque<Result<Vec<ChartEntry>, FetchError>>>>,
    hang_on: Mutex<Option<String>>,
    calls: Mutex<Vec<String>>,
    chart_started: Mutex<Vec<(String, Instant)>>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue registry responses; the last one repeats.
    pub fn push_listing(&self, result: Result<Vec<PoolListing>, FetchError>) {
        self.listing.lock().unwrap().push_back(result);
    }

    pub fn set_chart(&self, pool_id: &str, entries: Vec<ChartEntry>) {
        self.charts.lock().unwrap().insert(pool_id.to_string(), entries);
    }

    pub fn script_chart(&self, pool_id: &str, results: Vec<Result<Vec<ChartEntry>, FetchError>>) {
        self.scripted
            .lock()
            .unwrap()
            .insert(pool_id.to_string(), results.into_iter().collect());
    }

    pub fn hang_on(&self, pool_id: &str) {
        *self.hang_on.lock().unwrap() = Some(pool_id.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn chart_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| call.strip_prefix("chart:").map(str::to_string))
            .collect()
    }

    pub fn chart_calls_for(&self, pool_id: &str) -> usize {
        self.chart_calls().iter().filter(|id| *id == pool_id).count()
    }

    /// Start time of every chart request, in call order.
    pub fn chart_call_times(&self) -> Vec<(String, Instant)> {
        self.chart_started.lock().unwrap().clone()
    }

    pub fn listing_calls(&self) -> usize {
        self.calls().iter().filter(|call| *call == "pools").count()
    }
}

#[async_trait]
impl YieldsProvider for FakeProvider {
    async fn fetch_pools(&self) -> Result<Vec<PoolListing>, FetchError> {
        self.calls.lock().unwrap().push("pools".to_string());

        let mut listing = self.listing.lock().unwrap();
        if listing.len() > 1 {
            listing.pop_front().unwrap_or(Ok(Vec::new()))
        } else {
            listing.front().cloned().unwrap_or(Ok(Vec::new()))
        }
    }

    async fn fetch_pool_chart(&self, pool_id: &str) -> Result<Vec<ChartEntry>, FetchError> {
        self.calls.lock().unwrap().push(format!("chart:{}", pool_id));
        self.chart_started
            .lock()
            .unwrap()
            .push((pool_id.to_string(), Instant::now()));

        let hang = self.hang_on.lock().unwrap().as_deref() == Some(pool_id);
        if hang {
            std::future::pending::<()>().await;
        }

        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(pool_id)
            .and_then(|queue| queue.pop_front());
        if let Some(result) = scripted {
            return result;
        }

        self.charts
            .lock()
            .unwrap()
            .get(pool_id)
            .cloned()
            .ok_or(FetchError::Rejected { status: 404 })
    }
}

/// Checkpoint store whose writes fail after `successful_saves` saves.
pub struct FailingCheckpoints {
    inner: Arc<SqliteStore>,
    successful_saves: usize,
    saves: Mutex<usize>,
}

impl FailingCheckpoints {
    pub fn new(inner: Arc<SqliteStore>, successful_saves: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            successful_saves,
            saves: Mutex::new(0),
        })
    }
}

#[async_trait]
impl CheckpointRepository for FailingCheckpoints {
    async fn load_checkpoint(&self) -> Result<Option<CollectionCheckpoint>, AppError> {
        self.inner.load_checkpoint().await
    }

    async fn save_checkpoint(&self, checkpoint: &CollectionCheckpoint) -> Result<(), AppError> {
        let allowed = {
            let mut saves = self.saves.lock().unwrap();
            *saves += 1;
            *saves <= self.successful_saves
        };

        if allowed {
            self.inner.save_checkpoint(checkpoint).await
        } else {
            Err(AppError::DatabaseError("disk I/O error".to_string()))
        }
    }

    async fn clear_checkpoint(&self) -> Result<(), AppError> {
        self.inner.clear_checkpoint().await
    }
}

/// Registry, metrics and checkpoint held in memory. Never yields to the
/// runtime, so tests on a paused clock only see the collector's own waits.
#[derive(Default)]
pub struct MemoryStore {
    pools: Mutex<Vec<Pool>>,
    points: Mutex<BTreeMap<(String, NaiveDate), MetricPoint>>,
    checkpoint: Mutex<Option<CollectionCheckpoint>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

fn registered(pool: &NewPool, position: i64, now: DateTime<Utc>) -> Pool {
    Pool {
        id: pool.id.clone(),
        position,
        chain: pool.chain.clone(),
        project: pool.project.clone(),
        symbol: pool.symbol.clone(),
        tvl: pool.tvl,
        apy: pool.apy,
        eligible: true,
        needs_scoring: false,
        first_seen: now,
        last_updated: now,
    }
}

#[async_trait]
impl PoolRepository for MemoryStore {
    async fn apply_registry(
        &self,
        pools: &[NewPool],
        observed_at: DateTime<Utc>,
    ) -> Result<RegistryChanges, AppError> {
        let mut stored = self.pools.lock().unwrap();
        let mut changes = RegistryChanges::default();
        for pool in pools {
            match stored.iter_mut().find(|existing| existing.id == pool.id) {
                Some(existing) => {
                    existing.eligible = true;
                    changes.unchanged += 1;
                }
                None => {
                    let position = stored.len() as i64 + 1;
                    stored.push(registered(pool, position, observed_at));
                    changes.added += 1;
                }
            }
        }
        Ok(changes)
    }

    async fn get_pool(&self, pool_id: &str) -> Result<Option<Pool>, AppError> {
        Ok(self.pools.lock().unwrap().iter().find(|pool| pool.id == pool_id).cloned())
    }

    async fn pools_by_ids(&self, pool_ids: &[String]) -> Result<Vec<Pool>, AppError> {
        Ok(self
            .pools
            .lock()
            .unwrap()
            .iter()
            .filter(|pool| pool_ids.contains(&pool.id))
            .cloned()
            .collect())
    }

    async fn eligible_pools(&self) -> Result<Vec<Pool>, AppError> {
        Ok(self.pools.lock().unwrap().iter().filter(|pool| pool.eligible).cloned().collect())
    }

    async fn pools_needing_scoring(&self) -> Result<Vec<Pool>, AppError> {
        Ok(self
            .pools
            .lock()
            .unwrap()
            .iter()
            .filter(|pool| pool.eligible && pool.needs_scoring)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MetricRepository for MemoryStore {
    async fn upsert_points(&self, pool_id: &str, points: &[MetricPoint]) -> Result<u64, AppError> {
        let mut stored = self.points.lock().unwrap();
        let mut changed = 0;
        for point in points {
            let key = (pool_id.to_string(), point.date);
            if stored.get(&key) != Some(point) {
                stored.insert(key, point.clone());
                changed += 1;
            }
        }
        if changed > 0 {
            if let Some(pool) = self.pools.lock().unwrap().iter_mut().find(|pool| pool.id == pool_id) {
                pool.needs_scoring = true;
            }
        }
        Ok(changed)
    }

    async fn recent_points(&self, pool_id: &str, limit: usize) -> Result<Vec<MetricPoint>, AppError> {
        let stored = self.points.lock().unwrap();
        let mut points: Vec<MetricPoint> = stored
            .values()
            .filter(|point| point.pool_id == pool_id)
            .rev()
            .take(limit)
            .cloned()
            .collect();
        points.reverse();
        Ok(points)
    }

    async fn dates_between(
        &self,
        pool_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeSet<NaiveDate>, AppError> {
        Ok(self
            .points
            .lock()
            .unwrap()
            .values()
            .filter(|point| point.pool_id == pool_id && point.date >= start && point.date <= end)
            .map(|point| point.date)
            .collect())
    }

    async fn count_points(&self, pool_id: &str) -> Result<i64, AppError> {
        Ok(self
            .points
            .lock()
            .unwrap()
            .values()
            .filter(|point| point.pool_id == pool_id)
            .count() as i64)
    }
}

#[async_trait]
impl CheckpointRepository for MemoryStore {
    async fn load_checkpoint(&self) -> Result<Option<CollectionCheckpoint>, AppError> {
        Ok(self.checkpoint.lock().unwrap().clone())
    }

    async fn save_checkpoint(&self, checkpoint: &CollectionCheckpoint) -> Result<(), AppError> {
        *self.checkpoint.lock().unwrap() = Some(checkpoint.clone());
        Ok(())
    }

    async fn clear_checkpoint(&self) -> Result<(), AppError> {
        *self.checkpoint.lock().unwrap() = None;
        Ok(())
    }
}
