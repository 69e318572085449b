use chrono::{NaiveDate, Utc};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::database::{CheckpointRepository, MetricRepository, PoolRepository};
use crate::error::{with_retry, AppError, FetchError, RetryPolicy};
use crate::models::{
    ChartEntry, CollectionCheckpoint, CollectionReport, FailureReason, HistoryWindow, MetricPoint,
};
use crate::services::YieldsProvider;
use crate::utils::time::parse_upstream_date;
use crate::utils::RequestPacer;

/// One pool to collect. `only_dates` narrows the write to specific dates
/// (used by incremental updates); `None` keeps everything inside the window.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionTarget {
    pub pool_id: String,
    pub only_dates: Option<BTreeSet<NaiveDate>>,
}

impl CollectionTarget {
    pub fn full(pool_id: impl Into<String>) -> Self {
        Self {
            pool_id: pool_id.into(),
            only_dates: None,
        }
    }

    pub fn dates(pool_id: impl Into<String>, dates: BTreeSet<NaiveDate>) -> Self {
        Self {
            pool_id: pool_id.into(),
            only_dates: Some(dates),
        }
    }
}

/// Sequential, paced, resumable collector of per-pool daily history.
pub struct HistoricalCollector {
    provider: Arc<dyn YieldsProvider>,
    pools: Arc<dyn PoolRepository>,
    metrics: Arc<dyn MetricRepository>,
    checkpoints: Arc<dyn CheckpointRepository>,
    pacer: Arc<RequestPacer>,
    retry_policy: RetryPolicy,
}

impl HistoricalCollector {
    pub fn new(
        provider: Arc<dyn YieldsProvider>,
        pools: Arc<dyn PoolRepository>,
        metrics: Arc<dyn MetricRepository>,
        checkpoints: Arc<dyn CheckpointRepository>,
        pacer: Arc<RequestPacer>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            pools,
            metrics,
            checkpoints,
            pacer,
            retry_policy,
        }
    }

    /// Collect every eligible pool in registry order, optionally only the first `limit`.
    pub async fn collect_eligible(
        &self,
        window: HistoryWindow,
        limit: Option<usize>,
    ) -> Result<CollectionReport, AppError> {
        let mut pools = self.pools.eligible_pools().await?;
        if let Some(limit) = limit {
            pools.truncate(limit);
        }

        let targets = pools.into_iter().map(|pool| CollectionTarget::full(pool.id)).collect();
        self.collect_targets(targets, window).await
    }

    pub async fn collect(
        &self,
        pool_ids: &[String],
        window: HistoryWindow,
    ) -> Result<CollectionReport, AppError> {
        let targets = pool_ids.iter().map(CollectionTarget::full).collect();
        self.collect_targets(targets, window).await
    }

    /// Fetch, validate and store history for each target in registry order.
    ///
    /// Per-pool failures are recorded in the report and never abort the run.
    /// A checkpoint is written after every processed pool. If one left by an
    /// interrupted run with the same window and targets exists, its run id is
    /// reused and pools at or before its position are skipped; a checkpoint
    /// from any other run is ignored. Failing to write or clear the checkpoint aborts
    /// with [`AppError::CheckpointWriteFailure`].
    pub async fn collect_targets(
        &self,
        targets: Vec<CollectionTarget>,
        window: HistoryWindow,
    ) -> Result<CollectionReport, AppError> {
        let fingerprint = run_fingerprint(&targets, window);
        let mut targets_by_id: HashMap<String, CollectionTarget> = targets
            .into_iter()
            .map(|target| (target.pool_id.clone(), target))
            .collect();

        let requested: Vec<String> = targets_by_id.keys().cloned().collect();
        let pools = self.pools.pools_by_ids(&requested).await?;
        let unknown = requested.len().saturating_sub(pools.len());
        if unknown > 0 {
            warn!(unknown, "Skipping pools missing from the registry");
        }

        let checkpoint = match self.checkpoints.load_checkpoint().await? {
            Some(checkpoint) if checkpoint.run_fingerprint == fingerprint => {
                info!(
                    run_id = %checkpoint.run_id,
                    last_pool_id = %checkpoint.last_pool_id,
                    last_position = checkpoint.last_position,
                    "Resuming interrupted collection run"
                );
                Some(checkpoint)
            }
            Some(stale) => {
                warn!(
                    run_id = %stale.run_id,
                    last_pool_id = %stale.last_pool_id,
                    "Ignoring checkpoint of a different collection run; starting fresh"
                );
                None
            }
            None => None,
        };
        let (run_id, started_at, resume_after) = match &checkpoint {
            Some(checkpoint) => (checkpoint.run_id.clone(), checkpoint.started_at, Some(checkpoint.last_position)),
            None => (Uuid::new_v4().to_string(), Utc::now(), None),
        };
        let mut owns_checkpoint = checkpoint.is_some();

        let mut report = CollectionReport {
            run_id: run_id.clone(),
            skipped: unknown,
            resumed_from: checkpoint.map(|checkpoint| checkpoint.last_pool_id),
            ..Default::default()
        };

        info!(
            run_id = %run_id,
            pools = pools.len(),
            window_start = %window.start,
            window_end = %window.end,
            "Starting collection run"
        );

        for pool in pools {
            if resume_after.is_some_and(|last_position| pool.position <= last_position) {
                debug!(pool_id = %pool.id, position = pool.position, "Already collected by interrupted run");
                report.skipped += 1;
                continue;
            }

            let only_dates = targets_by_id
                .remove(&pool.id)
                .and_then(|target| target.only_dates);

            match self.collect_pool(&pool.id, window, only_dates.as_ref()).await? {
                Ok(written) => {
                    info!(pool_id = %pool.id, points_written = written, "Pool history collected");
                    report.record_fetched(&pool.id, written);
                }
                Err((reason, detail)) => {
                    warn!(pool_id = %pool.id, reason = %reason, detail = %detail, "Pool collection failed");
                    report.record_failure(&pool.id, reason, detail);
                }
            }

            let checkpoint = CollectionCheckpoint {
                run_id: run_id.clone(),
                run_fingerprint: fingerprint.clone(),
                last_pool_id: pool.id.clone(),
                last_position: pool.position,
                started_at,
            };
            self.checkpoints
                .save_checkpoint(&checkpoint)
                .await
                .map_err(checkpoint_failure)?;
            owns_checkpoint = true;
        }

        // a run that processed nothing leaves another run's checkpoint in place
        if owns_checkpoint {
            self.checkpoints
                .clear_checkpoint()
                .await
                .map_err(checkpoint_failure)?;
        }

        info!(
            run_id = %report.run_id,
            fetched = report.fetched,
            skipped = report.skipped,
            failed = report.failed,
            points_written = report.points_written,
            "Collection run finished"
        );

        Ok(report)
    }

    /// Outer error: the store failed and the run must stop.
    /// Inner error: this pool failed and the run continues.
    async fn collect_pool(
        &self,
        pool_id: &str,
        window: HistoryWindow,
        only_dates: Option<&BTreeSet<NaiveDate>>,
    ) -> Result<Result<u64, (FailureReason, String)>, AppError> {
        let provider = self.provider.as_ref();
        let pacer = self.pacer.as_ref();

        let fetched = with_retry("fetch_pool_chart", &self.retry_policy, move || async move {
            pacer.acquire().await;
            provider.fetch_pool_chart(pool_id).await
        })
        .await;

        let entries = match fetched {
            Ok(entries) => entries,
            Err(e) => return Ok(Err(classify_fetch_failure(e))),
        };

        let points = match validate_chart(pool_id, entries) {
            Ok(points) => points,
            Err(detail) => return Ok(Err((FailureReason::BadPayload, detail))),
        };

        let selected: Vec<MetricPoint> = points
            .into_iter()
            .filter(|point| window.contains(point.date))
            .filter(|point| only_dates.map_or(true, |dates| dates.contains(&point.date)))
            .collect();

        let written = self.metrics.upsert_points(pool_id, &selected).await.map_err(|e| {
            error!(pool_id, error = %e, "Failed to store metric points");
            e
        })?;

        Ok(Ok(written))
    }
}

/// Stable identity of a run: its window plus every target and requested date,
/// independent of target order.
fn run_fingerprint(targets: &[CollectionTarget], window: HistoryWindow) -> String {
    let mut sorted: Vec<&CollectionTarget> = targets.iter().collect();
    sorted.sort_by(|a, b| a.pool_id.cmp(&b.pool_id));

    let mut hasher = Sha256::new();
    hasher.update(format!("window:{}..{}\n", window.start, window.end));
    for target in sorted {
        let dates = match &target.only_dates {
            Some(dates) => dates.iter().map(|date| date.to_string()).collect::<Vec<_>>().join(","),
            None => "*".to_string(),
        };
        hasher.update(format!("{}:{}\n", target.pool_id, dates));
    }
    hex::encode(hasher.finalize())
}

fn classify_fetch_failure(error: FetchError) -> (FailureReason, String) {
    let reason = match &error {
        FetchError::RateLimited => FailureReason::RateLimitExhausted,
        FetchError::Transient(_) | FetchError::Rejected { .. } => FailureReason::UpstreamUnavailable,
        FetchError::Malformed(_) => FailureReason::BadPayload,
    };
    (reason, error.to_string())
}

fn checkpoint_failure(error: AppError) -> AppError {
    let error = match error {
        AppError::CheckpointWriteFailure(detail) => AppError::CheckpointWriteFailure(detail),
        other => AppError::CheckpointWriteFailure(other.to_string()),
    };
    error!(error = %error, "Aborting collection run");
    error
}

/// Turn a chart payload into one point per calendar date. Any entry without a
/// parseable timestamp, a finite APY, or a finite non-negative TVL rejects the
/// whole payload. Later entries for the same date replace earlier ones.
pub fn validate_chart(pool_id: &str, entries: Vec<ChartEntry>) -> Result<Vec<MetricPoint>, String> {
    let mut by_date: BTreeMap<NaiveDate, MetricPoint> = BTreeMap::new();

    for (index, entry) in entries.into_iter().enumerate() {
        let raw = entry
            .timestamp
            .as_deref()
            .ok_or_else(|| format!("entry {} has no timestamp", index))?;
        let date = parse_upstream_date(raw)
            .ok_or_else(|| format!("entry {} has unparseable timestamp '{}'", index, raw))?;
        let apy = entry
            .apy
            .filter(|apy| apy.is_finite())
            .ok_or_else(|| format!("entry {} ({}) has no finite apy", index, date))?;
        let tvl = entry
            .tvl_usd
            .filter(|tvl| tvl.is_finite() && *tvl >= 0.0)
            .ok_or_else(|| format!("entry {} ({}) has no valid tvl", index, date))?;

        by_date.insert(
            date,
            MetricPoint {
                pool_id: pool_id.to_string(),
                date,
                apy,
                tvl,
                apy_base: entry.apy_base.filter(|v| v.is_finite()),
                apy_reward: entry.apy_reward.filter(|v| v.is_finite()),
                il_7d: entry.il7d.filter(|v| v.is_finite()),
            },
        );
    }

    Ok(by_date.into_values().collect())
}
