use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use crate::database::{MetricRepository, PoolRepository};
use crate::error::AppError;
use crate::models::{HistoryWindow, UpdateReport};
use crate::services::{CollectionTarget, HistoricalCollector, ScoringService};

/// Brings the store up to date for a reference date: fetch only the missing
/// dates, then rescore the pools whose history changed.
pub struct UpdateOrchestrator {
    pools: Arc<dyn PoolRepository>,
    metrics: Arc<dyn MetricRepository>,
    collector: Arc<HistoricalCollector>,
    scoring: Arc<ScoringService>,
    window_days: u32,
}

impl UpdateOrchestrator {
    pub fn new(
        pools: Arc<dyn PoolRepository>,
        metrics: Arc<dyn MetricRepository>,
        collector: Arc<HistoricalCollector>,
        scoring: Arc<ScoringService>,
        window_days: u32,
    ) -> Self {
        Self {
            pools,
            metrics,
            collector,
            scoring,
            window_days,
        }
    }

    /// Running this twice for the same `as_of` with no upstream change makes
    /// the second run a no-op.
    pub async fn run_incremental_update(&self, as_of: NaiveDate) -> Result<UpdateReport, AppError> {
        let window = HistoryWindow::trailing(as_of, self.window_days);
        let pools = self.pools.eligible_pools().await?;

        info!(
            %as_of,
            pools = pools.len(),
            window_days = self.window_days,
            "Starting incremental update"
        );

        let mut targets = Vec::new();
        let mut pools_up_to_date = 0;
        let mut dates_requested = 0;

        for pool in &pools {
            let stored = self
                .metrics
                .dates_between(&pool.id, window.start, window.end)
                .await?;
            let missing: BTreeSet<NaiveDate> =
                window.dates().filter(|date| !stored.contains(date)).collect();

            if missing.is_empty() {
                pools_up_to_date += 1;
            } else {
                dates_requested += missing.len();
                targets.push(CollectionTarget::dates(pool.id.clone(), missing));
            }
        }

        let collection = self.collector.collect_targets(targets, window).await?;
        let scoring = self.scoring.score_pending().await?;

        let report = UpdateReport {
            as_of,
            pools_considered: pools.len(),
            pools_up_to_date,
            dates_requested,
            collection,
            scoring,
        };

        info!(
            %as_of,
            pools_up_to_date = report.pools_up_to_date,
            dates_requested = report.dates_requested,
            points_written = report.collection.points_written,
            failed = report.collection.failed,
            scored = report.scoring.scored,
            "Incremental update finished"
        );

        Ok(report)
    }
}
