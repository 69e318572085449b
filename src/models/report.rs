use serde::{Deserialize, Serialize};
use chrono::NaiveDate;
use std::fmt;

/// Counts produced by one registry sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRefreshReport {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub filtered_out: usize,
    pub marked_ineligible: usize,
}

/// Why a single pool could not be collected. Never fatal to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    RateLimitExhausted,
    UpstreamUnavailable,
    BadPayload,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureReason::RateLimitExhausted => "RateLimitExhausted",
            FailureReason::UpstreamUnavailable => "UpstreamUnavailable",
            FailureReason::BadPayload => "BadPayload",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolFailure {
    pub pool_id: String,
    pub reason: FailureReason,
    pub detail: String,
}

/// Aggregate outcome of a collection run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionReport {
    pub run_id: String,
    /// Pools whose history was fetched and validated.
    pub fetched: usize,
    /// Pools passed over: already checkpointed by an interrupted run, or not in the registry.
    pub skipped: usize,
    pub failed: usize,
    /// Metric rows inserted or changed.
    pub points_written: u64,
    pub resumed_from: Option<String>,
    pub failures: Vec<PoolFailure>,
    /// Pools whose stored metric set changed during this run.
    pub changed_pools: Vec<String>,
}

impl CollectionReport {
    pub fn record_failure(&mut self, pool_id: &str, reason: FailureReason, detail: String) {
        self.failed += 1;
        self.failures.push(PoolFailure {
            pool_id: pool_id.to_string(),
            reason,
            detail,
        });
    }

    pub fn record_fetched(&mut self, pool_id: &str, points_written: u64) {
        self.fetched += 1;
        self.points_written += points_written;
        if points_written > 0 {
            self.changed_pools.push(pool_id.to_string());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringReport {
    pub scored: usize,
    pub insufficient_history: usize,
    pub unscored_pools: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub as_of: NaiveDate,
    pub pools_considered: usize,
    pub pools_up_to_date: usize,
    pub dates_requested: usize,
    pub collection: CollectionReport,
    pub scoring: ScoringReport,
}

impl UpdateReport {
    /// True when the update neither wrote metrics nor recomputed scores.
    pub fn is_noop(&self) -> bool {
        self.collection.points_written == 0
            && self.scoring.scored == 0
            && self.scoring.insufficient_history == 0
    }
}
