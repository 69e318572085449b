use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::database::{MetricRepository, PoolRepository, RiskScoreRepository};
use crate::error::AppError;
use crate::models::{Pool, RiskScore, ScoreOutcome, ScoringReport};
use crate::services::RiskCalculator;

/// Runs the calculator against stored history and persists the result.
pub struct ScoringService {
    pools: Arc<dyn PoolRepository>,
    metrics: Arc<dyn MetricRepository>,
    scores: Arc<dyn RiskScoreRepository>,
    calculator: RiskCalculator,
}

impl ScoringService {
    pub fn new(
        pools: Arc<dyn PoolRepository>,
        metrics: Arc<dyn MetricRepository>,
        scores: Arc<dyn RiskScoreRepository>,
        calculator: RiskCalculator,
    ) -> Self {
        Self {
            pools,
            metrics,
            scores,
            calculator,
        }
    }

    /// Score one pool and replace whatever score it had. Pools with too little
    /// history lose any previous score and become unscored.
    pub async fn score_pool(&self, pool: &Pool) -> Result<ScoreOutcome, AppError> {
        let window = self.calculator.settings().score_window;
        let history = self.metrics.recent_points(&pool.id, window).await?;

        match self.calculator.score(&history) {
            Ok(assessment) => {
                let score = RiskScore::new(&pool.id, assessment, Utc::now());
                self.scores.replace_score(&pool.id, Some(&score)).await?;
                debug!(
                    pool_id = %pool.id,
                    composite_score = score.composite_score,
                    classification = %score.classification,
                    "Pool scored"
                );
                Ok(ScoreOutcome::Scored(score))
            }
            Err(insufficient) => {
                self.scores.replace_score(&pool.id, None).await?;
                debug!(pool_id = %pool.id, %insufficient, "Pool left unscored");
                Ok(ScoreOutcome::InsufficientHistory(insufficient))
            }
        }
    }

    /// Rescore eligible pools whose metric set changed since their last scoring.
    pub async fn score_pending(&self) -> Result<ScoringReport, AppError> {
        let pools = self.pools.pools_needing_scoring().await?;
        self.score_pools(&pools).await
    }

    /// Rescore every eligible pool regardless of pending changes.
    pub async fn score_all(&self) -> Result<ScoringReport, AppError> {
        let pools = self.pools.eligible_pools().await?;
        self.score_pools(&pools).await
    }

    async fn score_pools(&self, pools: &[Pool]) -> Result<ScoringReport, AppError> {
        let mut report = ScoringReport::default();

        for pool in pools {
            match self.score_pool(pool).await? {
                ScoreOutcome::Scored(_) => report.scored += 1,
                ScoreOutcome::InsufficientHistory(_) => {
                    report.insufficient_history += 1;
                    report.unscored_pools.push(pool.id.clone());
                }
            }
        }

        info!(
            scored = report.scored,
            insufficient_history = report.insufficient_history,
            "Scoring pass finished"
        );

        Ok(report)
    }
}
