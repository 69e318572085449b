use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Lower bounds are inclusive: a score equal to `low_threshold` is Medium,
    /// a score equal to `high_threshold` is High.
    pub fn classify(score: f64, low_threshold: f64, high_threshold: f64) -> Self {
        if score < low_threshold {
            RiskLevel::Low
        } else if score < high_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(format!("unknown risk level: {}", other)),
        }
    }
}

/// Output of the risk model for one metric history. Pure data; carries no
/// identity or timestamp so repeated evaluation compares equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub liquidity_score: f64,
    pub stability_score: f64,
    pub composite_score: f64,
    pub classification: RiskLevel,
    pub sample_size: usize,
    pub apy_mean: f64,
    pub apy_stdev: f64,
    pub tvl_mean: f64,
    pub tvl_cv: f64,
}

/// Persisted risk score, one row per pool, replaced wholesale on recompute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RiskScore {
    pub pool_id: String,
    pub liquidity_score: f64,
    pub stability_score: f64,
    pub composite_score: f64,
    pub classification: RiskLevel,
    pub sample_size: i64,
    pub apy_mean: f64,
    pub apy_stdev: f64,
    pub tvl_mean: f64,
    pub tvl_cv: f64,
    pub computed_at: DateTime<Utc>,
}

impl RiskScore {
    pub fn new(pool_id: &str, assessment: RiskAssessment, computed_at: DateTime<Utc>) -> Self {
        Self {
            pool_id: pool_id.to_string(),
            liquidity_score: assessment.liquidity_score,
            stability_score: assessment.stability_score,
            composite_score: assessment.composite_score,
            classification: assessment.classification,
            sample_size: assessment.sample_size as i64,
            apy_mean: assessment.apy_mean,
            apy_stdev: assessment.apy_stdev,
            tvl_mean: assessment.tvl_mean,
            tvl_cv: assessment.tvl_cv,
            computed_at,
        }
    }
}

/// Not enough stored observations to score a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsufficientHistory {
    pub available: usize,
    pub required: usize,
}

impl fmt::Display for InsufficientHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "insufficient history: {} observations, {} required",
            self.available, self.required
        )
    }
}

/// Result of scoring one pool against the store.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Scored(RiskScore),
    InsufficientHistory(InsufficientHistory),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_bands_are_lower_bound_inclusive() {
        assert_eq!(RiskLevel::classify(29.999, 30.0, 60.0), RiskLevel::Low);
        assert_eq!(RiskLevel::classify(30.0, 30.0, 60.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::classify(59.999, 30.0, 60.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::classify(60.0, 30.0, 60.0), RiskLevel::High);
        assert_eq!(RiskLevel::classify(100.0, 30.0, 60.0), RiskLevel::High);
        assert_eq!(RiskLevel::classify(0.0, 30.0, 60.0), RiskLevel::Low);
    }

    #[test]
    fn test_risk_level_round_trips_through_str() {
        for level in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High] {
            assert_eq!(level.as_str().parse::<RiskLevel>().unwrap(), level);
        }
        assert!("extreme".parse::<RiskLevel>().is_err());
    }
}
