use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{RiskLevel, RiskScore};

/// Filters accepted by the read query surface. All bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolFilter {
    pub chain: Option<String>,
    pub project: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub min_apy: Option<f64>,
    pub max_apy: Option<f64>,
    pub min_tvl: Option<f64>,
    pub max_tvl: Option<f64>,
    #[serde(default)]
    pub scored_only: bool,
}

/// Either the latest score or an explicit unscored marker; never a placeholder number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RiskStatus {
    Scored(RiskScore),
    Unscored,
}

impl RiskStatus {
    pub fn score(&self) -> Option<&RiskScore> {
        match self {
            RiskStatus::Scored(score) => Some(score),
            RiskStatus::Unscored => None,
        }
    }
}

/// An eligible pool joined with its risk status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolRiskView {
    pub id: String,
    pub position: i64,
    pub chain: String,
    pub project: String,
    pub symbol: String,
    pub tvl: f64,
    pub apy: f64,
    pub risk: RiskStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub eligible_pools: usize,
    pub scored_pools: usize,
    pub unscored_pools: usize,
    pub by_level: BTreeMap<String, usize>,
    pub mean_apy: Option<f64>,
    pub mean_tvl: Option<f64>,
    pub mean_composite_score: Option<f64>,
}

impl RiskSummary {
    pub fn from_views(views: &[PoolRiskView]) -> Self {
        let mut by_level: BTreeMap<String, usize> = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High]
            .iter()
            .map(|level| (level.as_str().to_string(), 0))
            .collect();

        let scores: Vec<&RiskScore> = views.iter().filter_map(|view| view.risk.score()).collect();
        for score in &scores {
            *by_level.entry(score.classification.as_str().to_string()).or_insert(0) += 1;
        }

        Self {
            eligible_pools: views.len(),
            scored_pools: scores.len(),
            unscored_pools: views.len() - scores.len(),
            by_level,
            mean_apy: mean(views.iter().map(|view| view.apy)),
            mean_tvl: mean(views.iter().map(|view| view.tvl)),
            mean_composite_score: mean(scores.iter().map(|score| score.composite_score)),
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}
