use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{DateTime, Utc};

/// A yield pool as tracked in the registry. Rows are never deleted; pools
/// that drop out of the eligibility filter are flagged `eligible = false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Pool {
    pub id: String,
    /// Stable registry position, assigned on first insertion. Defines the
    /// collection order.
    pub position: i64,
    pub chain: String,
    pub project: String,
    pub symbol: String,
    pub tvl: f64,
    pub apy: f64,
    pub eligible: bool,
    pub needs_scoring: bool,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// A registry entry that passed the eligibility filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPool {
    pub id: String,
    pub chain: String,
    pub project: String,
    pub symbol: String,
    pub tvl: f64,
    pub apy: f64,
}

impl NewPool {
    /// Token symbols making up the pool, e.g. `USDC-WETH` -> `["USDC", "WETH"]`.
    pub fn tokens(&self) -> Vec<&str> {
        self.symbol
            .split('-')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .collect()
    }
}
