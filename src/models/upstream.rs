//! Wire records returned by the yields provider. Every field is optional at
//! this layer; validation happens before anything reaches the store.

use serde::{Deserialize, Serialize};

/// Responses arrive either bare or wrapped as `{"status": ..., "data": [...]}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ApiEnvelope<T> {
    Wrapped { data: Vec<T> },
    Bare(Vec<T>),
}

impl<T> ApiEnvelope<T> {
    pub fn into_inner(self) -> Vec<T> {
        match self {
            ApiEnvelope::Wrapped { data } => data,
            ApiEnvelope::Bare(data) => data,
        }
    }
}

/// Entry of the pool listing endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolListing {
    #[serde(alias = "id")]
    pub pool: Option<String>,
    pub chain: Option<String>,
    pub project: Option<String>,
    pub symbol: Option<String>,
    #[serde(rename = "tvlUsd")]
    pub tvl_usd: Option<f64>,
    pub apy: Option<f64>,
}

/// Entry of the per-pool historical chart endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartEntry {
    #[serde(alias = "date")]
    pub timestamp: Option<String>,
    #[serde(rename = "tvlUsd")]
    pub tvl_usd: Option<f64>,
    pub apy: Option<f64>,
    #[serde(rename = "apyBase")]
    pub apy_base: Option<f64>,
    #[serde(rename = "apyReward")]
    pub apy_reward: Option<f64>,
    pub il7d: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_envelope() {
        let body = r#"{"status":"success","data":[{"pool":"abc","chain":"Ethereum","project":"aave-v3","symbol":"USDC","tvlUsd":1500000.5,"apy":3.2}]}"#;
        let listing: ApiEnvelope<PoolListing> = serde_json::from_str(body).unwrap();
        let pools = listing.into_inner();
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].pool.as_deref(), Some("abc"));
        assert_eq!(pools[0].tvl_usd, Some(1_500_000.5));
    }

    #[test]
    fn test_bare_envelope_with_nulls() {
        let body = r#"[{"timestamp":"2024-01-01T23:01:37.069Z","tvlUsd":100,"apy":null,"apyBase":1.0}]"#;
        let chart: ApiEnvelope<ChartEntry> = serde_json::from_str(body).unwrap();
        let entries = chart.into_inner();
        assert_eq!(entries[0].apy, None);
        assert_eq!(entries[0].apy_base, Some(1.0));
    }

    #[test]
    fn test_error_envelope_is_rejected() {
        let body = r#"{"status":"error","message":"not found"}"#;
        assert!(serde_json::from_str::<ApiEnvelope<ChartEntry>>(body).is_err());
    }

    #[test]
    fn test_wrongly_typed_field_is_rejected() {
        let body = r#"[{"timestamp":"2024-01-01","tvlUsd":"lots","apy":1.0}]"#;
        assert!(serde_json::from_str::<ApiEnvelope<ChartEntry>>(body).is_err());
    }
}
