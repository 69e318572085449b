use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::config::UpstreamSettings;
use crate::error::{AppError, FetchError};
use crate::models::{ApiEnvelope, ChartEntry, PoolListing};

/// Source of pool listings and per-pool daily history.
#[async_trait]
pub trait YieldsProvider: Send + Sync {
    async fn fetch_pools(&self) -> Result<Vec<PoolListing>, FetchError>;

    async fn fetch_pool_chart(&self, pool_id: &str) -> Result<Vec<ChartEntry>, FetchError>;
}

/// HTTP client for the DefiLlama yields API (`/pools`, `/chart/{pool}`).
#[derive(Debug, Clone)]
pub struct DefiLlamaClient {
    client: Client,
    base_url: Url,
}

impl DefiLlamaClient {
    pub fn new(settings: &UpstreamSettings) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: parse_base_url(&settings.yields_base_url)?,
        })
    }

    async fn get_envelope<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, FetchError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| FetchError::Malformed(format!("invalid request path '{}': {}", path, e)))?;

        debug!(%url, "Requesting upstream");

        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if status.is_server_error() {
            return Err(FetchError::Transient(format!("upstream returned {}", status)));
        }
        if !status.is_success() {
            return Err(FetchError::Rejected { status: status.as_u16() });
        }

        let body = response.text().await?;
        let envelope: ApiEnvelope<T> = serde_json::from_str(&body)
            .map_err(|e| FetchError::Malformed(format!("unexpected response shape: {}", e)))?;

        Ok(envelope.into_inner())
    }
}

#[async_trait]
impl YieldsProvider for DefiLlamaClient {
    async fn fetch_pools(&self) -> Result<Vec<PoolListing>, FetchError> {
        self.get_envelope("pools").await
    }

    async fn fetch_pool_chart(&self, pool_id: &str) -> Result<Vec<ChartEntry>, FetchError> {
        self.get_envelope(&format!("chart/{}", pool_id)).await
    }
}

fn parse_base_url(raw: &str) -> Result<Url, AppError> {
    let mut normalized = raw.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }

    Url::parse(&normalized)
        .map_err(|e| AppError::ConfigError(format!("Invalid yields base url '{}': {}", raw, e)))
}
