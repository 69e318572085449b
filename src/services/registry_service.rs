use chrono::Utc;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::EligibilitySettings;
use crate::database::PoolRepository;
use crate::error::{with_retry, AppError, FetchError, RetryPolicy};
use crate::models::{NewPool, PoolListing, RegistryRefreshReport};
use crate::services::YieldsProvider;
use crate::utils::RequestPacer;

/// Syncs the pool registry from the provider's listing endpoint.
pub struct RegistryFetcher {
    provider: Arc<dyn YieldsProvider>,
    pools: Arc<dyn PoolRepository>,
    pacer: Arc<RequestPacer>,
    retry_policy: RetryPolicy,
    eligibility: EligibilitySettings,
}

impl RegistryFetcher {
    pub fn new(
        provider: Arc<dyn YieldsProvider>,
        pools: Arc<dyn PoolRepository>,
        pacer: Arc<RequestPacer>,
        retry_policy: RetryPolicy,
        eligibility: EligibilitySettings,
    ) -> Self {
        Self {
            provider,
            pools,
            pacer,
            retry_policy,
            eligibility,
        }
    }

    /// Fetch the listing, filter it, and apply it to the store as one batch.
    /// Nothing is written unless the listing was fetched and parsed.
    pub async fn refresh_registry(&self) -> Result<RegistryRefreshReport, AppError> {
        info!("Refreshing pool registry");

        let provider = self.provider.as_ref();
        let pacer = self.pacer.as_ref();

        let listings = with_retry("fetch_pool_registry", &self.retry_policy, move || async move {
            pacer.acquire().await;
            provider.fetch_pools().await
        })
        .await
        .map_err(|e| match e {
            FetchError::Malformed(detail) => AppError::BadPayload(format!("pool listing: {}", detail)),
            other => AppError::UpstreamUnavailable(format!("pool listing: {}", other)),
        })?;

        let total = listings.len();
        let eligible = select_eligible(listings, &self.eligibility);
        let filtered_out = total - eligible.len();

        if eligible.is_empty() {
            warn!(total, "No pools passed the eligibility filter");
        }

        let changes = self.pools.apply_registry(&eligible, Utc::now()).await?;

        let report = RegistryRefreshReport {
            added: changes.added,
            updated: changes.updated,
            unchanged: changes.unchanged,
            filtered_out,
            marked_ineligible: changes.marked_ineligible,
        };

        info!(
            total,
            eligible = eligible.len(),
            added = report.added,
            updated = report.updated,
            filtered_out = report.filtered_out,
            marked_ineligible = report.marked_ineligible,
            "Pool registry refreshed"
        );

        Ok(report)
    }
}

/// Apply the eligibility rules to a raw listing. Survivors are ordered by TVL
/// descending (ties by id) and capped at `max_pools`.
pub fn select_eligible(listings: Vec<PoolListing>, rules: &EligibilitySettings) -> Vec<NewPool> {
    let excluded: HashSet<String> = rules
        .excluded_symbols
        .iter()
        .map(|symbol| symbol.trim().to_ascii_lowercase())
        .collect();
    let allowed_chains: HashSet<String> = rules
        .allowed_chains
        .iter()
        .map(|chain| chain.trim().to_ascii_lowercase())
        .collect();

    let mut candidates: Vec<NewPool> = listings
        .into_iter()
        .filter_map(complete_listing)
        .filter(|pool| pool.tvl.is_finite() && pool.tvl >= rules.min_tvl_usd)
        .filter(|pool| pool.apy.is_finite() && pool.apy >= rules.min_apy && pool.apy <= rules.max_apy)
        .filter(|pool| allowed_chains.is_empty() || allowed_chains.contains(&pool.chain.to_ascii_lowercase()))
        .filter(|pool| !is_excluded_symbol(pool, &excluded))
        .collect();

    candidates.sort_by(|a, b| {
        b.tvl
            .partial_cmp(&a.tvl)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut seen = HashSet::new();
    candidates.retain(|pool| seen.insert(pool.id.clone()));

    if rules.max_pools > 0 {
        candidates.truncate(rules.max_pools);
    }

    candidates
}

fn complete_listing(listing: PoolListing) -> Option<NewPool> {
    let id = listing.pool.filter(|id| !id.trim().is_empty())?;

    Some(NewPool {
        id,
        chain: listing.chain?,
        project: listing.project?,
        symbol: listing.symbol?,
        tvl: listing.tvl_usd?,
        apy: listing.apy?,
    })
}

fn is_excluded_symbol(pool: &NewPool, excluded: &HashSet<String>) -> bool {
    if excluded.is_empty() {
        return false;
    }

    excluded.contains(&pool.symbol.to_ascii_lowercase())
        || pool
            .tokens()
            .iter()
            .any(|token| excluded.contains(&token.to_ascii_lowercase()))
}
