use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};

use crate::error::{AppError, RetryPolicy};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub upstream: UpstreamSettings,
    pub eligibility: EligibilitySettings,
    pub collection: CollectionSettings,
    pub risk: RiskSettings,
    pub api: ApiSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    pub yields_base_url: String,
    pub request_timeout_seconds: u64,
}

/// Registry filter applied on every registry sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilitySettings {
    pub min_tvl_usd: f64,
    pub min_apy: f64,
    pub max_apy: f64,
    /// Case-insensitive; matched against the whole symbol and each `-` separated token.
    pub excluded_symbols: Vec<String>,
    /// Empty means every chain is allowed.
    pub allowed_chains: Vec<String>,
    /// Keep only the largest pools by TVL. 0 disables the cap.
    pub max_pools: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionSettings {
    pub window_days: u32,
    pub min_request_interval_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_multiplier: f64,
}

/// Scoring model constants. The composite weights and the stability
/// sub-weights are independent inputs; neither is derived from the other.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSettings {
    pub score_window: usize,
    pub min_samples: usize,
    pub tvl_floor_usd: f64,
    pub liquidity_log_floor: f64,
    pub liquidity_log_ceiling: f64,
    pub apy_stdev_multiplier: f64,
    pub apy_stability_weight: f64,
    pub tvl_stability_weight: f64,
    pub liquidity_risk_weight: f64,
    pub stability_risk_weight: f64,
    pub low_risk_threshold: f64,
    pub high_risk_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    /// `json`, `pretty` or `compact`
    pub format: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            url: "sqlite://defi_yields.db".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        UpstreamSettings {
            yields_base_url: "https://yields.llama.fi".to_string(),
            request_timeout_seconds: 30,
        }
    }
}

impl Default for EligibilitySettings {
    fn default() -> Self {
        EligibilitySettings {
            min_tvl_usd: 100_000.0,
            min_apy: 0.5,
            max_apy: 200.0,
            excluded_symbols: Vec::new(),
            allowed_chains: Vec::new(),
            max_pools: 500,
        }
    }
}

impl Default for CollectionSettings {
    fn default() -> Self {
        CollectionSettings {
            window_days: 90,
            min_request_interval_ms: 1000,
            max_retries: 3,
            backoff_base_ms: 1000,
            backoff_multiplier: 2.0,
        }
    }
}

impl Default for RiskSettings {
    fn default() -> Self {
        RiskSettings {
            score_window: 30,
            min_samples: 7,
            tvl_floor_usd: 10_000.0,
            liquidity_log_floor: 4.0,
            liquidity_log_ceiling: 9.0,
            apy_stdev_multiplier: 2.0,
            apy_stability_weight: 0.6,
            tvl_stability_weight: 0.4,
            liquidity_risk_weight: 0.4,
            stability_risk_weight: 0.6,
            low_risk_threshold: 30.0,
            high_risk_threshold: 60.0,
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Longest history window a collection run accepts.
pub const MAX_WINDOW_DAYS: u32 = 3650;

impl CollectionSettings {
    /// The configured window, or `requested` when given. Either must lie in
    /// `1..=MAX_WINDOW_DAYS`.
    pub fn window_days_or(&self, requested: Option<u32>) -> Result<u32, AppError> {
        let days = requested.unwrap_or(self.window_days);
        if !(1..=MAX_WINDOW_DAYS).contains(&days) {
            return Err(AppError::ValidationError(format!(
                "window_days must be between 1 and {}, got {}",
                MAX_WINDOW_DAYS, days
            )));
        }
        Ok(days)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.backoff_base_ms),
            self.backoff_multiplier,
        )
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }
}

impl Settings {
    /// Defaults, then `config/default.toml`, then `path`, then `YIELD_RISK__*`
    /// variables, then a plain `DATABASE_URL`.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::with_name("config/default").required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("YIELD_RISK")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("eligibility.excluded_symbols")
                    .with_list_parse_key("eligibility.allowed_chains"),
            )
            .set_override_option("database.url", env::var("DATABASE_URL").ok())?
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.database.url.trim().is_empty() {
            return Err(invalid("database.url must not be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(invalid("database.max_connections must be at least 1"));
        }
        if self.upstream.yields_base_url.trim().is_empty() {
            return Err(invalid("upstream.yields_base_url must not be empty"));
        }

        let eligibility = &self.eligibility;
        if !(eligibility.min_tvl_usd >= 0.0) {
            return Err(invalid("eligibility.min_tvl_usd must be non-negative"));
        }
        if eligibility.min_apy > eligibility.max_apy {
            return Err(invalid("eligibility.min_apy must not exceed eligibility.max_apy"));
        }

        let collection = &self.collection;
        if collection.window_days == 0 || collection.window_days > MAX_WINDOW_DAYS {
            return Err(invalid("collection.window_days must be between 1 and 3650"));
        }
        if !(collection.backoff_multiplier >= 1.0) {
            return Err(invalid("collection.backoff_multiplier must be at least 1.0"));
        }

        let risk = &self.risk;
        if risk.score_window == 0 {
            return Err(invalid("risk.score_window must be at least 1"));
        }
        if risk.min_samples == 0 {
            return Err(invalid("risk.min_samples must be at least 1"));
        }
        if risk.min_samples > risk.score_window {
            return Err(invalid("risk.min_samples must not exceed risk.score_window"));
        }
        if !(risk.tvl_floor_usd > 0.0) {
            return Err(invalid("risk.tvl_floor_usd must be positive"));
        }
        if !(risk.liquidity_log_ceiling > risk.liquidity_log_floor) {
            return Err(invalid("risk.liquidity_log_ceiling must exceed risk.liquidity_log_floor"));
        }
        if !weights_sum_to_one(risk.apy_stability_weight, risk.tvl_stability_weight) {
            return Err(invalid(
                "risk.apy_stability_weight and risk.tvl_stability_weight must sum to 1",
            ));
        }
        if !weights_sum_to_one(risk.liquidity_risk_weight, risk.stability_risk_weight) {
            return Err(invalid(
                "risk.liquidity_risk_weight and risk.stability_risk_weight must sum to 1",
            ));
        }
        if !(risk.low_risk_threshold < risk.high_risk_threshold) {
            return Err(invalid("risk.low_risk_threshold must be below risk.high_risk_threshold"));
        }

        Ok(())
    }
}

fn weights_sum_to_one(a: f64, b: f64) -> bool {
    a >= 0.0 && b >= 0.0 && ((a + b) - 1.0).abs() <= 1e-9
}

fn invalid(message: &str) -> AppError {
    AppError::ConfigError(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.collection.window_days, 90);
        assert_eq!(settings.risk.min_samples, 7);
        assert_eq!(settings.collection.min_request_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_default_retry_policy_matches_backoff_schedule() {
        let policy = Settings::default().collection.retry_policy();
        assert_eq!(
            policy.schedule(),
            vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[test]
    fn test_rejects_unbalanced_composite_weights() {
        let mut settings = Settings::default();
        settings.risk.liquidity_risk_weight = 0.5;
        assert!(matches!(settings.validate(), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let mut settings = Settings::default();
        settings.risk.low_risk_threshold = 60.0;
        settings.risk.high_risk_threshold = 30.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_window() {
        let mut settings = Settings::default();
        settings.collection.window_days = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_window_override_is_bounded() {
        let collection = Settings::default().collection;
        assert_eq!(collection.window_days_or(None).unwrap(), 90);
        assert_eq!(collection.window_days_or(Some(30)).unwrap(), 30);
        assert_eq!(collection.window_days_or(Some(MAX_WINDOW_DAYS)).unwrap(), MAX_WINDOW_DAYS);
        assert!(matches!(collection.window_days_or(Some(0)), Err(AppError::ValidationError(_))));
        assert!(matches!(
            collection.window_days_or(Some(u32::MAX)),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn test_rejects_oversized_window() {
        let mut settings = Settings::default();
        settings.collection.window_days = MAX_WINDOW_DAYS + 1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            "[eligibility]\nmin_tvl_usd = 250000.0\nallowed_chains = [\"Ethereum\"]\n\n[risk]\nmin_samples = 10\n",
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.eligibility.min_tvl_usd, 250_000.0);
        assert_eq!(settings.eligibility.allowed_chains, vec!["Ethereum".to_string()]);
        assert_eq!(settings.risk.min_samples, 10);
        assert_eq!(settings.risk.score_window, 30);
    }
}
