use crate::config::RiskSettings;
use crate::models::{InsufficientHistory, MetricPoint, RiskAssessment, RiskLevel};
use crate::utils::math::{clamp, coefficient_of_variation, mean, standard_deviation};

/// Pure scoring model: metric history in, bounded risk assessment out.
#[derive(Debug, Clone)]
pub struct RiskCalculator {
    settings: RiskSettings,
}

impl RiskCalculator {
    pub fn new(settings: RiskSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RiskSettings {
        &self.settings
    }

    /// Score the most recent `score_window` observations of `history`.
    /// Input order does not matter; the window is taken by date.
    pub fn score(&self, history: &[MetricPoint]) -> Result<RiskAssessment, InsufficientHistory> {
        if history.len() < self.settings.min_samples {
            return Err(InsufficientHistory {
                available: history.len(),
                required: self.settings.min_samples,
            });
        }

        let mut window: Vec<&MetricPoint> = history.iter().collect();
        window.sort_by_key(|point| point.date);
        let skip = window.len().saturating_sub(self.settings.score_window);
        let window = &window[skip..];

        let apys: Vec<f64> = window.iter().map(|point| point.apy).collect();
        let tvls: Vec<f64> = window.iter().map(|point| point.tvl).collect();

        let apy_mean = mean(&apys).unwrap_or(0.0);
        let apy_stdev = standard_deviation(&apys);
        let tvl_mean = mean(&tvls).unwrap_or(0.0);

        let liquidity_score = self.liquidity_score(tvl_mean);

        let apy_component = (100.0 - apy_stdev * self.settings.apy_stdev_multiplier).max(0.0);
        // A zero mean TVL is maximal instability: CV is reported as 100 and the component is 0.
        let (tvl_cv, tvl_component) = match coefficient_of_variation(&tvls) {
            Some(cv) if tvl_mean > 0.0 => (cv, (100.0 - cv).max(0.0)),
            _ => (100.0, 0.0),
        };

        let stability_score = clamp(
            apy_component * self.settings.apy_stability_weight
                + tvl_component * self.settings.tvl_stability_weight,
            0.0,
            100.0,
        );

        let composite_score = clamp(
            (100.0 - liquidity_score) * self.settings.liquidity_risk_weight
                + (100.0 - stability_score) * self.settings.stability_risk_weight,
            0.0,
            100.0,
        );

        let classification = RiskLevel::classify(
            composite_score,
            self.settings.low_risk_threshold,
            self.settings.high_risk_threshold,
        );

        Ok(RiskAssessment {
            liquidity_score,
            stability_score,
            composite_score,
            classification,
            sample_size: window.len(),
            apy_mean,
            apy_stdev,
            tvl_mean,
            tvl_cv,
        })
    }

    /// Log-scaled TVL mapped onto 0..100. Non-decreasing in `tvl`.
    pub fn liquidity_score(&self, tvl: f64) -> f64 {
        let floor_log = self.settings.liquidity_log_floor;
        let span = self.settings.liquidity_log_ceiling - floor_log;
        let tvl = if tvl.is_nan() { 0.0 } else { tvl };
        let log_tvl = tvl.max(self.settings.tvl_floor_usd).log10();

        clamp((log_tvl - floor_log) / span * 100.0, 0.0, 100.0)
    }
}

impl Default for RiskCalculator {
    fn default() -> Self {
        Self::new(RiskSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn history(values: &[(f64, f64)]) -> Vec<MetricPoint> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, (apy, tvl))| MetricPoint {
                pool_id: "pool".to_string(),
                date: start + Duration::days(i as i64),
                apy: *apy,
                tvl: *tvl,
                apy_base: None,
                apy_reward: None,
                il_7d: None,
            })
            .collect()
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "expected {}, got {}", expected, actual);
    }

    #[test]
    fn test_liquidity_anchor_points() {
        let calculator = RiskCalculator::default();
        assert_close(calculator.liquidity_score(10_000.0), 0.0);
        assert_close(calculator.liquidity_score(100_000.0), 20.0);
        assert_close(calculator.liquidity_score(1_000_000.0), 40.0);
        assert_close(calculator.liquidity_score(100_000_000.0), 80.0);
        assert_close(calculator.liquidity_score(1_000_000_000.0), 100.0);
        assert_close(calculator.liquidity_score(50_000_000_000.0), 100.0);
    }

    #[test]
    fn test_liquidity_below_floor_is_zero() {
        let calculator = RiskCalculator::default();
        assert_close(calculator.liquidity_score(0.0), 0.0);
        assert_close(calculator.liquidity_score(500.0), 0.0);
    }

    #[test]
    fn test_insufficient_history() {
        let calculator = RiskCalculator::default();
        let result = calculator.score(&history(&[(5.0, 1e6); 3]));
        assert_eq!(result, Err(InsufficientHistory { available: 3, required: 7 }));
    }

    #[test]
    fn test_constant_series_is_fully_stable() {
        let calculator = RiskCalculator::default();
        let assessment = calculator.score(&history(&[(5.0, 1_000_000.0); 10])).unwrap();

        assert_close(assessment.stability_score, 100.0);
        assert_close(assessment.liquidity_score, 40.0);
        // (100 - 40) * 0.4 + 0 * 0.6
        assert_close(assessment.composite_score, 24.0);
        assert_eq!(assessment.classification, RiskLevel::Low);
        assert_eq!(assessment.sample_size, 10);
    }

    #[test]
    fn test_zero_tvl_is_maximally_unstable() {
        let calculator = RiskCalculator::default();
        let assessment = calculator.score(&history(&[(5.0, 0.0); 7])).unwrap();

        assert_close(assessment.liquidity_score, 0.0);
        // APY component 100, TVL component 0 -> stability 60
        assert_close(assessment.stability_score, 60.0);
        assert_close(assessment.composite_score, 64.0);
        assert_eq!(assessment.classification, RiskLevel::High);
        assert!(assessment.composite_score.is_finite());
    }

    #[test]
    fn test_window_uses_most_recent_observations() {
        let calculator = RiskCalculator::default();
        let mut values = vec![(500.0, 1.0); 5];
        values.extend(vec![(4.0, 2_000_000.0); 30]);
        let mut points = history(&values);
        points.reverse();

        let assessment = calculator.score(&points).unwrap();
        assert_eq!(assessment.sample_size, 30);
        assert_close(assessment.apy_stdev, 0.0);
        assert_close(assessment.tvl_mean, 2_000_000.0);
    }

    #[test]
    fn test_volatile_apy_lowers_stability() {
        let calculator = RiskCalculator::default();
        let calm = calculator.score(&history(&[(5.0, 1e6); 8])).unwrap();
        let wild = calculator
            .score(&history(&[
                (5.0, 1e6),
                (80.0, 1e6),
                (2.0, 1e6),
                (60.0, 1e6),
                (1.0, 1e6),
                (90.0, 1e6),
                (3.0, 1e6),
                (70.0, 1e6),
            ]))
            .unwrap();

        assert!(wild.stability_score < calm.stability_score);
        assert!(wild.composite_score > calm.composite_score);
        assert!(wild.composite_score <= 100.0);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let calculator = RiskCalculator::default();
        let points = history(&[(3.0, 2e6), (3.5, 2.1e6), (2.8, 1.9e6), (4.1, 2.2e6), (3.3, 2e6), (3.0, 1.8e6), (3.9, 2.05e6)]);
        assert_eq!(calculator.score(&points), calculator.score(&points));
    }
}
