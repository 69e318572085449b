/// Arithmetic mean. `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator). Zero for fewer than two values.
pub fn standard_deviation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance_sum: f64 = values
        .iter()
        .map(|x| {
            let diff = x - mean;
            diff * diff
        })
        .sum();
    (variance_sum / (values.len() - 1) as f64).sqrt()
}

/// Standard deviation over mean, as a percentage. `None` when the mean is zero
/// (or the input empty), so callers must decide what a degenerate series means.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    if mean == 0.0 {
        return None;
    }
    Some(standard_deviation(values) / mean * 100.0)
}

pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        return min;
    }
    value.max(min).min(max)
}
