/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample variance (n - 1 denominator), `None` for fewer than two values
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values)?;
    let sum_sq: f64 = values.iter().map(|x| (x - mean).powi(2)).sum();
    Some(sum_sq / (values.len() - 1) as f64)
}

/// Population coefficient of variation (std dev / mean)
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    if mean <= 0.0 {
        return None;
    }
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt() / mean)
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Clamp a score into [0, 100]
pub fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

/// Clamp a confidence or ratio into [0, 1]
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[2.0, 4.0, 6.0]), Some(4.0));
    }

    #[test]
    fn test_sample_variance() {
        assert_eq!(sample_variance(&[5.0]), None);
        assert_eq!(sample_variance(&[20.0, 80.0]), Some(1800.0));
        assert_eq!(sample_variance(&[3.0, 3.0, 3.0]), Some(0.0));
    }

    #[test]
    fn test_coefficient_of_variation() {
        assert_eq!(coefficient_of_variation(&[10.0, 10.0]), Some(0.0));
        assert_eq!(coefficient_of_variation(&[0.0, 0.0]), None);
        let cv = coefficient_of_variation(&[90.0, 110.0]).unwrap();
        assert!((cv - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_rounding_and_clamping() {
        assert_eq!(round_to(48.004, 2), 48.0);
        assert_eq!(round_to(0.12345, 3), 0.123);
        assert_eq!(clamp_score(120.0), 100.0);
        assert_eq!(clamp_score(-3.0), 0.0);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(1.5), 1.0);
    }
}
