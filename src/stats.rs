use serde::Serialize;

use crate::records::FeatureRecord;

/// Computes the arithmetic mean of a slice of values. Returns 0.0 for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator). Returns 0.0 for fewer than two values.
pub fn stddev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;

    variance.sqrt()
}

/// Median of the values; NaN-free input is assumed. Returns 0.0 for empty input.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Distribution of `log_return` within one label class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelSummary {
    pub post_vaccine: bool,
    pub count: usize,
    pub mean_log_return: f64,
    pub sd_log_return: f64,
}

/// Summaries for the pre- and post-vaccine classes, in that order.
pub fn summarize_labels(records: &[FeatureRecord]) -> Vec<LabelSummary> {
    [false, true]
        .into_iter()
        .map(|label| {
            let values: Vec<f64> = records
                .iter()
                .filter(|r| r.post_vaccine == label)
                .map(|r| r.log_return)
                .collect();
            let avg = mean(&values);
            LabelSummary {
                post_vaccine: label,
                count: values.len(),
                mean_log_return: avg,
                sd_log_return: stddev(&values, avg),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_empty() {
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn test_mean_and_stddev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let m = mean(&values);
        assert_eq!(m, 5.0);
        assert!((stddev(&values, m) - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(stddev(&[1.0], 1.0), 0.0);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), 0.0);
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }
}
