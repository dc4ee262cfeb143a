//! Small numeric helpers for the aggregate computation. All inputs are in
//! milliseconds unless stated otherwise.

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median as the value at index `floor(n / 2)` of the sorted input.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Some(sorted[sorted.len() / 2])
}

/// Nearest-rank percentile: the value at index `ceil(k / 100 * n) - 1` of the
/// sorted input, clamped into range. Returns 0 for an empty input so that
/// all-failed scenarios report zeroed latencies.
pub fn percentile(sorted: &[f64], k: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (k / 100.0 * sorted.len() as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[idx]
}
