//! Statistical summarization of timer sample lists.

/// The nine aggregates computed over one bucket of timer samples.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub mean: f64,
    pub stddev: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl TimerSummary {
    /// Computes all aggregates over a non-empty sample list. Returns `None`
    /// for an empty slice.
    pub fn compute(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len();
        let sum: f64 = sorted.iter().sum();
        let mean = sum / n as f64;

        let variance = sorted.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n as f64;

        Some(Self {
            count: n,
            min: sorted[0],
            max: sorted[n - 1],
            median: median_of_sorted(&sorted),
            mean,
            stddev: variance.sqrt(),
            p90: percentile_of_sorted(&sorted, 0.9),
            p95: percentile_of_sorted(&sorted, 0.95),
            p99: percentile_of_sorted(&sorted, 0.99),
        })
    }

    /// Renders the slash-separated aggregate form
    /// `count/min/max/median/mean/stddev/p90/p95/p99`, each number in its
    /// natural textual form.
    pub fn format(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}/{}/{}/{}/{}",
            self.count,
            self.min,
            self.max,
            self.median,
            self.mean,
            self.stddev,
            self.p90,
            self.p95,
            self.p99,
        )
    }
}

/// Median: middle element for odd n, mean of the two middle elements for even.
fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Percentile by the `ceil(p * n) - 1` convention, clamped to valid indices.
/// No interpolation between ranks.
fn percentile_of_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    let rank = (p * n as f64).ceil() as i64 - 1;
    let idx = rank.clamp(0, n as i64 - 1) as usize;
    sorted[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_samples_yield_none() {
        assert!(TimerSummary::compute(&[]).is_none());
    }

    #[test]
    fn test_single_sample() {
        let s = TimerSummary::compute(&[42.0]).expect("non-empty");
        assert_eq!(s.count, 1);
        assert_eq!(s.min, 42.0);
        assert_eq!(s.max, 42.0);
        assert_eq!(s.median, 42.0);
        assert_eq!(s.mean, 42.0);
        assert_eq!(s.stddev, 0.0);
        assert_eq!(s.p90, 42.0);
        assert_eq!(s.p99, 42.0);
    }

    #[test]
    fn test_three_samples_reference_values() {
        let s = TimerSummary::compute(&[10.0, 20.0, 30.0]).expect("non-empty");
        assert_eq!(s.count, 3);
        assert_eq!(s.min, 10.0);
        assert_eq!(s.max, 30.0);
        assert_eq!(s.median, 20.0);
        assert_eq!(s.mean, 20.0);
        // Population stddev: sqrt((100 + 0 + 100) / 3).
        assert!((s.stddev - 8.16496580927726).abs() < 1e-12);
        assert_eq!(s.p90, 30.0);
        assert_eq!(s.p95, 30.0);
        assert_eq!(s.p99, 30.0);
    }

    #[test]
    fn test_median_even_count() {
        let s = TimerSummary::compute(&[1.0, 2.0, 3.0, 4.0]).expect("non-empty");
        assert_eq!(s.median, 2.5);
    }

    #[test]
    fn test_unsorted_input() {
        let s = TimerSummary::compute(&[30.0, 10.0, 20.0]).expect("non-empty");
        assert_eq!(s.min, 10.0);
        assert_eq!(s.max, 30.0);
        assert_eq!(s.median, 20.0);
    }

    #[test]
    fn test_percentile_rank_convention() {
        // 10 samples: p90 -> ceil(0.9 * 10) - 1 = index 8.
        let samples: Vec<f64> = (1..=10).map(f64::from).collect();
        let s = TimerSummary::compute(&samples).expect("non-empty");
        assert_eq!(s.p90, 9.0);
        // p95 -> ceil(9.5) - 1 = index 9; p99 -> ceil(9.9) - 1 = index 9.
        assert_eq!(s.p95, 10.0);
        assert_eq!(s.p99, 10.0);
    }

    #[test]
    fn test_percentile_clamps_low_rank() {
        let sorted = [5.0];
        assert_eq!(percentile_of_sorted(&sorted, 0.0), 5.0);
    }

    #[test]
    fn test_format_natural_number_rendering() {
        let s = TimerSummary::compute(&[10.0, 20.0, 30.0]).expect("non-empty");
        assert_eq!(s.format(), "3/10/30/20/20/8.16496580927726/30/30/30");
    }

    #[test]
    fn test_format_fractional_values() {
        let s = TimerSummary::compute(&[1.5, 2.5]).expect("non-empty");
        assert_eq!(s.count, 2);
        assert_eq!(s.median, 2.0);
        assert!(s.format().starts_with("2/1.5/2.5/2/2/"));
    }
}
