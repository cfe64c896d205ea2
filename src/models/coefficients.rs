//! Named coefficient vectors with running posterior statistics.

use num_traits::ToPrimitive;

/// Posterior summary of one coefficient.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientSummary {
    pub label: String,
    pub mean: f64,
    pub std_dev: f64,
}

/// A labelled vector of coefficients.
///
/// `collect_stats` folds the current values into Welford accumulators so
/// posterior means and standard deviations are available without storing draws.
#[derive(Debug, Clone)]
pub struct CoefficientVector {
    pub name: String,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    count: usize,
    means: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl CoefficientVector {
    /// Zero-initialised vector with one value per label.
    #[must_use]
    pub fn new(name: impl Into<String>, labels: Vec<String>) -> Self {
        let n = labels.len();
        Self {
            name: name.into(),
            labels,
            values: vec![0.0; n],
            count: 0,
            means: vec![0.0; n],
            sum_sq: vec![0.0; n],
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of draws folded into the statistics.
    #[must_use]
    pub const fn draws(&self) -> usize {
        self.count
    }

    /// Clear the running statistics. Current values are kept.
    pub fn reset_stats(&mut self) {
        self.count = 0;
        self.means.fill(0.0);
        self.sum_sq.fill(0.0);
    }

    /// Add the current values to the running statistics.
    pub fn collect_stats(&mut self) {
        self.count += 1;
        let n = self.count.to_f64().unwrap_or(f64::INFINITY);
        for ((value, mean), sum_sq) in self
            .values
            .iter()
            .zip(self.means.iter_mut())
            .zip(self.sum_sq.iter_mut())
        {
            let delta = value - *mean;
            *mean += delta / n;
            *sum_sq += delta * (value - *mean);
        }
    }

    /// Posterior mean and standard deviation per element.
    ///
    /// Standard deviations are `0` until two draws have been collected.
    #[must_use]
    pub fn summaries(&self) -> Vec<CoefficientSummary> {
        let denom = self
            .count
            .checked_sub(1)
            .filter(|d| *d > 0)
            .and_then(|d| d.to_f64());
        self.labels
            .iter()
            .zip(self.means.iter().zip(&self.sum_sq))
            .map(|(label, (mean, sum_sq))| CoefficientSummary {
                label: label.clone(),
                mean: *mean,
                std_dev: denom.map_or(0.0, |denom| (sum_sq / denom).sqrt()),
            })
            .collect()
    }
}
