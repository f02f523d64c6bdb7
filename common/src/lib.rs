use std::{fmt::Display, time::Duration};

pub mod client;
pub mod robot;
pub mod sensor;

/// Keeps track of performance metrics and incremental updates the values. In milliseconds.
#[derive(Debug, Clone)]
pub struct PerfStats {
    mean: f64,
    var_sum: f64,
    std: f64,
    sample_count: usize,
    min: f64,
    max: f64,
    latest: f64,
}

impl Default for PerfStats {
    fn default() -> Self {
        Self {
            mean: 0.0,
            var_sum: 0.0,
            std: 0.0,
            sample_count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            latest: 0.0,
        }
    }
}

impl PerfStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default()
    }

    pub fn update(&mut self, duration: Duration) {
        let msecs = duration.as_secs_f64() * 1000.0;

        self.sample_count += 1;

        // Welford's online update of mean and variance
        let old_mean = self.mean;
        self.mean += (msecs - self.mean) / self.sample_count as f64;
        self.var_sum += (msecs - old_mean) * (msecs - self.mean);
        self.std = (self.var_sum / self.sample_count as f64).sqrt();

        // min and max values
        self.min = self.min.min(msecs);
        self.max = self.max.max(msecs);
        self.latest = msecs;
    }

    pub fn latest(&self) -> f64 {
        self.latest
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std(&self) -> f64 {
        self.std
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }
}

impl Display for PerfStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:>5.2}ms ({:.2}±{:.2} , [{:.2}, {:.2}], {})",
            self.latest, self.mean, self.std, self.min, self.max, self.sample_count
        )
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn perf_stats_mean_and_std() {
        let mut stats = PerfStats::new();
        for ms in [2, 4, 4, 4, 5, 5, 7, 9] {
            stats.update(Duration::from_millis(ms));
        }

        assert_eq!(stats.sample_count(), 8);
        assert_relative_eq!(stats.mean(), 5.0, epsilon = 1e-9);
        assert_relative_eq!(stats.std(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(stats.latest(), 9.0, epsilon = 1e-9);
    }

    #[test]
    fn reset_clears_samples() {
        let mut stats = PerfStats::new();
        stats.update(Duration::from_millis(10));
        stats.reset();

        assert_eq!(stats.sample_count(), 0);
        assert_relative_eq!(stats.mean(), 0.0);
    }
}
