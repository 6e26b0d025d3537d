// Median accumulator for the values seen between two flushes.
// Reading the median also starts the next window.

/// Collects scalar samples and reduces them to their median.
#[derive(Debug, Default, Clone)]
pub struct MedianSampler {
    values: Vec<f64>,
}

impl MedianSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.values.push(value);
    }

    /// Number of samples in the current window.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Median of the current window, or 0.0 when it is empty.
    /// Always leaves the sampler empty.
    pub fn median(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.sort_by(f64::total_cmp);
        let n = self.values.len();
        let median = if n % 2 == 1 {
            self.values[n / 2]
        } else {
            (self.values[n / 2 - 1] + self.values[n / 2]) / 2.0
        };
        self.values.clear();
        median
    }
}
