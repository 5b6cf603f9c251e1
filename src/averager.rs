// element-wise running mean of equal-shaped spectra

#[derive(Debug, Default)]
pub struct RunningAverager {
    running_sum: Vec<f64>,
    running_count: usize,
}

impl RunningAverager {
    pub fn new() -> RunningAverager {
        RunningAverager::default()
    }

    /// Fold `samples` into the sum. A shape change throws away whatever was
    /// accumulated so far and starts over from these samples.
    pub fn ingest(&mut self, samples: &[f64]) {
        if samples.len() != self.running_sum.len() {
            self.running_sum = vec![0.0; samples.len()];
            self.running_count = 0;
        }
        for (acc, sample) in self.running_sum.iter_mut().zip(samples) {
            *acc += sample;
        }
        self.running_count += 1;
    }

    pub fn count(&self) -> usize {
        self.running_count
    }

    /// Mean of everything ingested since the last emit, then reset.
    /// `None` when nothing has been ingested.
    pub fn emit(&mut self) -> Option<Vec<f64>> {
        if self.running_count == 0 {
            return None;
        }
        let n = self.running_count as f64;
        let mean = self.running_sum.iter().map(|acc| acc / n).collect();
        self.running_sum.iter_mut().for_each(|acc| *acc = 0.0);
        self.running_count = 0;
        Some(mean)
    }
}
