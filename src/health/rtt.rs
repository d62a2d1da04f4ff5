use std::time::Duration;

/// Weight given to the newest sample
pub const RTT_ALPHA: f64 = 0.2;

/// Exponentially weighted moving average of round-trip times
///
/// Only the monitor's background task feeds it, so it needs no locking.
#[derive(Debug, Clone, Default)]
pub struct RttEstimator {
    average: Option<Duration>,
}

impl RttEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a raw sample into the average and return the new estimate
    ///
    /// The first sample is taken verbatim.
    pub fn update(&mut self, sample: Duration) -> Duration {
        let next = match self.average {
            None => sample,
            Some(prev) => {
                let nanos =
                    RTT_ALPHA * sample.as_nanos() as f64 + (1.0 - RTT_ALPHA) * prev.as_nanos() as f64;
                Duration::from_nanos(nanos as u64)
            }
        };
        self.average = Some(next);
        next
    }

    /// Current estimate, if any sample has been seen
    pub fn average(&self) -> Option<Duration> {
        self.average
    }
}
