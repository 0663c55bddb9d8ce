use std::time::Duration;

/// Reconnect delays drawn from a fixed ascending table.
///
/// `delay(attempt)` takes the number of consecutive failed attempts that came
/// before and returns how long to wait, or `None` once the table is exhausted.
/// It never extrapolates past the last entry, so the connection manager gets
/// a definite point where it stops retrying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    delays: Vec<Duration>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_millis(&[0, 2_000, 10_000, 30_000])
    }
}

impl Backoff {
    pub fn new(delays: Vec<Duration>) -> Self {
        debug_assert!(
            delays.windows(2).all(|w| w[0] <= w[1]),
            "backoff delays should be ascending"
        );
        Self { delays }
    }

    pub fn from_millis(delays: &[u64]) -> Self {
        Self::new(delays.iter().copied().map(Duration::from_millis).collect())
    }

    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        self.delays.get(attempt as usize).copied()
    }

    /// Number of retries allowed before giving up.
    pub fn max_retries(&self) -> usize {
        self.delays.len()
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}
