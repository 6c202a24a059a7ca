use crate::{invariants::Timestamp, models::DownloadEvent};

/// Admits events strictly newer than the watermark of the previous run and
/// remembers the newest one it let through.
#[derive(Debug, Clone, Default)]
pub struct WatermarkTracker {
    prior: Option<Timestamp>,
    high: Option<Timestamp>,
    admitted: usize,
    stale: usize,
}

impl WatermarkTracker {
    /// `None` counts everything.
    pub fn new(prior: Option<Timestamp>) -> Self {
        Self {
            prior,
            ..Self::default()
        }
    }

    pub fn admit(&mut self, event: &DownloadEvent) -> bool {
        if self.prior.is_some_and(|w| event.timestamp <= w) {
            self.stale += 1;
            return false;
        }
        self.admitted += 1;
        self.high = self.high.max(Some(event.timestamp));
        true
    }

    pub fn prior(&self) -> Option<Timestamp> {
        self.prior
    }

    /// Watermark to persist at the end of the run; unchanged when nothing
    /// was admitted.
    pub fn next(&self) -> Option<Timestamp> {
        self.high.or(self.prior)
    }

    pub fn admitted(&self) -> usize {
        self.admitted
    }

    pub fn stale(&self) -> usize {
        self.stale
    }
}
