use chrono::{DateTime, Duration, Utc};

/// Time between forced battery refreshes across all thermostats.
pub const BATTERY_SWEEP_SECS: i64 = 12 * 60 * 60;

/// Tracks when the polling loop last refreshed every battery.
#[derive(Debug, Clone)]
pub struct BatterySweep {
    interval: Duration,
    last: Option<DateTime<Utc>>,
}

impl Default for BatterySweep {
    fn default() -> Self {
        Self::new(Duration::seconds(BATTERY_SWEEP_SECS))
    }
}

impl BatterySweep {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Due immediately until the first sweep has run.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.last
            .map(|last| now - last >= self.interval)
            .unwrap_or(true)
    }

    pub fn mark(&mut self, now: DateTime<Utc>) {
        self.last = Some(now);
    }

    pub fn last(&self) -> Option<DateTime<Utc>> {
        self.last
    }
}
