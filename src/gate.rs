use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// True if no refresh happened yet or the last one is more than `interval_ms` old.
pub fn should_refresh(last_refresh: Option<u64>, now: u64, interval_ms: u64) -> bool {
    match last_refresh {
        None => true,
        Some(last) => now.saturating_sub(last) > interval_ms,
    }
}

/// Throttles registry refreshes independently of how often the host delivers new data.
#[derive(Debug, Clone)]
pub struct RefreshGate {
    interval_ms: u64,
    last_refresh: Option<u64>,
    forced: bool,
    due_at: Option<u64>,
}

impl RefreshGate {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_refresh: None,
            forced: false,
            due_at: None,
        }
    }

    pub fn should_refresh(&self, now: u64) -> bool {
        self.forced
            || self.due_at.is_some_and(|due| now >= due)
            || should_refresh(self.last_refresh, now, self.interval_ms)
    }

    /// Record a refresh started at `now`. A deadline still in the future stays pending.
    pub fn mark_refreshed(&mut self, now: u64) {
        self.last_refresh = Some(now);
        self.forced = false;
        self.due_at = self.due_at.filter(|due| *due > now);
    }

    /// Refresh on the first evaluation at or after `at`, regardless of the interval.
    pub fn refresh_at(&mut self, at: u64) {
        self.due_at = Some(self.due_at.map_or(at, |due| due.min(at)));
    }

    /// Make the next evaluation refresh regardless of the last timestamp.
    pub fn reset(&mut self) {
        self.forced = true;
    }
}
