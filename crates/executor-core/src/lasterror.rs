use chrono::{DateTime, Utc};
use std::time::Duration;

/// Sliding-window error accumulator for one vreplication stream. An error is
/// treated as terminal once the stream has been continuously failing with it
/// for longer than the window; a change of error message restarts the clock,
/// and a healthy observation clears it.
#[derive(Debug, Clone)]
pub struct LastError {
    max_time_in_error: Duration,
    first_seen: Option<DateTime<Utc>>,
    message: String,
}

impl LastError {
    pub fn new(max_time_in_error: Duration) -> Self {
        LastError {
            max_time_in_error,
            first_seen: None,
            message: String::new(),
        }
    }

    pub fn record(&mut self, message: &str, now: DateTime<Utc>) {
        if self.first_seen.is_none() || self.message != message {
            self.first_seen = Some(now);
            self.message = message.to_string();
        }
    }

    pub fn clear(&mut self) {
        self.first_seen = None;
        self.message.clear();
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// False once the same error has persisted past the window.
    pub fn should_retry(&self, now: DateTime<Utc>) -> bool {
        match self.first_seen {
            None => true,
            Some(first_seen) => match (now - first_seen).to_std() {
                Ok(elapsed) => elapsed < self.max_time_in_error,
                Err(_) => true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
    }

    #[test]
    fn persisting_error_becomes_terminal() {
        let mut last_error = LastError::new(Duration::from_secs(180 * 60));
        last_error.record("duplicate entry", at(0));
        assert!(last_error.should_retry(at(60)));
        last_error.record("duplicate entry", at(60));
        assert!(!last_error.should_retry(at(181)));
    }

    #[test]
    fn changed_error_restarts_window() {
        let mut last_error = LastError::new(Duration::from_secs(180 * 60));
        last_error.record("duplicate entry", at(0));
        last_error.record("lock wait timeout", at(179));
        assert!(last_error.should_retry(at(200)));
    }

    #[test]
    fn clear_resets_state() {
        let mut last_error = LastError::new(Duration::from_secs(60));
        last_error.record("boom", at(0));
        last_error.clear();
        assert!(last_error.should_retry(at(500)));
        assert!(last_error.message().is_empty());
    }
}
