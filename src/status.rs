//! Sampling status shared between the background sampler and the handlers.

use chrono::{DateTime, Utc};

/// Outcome of the most recent CPU counter sample.
#[derive(Debug, Clone, Default)]
pub struct SampleStatus {
    pub last_updated: Option<DateTime<Utc>>,
    pub update_duration_seconds: f64,
    pub update_success: bool,
    pub is_updating: bool,
    pub last_error: Option<String>,
    pub consecutive_failures: u64,
}

impl SampleStatus {
    pub fn mark_updating(&mut self) {
        self.is_updating = true;
    }

    pub fn mark_success(&mut self, at: DateTime<Utc>, duration_seconds: f64) {
        self.last_updated = Some(at);
        self.update_duration_seconds = duration_seconds;
        self.update_success = true;
        self.is_updating = false;
        self.last_error = None;
        self.consecutive_failures = 0;
    }

    /// Records a failed sample. `last_updated` keeps pointing at the last
    /// good sample.
    pub fn mark_failure(&mut self, error: String, duration_seconds: f64) {
        self.update_duration_seconds = duration_seconds;
        self.update_success = false;
        self.is_updating = false;
        self.last_error = Some(error);
        self.consecutive_failures += 1;
    }

    /// True once a sample has succeeded and the latest one did too.
    pub fn is_healthy(&self) -> bool {
        self.update_success && self.last_updated.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_keeps_last_good_sample() {
        let mut status = SampleStatus::default();
        assert!(!status.is_healthy());

        let at = Utc::now();
        status.mark_updating();
        status.mark_success(at, 0.001);
        assert!(status.is_healthy());

        status.mark_updating();
        status.mark_failure("source unavailable".into(), 2.0);
        status.mark_failure("source unavailable".into(), 2.0);
        assert!(!status.is_healthy());
        assert!(!status.is_updating);
        assert_eq!(status.last_updated, Some(at));
        assert_eq!(status.consecutive_failures, 2);

        status.mark_success(Utc::now(), 0.001);
        assert_eq!(status.consecutive_failures, 0);
        assert!(status.last_error.is_none());
    }
}
