//! Internal statistics rendered by the /health endpoint.

use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Clone, Copy, Default)]
struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
            self.last = value;
            self.sum = value;
            self.count = 1;
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

#[derive(Default)]
struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// (current, average, max, min, count)
    fn snapshot(&self) -> (f64, f64, f64, f64, u64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min, s.count)
        } else {
            (0.0, 0.0, 0.0, 0.0, 0)
        }
    }
}

/// Sampling and scrape statistics since startup.
pub struct HealthStats {
    started: Instant,
    sample_duration_seconds: Stat,
    scrape_duration_seconds: Stat,
    pools_exported: Stat,
    pools_failed: Stat,
    total_samples: AtomicU64,
    failed_samples: AtomicU64,
    total_scrapes: AtomicU64,
    failed_scrapes: AtomicU64,
    http_requests: AtomicU64,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            sample_duration_seconds: Stat::default(),
            scrape_duration_seconds: Stat::default(),
            pools_exported: Stat::default(),
            pools_failed: Stat::default(),
            total_samples: AtomicU64::new(0),
            failed_samples: AtomicU64::new(0),
            total_scrapes: AtomicU64::new(0),
            failed_scrapes: AtomicU64::new(0),
            http_requests: AtomicU64::new(0),
        }
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record_sample(&self, duration_seconds: f64, success: bool) {
        self.total_samples.fetch_add(1, Ordering::Relaxed);
        if success {
            self.sample_duration_seconds.add_sample(duration_seconds);
        } else {
            self.failed_samples.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_scrape(&self, duration_seconds: f64, pools_exported: usize, pools_failed: usize) {
        self.total_scrapes.fetch_add(1, Ordering::Relaxed);
        self.scrape_duration_seconds.add_sample(duration_seconds);
        self.pools_exported.add_sample(pools_exported as f64);
        self.pools_failed.add_sample(pools_failed as f64);
    }

    pub fn record_failed_scrape(&self) {
        self.total_scrapes.fetch_add(1, Ordering::Relaxed);
        self.failed_scrapes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_http_request(&self) {
        self.http_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn failed_samples(&self) -> u64 {
        self.failed_samples.load(Ordering::Relaxed)
    }

    pub fn render_table(&self) -> String {
        let left_col = 26usize;
        let col_w = 12usize;

        let mut out = String::new();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "metric",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out, "{}", "-".repeat(left_col + 3 + (col_w + 3) * 4)).ok();

        let rows = [
            ("sample duration (s)", &self.sample_duration_seconds, 3usize),
            ("scrape duration (s)", &self.scrape_duration_seconds, 3),
            ("pools exported", &self.pools_exported, 0),
            ("pools failed", &self.pools_failed, 0),
        ];

        for (label, stat, precision) in rows {
            let (cur, avg, max, min, _count) = stat.snapshot();
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                label,
                format!("{:.p$}", cur, p = precision),
                format!("{:.p$}", avg, p = precision.max(1)),
                format!("{:.p$}", max, p = precision),
                format!("{:.p$}", min, p = precision),
                left = left_col,
                col = col_w
            )
            .ok();
        }

        writeln!(out).ok();
        writeln!(
            out,
            "samples: {} ({} failed)",
            self.total_samples.load(Ordering::Relaxed),
            self.failed_samples()
        )
        .ok();
        writeln!(
            out,
            "scrapes: {} ({} failed)",
            self.total_scrapes.load(Ordering::Relaxed),
            self.failed_scrapes.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(
            out,
            "http requests: {}",
            self.http_requests.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(out, "uptime (s): {}", self.uptime_seconds()).ok();

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stat() {
        let mut s = RunningStat::default();
        s.add(2.0);
        s.add(4.0);
        s.add(3.0);
        assert_eq!(s.count, 3);
        assert_eq!(s.min, 2.0);
        assert_eq!(s.max, 4.0);
        assert_eq!(s.last, 3.0);
        assert!((s.avg() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_render_table_counts() {
        let stats = HealthStats::new();
        stats.record_sample(0.002, true);
        stats.record_sample(0.0, false);
        stats.record_scrape(0.01, 3, 1);
        stats.record_failed_scrape();

        let table = stats.render_table();
        assert!(table.contains("samples: 2 (1 failed)"));
        assert!(table.contains("scrapes: 2 (1 failed)"));
        assert!(table.contains("pools exported"));
        assert_eq!(stats.failed_samples(), 1);
    }
}
