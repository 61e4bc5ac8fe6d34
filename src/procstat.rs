//! Per-CPU utilization sampling from /proc/stat.
//!
//! `/proc/stat` looks like this:
//!
//! ```text
//! cpu  130216 19944 162525 1491240 3784 24749 17773 0 0 0
//! cpu0 40321 11452 49784 403099 2615 6076 6748 0 0 0
//! cpu1 26585 2425 36639 151166 404 2533 3541 0 0 0
//! ...
//! ```
//!
//! The fourth numeric field of each `cpuN` row is the idle counter and the
//! sum of all numeric fields is the total counter, both in clock ticks since
//! boot. [`CpuTimeStat`] keeps the previous sample and turns two consecutive
//! samples into per-CPU deltas and utilization percentages.

use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock, TryLockError};
use thiserror::Error;
use tracing::{debug, trace};

/// Default location of the kernel CPU time counters.
pub const PROC_STAT_PATH: &str = "/proc/stat";

/// Index of the idle counter among the numeric fields of a `cpuN` row.
const IDLE_FIELD: usize = 3;

/// Errors that can occur while sampling CPU counters.
#[derive(Error, Debug)]
pub enum SampleError {
    #[error("failed to read counter source {source_name}: {error}")]
    SourceUnavailable {
        source_name: String,
        #[source]
        error: io::Error,
    },

    #[error("malformed counter row: {0}")]
    MalformedCounterRow(String),

    #[error("malformed counter field {field} '{token}' for cpu{cpu}")]
    MalformedToken {
        cpu: usize,
        field: usize,
        token: String,
    },

    #[error("previous sample of {0} still in progress")]
    InProgress(String),

    #[error("CPU time state lock poisoned")]
    LockPoisoned,
}

/// Supplies the raw text of a `/proc/stat`-style counter table.
pub trait CounterSource: Send + Sync {
    /// Reads the whole counter table.
    fn read(&self) -> io::Result<String>;

    /// Human-readable name used in errors and logs.
    fn name(&self) -> String;
}

/// Counter source backed by a file, `/proc/stat` by default.
#[derive(Debug, Clone)]
pub struct ProcStatSource {
    path: PathBuf,
}

impl ProcStatSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for ProcStatSource {
    fn default() -> Self {
        Self::new(PROC_STAT_PATH)
    }
}

impl CounterSource for ProcStatSource {
    fn read(&self) -> io::Result<String> {
        fs::read_to_string(&self.path)
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }
}

/// Cumulative counters of one CPU from one sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuCounters {
    pub idle: u64,
    pub total: u64,
}

/// Parses the numeric fields of one `cpuN` row.
fn parse_cpu_row(cpu: usize, fields: &[&str]) -> Result<CpuCounters, SampleError> {
    if fields.len() <= IDLE_FIELD {
        return Err(SampleError::MalformedCounterRow(format!(
            "cpu{} has {} numeric fields, expected at least {}",
            cpu,
            fields.len(),
            IDLE_FIELD + 1
        )));
    }

    let mut values = Vec::with_capacity(fields.len());
    for (field, token) in fields.iter().enumerate() {
        let value = token
            .parse::<u64>()
            .map_err(|_| SampleError::MalformedToken {
                cpu,
                field,
                token: token.to_string(),
            })?;
        values.push(value);
    }

    Ok(CpuCounters {
        idle: values[IDLE_FIELD],
        total: values.iter().fold(0u64, |acc, v| acc.saturating_add(*v)),
    })
}

/// Parses the per-CPU rows of a counter table, requiring a row for every
/// one of the `processor_count` CPUs.
pub fn parse_counter_rows(
    content: &str,
    processor_count: usize,
) -> Result<Vec<CpuCounters>, SampleError> {
    parse_online_counter_rows(content, &vec![true; processor_count])
}

/// Parses the per-CPU rows of a counter table.
///
/// `online[i]` tells whether a row for `cpu{i}` is required. The kernel
/// omits rows of offline CPUs; their slots read as zero counters. The
/// aggregate `cpu` row and non-CPU lines (`intr`, `ctxt`, ...) are skipped.
/// Rows are placed by their `cpuN` index, so the result always has exactly
/// `online.len()` entries or the table is rejected.
pub fn parse_online_counter_rows(
    content: &str,
    online: &[bool],
) -> Result<Vec<CpuCounters>, SampleError> {
    let processor_count = online.len();
    let mut rows: Vec<Option<CpuCounters>> = vec![None; processor_count];

    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(label) = fields.first() else {
            continue;
        };
        let Some(suffix) = label.strip_prefix("cpu") else {
            continue;
        };
        if suffix.is_empty() {
            // aggregate row
            continue;
        }

        let cpu = suffix.parse::<usize>().map_err(|_| {
            SampleError::MalformedCounterRow(format!("unexpected row label '{}'", label))
        })?;
        if cpu >= processor_count {
            return Err(SampleError::MalformedCounterRow(format!(
                "cpu{} is outside the discovered topology of {} CPUs",
                cpu, processor_count
            )));
        }
        if rows[cpu].is_some() {
            return Err(SampleError::MalformedCounterRow(format!(
                "duplicate row for cpu{}",
                cpu
            )));
        }

        rows[cpu] = Some(parse_cpu_row(cpu, &fields[1..])?);
    }

    let missing: Vec<String> = rows
        .iter()
        .zip(online)
        .enumerate()
        .filter(|(_, (row, required))| row.is_none() && **required)
        .map(|(cpu, _)| format!("cpu{}", cpu))
        .collect();
    if !missing.is_empty() {
        return Err(SampleError::MalformedCounterRow(format!(
            "missing rows for online CPUs: {}",
            missing.join(",")
        )));
    }

    Ok(rows.into_iter().map(Option::unwrap_or_default).collect())
}

/// Returns the ids of the per-CPU rows in a counter table, in table order.
pub fn cpu_row_ids(content: &str) -> Vec<usize> {
    content
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|label| label.strip_prefix("cpu"))
        .filter(|suffix| !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|suffix| suffix.parse().ok())
        .collect()
}

/// CPU time counters, deltas and utilization for every CPU.
///
/// All vectors have exactly `processor_count` entries. The state only
/// changes through [`ProcessorTimeState::apply`], which replaces a whole
/// sample at once.
#[derive(Debug, Clone)]
pub struct ProcessorTimeState {
    processor_count: usize,
    previous_idle: Vec<u64>,
    previous_total: Vec<u64>,
    current_idle: Vec<u64>,
    current_total: Vec<u64>,
    delta_idle: Vec<u64>,
    delta_total: Vec<u64>,
    utilization: Vec<f64>,
    bootstrapped: bool,
    sampled_at: Option<DateTime<Utc>>,
    samples: u64,
}

impl ProcessorTimeState {
    /// Creates an empty state sized for `processor_count` CPUs.
    pub fn new(processor_count: usize) -> Self {
        Self {
            processor_count,
            previous_idle: vec![0; processor_count],
            previous_total: vec![0; processor_count],
            current_idle: vec![0; processor_count],
            current_total: vec![0; processor_count],
            delta_idle: vec![0; processor_count],
            delta_total: vec![0; processor_count],
            utilization: vec![0.0; processor_count],
            bootstrapped: false,
            sampled_at: None,
            samples: 0,
        }
    }

    /// Applies one full sample of counters.
    ///
    /// The first sample only records the counters: deltas and utilization
    /// stay at zero until a second sample arrives. Counters that moved
    /// backwards yield a zero delta. An interval without elapsed ticks
    /// reports 0% utilization.
    pub fn apply(&mut self, counters: &[CpuCounters], at: DateTime<Utc>) -> Result<(), SampleError> {
        if counters.len() != self.processor_count {
            return Err(SampleError::MalformedCounterRow(format!(
                "sample has {} CPUs, state has {}",
                counters.len(),
                self.processor_count
            )));
        }

        for (i, c) in counters.iter().enumerate() {
            self.current_idle[i] = c.idle;
            self.current_total[i] = c.total;
            self.utilization[i] = 0.0;

            if self.bootstrapped {
                self.delta_idle[i] = c.idle.saturating_sub(self.previous_idle[i]);
                self.delta_total[i] = c.total.saturating_sub(self.previous_total[i]);
                self.utilization[i] = utilization_percent(self.delta_idle[i], self.delta_total[i]);
            }

            self.previous_idle[i] = c.idle;
            self.previous_total[i] = c.total;
        }

        self.bootstrapped = true;
        self.sampled_at = Some(at);
        self.samples += 1;
        Ok(())
    }

    pub fn processor_count(&self) -> usize {
        self.processor_count
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    pub fn sampled_at(&self) -> Option<DateTime<Utc>> {
        self.sampled_at
    }

    /// Number of samples applied so far.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn current_idle(&self) -> &[u64] {
        &self.current_idle
    }

    pub fn current_total(&self) -> &[u64] {
        &self.current_total
    }

    pub fn delta_idle(&self) -> &[u64] {
        &self.delta_idle
    }

    pub fn delta_total(&self) -> &[u64] {
        &self.delta_total
    }

    /// Utilization per CPU in percent for the latest interval.
    pub fn utilization(&self) -> &[f64] {
        &self.utilization
    }
}

/// `(1 - idle/total) * 100`, or 0 when no ticks elapsed.
pub fn utilization_percent(delta_idle: u64, delta_total: u64) -> f64 {
    if delta_total == 0 {
        return 0.0;
    }
    (1.0 - delta_idle as f64 / delta_total as f64) * 100.0
}

/// Shared CPU time sampler.
///
/// The counter source is read and parsed before the write lock is taken,
/// so readers never wait on file I/O. Samples are serialized among
/// themselves so an older read can never be applied after a newer one.
pub struct CpuTimeStat {
    source: Box<dyn CounterSource>,
    online: Vec<bool>,
    sampling: Mutex<()>,
    state: RwLock<ProcessorTimeState>,
}

impl CpuTimeStat {
    /// Creates a sampler for `processor_count` CPUs, all expected online.
    pub fn new(source: impl CounterSource + 'static, processor_count: usize) -> Self {
        Self::with_online(source, processor_count, &(0..processor_count).collect::<Vec<_>>())
    }

    /// Creates a sampler for `processor_count` CPUs of which only the
    /// `online` ids must be present in every table. Ids outside the
    /// topology are ignored.
    pub fn with_online(
        source: impl CounterSource + 'static,
        processor_count: usize,
        online: &[usize],
    ) -> Self {
        let mut mask = vec![false; processor_count];
        for &cpu in online {
            if let Some(slot) = mask.get_mut(cpu) {
                *slot = true;
            }
        }
        Self {
            source: Box::new(source),
            online: mask,
            sampling: Mutex::new(()),
            state: RwLock::new(ProcessorTimeState::new(processor_count)),
        }
    }

    pub fn processor_count(&self) -> usize {
        self.online.len()
    }

    /// Whether a counter row is required for `cpu`.
    pub fn is_online(&self, cpu: usize) -> bool {
        self.online.get(cpu).copied().unwrap_or(false)
    }

    pub fn source_name(&self) -> String {
        self.source.name()
    }

    /// Takes one sample and atomically replaces the shared state.
    ///
    /// On error the previous state is left untouched. A call made while
    /// another sample is still reading fails with
    /// [`SampleError::InProgress`] instead of waiting for it.
    pub fn sample(&self) -> Result<(), SampleError> {
        let _sampling = match self.sampling.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                return Err(SampleError::InProgress(self.source.name()))
            }
            Err(TryLockError::Poisoned(_)) => return Err(SampleError::LockPoisoned),
        };
        let content = self
            .source
            .read()
            .map_err(|error| SampleError::SourceUnavailable {
                source_name: self.source.name(),
                error,
            })?;
        let counters = parse_online_counter_rows(&content, &self.online)?;
        let now = Utc::now();

        let mut state = self.state.write().map_err(|_| SampleError::LockPoisoned)?;
        state.apply(&counters, now)?;
        trace!("Applied CPU sample #{}", state.samples());
        if state.samples() == 1 {
            debug!(
                "Bootstrapped CPU time state for {} CPUs from {}",
                self.online.len(),
                self.source.name()
            );
        }
        Ok(())
    }

    /// Runs `f` against the latest state while holding the read lock.
    pub fn with_snapshot<R>(
        &self,
        f: impl FnOnce(&ProcessorTimeState) -> R,
    ) -> Result<R, SampleError> {
        let state = self.state.read().map_err(|_| SampleError::LockPoisoned)?;
        Ok(f(&state))
    }

    /// Returns a copy of the latest state.
    pub fn snapshot(&self) -> Result<ProcessorTimeState, SampleError> {
        self.with_snapshot(ProcessorTimeState::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Serves queued tables, repeating the last one when the queue runs dry.
    struct ScriptedSource {
        tables: Mutex<VecDeque<String>>,
    }

    impl ScriptedSource {
        fn new(tables: &[&str]) -> Self {
            Self {
                tables: Mutex::new(tables.iter().map(|t| t.to_string()).collect()),
            }
        }
    }

    impl CounterSource for ScriptedSource {
        fn read(&self) -> io::Result<String> {
            let mut tables = self.tables.lock().unwrap();
            if tables.len() > 1 {
                Ok(tables.pop_front().unwrap())
            } else {
                tables
                    .front()
                    .cloned()
                    .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no table"))
            }
        }

        fn name(&self) -> String {
            "scripted".into()
        }
    }

    const FIRST: &str = "cpu  300 0 0 700 0 0 0 0 0 0\n\
                         cpu0 100 0 0 400 0 0 0 0 0 0\n\
                         cpu1 200 0 0 300 0 0 0 0 0 0\n\
                         intr 12345 0 0\n\
                         ctxt 987\n";

    const SECOND: &str = "cpu  400 0 0 860 0 0 0 0 0 0\n\
                          cpu0 190 0 0 410 0 0 0 0 0 0\n\
                          cpu1 210 0 0 450 0 0 0 0 0 0\n";

    #[test]
    fn test_parse_counter_rows() {
        let rows = parse_counter_rows(
            "cpu  1 2 3 4 5 6 7 0 0 0\n\ncpu0 40321 11452 49784 403099 2615 6076 6748 0 0 0\n",
            1,
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].idle, 403099);
        assert_eq!(
            rows[0].total,
            40321 + 11452 + 49784 + 403099 + 2615 + 6076 + 6748
        );
    }

    #[test]
    fn test_parse_counter_rows_places_by_label() {
        let rows = parse_counter_rows("cpu1 1 1 1 20\ncpu0 1 1 1 10\n", 2).unwrap();
        assert_eq!(rows[0].idle, 10);
        assert_eq!(rows[1].idle, 20);
    }

    #[test]
    fn test_parse_counter_rows_too_few_rows() {
        let err = parse_counter_rows("cpu  1 1 1 1\ncpu0 1 1 1 1\n", 2).unwrap_err();
        assert!(matches!(err, SampleError::MalformedCounterRow(_)));
    }

    #[test]
    fn test_parse_counter_rows_rejects_unknown_cpu() {
        let err = parse_counter_rows("cpu0 1 1 1 1\ncpu7 1 1 1 1\n", 1).unwrap_err();
        assert!(matches!(err, SampleError::MalformedCounterRow(_)));
    }

    #[test]
    fn test_parse_counter_rows_rejects_duplicate_cpu() {
        let err = parse_counter_rows("cpu0 1 1 1 1\ncpu0 1 1 1 1\n", 2).unwrap_err();
        assert!(matches!(err, SampleError::MalformedCounterRow(_)));
    }

    #[test]
    fn test_parse_counter_rows_rejects_short_row() {
        let err = parse_counter_rows("cpu0 1 1 1\n", 1).unwrap_err();
        assert!(matches!(err, SampleError::MalformedCounterRow(_)));
    }

    #[test]
    fn test_parse_counter_rows_rejects_bad_token() {
        let err = parse_counter_rows("cpu0 1 1 x 1\n", 1).unwrap_err();
        match err {
            SampleError::MalformedToken { cpu, field, token } => {
                assert_eq!(cpu, 0);
                assert_eq!(field, 2);
                assert_eq!(token, "x");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_online_counter_rows_zeroes_offline_slots() {
        let rows = parse_online_counter_rows(
            "cpu0 1 0 0 10\ncpu1 2 0 0 20\ncpu3 4 0 0 40\n",
            &[true, true, false, true],
        )
        .unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2], CpuCounters::default());
        assert_eq!(rows[3].idle, 40);
    }

    #[test]
    fn test_parse_online_counter_rows_accepts_row_of_offline_cpu() {
        let rows =
            parse_online_counter_rows("cpu0 1 0 0 10\ncpu1 2 0 0 20\n", &[true, false]).unwrap();
        assert_eq!(rows[1].idle, 20);
    }

    #[test]
    fn test_parse_online_counter_rows_requires_online_rows() {
        let err = parse_online_counter_rows("cpu0 1 0 0 10\ncpu1 2 0 0 20\n", &[true, true, true])
            .unwrap_err();
        match err {
            SampleError::MalformedCounterRow(msg) => assert!(msg.contains("cpu2"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cpu_row_ids() {
        assert_eq!(cpu_row_ids(FIRST), vec![0, 1]);
        assert_eq!(cpu_row_ids("cpu 1 2\ncpu0 1\ncpu3 1\nintr 1\n"), vec![0, 3]);
        assert!(cpu_row_ids("cpu 1 2\ncpux 1\nintr 1\n").is_empty());
    }

    #[test]
    fn test_utilization_percent_zero_total() {
        assert_eq!(utilization_percent(0, 0), 0.0);
        assert!((utilization_percent(25, 100) - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_first_sample_reports_zero() {
        for n in 1..=4 {
            let table: String = (0..n)
                .map(|i| format!("cpu{} {} 0 0 {}\n", i, 10 + i, 50 * (i + 1)))
                .collect();
            let stat = CpuTimeStat::new(ScriptedSource::new(&[&table]), n);
            stat.sample().unwrap();

            let state = stat.snapshot().unwrap();
            assert!(state.is_bootstrapped());
            assert_eq!(state.utilization(), vec![0.0; n].as_slice());
            assert_eq!(state.delta_total(), vec![0; n].as_slice());
        }
    }

    #[test]
    fn test_consecutive_samples_compute_deltas() {
        let stat = CpuTimeStat::new(ScriptedSource::new(&[FIRST, SECOND]), 2);
        stat.sample().unwrap();
        stat.sample().unwrap();

        stat.with_snapshot(|state| {
            assert_eq!(state.samples(), 2);
            assert_eq!(state.delta_idle(), &[10, 150]);
            assert_eq!(state.delta_total(), &[100, 160]);
            assert!((state.utilization()[0] - 90.0).abs() < 1e-9);
            assert!((state.utilization()[1] - (1.0 - 150.0 / 160.0) * 100.0).abs() < 1e-9);
            assert_eq!(state.current_idle(), &[410, 450]);
        })
        .unwrap();
    }

    #[test]
    fn test_idle_interval_reports_zero() {
        let stat = CpuTimeStat::new(ScriptedSource::new(&[FIRST, FIRST]), 2);
        stat.sample().unwrap();
        stat.sample().unwrap();
        let state = stat.snapshot().unwrap();
        assert_eq!(state.delta_total(), &[0, 0]);
        assert!(state.utilization().iter().all(|u| *u == 0.0));
    }

    #[test]
    fn test_counter_reset_saturates() {
        let stat = CpuTimeStat::new(ScriptedSource::new(&[SECOND, FIRST]), 2);
        stat.sample().unwrap();
        stat.sample().unwrap();
        let state = stat.snapshot().unwrap();
        assert_eq!(state.delta_idle(), &[0, 0]);
        assert_eq!(state.delta_total(), &[0, 0]);
    }

    #[test]
    fn test_failed_sample_keeps_previous_state() {
        let broken = "cpu0 1 1 1 1\ncpu1 1 1 oops 1\n";
        let stat = CpuTimeStat::new(ScriptedSource::new(&[FIRST, SECOND, broken]), 2);
        stat.sample().unwrap();
        stat.sample().unwrap();
        let before = stat.snapshot().unwrap();

        assert!(matches!(
            stat.sample(),
            Err(SampleError::MalformedToken { .. })
        ));

        let after = stat.snapshot().unwrap();
        assert_eq!(after.samples(), before.samples());
        assert_eq!(after.delta_idle(), before.delta_idle());
        assert_eq!(after.utilization(), before.utilization());
    }

    #[test]
    fn test_missing_source_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let stat = CpuTimeStat::new(ProcStatSource::new(dir.path().join("stat")), 1);
        assert!(matches!(
            stat.sample(),
            Err(SampleError::SourceUnavailable { .. })
        ));
        assert!(!stat.snapshot().unwrap().is_bootstrapped());
    }

    #[test]
    fn test_file_source_round() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FIRST.as_bytes()).unwrap();
        let stat = CpuTimeStat::new(ProcStatSource::new(file.path()), 2);
        stat.sample().unwrap();
        assert_eq!(stat.snapshot().unwrap().current_total(), &[500, 500]);
    }

    #[test]
    fn test_apply_rejects_wrong_width() {
        let mut state = ProcessorTimeState::new(2);
        let err = state
            .apply(&[CpuCounters::default()], Utc::now())
            .unwrap_err();
        assert!(matches!(err, SampleError::MalformedCounterRow(_)));
        assert!(!state.is_bootstrapped());
    }

    /// Interval `k` advances every CPU's idle and busy counters by the same
    /// amount, so a consistent snapshot always has `total == 2 * idle`.
    struct GrowingSource {
        cpus: usize,
        round: AtomicU64,
    }

    impl CounterSource for GrowingSource {
        fn read(&self) -> io::Result<String> {
            let k = self.round.fetch_add(1, Ordering::SeqCst) + 1;
            let ticks = 10 * k * k;
            Ok((0..self.cpus)
                .map(|i| format!("cpu{} {} 0 0 {}\n", i, ticks, ticks))
                .collect())
        }

        fn name(&self) -> String {
            "growing".into()
        }
    }

    #[test]
    fn test_concurrent_readers_see_whole_intervals() {
        let cpus = 8;
        let stat = Arc::new(CpuTimeStat::new(
            GrowingSource {
                cpus,
                round: AtomicU64::new(0),
            },
            cpus,
        ));
        stat.sample().unwrap();
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let stat = Arc::clone(&stat);
                let done = Arc::clone(&done);
                std::thread::spawn(move || {
                    while !done.load(Ordering::SeqCst) {
                        stat.with_snapshot(|state| {
                            let idle = state.delta_idle();
                            let total = state.delta_total();
                            for i in 0..state.processor_count() {
                                assert_eq!(total[i], 2 * idle[i]);
                                assert_eq!(idle[i], idle[0]);
                            }
                        })
                        .unwrap();
                    }
                })
            })
            .collect();

        for _ in 0..500 {
            stat.sample().unwrap();
        }
        done.store(true, Ordering::SeqCst);

        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(stat.snapshot().unwrap().samples(), 501);
    }

    #[test]
    fn test_offline_cpu_samples_with_zero_delta() {
        let first = "cpu  0 0 0 0\ncpu0 10 0 0 90\ncpu1 20 0 0 80\ncpu3 30 0 0 70\n";
        let second = "cpu  0 0 0 0\ncpu0 60 0 0 140\ncpu1 20 0 0 180\ncpu3 130 0 0 70\n";
        let stat = CpuTimeStat::with_online(ScriptedSource::new(&[first, second]), 4, &[0, 1, 3]);
        assert!(stat.is_online(3));
        assert!(!stat.is_online(2));

        stat.sample().unwrap();
        stat.sample().unwrap();

        let state = stat.snapshot().unwrap();
        assert_eq!(state.processor_count(), 4);
        assert_eq!(state.delta_total(), &[100, 100, 0, 100]);
        assert_eq!(state.utilization()[2], 0.0);
        assert!((state.utilization()[0] - 50.0).abs() < 1e-9);
        assert!((state.utilization()[3] - 100.0).abs() < 1e-9);
    }

    /// Blocks every read until the test releases it.
    struct StalledSource {
        reads: Arc<AtomicUsize>,
        started: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl CounterSource for StalledSource {
        fn read(&self) -> io::Result<String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let _ = self.started.lock().unwrap().send(());
            let _ = self.release.lock().unwrap().recv();
            Ok(FIRST.to_string())
        }

        fn name(&self) -> String {
            "stalled".into()
        }
    }

    #[test]
    fn test_overlapping_sample_is_rejected() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let reads = Arc::new(AtomicUsize::new(0));
        let stat = Arc::new(CpuTimeStat::new(
            StalledSource {
                reads: Arc::clone(&reads),
                started: Mutex::new(started_tx),
                release: Mutex::new(release_rx),
            },
            2,
        ));

        let first = {
            let stat = Arc::clone(&stat);
            std::thread::spawn(move || stat.sample())
        };
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        for _ in 0..3 {
            assert!(matches!(stat.sample(), Err(SampleError::InProgress(_))));
        }
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        release_tx.send(()).unwrap();
        first.join().unwrap().unwrap();
        assert_eq!(stat.snapshot().unwrap().samples(), 1);

        // The guard is free again once the stalled read returns.
        release_tx.send(()).unwrap();
        stat.sample().unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }
}
