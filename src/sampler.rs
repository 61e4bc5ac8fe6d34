//! Background sampling of the CPU time counters.

use anyhow::{anyhow, Context};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{DEFAULT_SAMPLE_INTERVAL, DEFAULT_SAMPLE_TIMEOUT_MS};
use crate::state::SharedState;

/// Takes one CPU sample and records its outcome.
///
/// The blocking read runs on the blocking pool and is abandoned after
/// `sample_timeout_ms`. A late read is still applied once it completes,
/// but this interval is reported as failed. Until it completes every
/// further call fails at once instead of queueing another blocking read.
#[instrument(skip(state))]
pub async fn update_sample(state: &SharedState) -> anyhow::Result<()> {
    let start = Instant::now();

    {
        let mut status = state.status.write().await;
        status.mark_updating();
        state.telemetry.sampling.set(1.0);
    }

    let timeout = Duration::from_millis(
        state
            .config
            .sample_timeout_ms
            .unwrap_or(DEFAULT_SAMPLE_TIMEOUT_MS),
    );
    let cpu_stat = Arc::clone(&state.cpu_stat);
    let task = tokio::task::spawn_blocking(move || cpu_stat.sample());

    let result = match tokio::time::timeout(timeout, task).await {
        Ok(Ok(sampled)) => sampled.context("CPU sample failed"),
        Ok(Err(join_error)) => Err(anyhow!("Sampling task failed: {}", join_error)),
        Err(_) => Err(anyhow!(
            "CPU sample timed out after {}ms",
            timeout.as_millis()
        )),
    };

    let duration = start.elapsed().as_secs_f64();
    state.health_stats.record_sample(duration, result.is_ok());
    state.telemetry.sampling.set(0.0);
    state.telemetry.sample_duration.set(duration);

    let mut status = state.status.write().await;
    match &result {
        Ok(()) => {
            let sampled_at = state
                .cpu_stat
                .with_snapshot(|s| s.sampled_at())
                .ok()
                .flatten()
                .unwrap_or_else(Utc::now);
            status.mark_success(sampled_at, duration);
            state.telemetry.sample_success.set(1.0);
            debug!("CPU sample completed in {:.3}ms", duration * 1000.0);
        }
        Err(e) => {
            status.mark_failure(format!("{:#}", e), duration);
            state.telemetry.sample_success.set(0.0);
            if status.consecutive_failures > 1 {
                warn!(
                    "{} consecutive CPU samples failed",
                    status.consecutive_failures
                );
            }
        }
    }

    result
}

/// Spawns the periodic sampler.
///
/// The first tick is skipped because the caller takes the initial sample
/// before serving.
pub fn spawn_sampler(state: SharedState) -> JoinHandle<()> {
    let period = Duration::from_secs(
        state
            .config
            .sample_interval_secs
            .unwrap_or(DEFAULT_SAMPLE_INTERVAL),
    );

    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        info!(
            "Background CPU sampler started with {}s interval",
            period.as_secs()
        );

        loop {
            ticker.tick().await;
            if let Err(e) = update_sample(&state).await {
                error!("Scheduled CPU sample failed: {:#}", e);
            }
        }
    })
}
