//! Offline replay of a pause-indicator trace through the detector.

use anyhow::{bail, Context, Result};
use autodialer::{
    CallOutcome, CallOutcomeDetector, Clock, DetectionConfig, FakeClock, ScriptedProbe,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Longest stretch of simulated time a replay may cover.
const MAX_SIMULATED_SPAN: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on poll iterations in one replay.
const MAX_SIMULATED_POLLS: u128 = 1_000_000;

/// What a replay produced, in a shape suitable for `--json` output.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub outcome: CallOutcome,
    /// Probe samples consumed before the run resolved.
    pub samples: usize,
    /// Simulated seconds from the start of detection to resolution.
    pub elapsed: f64,
    pub ring_timeout: f64,
    pub busy_boundary: f64,
    pub answered_boundary: f64,
    pub poll_interval: f64,
}

/// Replay `trace` on a fake clock. Each sample may cost `latency` of
/// simulated time, as a slow page lookup would.
pub fn simulate(config: DetectionConfig, trace: &str, latency: Duration) -> Result<SimulationReport> {
    check_bounded(&config)?;
    let clock = FakeClock::new();
    let probe = ScriptedProbe::parse(trace)
        .context("Failed to parse probe trace")?
        .with_latency(clock.clone(), latency);
    let detector = CallOutcomeDetector::with_clock(config, Arc::new(clock.clone()));

    let outcome = detector.detect(&probe);

    Ok(SimulationReport {
        outcome,
        samples: probe.calls(),
        elapsed: clock.now().as_secs_f64(),
        ring_timeout: config.ring_timeout().as_secs_f64(),
        busy_boundary: config.busy_boundary().as_secs_f64(),
        answered_boundary: config.answered_boundary().as_secs_f64(),
        poll_interval: config.poll_interval().as_secs_f64(),
    })
}

/// Refuse thresholds whose replay would not finish in reasonable time.
fn check_bounded(config: &DetectionConfig) -> Result<()> {
    let span = config.ring_timeout().saturating_add(config.answered_boundary());
    if span > MAX_SIMULATED_SPAN {
        bail!(
            "Detection thresholds span {:.0}s, more than the {}s a simulation may cover",
            span.as_secs_f64(),
            MAX_SIMULATED_SPAN.as_secs()
        );
    }
    let polls = span.as_nanos() / config.poll_interval().as_nanos();
    if polls > MAX_SIMULATED_POLLS {
        bail!("Poll interval too small: simulation would take {polls} polls");
    }
    Ok(())
}
