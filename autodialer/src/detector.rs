//! Call-outcome detection.
//!
//! A call attempt is classified by watching one signal, the pause indicator
//! of the telephony UI, which is up while the line rings and during early
//! call setup:
//!
//! - it never appears within `ring_timeout`: **no answer**;
//! - it appears and vanishes within `off_busy_threshold + busy_slack`:
//!   **powered off or busy** (fast signalling teardown);
//! - it vanishes later than that: **ended after answer**;
//! - it is still up at `off_busy_threshold + answered_grace`: **answered**.
//!
//! Every sample is followed by one `poll_interval` sleep, so samples land on a
//! fixed grid measured from the start of detection.

use crate::clock::{Clock, SystemClock};
use crate::config::DetectionConfig;
use crate::errors::DialerError;
use crate::outcome::{CallOutcome, CallStatus};
use crate::probe::SignalProbe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Where a detection run currently stands. Runs are single-shot: no state
/// ever leads back to [`DetectionState::WaitingForRing`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectionState {
    /// Waiting for the indicator to show up at all.
    WaitingForRing { deadline: Duration },
    /// The indicator was first seen at `since`.
    WaitingForResolution { since: Duration },
    Terminal(CallOutcome),
}

impl DetectionState {
    /// Initial state for a run starting at `now`.
    pub fn begin(now: Duration, config: &DetectionConfig) -> Self {
        DetectionState::WaitingForRing {
            deadline: now + config.ring_timeout(),
        }
    }

    /// Resolve to `no_answer` if the ring deadline has passed at `now`.
    pub fn expire(self, now: Duration) -> Self {
        match self {
            DetectionState::WaitingForRing { deadline } if now >= deadline => {
                DetectionState::Terminal(CallOutcome::no_answer())
            }
            other => other,
        }
    }

    /// Feed one sample of the indicator taken at `now`.
    pub fn advance(self, visible: bool, now: Duration, config: &DetectionConfig) -> Self {
        match self {
            DetectionState::WaitingForRing { .. } if visible => {
                DetectionState::WaitingForResolution { since: now }
            }
            DetectionState::WaitingForResolution { since } => {
                let elapsed = now.saturating_sub(since);
                if !visible {
                    let status = if elapsed <= config.busy_boundary() {
                        CallStatus::PoweredOffOrBusy
                    } else {
                        CallStatus::EndedAfterAnswer
                    };
                    DetectionState::Terminal(CallOutcome::resolved(status, elapsed))
                } else if elapsed >= config.answered_boundary() {
                    DetectionState::Terminal(CallOutcome::resolved(CallStatus::Answered, elapsed))
                } else {
                    self
                }
            }
            other => other,
        }
    }

    pub fn outcome(&self) -> Option<CallOutcome> {
        match self {
            DetectionState::Terminal(outcome) => Some(*outcome),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DetectionState::Terminal(_))
    }
}

/// Polls a [`SignalProbe`] and classifies the call it observes.
///
/// Detection blocks the calling thread until a terminal outcome. Use
/// [`CallOutcomeDetector::detect_async`] from async code.
#[derive(Clone)]
pub struct CallOutcomeDetector {
    config: DetectionConfig,
    clock: Arc<dyn Clock>,
}

impl CallOutcomeDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(config: DetectionConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Run detection to completion. Always yields exactly one outcome.
    #[instrument(level = "debug", skip_all)]
    pub fn detect<P: SignalProbe + ?Sized>(&self, probe: &P) -> CallOutcome {
        let mut state = DetectionState::begin(self.clock.now(), &self.config);
        loop {
            state = self.poll_once(state, probe);
            if let DetectionState::Terminal(outcome) = state {
                return outcome;
            }
        }
    }

    /// Like [`detect`](Self::detect), but checks `cancel` between polls and
    /// gives up with [`DialerError::Cancelled`] once it fires.
    #[instrument(level = "debug", skip_all)]
    pub fn detect_cancellable<P: SignalProbe + ?Sized>(
        &self,
        probe: &P,
        cancel: &CancellationToken,
    ) -> Result<CallOutcome, DialerError> {
        let mut state = DetectionState::begin(self.clock.now(), &self.config);
        loop {
            if cancel.is_cancelled() {
                info!(?state, "Call detection cancelled");
                return Err(DialerError::Cancelled(
                    "call detection was cancelled".to_string(),
                ));
            }
            state = self.poll_once(state, probe);
            if let DetectionState::Terminal(outcome) = state {
                return Ok(outcome);
            }
        }
    }

    /// Run detection on a blocking worker thread.
    pub async fn detect_async<P>(
        &self,
        probe: P,
        cancel: CancellationToken,
    ) -> Result<CallOutcome, DialerError>
    where
        P: SignalProbe + 'static,
    {
        let detector = self.clone();
        task::spawn_blocking(move || detector.detect_cancellable(&probe, &cancel))
            .await
            .map_err(|e| DialerError::Internal(format!("Task join error: {e}")))?
    }

    /// One iteration: expire the ring deadline, take a sample, and sleep one
    /// poll interval unless the run has finished.
    fn poll_once<P: SignalProbe + ?Sized>(&self, state: DetectionState, probe: &P) -> DetectionState {
        let next = match state {
            DetectionState::WaitingForRing { .. } => {
                let state = state.expire(self.clock.now());
                if state.is_terminal() {
                    info!("Pause indicator never appeared: no answer or unreachable");
                    return state;
                }
                let visible = self.sample(probe);
                let next = state.advance(visible, self.clock.now(), &self.config);
                if matches!(next, DetectionState::WaitingForResolution { .. }) {
                    info!("Pause indicator appeared");
                }
                next
            }
            DetectionState::WaitingForResolution { .. } => {
                let now = self.clock.now();
                let visible = self.sample(probe);
                let next = state.advance(visible, now, &self.config);
                if let Some(outcome) = next.outcome() {
                    match outcome.status() {
                        CallStatus::Answered => {
                            info!(duration = outcome.duration_secs(), "Call answered")
                        }
                        status => info!(
                            duration = outcome.duration_secs(),
                            %status,
                            "Pause indicator disappeared"
                        ),
                    }
                }
                next
            }
            terminal => return terminal,
        };
        if !next.is_terminal() {
            self.clock.sleep(self.config.poll_interval());
        }
        next
    }

    fn sample<P: SignalProbe + ?Sized>(&self, probe: &P) -> bool {
        match probe.is_visible() {
            Ok(visible) => visible,
            Err(e) => {
                debug!("Probe failed, treating sample as not visible: {e}");
                false
            }
        }
    }
}
