//! Tests for call-outcome detection, driven by a fake clock

use super::init_tracing;
use crate::{
    CallOutcome, CallOutcomeDetector, CallStatus, Clock, DetectionConfig, DetectionState,
    DialerError, FakeClock, FnProbe, ScriptedProbe,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn reference_config() -> DetectionConfig {
    DetectionConfig::new(15.0, 3.0, 0.4).unwrap()
}

fn detector(config: DetectionConfig) -> (CallOutcomeDetector, FakeClock) {
    let clock = FakeClock::new();
    let detector = CallOutcomeDetector::with_clock(config, Arc::new(clock.clone()));
    (detector, clock)
}

fn assert_secs(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected ~{expected}s, got {actual}s"
    );
}

#[test]
fn test_never_visible_is_no_answer_after_ring_timeout() {
    init_tracing();
    let (detector, clock) = detector(reference_config());
    let probe = ScriptedProbe::from_bools(&[false]);

    let outcome = detector.detect(&probe);

    assert_eq!(outcome, CallOutcome::no_answer());
    assert_eq!(outcome.duration_secs(), 0.0);
    let elapsed = clock.now();
    assert!(elapsed >= Duration::from_secs(15), "returned early: {elapsed:?}");
    assert!(
        elapsed < Duration::from_secs(15) + Duration::from_millis(200),
        "returned late: {elapsed:?}"
    );
    // One sample every 200ms across the 15s window.
    assert_eq!(probe.calls(), 75);
}

#[test]
fn test_slow_probe_twenty_negative_polls_fill_the_ring_window() {
    let (detector, clock) = detector(reference_config());
    // Each lookup costs 550ms, so with the 200ms cadence twenty negative polls
    // span the whole 15s window and the later positives are never seen.
    let probe = ScriptedProbe::pulse(20, usize::MAX)
        .with_latency(clock.clone(), Duration::from_millis(550));

    let outcome = detector.detect(&probe);

    assert_eq!(outcome.status(), CallStatus::NoAnswer);
    assert_eq!(outcome.duration_secs(), 0.0);
    assert_eq!(probe.calls(), 20);
    assert_eq!(clock.now(), Duration::from_secs(15));
}

#[test]
fn test_indicator_gone_at_poll_ten_is_powered_off_or_busy() {
    let (detector, _clock) = detector(reference_config());
    let mut script = vec![true; 9];
    script.push(false);
    let probe = ScriptedProbe::from_bools(&script);

    let outcome = detector.detect(&probe);

    assert_eq!(outcome.status(), CallStatus::PoweredOffOrBusy);
    assert_secs(outcome.duration_secs(), 1.8);
    assert_eq!(probe.calls(), 10);
}

#[test]
fn test_indicator_held_through_poll_eighteen_is_answered() {
    let (detector, _clock) = detector(reference_config());
    let probe = ScriptedProbe::pulse(0, usize::MAX);

    let outcome = detector.detect(&probe);

    assert_eq!(outcome.status(), CallStatus::Answered);
    assert_secs(outcome.duration_secs(), 3.4);
    assert_eq!(probe.calls(), 18);
}

#[test]
fn test_duration_is_measured_from_first_sighting() {
    let (detector, clock) = detector(reference_config());
    // Rings for 2s before the indicator shows, then drops after 1s.
    let probe = ScriptedProbe::pulse(10, 5);

    let outcome = detector.detect(&probe);

    assert_eq!(outcome.status(), CallStatus::PoweredOffOrBusy);
    assert_secs(outcome.duration_secs(), 1.0);
    assert_eq!(clock.now(), Duration::from_secs(3));
}

#[test]
fn test_busy_boundary_is_inclusive() {
    let config = DetectionConfig::new(15.0, 3.0, 2.0)
        .unwrap()
        .with_poll_interval(Duration::from_millis(100))
        .unwrap();

    // Visible on samples at 0.0..=3.2s, gone at 3.3s == threshold + slack.
    let (at_boundary, _) = detector(config);
    let outcome = at_boundary.detect(&ScriptedProbe::pulse(0, 33));
    assert_eq!(outcome.status(), CallStatus::PoweredOffOrBusy);
    assert_secs(outcome.duration_secs(), 3.3);

    // One poll later it is no longer a busy signal.
    let (past_boundary, _) = detector(config);
    let outcome = past_boundary.detect(&ScriptedProbe::pulse(0, 34));
    assert_eq!(outcome.status(), CallStatus::EndedAfterAnswer);
    assert_secs(outcome.duration_secs(), 3.4);
}

#[test]
fn test_ended_after_answer_between_boundaries() {
    let config = DetectionConfig::new(15.0, 3.0, 2.0).unwrap();
    let (detector, _) = detector(config);
    // Gone at 4.0s: past 3.3s busy boundary, before the 5.0s answered boundary.
    let outcome = detector.detect(&ScriptedProbe::pulse(0, 20));

    assert_eq!(outcome.status(), CallStatus::EndedAfterAnswer);
    assert_secs(outcome.duration_secs(), 4.0);
}

#[test]
fn test_answered_within_one_poll_of_boundary() {
    let poll = Duration::from_millis(300);
    let config = reference_config().with_poll_interval(poll).unwrap();
    let (detector, _) = detector(config);

    let outcome = detector.detect(&ScriptedProbe::pulse(0, usize::MAX));

    assert_eq!(outcome.status(), CallStatus::Answered);
    let boundary = config.answered_boundary();
    assert!(outcome.duration() >= boundary);
    assert!(outcome.duration() < boundary + poll);
}

#[test]
fn test_busy_slack_is_sensitive_to_poll_interval() {
    // The indicator is really up for 3.25s. Whether that reads as a busy line
    // depends on where the poll grid lands relative to the 3.3s boundary.
    fn run(poll_ms: u64, slack_ms: u64) -> CallOutcome {
        let clock = FakeClock::new();
        let config = DetectionConfig::new(15.0, 3.0, 2.0)
            .unwrap()
            .with_poll_interval(Duration::from_millis(poll_ms))
            .unwrap()
            .with_busy_slack(Duration::from_millis(slack_ms));
        let detector = CallOutcomeDetector::with_clock(config, Arc::new(clock.clone()));
        let signal_clock = clock.clone();
        let probe = FnProbe::new(move || Ok(signal_clock.now() < Duration::from_millis(3250)));
        detector.detect(&probe)
    }

    let fine = run(100, 300);
    assert_eq!(fine.status(), CallStatus::PoweredOffOrBusy);
    assert_secs(fine.duration_secs(), 3.3);

    let coarse = run(400, 300);
    assert_eq!(coarse.status(), CallStatus::EndedAfterAnswer);
    assert_secs(coarse.duration_secs(), 3.6);

    let coarse_wide_slack = run(400, 600);
    assert_eq!(coarse_wide_slack.status(), CallStatus::PoweredOffOrBusy);
}

#[test]
fn test_probe_failure_reads_as_not_visible() {
    let (detector, _) = detector(reference_config());
    let probe = ScriptedProbe::parse("1x").unwrap();

    let outcome = detector.detect(&probe);

    assert_eq!(outcome.status(), CallStatus::PoweredOffOrBusy);
    assert_secs(outcome.duration_secs(), 0.2);
}

#[test]
fn test_probe_failures_during_ring_keep_waiting() {
    let (detector, clock) = detector(reference_config());
    let probe = ScriptedProbe::parse("xxx1").unwrap();

    let outcome = detector.detect(&probe);

    assert_eq!(outcome.status(), CallStatus::Answered);
    assert_secs(outcome.duration_secs(), 3.4);
    assert_eq!(clock.now(), Duration::from_millis(4000));
}

#[test]
fn test_sequential_runs_do_not_share_state() {
    let (detector, _) = detector(reference_config());
    let mut busy_script = vec![true; 9];
    busy_script.push(false);

    let first = detector.detect(&ScriptedProbe::from_bools(&busy_script));
    let second = detector.detect(&ScriptedProbe::pulse(0, usize::MAX));
    let third = detector.detect(&ScriptedProbe::from_bools(&[false]));

    assert_eq!(first.status(), CallStatus::PoweredOffOrBusy);
    assert_secs(first.duration_secs(), 1.8);
    assert_eq!(second.status(), CallStatus::Answered);
    assert_secs(second.duration_secs(), 3.4);
    assert_eq!(third, CallOutcome::no_answer());
}

#[test]
fn test_cancelled_before_start_never_samples() {
    let (detector, _) = detector(reference_config());
    let probe = ScriptedProbe::from_bools(&[false]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = detector.detect_cancellable(&probe, &cancel);

    assert!(matches!(result, Err(DialerError::Cancelled(_))));
    assert_eq!(probe.calls(), 0);
}

#[test]
fn test_cancellation_aborts_between_polls() {
    let (detector, _) = detector(reference_config());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let probe = FnProbe::new(move || {
        if counter.fetch_add(1, Ordering::SeqCst) + 1 == 5 {
            trigger.cancel();
        }
        Ok(true)
    });

    let result = detector.detect_cancellable(&probe, &cancel);

    assert!(matches!(result, Err(DialerError::Cancelled(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[test]
fn test_uncancelled_token_matches_plain_detect() {
    let (detector, _) = detector(reference_config());
    let outcome = detector
        .detect_cancellable(&ScriptedProbe::pulse(0, usize::MAX), &CancellationToken::new())
        .unwrap();
    assert_eq!(outcome.status(), CallStatus::Answered);
}

#[tokio::test]
async fn test_detect_async_runs_on_worker() {
    let (detector, _) = detector(reference_config());
    let probe = ScriptedProbe::pulse(3, 4);

    let outcome = detector
        .detect_async(probe, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status(), CallStatus::PoweredOffOrBusy);
    assert_secs(outcome.duration_secs(), 0.8);
}

#[test]
fn test_state_machine_transitions() {
    let config = reference_config();
    let start = DetectionState::begin(Duration::ZERO, &config);
    assert_eq!(
        start,
        DetectionState::WaitingForRing {
            deadline: Duration::from_secs(15)
        }
    );

    // Negative samples keep ringing; only the deadline ends the ring phase.
    let still = start.advance(false, Duration::from_secs(20), &config);
    assert_eq!(still, start);
    assert_eq!(still.expire(Duration::from_secs(14)), start);
    assert_eq!(
        still.expire(Duration::from_secs(15)).outcome(),
        Some(CallOutcome::no_answer())
    );

    let resolving = start.advance(true, Duration::from_secs(2), &config);
    assert_eq!(
        resolving,
        DetectionState::WaitingForResolution {
            since: Duration::from_secs(2)
        }
    );
    // Expiry does not apply once the indicator has been seen.
    assert_eq!(resolving.expire(Duration::from_secs(60)), resolving);
    // Early positive samples stay in resolution.
    assert_eq!(
        resolving.advance(true, Duration::from_secs(4), &config),
        resolving
    );

    let answered = resolving.advance(true, Duration::from_millis(5400), &config);
    assert_eq!(answered.outcome().map(|o| o.status()), Some(CallStatus::Answered));

    // Terminal states absorb everything.
    assert_eq!(answered.advance(false, Duration::from_secs(99), &config), answered);
    assert_eq!(answered.expire(Duration::from_secs(99)), answered);
}

#[test]
fn test_outcome_rejects_invalid_duration_on_deserialize() {
    let negative = serde_json::from_str::<CallOutcome>(r#"{"status":"answered","duration":-1.0}"#);
    assert!(negative.is_err());

    // JSON has no NaN literal; a non-number is rejected by the same path.
    let not_a_number = serde_json::from_str::<CallOutcome>(r#"{"status":"answered","duration":"NaN"}"#);
    assert!(not_a_number.is_err());

    let infinite = serde_json::from_str::<CallOutcome>(r#"{"status":"answered","duration":1e400}"#);
    assert!(infinite.is_err());
}

#[test]
fn test_outcome_serde_keeps_status_and_duration() {
    let answered = CallOutcome::resolved(CallStatus::Answered, Duration::from_millis(1500));
    let json = serde_json::to_string(&answered).unwrap();
    assert_eq!(json, r#"{"status":"answered","duration":1.5}"#);

    let back: CallOutcome = serde_json::from_str(&json).unwrap();
    assert_eq!(back, answered);
    assert_eq!(back.duration(), Duration::from_millis(1500));
}

#[test]
fn test_fake_clock_advance_saturates_instead_of_wrapping() {
    let clock = FakeClock::new();
    clock.advance(Duration::from_secs(5));
    clock.advance(Duration::MAX);
    assert_eq!(clock.now(), Duration::from_nanos(u64::MAX));

    clock.advance_ms(1);
    assert_eq!(clock.now(), Duration::from_nanos(u64::MAX));
}
