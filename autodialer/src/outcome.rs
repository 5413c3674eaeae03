//! Terminal classification of a single call attempt

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How a call attempt ended, as judged from the pause indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// The indicator never appeared within the ring timeout.
    NoAnswer,
    /// The indicator stayed up past the busy threshold plus the answered grace.
    Answered,
    /// The indicator vanished almost immediately (remote end off or line busy).
    PoweredOffOrBusy,
    /// The indicator vanished after the busy boundary but before the call counted as answered.
    EndedAfterAnswer,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::NoAnswer => "no_answer",
            CallStatus::Answered => "answered",
            CallStatus::PoweredOffOrBusy => "powered_off_or_busy",
            CallStatus::EndedAfterAnswer => "ended_after_answer",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one detection run. Created once per call attempt and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCallOutcome")]
pub struct CallOutcome {
    status: CallStatus,
    /// Seconds from the first sighting of the indicator to resolution.
    #[serde(rename = "duration")]
    duration_secs: f64,
}

impl CallOutcome {
    pub fn no_answer() -> Self {
        Self {
            status: CallStatus::NoAnswer,
            duration_secs: 0.0,
        }
    }

    pub(crate) fn resolved(status: CallStatus, elapsed: Duration) -> Self {
        Self {
            status,
            duration_secs: elapsed.as_secs_f64(),
        }
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration_secs).unwrap_or_default()
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }
}

/// Wire form of [`CallOutcome`], checked before it becomes a value.
#[derive(Deserialize)]
struct RawCallOutcome {
    status: CallStatus,
    duration: f64,
}

impl TryFrom<RawCallOutcome> for CallOutcome {
    type Error = String;

    fn try_from(raw: RawCallOutcome) -> Result<Self, Self::Error> {
        if !raw.duration.is_finite() || raw.duration < 0.0 {
            return Err(format!(
                "duration must be a finite, non-negative number of seconds, got {}",
                raw.duration
            ));
        }
        Ok(Self {
            status: raw.status,
            duration_secs: raw.duration,
        })
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (~{:.1}s)", self.status, self.duration_secs)
    }
}
