//! Daily calling window

use crate::errors::DialerError;
use chrono::NaiveTime;
use std::fmt;

const TIME_FORMAT: &str = "%H:%M";

/// Local time-of-day range during which calls may be placed. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl CallWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, DialerError> {
        if start > end {
            return Err(DialerError::InvalidSchedule(format!(
                "window start {} is after end {}",
                start.format(TIME_FORMAT),
                end.format(TIME_FORMAT)
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse a window from two `HH:MM` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, DialerError> {
        Self::new(parse_time(start)?, parse_time(end)?)
    }

    /// A window covering the whole day.
    pub fn always() -> Self {
        Self {
            start: NaiveTime::MIN,
            end: NaiveTime::from_hms_nano_opt(23, 59, 59, 1_999_999_999).unwrap_or(NaiveTime::MIN),
        }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time <= self.end
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }
}

impl fmt::Display for CallWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format(TIME_FORMAT),
            self.end.format(TIME_FORMAT)
        )
    }
}

fn parse_time(raw: &str) -> Result<NaiveTime, DialerError> {
    NaiveTime::parse_from_str(raw.trim(), TIME_FORMAT)
        .map_err(|e| DialerError::InvalidSchedule(format!("'{raw}' is not an HH:MM time: {e}")))
}
