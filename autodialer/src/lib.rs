//! Call-outcome detection for browser-driven telephony dialers
//!
//! The core of this crate is [`CallOutcomeDetector`]: it polls a single
//! boolean signal, the "pause" indicator of a web telephony UI, and
//! classifies a call attempt as no answer, answered, powered off / busy, or
//! ended after answer. Around it sit the pieces a dialer needs to use it:
//! a JSON configuration, a browser-page abstraction with login and dial
//! flows, a calling window, a contact list, and [`DialSession`], which walks
//! the contacts and acts on every outcome.
//!
//! ```
//! use autodialer::{CallOutcomeDetector, CallStatus, DetectionConfig, FakeClock, ScriptedProbe};
//! use std::sync::Arc;
//!
//! let config = DetectionConfig::new(15.0, 3.0, 0.4)?;
//! let detector = CallOutcomeDetector::with_clock(config, Arc::new(FakeClock::new()));
//! // Indicator shows up on the first poll and stays up.
//! let outcome = detector.detect(&ScriptedProbe::pulse(0, usize::MAX));
//! assert_eq!(outcome.status(), CallStatus::Answered);
//! # Ok::<(), autodialer::DialerError>(())
//! ```

pub mod clock;
pub mod config;
pub mod contacts;
pub mod detector;
pub mod errors;
pub mod outcome;
pub mod page;
pub mod probe;
pub mod schedule;
pub mod selector;
pub mod session;
#[cfg(test)]
mod tests;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{DetectionConfig, DialerConfig};
pub use contacts::{validate_phone_number, Contact, ContactBook};
pub use detector::{CallOutcomeDetector, DetectionState};
pub use errors::DialerError;
pub use outcome::{CallOutcome, CallStatus};
pub use page::{BrowserPage, TelephonyPortal};
pub use probe::{ElementProbe, FnProbe, Sample, ScriptedProbe, SignalProbe};
pub use schedule::CallWindow;
pub use selector::{sanitize_selector, CssSelector};
pub use session::{AudioPlayer, CallHandling, CallRecord, DialSession, HangupHandle, SessionReport};
