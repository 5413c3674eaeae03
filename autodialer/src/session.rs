//! Dial sessions: drive the telephony portal through a list of contacts,
//! classify each call and act on the outcome.

use crate::clock::Clock;
use crate::config::DialerConfig;
use crate::contacts::{validate_phone_number, Contact, ContactBook};
use crate::detector::CallOutcomeDetector;
use crate::errors::DialerError;
use crate::outcome::{CallOutcome, CallStatus};
use crate::page::{BrowserPage, TelephonyPortal};
use crate::schedule::CallWindow;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

const WINDOW_RECHECK_INTERVAL: Duration = Duration::from_secs(30);
const AUDIO_REPEAT_GAP: Duration = Duration::from_millis(500);

/// Plays an audio file into the call. `play` blocks until playback ends.
pub trait AudioPlayer: Send + Sync {
    fn play(&self, path: &Path, output_index: Option<u32>) -> Result<(), DialerError>;
}

/// What the session did with a classified call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CallHandling {
    /// The audio file was played this many times.
    AudioPlayed { repeats: u32 },
    AudioFailed,
    /// The operator hung up an answered call.
    HungUpByOperator,
    /// An answered call was hung up because `max_hangup_wait` elapsed.
    HangupWaitExpired,
    /// Nothing to do beyond logging.
    Logged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub contact: Contact,
    pub outcome: CallOutcome,
    pub dial_attempts: u32,
    pub handling: CallHandling,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub records: Vec<CallRecord>,
}

impl SessionReport {
    pub fn count(&self, status: CallStatus) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome.status() == status)
            .count()
    }
}

/// Lets the operator end an answered call that is waiting for a manual hang-up.
#[derive(Clone)]
pub struct HangupHandle {
    state: Arc<HangupState>,
    portal: TelephonyPortal,
}

struct HangupState {
    active: AtomicBool,
    requested: AtomicBool,
}

impl HangupHandle {
    fn new(portal: TelephonyPortal) -> Self {
        Self {
            state: Arc::new(HangupState {
                active: AtomicBool::new(false),
                requested: AtomicBool::new(false),
            }),
            portal,
        }
    }

    /// Whether an answered call is currently waiting for a hang-up.
    pub fn is_call_active(&self) -> bool {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Hang up the active call. Returns `false` when there is none.
    pub fn hang_up(&self) -> bool {
        if !self.is_call_active() {
            warn!("Hang-up requested but no call is active");
            return false;
        }
        info!("Hang-up requested");
        if let Err(e) = self.portal.hang_up() {
            warn!("Failed to click hang-up control: {e}");
        }
        self.state.requested.store(true, Ordering::SeqCst);
        true
    }

    fn begin_call(&self) {
        self.state.requested.store(false, Ordering::SeqCst);
        self.state.active.store(true, Ordering::SeqCst);
    }

    fn end_call(&self) {
        self.state.active.store(false, Ordering::SeqCst);
    }

    fn is_requested(&self) -> bool {
        self.state.requested.load(Ordering::SeqCst)
    }
}

/// One operator's dialing session over a single browser page.
#[derive(Clone)]
pub struct DialSession {
    id: Uuid,
    config: DialerConfig,
    window: CallWindow,
    portal: TelephonyPortal,
    detector: CallOutcomeDetector,
    audio: Option<Arc<dyn AudioPlayer>>,
    clock: Arc<dyn Clock>,
    hangup: HangupHandle,
    cancel: CancellationToken,
}

impl DialSession {
    pub fn new(
        config: DialerConfig,
        page: Arc<dyn BrowserPage>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DialerError> {
        config.validate()?;
        let detection = config.detection()?;
        let window = config.call_window()?;
        let portal = TelephonyPortal::new(page, clock.clone(), &config);
        Ok(Self {
            id: Uuid::new_v4(),
            window,
            detector: CallOutcomeDetector::with_clock(detection, clock.clone()),
            hangup: HangupHandle::new(portal.clone()),
            portal,
            audio: None,
            clock,
            cancel: CancellationToken::new(),
            config,
        })
    }

    pub fn with_audio_player(mut self, player: Arc<dyn AudioPlayer>) -> Self {
        self.audio = Some(player);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn hangup_handle(&self) -> HangupHandle {
        self.hangup.clone()
    }

    /// Token that aborts the session between polls when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Dial every contact in `category` (all contacts for `None`), marking each
    /// one called in `book` once its outcome is known. The browser page is
    /// closed when the session ends, successfully or not.
    #[instrument(skip_all, fields(session = %self.id))]
    pub fn run(
        &self,
        book: &mut ContactBook,
        category: Option<&str>,
    ) -> Result<SessionReport, DialerError> {
        let contacts = book.filter(category);
        let result = self.run_inner(book, &contacts);
        self.close_page();
        match &result {
            Ok(report) => info!(calls = report.records.len(), "All calls finished"),
            Err(e) => error!("Dial session aborted: {e}"),
        }
        result
    }

    /// Run the session on a blocking worker. The updated book is handed back
    /// alongside the report.
    pub async fn run_async(
        &self,
        mut book: ContactBook,
        category: Option<String>,
    ) -> Result<(ContactBook, SessionReport), DialerError> {
        let session = self.clone();
        task::spawn_blocking(move || {
            let report = session.run(&mut book, category.as_deref())?;
            Ok((book, report))
        })
        .await
        .map_err(|e| DialerError::Internal(format!("Task join error: {e}")))?
    }

    /// Place a single call to a typed or pasted number.
    #[instrument(skip(self), fields(session = %self.id))]
    pub fn manual_call(&self, number: &str) -> Result<CallRecord, DialerError> {
        let number = validate_phone_number(number)?;
        info!("Manual call to {number}");
        let result = self.portal.login().and_then(|()| {
            self.portal.dial(&number)?;
            let outcome = self.detect_outcome()?;
            self.record_call(Contact::new("manual", number.clone()), outcome, 1)
        });
        self.close_page();
        if let Err(e) = &result {
            error!("Manual call failed: {e}");
        }
        result
    }

    pub async fn manual_call_async(&self, number: String) -> Result<CallRecord, DialerError> {
        let session = self.clone();
        task::spawn_blocking(move || session.manual_call(&number))
            .await
            .map_err(|e| DialerError::Internal(format!("Task join error: {e}")))?
    }

    fn run_inner(
        &self,
        book: &mut ContactBook,
        contacts: &[Contact],
    ) -> Result<SessionReport, DialerError> {
        self.wait_for_window()?;
        info!("Starting calls");
        self.portal.login()?;

        let inter_call_delay = self.config.call.inter_call_delay()?;
        let mut records = Vec::with_capacity(contacts.len());
        for contact in contacts {
            self.check_cancelled()?;
            info!(name = %contact.name, phone = %contact.phone, "Dialing contact");
            let attempts = self.dial_with_retry(&contact.phone)?;
            let outcome = self.detect_outcome()?;
            // Dialed and classified: never dial this number again, even if
            // handling the outcome is interrupted.
            book.mark_called(&contact.phone);
            let record = self.record_call(contact.clone(), outcome, attempts)?;
            records.push(record);
            self.clock.sleep(inter_call_delay);
        }
        Ok(SessionReport {
            session_id: self.id,
            records,
        })
    }

    fn wait_for_window(&self) -> Result<(), DialerError> {
        loop {
            self.check_cancelled()?;
            if self.window.contains(self.clock.local_time()) {
                return Ok(());
            }
            info!(window = %self.window, "Outside calling window, waiting");
            self.clock.sleep(WINDOW_RECHECK_INTERVAL);
        }
    }

    /// Submit `number`, re-logging in after each failure. Returns the number
    /// of attempts it took.
    fn dial_with_retry(&self, number: &str) -> Result<u32, DialerError> {
        let max_attempts = self.config.call.max_dial_attempts;
        let retry_delay = self.config.call.retry_delay()?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.portal.dial(number) {
                Ok(()) => return Ok(attempt),
                Err(e) => e,
            };
            if attempt >= max_attempts || !err.is_retryable() {
                return Err(DialerError::DialFailed {
                    message: err.to_string(),
                    attempts: attempt,
                });
            }
            warn!(attempt, "Dial failed: {err}; retrying");
            self.clock.sleep(retry_delay);
            self.check_cancelled()?;
            self.portal.login()?;
        }
    }

    fn detect_outcome(&self) -> Result<CallOutcome, DialerError> {
        let probe = self.portal.pause_probe();
        self.detector.detect_cancellable(&probe, &self.cancel)
    }

    fn record_call(
        &self,
        contact: Contact,
        outcome: CallOutcome,
        dial_attempts: u32,
    ) -> Result<CallRecord, DialerError> {
        let handling = self.handle_outcome(&outcome)?;
        Ok(CallRecord {
            contact,
            outcome,
            dial_attempts,
            handling,
        })
    }

    fn handle_outcome(&self, outcome: &CallOutcome) -> Result<CallHandling, DialerError> {
        let duration = outcome.duration_secs();
        match outcome.status() {
            CallStatus::Answered => {
                let audio = &self.config.audio;
                match (&self.audio, &audio.path) {
                    (Some(player), Some(path)) if audio.enabled => {
                        Ok(self.play_audio(player.as_ref(), path, duration))
                    }
                    _ => self.wait_for_hangup(),
                }
            }
            CallStatus::EndedAfterAnswer => {
                info!(duration, "Call connected but ended early");
                Ok(CallHandling::Logged)
            }
            CallStatus::PoweredOffOrBusy => {
                info!(duration, "Phone powered off or busy");
                Ok(CallHandling::Logged)
            }
            CallStatus::NoAnswer => {
                info!("No answer or unreachable");
                Ok(CallHandling::Logged)
            }
        }
    }

    fn play_audio(&self, player: &dyn AudioPlayer, path: &Path, duration: f64) -> CallHandling {
        let audio = &self.config.audio;
        if audio.delay > 0 {
            self.clock.sleep(Duration::from_secs(audio.delay));
        }
        for played in 0..audio.repeat {
            if let Err(e) = player.play(path, audio.output_index) {
                warn!(played, "Audio playback failed: {e}");
                return CallHandling::AudioFailed;
            }
            self.clock.sleep(AUDIO_REPEAT_GAP);
        }
        info!(duration, repeats = audio.repeat, "Call answered, audio played");
        CallHandling::AudioPlayed {
            repeats: audio.repeat,
        }
    }

    fn wait_for_hangup(&self) -> Result<CallHandling, DialerError> {
        let max_wait = self.config.call.max_hangup_wait()?;
        let started = self.clock.now();
        self.hangup.begin_call();
        info!("Call answered, waiting for operator hang-up");

        let handling = loop {
            if self.hangup.is_requested() {
                info!("Call hung up by operator");
                break Ok(CallHandling::HungUpByOperator);
            }
            if self.cancel.is_cancelled() {
                break Err(DialerError::Cancelled(
                    "session cancelled while a call was active".to_string(),
                ));
            }
            if let Some(max_wait) = max_wait {
                if self.clock.now().saturating_sub(started) >= max_wait {
                    warn!(?max_wait, "Hang-up wait expired, hanging up");
                    if let Err(e) = self.portal.hang_up() {
                        warn!("Failed to click hang-up control: {e}");
                    }
                    break Ok(CallHandling::HangupWaitExpired);
                }
            }
            self.clock.sleep(self.detector.config().poll_interval());
        };
        self.hangup.end_call();
        handling
    }

    fn check_cancelled(&self) -> Result<(), DialerError> {
        if self.cancel.is_cancelled() {
            return Err(DialerError::Cancelled("dial session was cancelled".to_string()));
        }
        Ok(())
    }

    fn close_page(&self) {
        if let Err(e) = self.portal.close() {
            warn!("Failed to close browser page: {e}");
        }
    }
}
