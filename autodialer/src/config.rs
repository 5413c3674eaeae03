//! Dialer configuration: the JSON settings document and the validated
//! detection thresholds derived from it.

use crate::errors::DialerError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

pub const DEFAULT_RING_TIMEOUT_SECS: f64 = 15.0;
pub const DEFAULT_OFF_BUSY_THRESHOLD_SECS: f64 = 3.0;
pub const DEFAULT_ANSWERED_GRACE_SECS: f64 = 0.4;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Tolerance added to the busy threshold to absorb poll jitter.
pub const DEFAULT_BUSY_SLACK: Duration = Duration::from_millis(300);

/// Converts a seconds value from configuration into a millisecond-exact `Duration`.
fn secs_to_duration(name: &str, secs: f64) -> Result<Duration, DialerError> {
    if !secs.is_finite() {
        return Err(DialerError::InvalidConfig(format!(
            "{name} must be a finite number of seconds, got {secs}"
        )));
    }
    if secs < 0.0 {
        return Err(DialerError::InvalidConfig(format!(
            "{name} must not be negative, got {secs}"
        )));
    }
    Ok(Duration::from_millis((secs * 1000.0).round() as u64))
}

/// Thresholds that drive call-outcome detection. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionConfig {
    ring_timeout: Duration,
    off_busy_threshold: Duration,
    answered_grace: Duration,
    poll_interval: Duration,
    busy_slack: Duration,
}

impl DetectionConfig {
    /// Build a config from seconds values, using the default poll interval and slack.
    pub fn new(
        ring_timeout: f64,
        off_busy_threshold: f64,
        answered_grace: f64,
    ) -> Result<Self, DialerError> {
        Ok(Self {
            ring_timeout: secs_to_duration("ring_timeout", ring_timeout)?,
            off_busy_threshold: secs_to_duration("off_busy_threshold", off_busy_threshold)?,
            answered_grace: secs_to_duration("answered_grace", answered_grace)?,
            poll_interval: DEFAULT_POLL_INTERVAL,
            busy_slack: DEFAULT_BUSY_SLACK,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Result<Self, DialerError> {
        if poll_interval.is_zero() {
            return Err(DialerError::InvalidConfig(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        self.poll_interval = poll_interval;
        Ok(self)
    }

    pub fn with_busy_slack(mut self, busy_slack: Duration) -> Self {
        self.busy_slack = busy_slack;
        self
    }

    pub fn ring_timeout(&self) -> Duration {
        self.ring_timeout
    }

    pub fn off_busy_threshold(&self) -> Duration {
        self.off_busy_threshold
    }

    pub fn answered_grace(&self) -> Duration {
        self.answered_grace
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn busy_slack(&self) -> Duration {
        self.busy_slack
    }

    /// Latest disappearance time still classified as powered off / busy.
    pub fn busy_boundary(&self) -> Duration {
        self.off_busy_threshold + self.busy_slack
    }

    /// Presence time after which the call counts as answered.
    pub fn answered_boundary(&self) -> Duration {
        self.off_busy_threshold + self.answered_grace
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            ring_timeout: Duration::from_secs(15),
            off_busy_threshold: Duration::from_secs(3),
            answered_grace: Duration::from_millis(400),
            poll_interval: DEFAULT_POLL_INTERVAL,
            busy_slack: DEFAULT_BUSY_SLACK,
        }
    }
}

/// The `detect` section as stored on disk, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectSettings {
    pub ring_timeout: f64,
    pub off_busy_threshold: f64,
    pub answered_grace: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub busy_slack: Option<f64>,
}

impl Default for DetectSettings {
    fn default() -> Self {
        Self {
            ring_timeout: DEFAULT_RING_TIMEOUT_SECS,
            off_busy_threshold: DEFAULT_OFF_BUSY_THRESHOLD_SECS,
            answered_grace: DEFAULT_ANSWERED_GRACE_SECS,
            poll_interval: None,
            busy_slack: None,
        }
    }
}

impl TryFrom<&DetectSettings> for DetectionConfig {
    type Error = DialerError;

    fn try_from(settings: &DetectSettings) -> Result<Self, Self::Error> {
        let mut config = DetectionConfig::new(
            settings.ring_timeout,
            settings.off_busy_threshold,
            settings.answered_grace,
        )?;
        if let Some(poll) = settings.poll_interval {
            config = config.with_poll_interval(secs_to_duration("poll_interval", poll)?)?;
        }
        if let Some(slack) = settings.busy_slack {
            config = config.with_busy_slack(secs_to_duration("busy_slack", slack)?);
        }
        Ok(config)
    }
}

/// CSS selectors for the remote telephony UI. Raw HTML tags are accepted and
/// sanitised when used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorSettings {
    pub username: String,
    pub password: String,
    pub login_button: String,
    pub dialer_button: String,
    pub phone_input: String,
    pub call_button: String,
    pub hangup_button: String,
    pub pause_indicator: String,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            username: r#"input[name="login"]"#.to_string(),
            password: r#"input[name="password"]"#.to_string(),
            login_button: r#"button[type="submit"]"#.to_string(),
            dialer_button: "button#dialer-button".to_string(),
            phone_input: r#"input[name="phone"]"#.to_string(),
            call_button: "button.call-now".to_string(),
            hangup_button: String::new(),
            pause_indicator: ".mdi-pause".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSettings {
    pub start: String,
    pub end: String,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            start: "09:00".to_string(),
            end: "18:00".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Play the audio file to answered calls instead of waiting for a manual hang-up.
    /// Without a `path` (or a player) answered calls still wait for the operator.
    #[serde(default = "default_audio_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub repeat: u32,
    /// Seconds to wait after the call is answered before playback.
    pub delay: u64,
    pub output_index: Option<u32>,
}

fn default_audio_enabled() -> bool {
    true
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            enabled: default_audio_enabled(),
            path: None,
            repeat: 1,
            delay: 5,
            output_index: None,
        }
    }
}

/// Pacing of the dial loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSettings {
    pub max_dial_attempts: u32,
    /// Seconds to wait before re-logging in after a failed dial.
    pub retry_delay: f64,
    /// Seconds between consecutive contacts.
    pub inter_call_delay: f64,
    /// Upper bound in seconds on waiting for a manual hang-up; `null` waits forever.
    pub max_hangup_wait: Option<f64>,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            max_dial_attempts: 5,
            retry_delay: 3.0,
            inter_call_delay: 0.5,
            max_hangup_wait: None,
        }
    }
}

impl CallSettings {
    pub fn retry_delay(&self) -> Result<Duration, DialerError> {
        secs_to_duration("call.retry_delay", self.retry_delay)
    }

    pub fn inter_call_delay(&self) -> Result<Duration, DialerError> {
        secs_to_duration("call.inter_call_delay", self.inter_call_delay)
    }

    pub fn max_hangup_wait(&self) -> Result<Option<Duration>, DialerError> {
        self.max_hangup_wait
            .map(|secs| secs_to_duration("call.max_hangup_wait", secs))
            .transpose()
    }
}

/// Full dialer configuration document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DialerConfig {
    pub site_url: String,
    pub username: String,
    pub password: String,
    pub selectors: SelectorSettings,
    pub schedule: ScheduleSettings,
    pub audio: AudioSettings,
    pub detect: DetectSettings,
    #[serde(default)]
    pub call: CallSettings,
    /// Keys this version does not know about, kept so that saving does not drop them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DialerConfig {
    /// Load the config at `path`, merged over the defaults. A missing file is
    /// created with the defaults.
    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load_or_init(path: impl AsRef<Path>) -> Result<Self, DialerError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            info!("Config file not found, writing defaults");
            let config = Self::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Load the config at `path`, merged over the defaults. Fails if the file is missing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DialerError> {
        let raw = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, DialerError> {
        let user: Value = serde_json::from_str(raw)?;
        if !user.is_object() {
            return Err(DialerError::InvalidConfig(
                "config document must be a JSON object".to_string(),
            ));
        }
        let defaults = serde_json::to_value(Self::default())?;
        let merged = deep_merge(&defaults, &user);
        let config: DialerConfig = serde_json::from_value(merged)?;
        config.validate()?;
        debug!("Loaded dialer config for {}", config.site_url);
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DialerError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Check every derived value without building anything long-lived.
    pub fn validate(&self) -> Result<(), DialerError> {
        self.detection()?;
        self.call_window()?;
        self.call.retry_delay()?;
        self.call.inter_call_delay()?;
        self.call.max_hangup_wait()?;
        if self.call.max_dial_attempts == 0 {
            return Err(DialerError::InvalidConfig(
                "call.max_dial_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn detection(&self) -> Result<DetectionConfig, DialerError> {
        DetectionConfig::try_from(&self.detect)
    }

    pub fn call_window(&self) -> Result<crate::schedule::CallWindow, DialerError> {
        crate::schedule::CallWindow::parse(&self.schedule.start, &self.schedule.end)
    }
}

/// Recursively merge `overlay` onto `base`. Objects merge key by key; any
/// other value in `overlay` replaces the one in `base`.
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in overlay_map {
                let next = match base_map.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}
