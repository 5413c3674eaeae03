use thiserror::Error;

#[derive(Error, Debug)]
pub enum DialerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Signal probe failed: {0}")]
    ProbeFailure(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Dial failed after {attempts} attempt(s): {message}")]
    DialFailed { message: String, attempts: u32 },

    #[error("Telephony page error: {0}")]
    PageError(String),

    #[error("Audio playback error: {0}")]
    AudioError(String),

    #[error("Invalid phone number: {0}")]
    InvalidPhoneNumber(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DialerError {
    /// Whether a dial attempt that failed with this error is worth retrying
    /// after a fresh login.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DialerError::PageError(_) | DialerError::Timeout(_) | DialerError::ProbeFailure(_)
        )
    }
}
