//! The remote telephony web UI, seen through a browser driver.

use crate::clock::Clock;
use crate::config::DialerConfig;
use crate::errors::DialerError;
use crate::probe::ElementProbe;
use crate::selector::CssSelector;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const LOGIN_WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const AFTER_DIALER_OPEN_DELAY: Duration = Duration::from_secs(1);
const AFTER_NUMBER_ENTRY_DELAY: Duration = Duration::from_millis(500);

/// Minimal browser-driver surface the dialer needs. Implemented outside this
/// crate on top of a real driver (WebDriver, CDP, ...).
pub trait BrowserPage: Send + Sync {
    /// Tear down any existing browser session and start a fresh one.
    fn reset(&self) -> Result<(), DialerError>;

    fn navigate(&self, url: &str) -> Result<(), DialerError>;

    /// Block until an element matching `selector` is present, or fail with
    /// [`DialerError::Timeout`].
    fn wait_for(&self, selector: &CssSelector, timeout: Duration) -> Result<(), DialerError>;

    /// Clear the input matching `selector` and type `text` into it.
    fn fill(&self, selector: &CssSelector, text: &str) -> Result<(), DialerError>;

    fn click(&self, selector: &CssSelector) -> Result<(), DialerError>;

    /// Number of elements currently matching `selector`.
    fn count(&self, selector: &CssSelector) -> Result<usize, DialerError>;

    /// Quit the browser session. Closing an already closed page is not an error.
    fn close(&self) -> Result<(), DialerError>;
}

/// Login, dial and hang-up flows for the telephony site.
#[derive(Clone)]
pub struct TelephonyPortal {
    page: Arc<dyn BrowserPage>,
    clock: Arc<dyn Clock>,
    site_url: String,
    username: String,
    password: String,
    selectors: PortalSelectors,
}

#[derive(Clone, Debug)]
struct PortalSelectors {
    username: CssSelector,
    password: CssSelector,
    login_button: CssSelector,
    dialer_button: CssSelector,
    phone_input: CssSelector,
    call_button: CssSelector,
    hangup_button: CssSelector,
    pause_indicator: CssSelector,
}

impl TelephonyPortal {
    pub fn new(page: Arc<dyn BrowserPage>, clock: Arc<dyn Clock>, config: &DialerConfig) -> Self {
        let s = &config.selectors;
        Self {
            page,
            clock,
            site_url: config.site_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            selectors: PortalSelectors {
                username: CssSelector::from(&s.username),
                password: CssSelector::from(&s.password),
                login_button: CssSelector::from(&s.login_button),
                dialer_button: CssSelector::from(&s.dialer_button),
                phone_input: CssSelector::from(&s.phone_input),
                call_button: CssSelector::from(&s.call_button),
                hangup_button: CssSelector::from(&s.hangup_button),
                pause_indicator: CssSelector::from(&s.pause_indicator),
            },
        }
    }

    pub fn page(&self) -> &Arc<dyn BrowserPage> {
        &self.page
    }

    /// Start a fresh browser session, sign in and open the dialer panel.
    #[instrument(level = "debug", skip(self), fields(site = %self.site_url))]
    pub fn login(&self) -> Result<(), DialerError> {
        self.page.reset()?;
        self.page.navigate(&self.site_url)?;

        let s = &self.selectors;
        self.page.wait_for(&s.username, LOGIN_WAIT_TIMEOUT)?;
        self.page.fill(&s.username, &self.username)?;
        self.page.fill(&s.password, &self.password)?;
        self.page.click(&s.login_button)?;

        self.page.wait_for(&s.dialer_button, LOGIN_WAIT_TIMEOUT)?;
        self.page.click(&s.dialer_button)?;
        self.clock.sleep(AFTER_DIALER_OPEN_DELAY);
        info!("Logged in to telephony portal");
        Ok(())
    }

    /// Enter `number` and press the call button.
    #[instrument(level = "debug", skip(self))]
    pub fn dial(&self, number: &str) -> Result<(), DialerError> {
        self.page.fill(&self.selectors.phone_input, number)?;
        self.clock.sleep(AFTER_NUMBER_ENTRY_DELAY);
        self.page.click(&self.selectors.call_button)?;
        debug!("Call submitted");
        Ok(())
    }

    /// Click the hang-up control, if one is configured.
    pub fn hang_up(&self) -> Result<(), DialerError> {
        if self.selectors.hangup_button.is_empty() {
            warn!("No hang-up selector configured, nothing to click");
            return Ok(());
        }
        self.page.click(&self.selectors.hangup_button)
    }

    /// A probe for the pause indicator on this page.
    pub fn pause_probe(&self) -> ElementProbe {
        ElementProbe::new(self.page.clone(), self.selectors.pause_indicator.clone())
    }

    pub fn close(&self) -> Result<(), DialerError> {
        self.page.close()
    }
}
