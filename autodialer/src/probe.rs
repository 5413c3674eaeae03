//! Signal probes: the single observable the detector polls.

use crate::clock::{Clock, FakeClock};
use crate::errors::DialerError;
use crate::page::BrowserPage;
use crate::selector::CssSelector;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Answers "is the pause indicator currently visible?".
///
/// Implementations may be slow or fail; the detector treats an error as a
/// negative reading for that sample and never propagates it.
pub trait SignalProbe: Send {
    fn is_visible(&self) -> Result<bool, DialerError>;
}

impl<P: SignalProbe + Sync + ?Sized> SignalProbe for &P {
    fn is_visible(&self) -> Result<bool, DialerError> {
        (**self).is_visible()
    }
}

impl<P: SignalProbe + ?Sized> SignalProbe for Box<P> {
    fn is_visible(&self) -> Result<bool, DialerError> {
        (**self).is_visible()
    }
}

impl<P: SignalProbe + Sync + ?Sized> SignalProbe for Arc<P> {
    fn is_visible(&self) -> Result<bool, DialerError> {
        (**self).is_visible()
    }
}

/// Adapts a closure into a probe.
pub struct FnProbe<F>(F);

impl<F> FnProbe<F>
where
    F: Fn() -> Result<bool, DialerError> + Send,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> SignalProbe for FnProbe<F>
where
    F: Fn() -> Result<bool, DialerError> + Send,
{
    fn is_visible(&self) -> Result<bool, DialerError> {
        (self.0)()
    }
}

/// Probes a page for the presence of any element matching a selector.
#[derive(Clone)]
pub struct ElementProbe {
    page: Arc<dyn BrowserPage>,
    selector: CssSelector,
}

impl ElementProbe {
    pub fn new(page: Arc<dyn BrowserPage>, selector: impl Into<CssSelector>) -> Self {
        Self {
            page,
            selector: selector.into(),
        }
    }

    pub fn selector(&self) -> &CssSelector {
        &self.selector
    }
}

impl SignalProbe for ElementProbe {
    fn is_visible(&self) -> Result<bool, DialerError> {
        let count = self.page.count(&self.selector)?;
        trace!(selector = %self.selector, count, "probed pause indicator");
        Ok(count > 0)
    }
}

/// One scripted reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sample {
    Visible,
    Hidden,
    Fail,
}

impl Sample {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '1' | 'T' | 't' | '#' => Some(Sample::Visible),
            '0' | 'F' | 'f' | '.' => Some(Sample::Hidden),
            'x' | 'X' | 'E' | 'e' => Some(Sample::Fail),
            _ => None,
        }
    }
}

/// Replays a fixed sequence of readings, one per call. After the script runs
/// out the last reading repeats forever.
///
/// With [`ScriptedProbe::with_latency`] every sample also advances a shared
/// [`FakeClock`], which stands in for a slow lookup.
pub struct ScriptedProbe {
    samples: Vec<Sample>,
    calls: AtomicUsize,
    latency: Option<(FakeClock, Duration)>,
}

impl ScriptedProbe {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self {
            samples,
            calls: AtomicUsize::new(0),
            latency: None,
        }
    }

    pub fn from_bools(values: &[bool]) -> Self {
        Self::new(
            values
                .iter()
                .map(|v| if *v { Sample::Visible } else { Sample::Hidden })
                .collect(),
        )
    }

    /// `hidden` negative readings followed by `visible` positive ones, then
    /// hidden forever. `visible == usize::MAX` means visible forever.
    pub fn pulse(hidden: usize, visible: usize) -> Self {
        let mut samples = vec![Sample::Hidden; hidden];
        if visible == usize::MAX {
            samples.push(Sample::Visible);
        } else {
            samples.extend(std::iter::repeat(Sample::Visible).take(visible));
            samples.push(Sample::Hidden);
        }
        Self::new(samples)
    }

    /// Parse a trace such as `"0001111100"`: `1`/`T`/`#` visible, `0`/`F`/`.`
    /// hidden, `x`/`E` a failing sample. Whitespace, `,`, `_` and `|` are ignored.
    pub fn parse(trace: &str) -> Result<Self, DialerError> {
        let mut samples = Vec::with_capacity(trace.len());
        for c in trace.chars() {
            if c.is_whitespace() || matches!(c, ',' | '_' | '|') {
                continue;
            }
            let sample = Sample::from_char(c).ok_or_else(|| {
                DialerError::InvalidConfig(format!("unexpected character '{c}' in probe trace"))
            })?;
            samples.push(sample);
        }
        if samples.is_empty() {
            return Err(DialerError::InvalidConfig(
                "probe trace must contain at least one sample".to_string(),
            ));
        }
        Ok(Self::new(samples))
    }

    pub fn with_latency(mut self, clock: FakeClock, latency: Duration) -> Self {
        self.latency = Some((clock, latency));
        self
    }

    /// Number of times the probe has been sampled.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SignalProbe for ScriptedProbe {
    fn is_visible(&self) -> Result<bool, DialerError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((clock, latency)) = &self.latency {
            clock.sleep(*latency);
        }
        let sample = self
            .samples
            .get(index)
            .or_else(|| self.samples.last())
            .copied()
            .unwrap_or(Sample::Hidden);
        match sample {
            Sample::Visible => Ok(true),
            Sample::Hidden => Ok(false),
            Sample::Fail => Err(DialerError::ProbeFailure(format!(
                "scripted failure at sample {index}"
            ))),
        }
    }
}
