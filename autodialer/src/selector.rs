use once_cell::sync::Lazy;
use regex::Regex;

/// A CSS selector used to locate an element on the telephony page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CssSelector(String);

impl CssSelector {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Selectors that are empty after sanitising match nothing and are skipped by callers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for CssSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CssSelector {
    fn from(s: &str) -> Self {
        CssSelector(sanitize_selector(s))
    }
}

impl From<&String> for CssSelector {
    fn from(s: &String) -> Self {
        CssSelector::from(s.as_str())
    }
}

impl From<String> for CssSelector {
    fn from(s: String) -> Self {
        CssSelector::from(s.as_str())
    }
}

static ATTRIBUTE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(\w+)=(?:"|')([^"']+)(?:"|')"#).expect("attribute pattern is valid")
});

/// Turn a pasted HTML tag such as `<button class="call" id='x'>` into the CSS
/// selector `button[class="call"][id="x"]`. Anything that is not wrapped in
/// angle brackets is returned trimmed.
pub fn sanitize_selector(raw: &str) -> String {
    let s = raw.trim();
    let Some(inner) = s.strip_prefix('<').and_then(|rest| rest.strip_suffix('>')) else {
        return s.to_string();
    };
    let inner = inner.trim().trim_end_matches('/').trim_end();
    let Some(tag) = inner.split_whitespace().next() else {
        return s.to_string();
    };

    let attrs: String = ATTRIBUTE_PATTERN
        .captures_iter(inner)
        .map(|caps| format!(r#"[{}="{}"]"#, &caps[1], &caps[2]))
        .collect();
    format!("{tag}{attrs}")
}
