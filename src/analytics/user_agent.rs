//! User-agent classification into OS and browser families
//!
//! Aggregation only needs a family name per axis, so classification sits
//! behind [`UserAgentClassifier`] and the rule table can be replaced without
//! touching the grouping code.

use regex::Regex;

use crate::analytics::models::UNKNOWN_FAMILY;

/// OS and browser family of one user agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentFamilies {
    pub os_family: String,
    pub browser_family: String,
}

impl AgentFamilies {
    pub fn unknown() -> Self {
        Self {
            os_family: UNKNOWN_FAMILY.to_string(),
            browser_family: UNKNOWN_FAMILY.to_string(),
        }
    }
}

pub trait UserAgentClassifier: Send + Sync {
    /// Classify a raw user-agent string. Must not fail: anything
    /// unrecognized maps to [`UNKNOWN_FAMILY`].
    fn classify(&self, user_agent: &str) -> AgentFamilies;
}

struct Rule {
    pattern: Regex,
    family: &'static str,
}

// First match wins, so more specific agents come before the engines they
// embed (Edge and Opera before Chrome, Chrome before Safari, iOS before Mac).
// Family names follow uap-core so labels line up with other UA tooling.
const OS_RULES: &[(&str, &str)] = &[
    (r"Windows Phone", "Windows Phone"),
    (r"Windows NT|Windows", "Windows"),
    (r"iPhone|iPad|iPod", "iOS"),
    (r"^Roku/|\bRoku\b", "Roku"),
    (r"CrKey/", "Chromecast"),
    (r"Tizen", "Tizen"),
    (r"Web0S|webOS", "webOS"),
    (r"Android", "Android"),
    (r"CrOS", "Chrome OS"),
    (r"Mac OS X|Macintosh", "Mac OS X"),
    (r"Ubuntu", "Ubuntu"),
    (r"Fedora", "Fedora"),
    (r"Linux|X11", "Linux"),
];

const BROWSER_RULES: &[(&str, &str)] = &[
    (r"Googlebot", "Googlebot"),
    (r"bingbot", "bingbot"),
    (r"facebookexternalhit/", "FacebookBot"),
    (r"(?i)[a-z]*(?:bot|crawler|spider)/", "Spider"),
    (r"^Roku/", "Roku"),
    (r"FBAN|FBAV", "Facebook"),
    (r"Edg(e|A|iOS)?/", "Edge"),
    (r"OPR/|Opera", "Opera"),
    (r"SamsungBrowser/", "Samsung Internet"),
    (r"FxiOS/", "Firefox iOS"),
    (r"Firefox/", "Firefox"),
    (r"CriOS/", "Chrome Mobile iOS"),
    (r"; wv\).+Chrome/", "Chrome Mobile WebView"),
    (r"CrKey/", "Chromecast"),
    (r"Chrome/[\d.]+ Mobile", "Chrome Mobile"),
    (r"Chrome/|Chromium/", "Chrome"),
    (r"Version/[\d.]+ Mobile/\S+ Safari/|Mobile/\S+ Safari/", "Mobile Safari"),
    (r"(?:iPhone|iPad|iPod).+AppleWebKit/.+ Mobile/\w+", "Mobile Safari UI/WKWebView"),
    (r"Version/[\d.]+ Safari/", "Safari"),
    (r"(?:SMART-TV|SmartTV|Web0S).+Safari/", "Smart TV Browser"),
    (r"MSIE |Trident/", "IE"),
];

/// Ordered first-match regex table
pub struct RuleTableClassifier {
    os_rules: Vec<Rule>,
    browser_rules: Vec<Rule>,
}

impl RuleTableClassifier {
    /// Compile the built-in rule table
    pub fn builtin() -> Result<Self, regex::Error> {
        Self::from_tables(OS_RULES, BROWSER_RULES)
    }

    /// Compile a custom `(pattern, family)` table
    pub fn from_tables(
        os_rules: &[(&str, &'static str)],
        browser_rules: &[(&str, &'static str)],
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            os_rules: compile(os_rules)?,
            browser_rules: compile(browser_rules)?,
        })
    }
}

fn compile(table: &[(&str, &'static str)]) -> Result<Vec<Rule>, regex::Error> {
    table
        .iter()
        .map(|(pattern, family)| {
            Ok(Rule {
                pattern: Regex::new(pattern)?,
                family,
            })
        })
        .collect()
}

fn first_match(rules: &[Rule], user_agent: &str) -> String {
    rules
        .iter()
        .find(|rule| rule.pattern.is_match(user_agent))
        .map(|rule| rule.family)
        .unwrap_or(UNKNOWN_FAMILY)
        .to_string()
}

impl UserAgentClassifier for RuleTableClassifier {
    fn classify(&self, user_agent: &str) -> AgentFamilies {
        let user_agent = user_agent.trim();
        if user_agent.is_empty() {
            return AgentFamilies::unknown();
        }

        AgentFamilies {
            os_family: first_match(&self.os_rules, user_agent),
            browser_family: first_match(&self.browser_rules, user_agent),
        }
    }
}
