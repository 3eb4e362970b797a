//! Notification threshold gate

use std::fmt;

use crate::analytics::models::EventSummary;

/// Default unique-viewer floor an event must exceed to trigger an email
pub const DEFAULT_UNIQUE_VIEWER_FLOOR: u64 = 5;

/// Which notification endpoint is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Sender,
    Recipient,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Sender => write!(f, "sender"),
            Endpoint::Recipient => write!(f, "recipient"),
        }
    }
}

/// Outcome of the gate. Every variant other than `Notify` is a normal,
/// loggable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyDecision {
    Notify,
    /// Notifications are not configured
    Disabled { missing: Endpoint },
    /// The event name matches an exclusion pattern
    Excluded { pattern: String },
    BelowThreshold { unique_viewers: u64, floor: u64 },
}

impl NotifyDecision {
    pub fn should_notify(&self) -> bool {
        matches!(self, NotifyDecision::Notify)
    }
}

impl fmt::Display for NotifyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyDecision::Notify => write!(f, "notify"),
            NotifyDecision::Disabled { missing } => {
                write!(f, "notifications disabled: no {} address configured", missing)
            }
            NotifyDecision::Excluded { pattern } => {
                write!(f, "event name matches excluded pattern '{}'", pattern)
            }
            NotifyDecision::BelowThreshold {
                unique_viewers,
                floor,
            } => write!(
                f,
                "{} unique viewers does not exceed floor of {}",
                unique_viewers, floor
            ),
        }
    }
}

/// Decides whether an event's summary is worth an email
#[derive(Debug, Clone)]
pub struct NotifyGate {
    pub floor: u64,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    /// Substrings of event names that never notify
    pub excluded_patterns: Vec<String>,
}

impl NotifyGate {
    pub fn new(floor: u64, sender: Option<String>, recipient: Option<String>) -> Self {
        Self {
            floor,
            sender,
            recipient,
            excluded_patterns: Vec::new(),
        }
    }

    pub fn with_excluded_patterns(mut self, patterns: Vec<String>) -> Self {
        self.excluded_patterns = patterns;
        self
    }

    pub fn evaluate(&self, event_name: &str, summary: &EventSummary) -> NotifyDecision {
        if is_blank(self.sender.as_deref()) {
            return NotifyDecision::Disabled {
                missing: Endpoint::Sender,
            };
        }
        if is_blank(self.recipient.as_deref()) {
            return NotifyDecision::Disabled {
                missing: Endpoint::Recipient,
            };
        }

        if let Some(pattern) = self
            .excluded_patterns
            .iter()
            .find(|p| !p.is_empty() && event_name.contains(p.as_str()))
        {
            return NotifyDecision::Excluded {
                pattern: pattern.clone(),
            };
        }

        let unique_viewers = summary.scalars.unique_viewers;
        if unique_viewers > self.floor {
            NotifyDecision::Notify
        } else {
            NotifyDecision::BelowThreshold {
                unique_viewers,
                floor: self.floor,
            }
        }
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// True iff both endpoints are configured and unique viewers exceed `floor`
pub fn should_notify(
    summary: &EventSummary,
    floor: u64,
    sender: Option<&str>,
    recipient: Option<&str>,
) -> bool {
    NotifyGate::new(floor, sender.map(str::to_string), recipient.map(str::to_string))
        .evaluate("", summary)
        .should_notify()
}
