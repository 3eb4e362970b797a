//! Event summary notifications

pub mod smtp;

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::prelude::*;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::analytics::EventSummary;
use crate::report::ReportHeader;

pub use smtp::SmtpNotifier;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("SMTP I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("SMTP server rejected {command}: {code} {message}")]
    Rejected {
        command: &'static str,
        code: u16,
        message: String,
    },
    #[error("SMTP server sent a malformed reply: {0:?}")]
    MalformedReply(String),
    #[error("SMTP exchange timed out after {0} seconds")]
    Timeout(u64),
}

pub type NotifyResult<T> = Result<T, NotifyError>;

/// A composed plain-text email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    /// Build the summary email for an event
    pub fn compose(
        from: &str,
        to: &str,
        subject_prefix: &str,
        header: ReportHeader<'_>,
        summary: &EventSummary,
        top_cities: usize,
    ) -> Self {
        let scalars = &summary.scalars;
        let mut lines = vec![
            format!("Unique Viewers: {}", scalars.unique_viewers),
            format!("Views: {}", scalars.views),
            format!("Distinct Clients: {}", scalars.distinct_clients),
            format!("Distinct IPs: {}", scalars.distinct_ips),
            format!("Average Watch Time: {}", scalars.average_watch.display),
            format!("Median Watch Time: {}", scalars.median_watch.display),
            format!("Total Watch Time: {}", scalars.total_watch.display),
        ];
        if let Some(peak) = scalars.peak_concurrency {
            lines.push(format!("Peak Concurrent Viewers: {}", peak));
        }

        let cities = summary.top_cities(top_cities);
        if !cities.is_empty() {
            lines.push(String::new());
            lines.push("Top Cities:".to_string());
            for (city, clients) in cities {
                lines.push(format!("  {}: {}", city, clients));
            }
        }

        Self {
            from: from.to_string(),
            to: to.to_string(),
            subject: format!("{} {}, {}", subject_prefix, header.name, header.start_time)
                .trim()
                .to_string(),
            body: lines.join("\n"),
        }
    }

    /// RFC 5322 message text with CRLF line endings
    pub fn to_rfc5322(&self, display_name: &str) -> String {
        self.to_rfc5322_at(display_name, Utc::now())
    }

    pub fn to_rfc5322_at(&self, display_name: &str, date: DateTime<Utc>) -> String {
        let mut text = format!(
            "Date: {}\r\nMessage-ID: {}\r\nFrom: {} <{}>\r\nTo: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Transfer-Encoding: 8bit\r\n\r\n",
            date.to_rfc2822(),
            message_id(&self.from, date),
            encode_header(display_name),
            self.from,
            self.to,
            encode_header(&single_line(&self.subject))
        );
        for line in self.body.lines() {
            text.push_str(line);
            text.push_str("\r\n");
        }
        text
    }
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// RFC 2047 "B" encoding for header values that are not plain ASCII
fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }
    format!("=?UTF-8?B?{}?=", BASE64_STANDARD.encode(value.as_bytes()))
}

/// Unique per process run: timestamp plus a process-wide sequence number
fn message_id(from: &str, date: DateTime<Utc>) -> String {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);

    let domain = from
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .filter(|domain| !domain.is_empty())
        .unwrap_or("localhost");
    format!(
        "<{}.{}.{}@{}>",
        date.timestamp_micros(),
        std::process::id(),
        SEQUENCE.fetch_add(1, Ordering::Relaxed),
        domain
    )
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> NotifyResult<()>;
}

/// Logs messages instead of sending them
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &EmailMessage) -> NotifyResult<()> {
        info!(
            "[dry-run] would email {} -> {}: {}\n{}",
            message.from, message.to, message.subject, message.body
        );
        Ok(())
    }
}
