//! HTML report rendering
//!
//! Reports are produced by plain placeholder substitution into an HTML
//! template. The default template is embedded in the binary; a directory
//! holding a `report.html` can be configured to override it.

use std::path::{Path, PathBuf};

use rust_embed::RustEmbed;
use thiserror::Error;
use tracing::{debug, info};

use crate::analytics::EventSummary;
use crate::config::ReportConfig;
use crate::models::StoredEvent;

pub const TEMPLATE_NAME: &str = "report.html";

#[derive(RustEmbed)]
#[folder = "templates"]
pub struct Templates;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report template {0} is missing")]
    MissingTemplate(String),
    #[error("report template is not valid UTF-8")]
    TemplateEncoding(#[from] std::string::FromUtf8Error),
    #[error("could not serialize charts: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("report I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type ReportResult<T> = Result<T, ReportError>;

/// Identity of the event a report is rendered for
#[derive(Debug, Clone, Copy)]
pub struct ReportHeader<'a> {
    pub event_id: &'a str,
    pub name: &'a str,
    pub start_time: &'a str,
}

impl<'a> From<&'a StoredEvent> for ReportHeader<'a> {
    fn from(event: &'a StoredEvent) -> Self {
        Self {
            event_id: &event.event_id,
            name: &event.name,
            start_time: &event.start_time,
        }
    }
}

#[derive(Clone)]
pub struct ReportRenderer {
    template: String,
    output_dir: PathBuf,
}

impl ReportRenderer {
    pub async fn from_config(config: &ReportConfig) -> ReportResult<Self> {
        let template = match config.template_dir {
            Some(ref dir) => {
                let path = dir.join(TEMPLATE_NAME);
                info!("Using report template from {}", path.display());
                tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|source| ReportError::Io { path, source })?
            }
            None => embedded_template()?,
        };

        Ok(Self::new(template, config.output_dir.clone()))
    }

    pub fn new(template: String, output_dir: PathBuf) -> Self {
        Self {
            template,
            output_dir,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Fill the template for one event
    pub fn render(&self, header: ReportHeader<'_>, summary: &EventSummary) -> ReportResult<String> {
        let payload = summary.report_payload();
        let charts_json = serde_json::to_string(&payload.charts)?.replace("</", "<\\/");
        let scalars = &summary.scalars;

        let peak = scalars
            .peak_concurrency
            .map(|p| p.to_string())
            .unwrap_or_else(|| "n/a".to_string());

        let replacements = [
            ("{{name}}", escape_html(header.name)),
            ("{{start_time}}", escape_html(header.start_time)),
            ("{{event_id}}", escape_html(header.event_id)),
            ("{{distinct_ips}}", payload.distinct_ips.to_string()),
            ("{{distinct_clients}}", payload.distinct_clients.to_string()),
            ("{{unique_viewers}}", scalars.unique_viewers.to_string()),
            ("{{views}}", scalars.views.to_string()),
            ("{{average_watch}}", escape_html(&scalars.average_watch.display)),
            ("{{median_watch}}", escape_html(&scalars.median_watch.display)),
            ("{{total_watch}}", escape_html(&scalars.total_watch.display)),
            ("{{peak_concurrency}}", peak),
            ("{{charts_json}}", charts_json),
        ];

        let mut html = self.template.clone();
        for (placeholder, value) in replacements {
            html = html.replace(placeholder, &value);
        }
        Ok(html)
    }

    /// Render and write `{name}_{start_time}_{event_id}.html` into the output dir
    pub async fn write(&self, header: ReportHeader<'_>, summary: &EventSummary) -> ReportResult<PathBuf> {
        let html = self.render(header, summary)?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| ReportError::Io {
                path: self.output_dir.clone(),
                source,
            })?;

        let path = self.output_dir.join(report_file_name(header));
        tokio::fs::write(&path, html)
            .await
            .map_err(|source| ReportError::Io {
                path: path.clone(),
                source,
            })?;

        debug!("Wrote report {}", path.display());
        Ok(path)
    }
}

fn embedded_template() -> ReportResult<String> {
    let file = Templates::get(TEMPLATE_NAME)
        .ok_or_else(|| ReportError::MissingTemplate(TEMPLATE_NAME.to_string()))?;
    Ok(String::from_utf8(file.data.into_owned())?)
}

pub fn report_file_name(header: ReportHeader<'_>) -> String {
    format!(
        "{}_{}_{}.html",
        sanitize(header.name),
        sanitize(header.start_time),
        sanitize(header.event_id)
    )
}

fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
