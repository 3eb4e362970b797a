//! Vendor sync pipeline
//!
//! One run fetches events the store hasn't seen yet, persists them, and then
//! produces the report and (if the gate allows) the email for each of them.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::analytics::{EventAggregator, NotifyDecision, NotifyGate};
use crate::models::{StoredEvent, VendorEvent};
use crate::notify::{EmailMessage, Notifier};
use crate::report::{ReportHeader, ReportRenderer};
use crate::storage::EventStore;
use crate::vendor::{VendorApi, VendorError};

/// Counters for one sync run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Events fetched and stored during this run
    pub fetched: usize,
    /// Events already in the store
    pub skipped: usize,
    /// Events whose fetch or processing failed
    pub failed: usize,
    pub reports_written: usize,
    pub notified: usize,
}

/// Email settings the pipeline needs beyond the gate
#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub subject_prefix: String,
    pub top_cities: usize,
}

pub struct SyncService {
    vendor: Arc<dyn VendorApi>,
    store: Arc<dyn EventStore>,
    aggregator: Arc<EventAggregator>,
    renderer: ReportRenderer,
    notifier: Arc<dyn Notifier>,
    gate: NotifyGate,
    email: EmailSettings,
}

impl SyncService {
    pub fn new(
        vendor: Arc<dyn VendorApi>,
        store: Arc<dyn EventStore>,
        aggregator: Arc<EventAggregator>,
        renderer: ReportRenderer,
        notifier: Arc<dyn Notifier>,
        gate: NotifyGate,
        email: EmailSettings,
    ) -> Self {
        Self {
            vendor,
            store,
            aggregator,
            renderer,
            notifier,
            gate,
            email,
        }
    }

    /// Fetch new events, store them, then report and notify for each
    pub async fn run_once(&self) -> Result<SyncReport> {
        self.vendor
            .login()
            .await
            .context("vendor login failed")?;

        let events = self
            .vendor
            .list_events()
            .await
            .context("could not list vendor events")?;
        debug!("Vendor lists {} events", events.len());

        let mut report = SyncReport::default();
        let mut new_events = Vec::new();

        for listed in events {
            if self.store.contains(&listed.uuid).await? {
                report.skipped += 1;
                continue;
            }

            match self.fetch_event(&listed).await {
                Ok(event) => {
                    self.store
                        .insert(event.clone())
                        .await
                        .with_context(|| format!("could not store event {}", event.event_id))?;
                    report.fetched += 1;
                    new_events.push(event);
                }
                Err(e) if e.is_retryable() => {
                    warn!("Fetching event {} failed, will retry next run: {}", listed.uuid, e);
                    report.failed += 1;
                }
                Err(e) => {
                    error!("Fetching event {} failed: {}", listed.uuid, e);
                    report.failed += 1;
                }
            }
        }

        for event in &new_events {
            match self.process_event(event).await {
                Ok(notified) => {
                    report.reports_written += 1;
                    if notified {
                        report.notified += 1;
                    }
                }
                Err(e) => {
                    error!("Processing event {} failed: {:#}", event.event_id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Sync finished: {} new, {} already stored, {} failed, {} notified",
            report.fetched, report.skipped, report.failed, report.notified
        );
        Ok(report)
    }

    async fn fetch_event(&self, listed: &VendorEvent) -> Result<StoredEvent, VendorError> {
        let public_info = self.vendor.public_info(&listed.uuid).await?;
        let viewer_info = self.vendor.viewer_export(&listed.uuid).await?;

        Ok(StoredEvent {
            event_id: listed.uuid.clone(),
            start_time: listed.start_time.clone(),
            name: listed.name.clone(),
            public_info,
            viewer_info,
        })
    }

    /// Render the report and send the email if the gate allows.
    /// Returns whether an email went out.
    async fn process_event(&self, event: &StoredEvent) -> Result<bool> {
        let outcome = self.aggregator.evaluate(event, &self.gate);
        let header = ReportHeader::from(event);

        let path = self.renderer.write(header, &outcome.summary).await?;
        info!("Report for '{}' written to {}", event.name, path.display());

        match outcome.decision {
            NotifyDecision::Notify => {
                let (Some(from), Some(to)) = (self.gate.sender.as_deref(), self.gate.recipient.as_deref())
                else {
                    return Err(anyhow!("notify gate passed without both endpoints"));
                };
                let message = EmailMessage::compose(
                    from,
                    to,
                    &self.email.subject_prefix,
                    header,
                    &outcome.summary,
                    self.email.top_cities,
                );
                self.notifier
                    .send(&message)
                    .await
                    .with_context(|| format!("could not email summary of {}", event.event_id))?;
                Ok(true)
            }
            NotifyDecision::Disabled { .. } => {
                debug!("Not emailing '{}': {}", event.name, outcome.decision);
                Ok(false)
            }
            NotifyDecision::Excluded { .. } | NotifyDecision::BelowThreshold { .. } => {
                info!("Not emailing '{}': {}", event.name, outcome.decision);
                Ok(false)
            }
        }
    }

    /// Re-render the report of an already stored event
    pub async fn rebuild_report(&self, event_id: &str) -> Result<PathBuf> {
        let event = self
            .store
            .get(event_id)
            .await?
            .ok_or_else(|| anyhow!("event {} is not stored", event_id))?;

        let summary = self.aggregator.summarize_event(&event);
        Ok(self.renderer.write(ReportHeader::from(&event), &summary).await?)
    }

    /// Run `run_once` every `interval` until `shutdown` flips to true or its
    /// sender is dropped
    pub fn spawn_periodic(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!("Sync run failed: {:#}", e);
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            info!("Shutdown sender dropped, sync task stopping");
                            break;
                        }
                        if *shutdown.borrow() {
                            info!("Sync task shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }
}
