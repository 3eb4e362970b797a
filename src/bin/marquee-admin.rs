use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use marquee::analytics::{EventAggregator, NotifyGate};
use marquee::api::handlers::SummaryResponse;
use marquee::config::Config;
use marquee::notify::{LogNotifier, Notifier, SmtpNotifier};
use marquee::report::ReportRenderer;
use marquee::storage::open_store;
use marquee::sync::{EmailSettings, SyncService};
use marquee::vendor::VendorClient;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "marquee-admin")]
#[command(about = "Marquee event analytics management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch new vendor events once, write their reports and send emails
    Sync {
        /// Log emails instead of sending them
        #[arg(long)]
        dry_run: bool,
    },
    /// List stored events
    List,
    /// Re-render the HTML report of a stored event
    Report {
        /// Vendor event id
        event_id: String,
    },
    /// Print the aggregated summary of a stored event as JSON
    Summary {
        /// Vendor event id
        event_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("marquee=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let store = open_store(&config.store).await?;
    let aggregator = Arc::new(EventAggregator::with_builtin_rules(
        config.vendor.watch_time_unit,
    )?);

    match cli.command {
        Commands::Sync { dry_run } => {
            let notifier: Arc<dyn Notifier> = if dry_run {
                Arc::new(LogNotifier)
            } else {
                Arc::new(SmtpNotifier::from_config(&config.notify))
            };
            let service = SyncService::new(
                Arc::new(VendorClient::from_config(&config.vendor)?),
                store,
                aggregator,
                ReportRenderer::from_config(&config.report).await?,
                notifier,
                NotifyGate::new(
                    config.notify.unique_viewer_floor,
                    config.notify.from.clone(),
                    config.notify.to.clone(),
                )
                .with_excluded_patterns(config.notify.excluded_patterns.clone()),
                EmailSettings {
                    subject_prefix: config.notify.subject_prefix.clone(),
                    top_cities: config.notify.top_cities,
                },
            );

            let report = service.run_once().await?;
            println!(
                "✓ Sync finished: {} new, {} already stored, {} failed, {} reports, {} emails",
                report.fetched,
                report.skipped,
                report.failed,
                report.reports_written,
                report.notified
            );
        }
        Commands::List => {
            let events = store.list().await?;
            if events.is_empty() {
                println!("No stored events found.");
            } else {
                println!("{:<38} {:<22} {:>8}  {}", "Event ID", "Start Time", "Viewers", "Name");
                println!("{}", "-".repeat(100));
                for event in events {
                    println!(
                        "{:<38} {:<22} {:>8}  {}",
                        event.event_id, event.start_time, event.viewer_records, event.name
                    );
                }
            }
        }
        Commands::Report { event_id } => {
            let event = store
                .get(&event_id)
                .await?
                .with_context(|| format!("event '{}' is not stored", event_id))?;
            let renderer = ReportRenderer::from_config(&config.report).await?;
            let summary = aggregator.summarize_event(&event);
            let path = renderer.write((&event).into(), &summary).await?;
            println!("✓ Wrote report {}", path.display());
        }
        Commands::Summary { event_id } => {
            let event = store
                .get(&event_id)
                .await?
                .with_context(|| format!("event '{}' is not stored", event_id))?;
            let summary = aggregator.summarize_event(&event);
            let response = SummaryResponse::new(&event, &summary, config.notify.top_cities);
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}
