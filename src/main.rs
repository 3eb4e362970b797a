use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use marquee::analytics::{EventAggregator, NotifyGate};
use marquee::api::{self, AppState};
use marquee::config::Config;
use marquee::notify::SmtpNotifier;
use marquee::report::ReportRenderer;
use marquee::storage::open_store;
use marquee::sync::{EmailSettings, SyncService};
use marquee::vendor::VendorClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("marquee=info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    let store = open_store(&config.store).await?;
    info!("Event store initialized");

    let aggregator = Arc::new(EventAggregator::with_builtin_rules(
        config.vendor.watch_time_unit,
    )?);
    let renderer = ReportRenderer::from_config(&config.report).await?;
    info!("📄 Reports are written to {}", config.report.output_dir.display());

    // Periodic vendor sync
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync_task = if config.vendor.username.is_some() && config.vendor.password.is_some() {
        let gate = NotifyGate::new(
            config.notify.unique_viewer_floor,
            config.notify.from.clone(),
            config.notify.to.clone(),
        )
        .with_excluded_patterns(config.notify.excluded_patterns.clone());

        if gate.sender.is_none() || gate.recipient.is_none() {
            info!("✉️  Email notifications are disabled (NOTIFY_FROM / NOTIFY_TO not set)");
        }

        let service = Arc::new(SyncService::new(
            Arc::new(VendorClient::from_config(&config.vendor)?),
            Arc::clone(&store),
            Arc::clone(&aggregator),
            renderer.clone(),
            Arc::new(SmtpNotifier::from_config(&config.notify)),
            gate,
            EmailSettings {
                subject_prefix: config.notify.subject_prefix.clone(),
                top_cities: config.notify.top_cities,
            },
        ));

        info!("🔄 Syncing vendor events every {}s", config.sync.interval_secs);
        Some(service.spawn_periodic(
            Duration::from_secs(config.sync.interval_secs.max(1)),
            shutdown_rx,
        ))
    } else {
        warn!("VENDOR_USERNAME / VENDOR_PASSWORD not set, periodic sync is disabled");
        None
    };

    let router = api::create_api_router(AppState {
        store,
        aggregator,
        renderer,
        top_cities: config.notify.top_cities,
    });

    // Start API server
    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("🚀 Report server listening on http://{}", api_addr);
    info!("   - API endpoints available at http://{}/api/...", api_addr);
    info!("   - Reports available at http://{}/reports/<event_id>", api_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(task) = sync_task {
        let _ = task.await;
    }

    Ok(())
}
