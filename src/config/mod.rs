use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::analytics::{WatchTimeUnit, DEFAULT_UNIQUE_VIEWER_FLOOR};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub vendor: VendorConfig,
    pub store: StoreConfig,
    pub report: ReportConfig,
    pub notify: NotifyConfig,
    pub sync: SyncConfig,
    pub api_server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorConfig {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// `max` parameter of the viewer export request
    pub export_max: u32,
    pub timeout_secs: u64,
    pub watch_time_unit: WatchTimeUnit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// File path for the JSON store, connection URL for SQLite
    pub path: String,
    pub cache_entries: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
    /// Directory containing `report.html`. If None, uses the embedded template
    pub template_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub helo_name: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject_prefix: String,
    pub top_cities: usize,
    pub unique_viewer_floor: u64,
    pub excluded_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any variable source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let opt = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let watch_time_unit = match var("KPI_WATCH_TIME_UNIT", "seconds").to_lowercase().as_str() {
            "seconds" | "secs" | "s" => WatchTimeUnit::Seconds,
            "minutes" | "mins" | "m" => WatchTimeUnit::Minutes,
            other => {
                tracing::warn!(
                    "Unknown KPI_WATCH_TIME_UNIT '{other}', falling back to 'seconds'. Supported values: seconds, minutes"
                );
                WatchTimeUnit::Seconds
            }
        };

        let backend = match var("STORE_BACKEND", "json").to_lowercase().as_str() {
            "json" => StoreBackend::Json,
            "sqlite" => StoreBackend::Sqlite,
            other => {
                tracing::warn!(
                    "Unknown STORE_BACKEND '{other}', falling back to 'json'. Supported values: json, sqlite"
                );
                StoreBackend::Json
            }
        };

        let default_store_path = match backend {
            StoreBackend::Json => "./events.json",
            StoreBackend::Sqlite => "sqlite://./marquee.db",
        };

        let excluded_patterns = var("NOTIFY_EXCLUDE_PATTERNS", "Social Media")
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Config {
            vendor: VendorConfig {
                base_url: var("VENDOR_BASE_URL", "https://central.livingasone.com")
                    .trim_end_matches('/')
                    .to_string(),
                username: opt("VENDOR_USERNAME"),
                password: opt("VENDOR_PASSWORD"),
                export_max: var("VENDOR_EXPORT_MAX", "500").parse::<u32>()?,
                timeout_secs: var("VENDOR_TIMEOUT_SECS", "30").parse::<u64>()?,
                watch_time_unit,
            },
            store: StoreConfig {
                backend,
                path: var("STORE_PATH", default_store_path),
                cache_entries: var("STORE_CACHE_ENTRIES", "1000").parse::<u64>()?,
            },
            report: ReportConfig {
                output_dir: PathBuf::from(var("REPORT_OUTPUT_DIR", "./outputs")),
                template_dir: opt("REPORT_TEMPLATE_DIR").map(PathBuf::from),
            },
            notify: NotifyConfig {
                smtp_host: var("SMTP_HOST", "aspmx.l.google.com"),
                smtp_port: var("SMTP_PORT", "25").parse::<u16>()?,
                helo_name: var("SMTP_HELO", "localhost"),
                from: opt("NOTIFY_FROM"),
                to: opt("NOTIFY_TO"),
                subject_prefix: var("NOTIFY_SUBJECT_PREFIX", "[Epic Production Analytics]"),
                top_cities: var("NOTIFY_TOP_CITIES", "5").parse::<usize>()?,
                unique_viewer_floor: match opt("UNIQUE_VIEWER_FLOOR") {
                    Some(v) => v.parse::<u64>()?,
                    None => DEFAULT_UNIQUE_VIEWER_FLOOR,
                },
                excluded_patterns,
            },
            sync: SyncConfig {
                interval_secs: var("SYNC_INTERVAL_SECS", "3600").parse::<u64>()?,
            },
            api_server: ServerConfig {
                host: var("API_HOST", "127.0.0.1"),
                port: var("API_PORT", "8080").parse::<u16>()?,
            },
        })
    }
}
