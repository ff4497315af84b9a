use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::feed::ParserSettings;
use crate::files::{ChecksumType, DEFAULT_MEDIA_EXTENSIONS, DEFAULT_MIN_FILE_SIZE};

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub torrents: TorrentsConfig,
    #[serde(default)]
    pub calendars: CalendarsConfig,
    pub files: FilesConfig,
    /// Alternate show identifier -> canonical title.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("mediamanager.db")
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Retry policy shared by network collaborators
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

/// One configured parser instance.
///
/// Every key besides `source` is handed to the parser as a setting.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ParserConfig {
    /// Registry name; defaults to the table id.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(flatten)]
    pub settings: ParserSettings,
}

impl ParserConfig {
    pub fn source_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.source.as_deref().unwrap_or(id)
    }
}

/// Tracker feeds, search parsers and quality arbitration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TorrentsConfig {
    #[serde(default = "default_torrent_interval")]
    pub update_interval_secs: u64,
    #[serde(default = "default_true")]
    pub poll_immediately: bool,
    /// Torrent client watch directory where fetched `.torrent` files land.
    #[serde(default)]
    pub watch_dir: PathBuf,
    #[serde(default)]
    pub primary_qualities: Vec<String>,
    #[serde(default)]
    pub secondary_qualities: Vec<String>,
    #[serde(default = "default_primary_quality_timeout")]
    pub primary_quality_timeout_secs: u64,
    #[serde(default = "default_backfill_interval")]
    pub backfill_interval_secs: u64,
    #[serde(default = "default_max_concurrent_deliveries")]
    pub max_concurrent_deliveries: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub feeders: BTreeMap<String, ParserConfig>,
    #[serde(default)]
    pub searchers: BTreeMap<String, ParserConfig>,
}

impl Default for TorrentsConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: default_torrent_interval(),
            poll_immediately: true,
            watch_dir: PathBuf::new(),
            primary_qualities: Vec::new(),
            secondary_qualities: Vec::new(),
            primary_quality_timeout_secs: default_primary_quality_timeout(),
            backfill_interval_secs: default_backfill_interval(),
            max_concurrent_deliveries: default_max_concurrent_deliveries(),
            request_timeout_secs: default_request_timeout(),
            feeders: BTreeMap::new(),
            searchers: BTreeMap::new(),
        }
    }
}

impl TorrentsConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn primary_quality_timeout(&self) -> Duration {
        Duration::from_secs(self.primary_quality_timeout_secs)
    }

    pub fn backfill_interval(&self) -> Duration {
        Duration::from_secs(self.backfill_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_torrent_interval() -> u64 {
    900
}

fn default_primary_quality_timeout() -> u64 {
    3600
}

fn default_backfill_interval() -> u64 {
    3600
}

fn default_max_concurrent_deliveries() -> usize {
    4
}

fn default_request_timeout() -> u64 {
    30
}

/// Calendar feeds announcing desired episodes
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CalendarsConfig {
    #[serde(default = "default_calendar_interval")]
    pub update_interval_secs: u64,
    #[serde(default = "default_true")]
    pub poll_immediately: bool,
    #[serde(default)]
    pub parsers: BTreeMap<String, ParserConfig>,
}

impl Default for CalendarsConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: default_calendar_interval(),
            poll_immediately: true,
            parsers: BTreeMap::new(),
        }
    }
}

impl CalendarsConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }
}

fn default_calendar_interval() -> u64 {
    21_600
}

/// Download directory pipeline
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilesConfig {
    /// Where finished downloads appear.
    pub watch_dir: PathBuf,
    /// Staging directory media files are transferred to before filing.
    pub temp_dir: PathBuf,
    /// Library root, organised as `Title/Season NN/filename`.
    pub destination_dir: PathBuf,
    /// Move instead of copy; also enables the garbage handler.
    #[serde(default)]
    pub delete_originals: bool,
    /// Delete media files rejected by the acceptance gate.
    #[serde(default = "default_true")]
    pub delete_rejected: bool,
    #[serde(default = "default_min_file_size")]
    pub min_file_size_bytes: u64,
    #[serde(default = "default_media_extensions")]
    pub media_extensions: Vec<String>,
    #[serde(default = "default_garbage_extensions")]
    pub garbage_extensions: Vec<String>,
    #[serde(default)]
    pub checksum: ChecksumType,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_true")]
    pub scan_existing: bool,
    #[serde(default = "default_max_concurrent_handlers")]
    pub max_concurrent_handlers: usize,
}

impl FilesConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

fn default_min_file_size() -> u64 {
    DEFAULT_MIN_FILE_SIZE
}

fn default_media_extensions() -> Vec<String> {
    DEFAULT_MEDIA_EXTENSIONS
        .iter()
        .map(|e| e.to_string())
        .collect()
}

fn default_garbage_extensions() -> Vec<String> {
    ["nfo", "txt", "jpg", "png", "sfv", "srr", "url", "nzb"]
        .iter()
        .map(|e| e.to_string())
        .collect()
}

fn default_settle_delay_ms() -> u64 {
    2000
}

fn default_max_concurrent_handlers() -> usize {
    2
}

/// Config for startup logging, with secret-looking settings redacted.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub database: DatabaseConfig,
    pub torrents: SanitizedTorrentsConfig,
    pub calendars: BTreeMap<String, SanitizedParserConfig>,
    pub files: FilesConfig,
    pub aliases: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTorrentsConfig {
    pub update_interval_secs: u64,
    pub watch_dir: PathBuf,
    pub primary_qualities: Vec<String>,
    pub secondary_qualities: Vec<String>,
    pub primary_quality_timeout_secs: u64,
    pub feeders: BTreeMap<String, SanitizedParserConfig>,
    pub searchers: BTreeMap<String, SanitizedParserConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedParserConfig {
    pub source: String,
    /// Setting keys; values of secret keys are replaced.
    pub settings: BTreeMap<String, String>,
}

const SECRET_MARKERS: &[&str] = &["key", "password", "secret", "token", "passkey"];

fn sanitize_parsers(
    parsers: &BTreeMap<String, ParserConfig>,
) -> BTreeMap<String, SanitizedParserConfig> {
    parsers
        .iter()
        .map(|(id, parser)| {
            let settings = parser
                .settings
                .iter()
                .map(|(key, value)| {
                    let lowered = key.to_lowercase();
                    let shown = if SECRET_MARKERS.iter().any(|m| lowered.contains(m)) {
                        "<redacted>".to_string()
                    } else {
                        match value {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        }
                    };
                    (key.clone(), shown)
                })
                .collect();
            (
                id.clone(),
                SanitizedParserConfig {
                    source: parser.source_name(id).to_string(),
                    settings,
                },
            )
        })
        .collect()
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            database: config.database.clone(),
            torrents: SanitizedTorrentsConfig {
                update_interval_secs: config.torrents.update_interval_secs,
                watch_dir: config.torrents.watch_dir.clone(),
                primary_qualities: config.torrents.primary_qualities.clone(),
                secondary_qualities: config.torrents.secondary_qualities.clone(),
                primary_quality_timeout_secs: config.torrents.primary_quality_timeout_secs,
                feeders: sanitize_parsers(&config.torrents.feeders),
                searchers: sanitize_parsers(&config.torrents.searchers),
            },
            calendars: sanitize_parsers(&config.calendars.parsers),
            files: config.files.clone(),
            aliases: config.aliases.len(),
        }
    }
}
