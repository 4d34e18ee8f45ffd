//! Resilient browser automation for LinkedIn post-analytics export
//!
//! Drives a real Chrome session through login, challenge detection, and the
//! analytics download flow via chromiumoxide, then relays the extracted
//! metrics to a spreadsheet.

pub mod browser_setup;
mod browser;
pub mod challenge;
pub mod credentials;
pub mod download;
pub mod engine;
pub mod login;
pub mod parser;
pub mod pipeline;
pub mod readiness;
pub mod resolver;
pub mod session_store;
pub mod sheets;
mod utils;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub sheet: SheetConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// File extension of the analytics export artifact (no leading dot)
    #[serde(default = "default_export_extension")]
    pub export_extension: String,
}

/// Browser launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Window dimensions
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_width")]
    pub width: u32,

    #[serde(default = "default_window_height")]
    pub height: u32,
}

/// Target site entry points
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Same-origin URL cookies are injected against before restore
    #[serde(default = "default_origin_url")]
    pub origin_url: String,

    #[serde(default = "default_login_url")]
    pub login_url: String,

    /// Authenticated-area URL used to verify a restored session
    #[serde(default = "default_feed_url")]
    pub feed_url: String,
}

/// Spreadsheet coordinates, 1-indexed column-letter + row-number addressing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetConfig {
    #[serde(default)]
    pub spreadsheet_id: String,

    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,

    /// Cell holding the post feed URL to pull analytics for
    #[serde(default = "default_post_url_cell")]
    pub post_url_cell: String,

    /// Column scanned to find the next free metrics row
    #[serde(default = "default_anchor_column")]
    pub anchor_column: String,

    /// First row metrics are ever written to
    #[serde(default = "default_anchor_row")]
    pub anchor_row: u32,

    /// Cell the post publication timestamp is written to
    #[serde(default = "default_post_time_cell")]
    pub post_time_cell: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Where Chrome drops the export; defaults to a per-process temp dir
    #[serde(default)]
    pub download_dir: Option<PathBuf>,

    /// Serialized cookie jar between runs
    #[serde(default)]
    pub cookie_file: Option<PathBuf>,

    /// Failure screenshots and HTML snapshots land here
    #[serde(default = "default_diagnostics_dir")]
    pub diagnostics_dir: PathBuf,
}

/// Every suspension point in the pipeline carries one of these bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_navigation_ms")]
    pub navigation_ms: u64,

    /// Per-strategy wait inside the element resolver
    #[serde(default = "default_strategy_ms")]
    pub strategy_ms: u64,

    #[serde(default = "default_readiness_ms")]
    pub readiness_ms: u64,

    #[serde(default = "default_download_ms")]
    pub download_ms: u64,

    /// Fixed settle delay after navigations and between scroll steps
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_headless() -> bool {
    true
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

fn default_origin_url() -> String {
    "https://www.linkedin.com".to_string()
}

fn default_login_url() -> String {
    "https://www.linkedin.com/login".to_string()
}

fn default_feed_url() -> String {
    "https://www.linkedin.com/feed/".to_string()
}

fn default_sheet_name() -> String {
    "시트4".to_string()
}

fn default_post_url_cell() -> String {
    "C2".to_string()
}

fn default_anchor_column() -> String {
    "C".to_string()
}

fn default_anchor_row() -> u32 {
    4
}

fn default_post_time_cell() -> String {
    "G2".to_string()
}

fn default_diagnostics_dir() -> PathBuf {
    PathBuf::from("diagnostics")
}

fn default_navigation_ms() -> u64 {
    30_000
}

fn default_strategy_ms() -> u64 {
    5_000
}

fn default_readiness_ms() -> u64 {
    60_000
}

fn default_download_ms() -> u64 {
    90_000
}

fn default_settle_ms() -> u64 {
    2_000
}

fn default_export_extension() -> String {
    "csv".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser: BrowserConfig::default(),
            target: TargetConfig::default(),
            sheet: SheetConfig::default(),
            paths: PathsConfig::default(),
            timeouts: TimeoutConfig::default(),
            export_extension: default_export_extension(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            window: WindowConfig::default(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            origin_url: default_origin_url(),
            login_url: default_login_url(),
            feed_url: default_feed_url(),
        }
    }
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            sheet_name: default_sheet_name(),
            post_url_cell: default_post_url_cell(),
            anchor_column: default_anchor_column(),
            anchor_row: default_anchor_row(),
            post_time_cell: default_post_time_cell(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            download_dir: None,
            cookie_file: None,
            diagnostics_dir: default_diagnostics_dir(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation_ms: default_navigation_ms(),
            strategy_ms: default_strategy_ms(),
            readiness_ms: default_readiness_ms(),
            download_ms: default_download_ms(),
            settle_ms: default_settle_ms(),
        }
    }
}

impl PathsConfig {
    /// Download directory, falling back to a per-process temp dir
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir.clone().unwrap_or_else(|| {
            std::env::temp_dir().join(format!("postmetrics_downloads_{}", std::process::id()))
        })
    }

    /// Cookie jar path, falling back to the platform data dir
    pub fn cookie_file(&self) -> PathBuf {
        self.cookie_file.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("postmetrics")
                .join("session_cookies.json")
        })
    }
}

/// Load config from config.yaml next to the manifest, defaults otherwise
pub fn load_yaml_config() -> anyhow::Result<Config> {
    let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config.yaml");

    if config_path.exists() {
        let contents = fs::read_to_string(&config_path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    } else {
        Ok(Config::default())
    }
}

pub use browser::BrowserWrapper;
pub use browser_setup::{download_managed_browser, find_browser_executable, launch_browser};
pub use challenge::PageVerdict;
pub use credentials::Credential;
pub use download::DownloadResult;
pub use engine::{EngineError, SessionEngine};
pub use parser::MetricsRecord;
pub use pipeline::Relay;
pub use session_store::{CookieJar, SessionStore, StoredCookie};
pub use sheets::{SheetsClient, TabularStore};
