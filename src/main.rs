//! Relay entry point
//!
//! One invocation is one run: resolve the target post from the sheet, drive
//! the browser session, relay the metrics. Scheduling recurrence is the
//! caller's job (cron, CI).

use anyhow::{Context, Result};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use postmetrics::session_store::SessionStore;
use postmetrics::{Relay, SessionEngine, SheetsClient, credentials};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("postmetrics=info")),
        )
        .init();

    let config = postmetrics::load_yaml_config().context("failed to load config.yaml")?;

    let spreadsheet_id = std::env::var("SPREADSHEET_ID")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| config.sheet.spreadsheet_id.clone());
    if spreadsheet_id.is_empty() {
        anyhow::bail!("no spreadsheet id configured (config.yaml sheet.spreadsheet_id or SPREADSHEET_ID)");
    }

    let credential = credentials::resolve();
    if credential.is_none() {
        warn!("no login credential configured; the run only succeeds if the stored session is still valid");
    }

    let store = SessionStore::new(config.paths.cookie_file());
    let engine = SessionEngine::new(config.clone(), store, credential);
    let sheets = SheetsClient::from_env(spreadsheet_id)?;

    let relay = Relay::new(engine, Box::new(sheets), config.sheet.clone());
    relay.run().await
}
