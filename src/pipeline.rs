//! Outer relay pipeline
//!
//! Reads which post to measure from the sheet, runs the session engine to
//! obtain the export, parses it, and writes the metrics into the next free
//! row. The engine does the hard part; everything here is thin sequencing
//! over the capability interfaces.

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, warn};

use crate::engine::SessionEngine;
use crate::sheets::{self, TabularStore};
use crate::{SheetConfig, parser};

/// Number of metric columns written per row (impressions .. reposts)
const METRIC_COLUMNS: u32 = 5;

pub struct Relay {
    engine: SessionEngine,
    store: Box<dyn TabularStore>,
    sheet: SheetConfig,
}

impl Relay {
    pub fn new(engine: SessionEngine, store: Box<dyn TabularStore>, sheet: SheetConfig) -> Self {
        Self {
            engine,
            store,
            sheet,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let post_cell = sheets::qualify(&self.sheet.sheet_name, &self.sheet.post_url_cell);
        let feed_url = self
            .store
            .read_cell(&post_cell)
            .await?
            .with_context(|| format!("no post URL in {post_cell}"))?;

        let analytics_url = analytics_url_from_feed(&feed_url)
            .context("post URL does not contain an activity identifier")?;
        info!(url = %analytics_url, "resolved analytics target");

        let artifact = self.engine.run(&analytics_url).await?;
        let record = parser::parse_export(&artifact.path)?;
        info!(?record, "export parsed");

        let populated = self
            .store
            .read_column(&sheets::open_column(
                &self.sheet.sheet_name,
                &self.sheet.anchor_column,
                self.sheet.anchor_row,
            ))
            .await?
            .len();
        let row = sheets::next_free_row(self.sheet.anchor_row, populated);

        let end_column = sheets::column_after(&self.sheet.anchor_column, METRIC_COLUMNS - 1);
        self.store
            .write_row(
                &sheets::row_span(
                    &self.sheet.sheet_name,
                    &self.sheet.anchor_column,
                    &end_column,
                    row,
                ),
                record.as_row(),
            )
            .await?;

        if let Some(posted_at) = &record.posted_at {
            self.store
                .write_row(
                    &sheets::qualify(&self.sheet.sheet_name, &self.sheet.post_time_cell),
                    vec![json!(posted_at)],
                )
                .await?;
        }

        // Artifact lifecycle is consume-and-delete
        if let Err(e) = std::fs::remove_file(&artifact.path) {
            warn!(
                "failed to delete consumed artifact {}: {}",
                artifact.path.display(),
                e
            );
        }

        info!(row, "metrics relayed");
        Ok(())
    }
}

/// Derive the post-summary analytics URL from a feed URL carrying an
/// `urn:li:activity:<id>` token
pub fn analytics_url_from_feed(feed_url: &str) -> Option<String> {
    let marker = "urn:li:activity:";
    let index = feed_url.find(marker)?;
    let tail = &feed_url[index + marker.len()..];
    let id: String = tail.chars().take_while(char::is_ascii_digit).collect();
    if id.is_empty() {
        return None;
    }
    Some(format!(
        "https://www.linkedin.com/analytics/post-summary/urn:li:activity:{id}/"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_id_is_extracted_from_feed_url() {
        let url = "https://www.linkedin.com/feed/update/urn:li:activity:7210001234567890123/";
        assert_eq!(
            analytics_url_from_feed(url).as_deref(),
            Some(
                "https://www.linkedin.com/analytics/post-summary/urn:li:activity:7210001234567890123/"
            )
        );
    }

    #[test]
    fn trailing_query_is_ignored() {
        let url =
            "https://www.linkedin.com/feed/update/urn:li:activity:123456/?utm_source=share";
        assert_eq!(
            analytics_url_from_feed(url).as_deref(),
            Some("https://www.linkedin.com/analytics/post-summary/urn:li:activity:123456/")
        );
    }

    #[test]
    fn bare_urn_works_without_a_path() {
        assert!(analytics_url_from_feed("urn:li:activity:42").is_some());
    }

    #[test]
    fn url_without_activity_token_is_rejected() {
        assert!(analytics_url_from_feed("https://www.linkedin.com/feed/").is_none());
        assert!(analytics_url_from_feed("urn:li:activity:").is_none());
    }
}
