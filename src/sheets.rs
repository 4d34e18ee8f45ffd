//! Tabular-store client
//!
//! Thin collaborator around the Google Sheets values API: fetch the target
//! post URL, allocate the next free metrics row, write the extracted values
//! back. Range addressing is 1-indexed, column-letter + row-number. The API
//! bearer token comes from the environment; token acquisition is an ops
//! concern, not this crate's.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

pub const TOKEN_ENV: &str = "SHEETS_API_TOKEN";

const VALUES_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets/";

/// Capability interface the relay pipeline talks to
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// Single cell as a trimmed string, `None` when empty
    async fn read_cell(&self, range: &str) -> Result<Option<String>>;

    /// First column of the range, one entry per populated row
    async fn read_column(&self, range: &str) -> Result<Vec<String>>;

    /// Overwrite one row span with the given values
    async fn write_row(&self, range: &str, values: Vec<Value>) -> Result<()>;
}

pub struct SheetsClient {
    http: reqwest::Client,
    spreadsheet_id: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl SheetsClient {
    pub fn new(spreadsheet_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            spreadsheet_id: spreadsheet_id.into(),
            token: token.into(),
        }
    }

    /// Construct from the `SHEETS_API_TOKEN` environment variable
    pub fn from_env(spreadsheet_id: impl Into<String>) -> Result<Self> {
        let token = std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .with_context(|| format!("{TOKEN_ENV} is not set"))?;
        Ok(Self::new(spreadsheet_id, token))
    }

    /// Values-API URL for a range; the range lands in a path segment and must
    /// be percent-encoded (sheet names are localized)
    fn values_url(&self, range: &str) -> Result<Url> {
        let mut url = Url::parse(VALUES_API_BASE).context("values API base URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("values API base cannot carry path segments"))?
            .push(&self.spreadsheet_id)
            .push("values")
            .push(range);
        Ok(url)
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<Value>>> {
        let url = self.values_url(range)?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("fetching range {range}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("values API returned {status} for {range}: {body}");
        }

        let range_data: ValueRange = response
            .json()
            .await
            .with_context(|| format!("decoding values for {range}"))?;
        Ok(range_data.values)
    }
}

#[async_trait]
impl TabularStore for SheetsClient {
    async fn read_cell(&self, range: &str) -> Result<Option<String>> {
        let values = self.get_values(range).await?;
        Ok(values
            .first()
            .and_then(|row| row.first())
            .map(cell_to_string)
            .filter(|s| !s.is_empty()))
    }

    async fn read_column(&self, range: &str) -> Result<Vec<String>> {
        let values = self.get_values(range).await?;
        Ok(values
            .iter()
            .filter_map(|row| row.first())
            .map(cell_to_string)
            .collect())
    }

    async fn write_row(&self, range: &str, values: Vec<Value>) -> Result<()> {
        let mut url = self.values_url(range)?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");

        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": [values],
        });

        let response = self
            .http
            .put(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("writing range {range}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("values API returned {status} writing {range}: {body}");
        }

        debug!(range, "row written");
        Ok(())
    }
}

fn cell_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// A1 addressing helpers
// ---------------------------------------------------------------------------

/// `sheet` + `C2` → `sheet!C2`
pub fn qualify(sheet: &str, cell: &str) -> String {
    format!("{sheet}!{cell}")
}

/// Open-ended column scan starting at `from_row`, e.g. `sheet!C4:C`
pub fn open_column(sheet: &str, column: &str, from_row: u32) -> String {
    format!("{sheet}!{column}{from_row}:{column}")
}

/// One-row span, e.g. `sheet!C7:G7`
pub fn row_span(sheet: &str, start_column: &str, end_column: &str, row: u32) -> String {
    format!("{sheet}!{start_column}{row}:{end_column}{row}")
}

/// Next free row under the anchor given how many rows are already populated
pub fn next_free_row(anchor_row: u32, populated: usize) -> u32 {
    anchor_row + populated as u32
}

/// Column letter `offset` positions to the right of `column` (A1 arithmetic,
/// bijective base 26: ... Y, Z, AA, AB ...)
pub fn column_after(column: &str, offset: u32) -> String {
    let mut index: u32 = 0;
    for c in column.trim().to_ascii_uppercase().chars() {
        if c.is_ascii_uppercase() {
            index = index * 26 + (c as u32 - 'A' as u32 + 1);
        }
    }
    index += offset;

    let mut letters = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        index = (index - 1) / 26;
    }
    letters.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a1_helpers_compose_ranges() {
        assert_eq!(qualify("시트4", "C2"), "시트4!C2");
        assert_eq!(open_column("시트4", "C", 4), "시트4!C4:C");
        assert_eq!(row_span("시트4", "C", "G", 12), "시트4!C12:G12");
    }

    #[test]
    fn next_free_row_counts_from_anchor() {
        assert_eq!(next_free_row(4, 0), 4);
        assert_eq!(next_free_row(4, 9), 13);
    }

    #[test]
    fn column_arithmetic() {
        assert_eq!(column_after("C", 0), "C");
        assert_eq!(column_after("C", 4), "G");
        assert_eq!(column_after("Z", 1), "AA");
        assert_eq!(column_after("AZ", 1), "BA");
    }

    #[test]
    fn cell_values_are_trimmed() {
        assert_eq!(cell_to_string(&Value::String("  x  ".into())), "x");
        assert_eq!(cell_to_string(&serde_json::json!(42)), "42");
    }
}
