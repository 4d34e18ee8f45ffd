//! Download orchestration
//!
//! "Click download, obtain the resulting artifact" as one reliable
//! operation: resolve the control through the strategy table, fall back to a
//! page-level script search, interact natively with a programmatic fallback,
//! then watch the download directory for a new matching file.
//!
//! The export's file names are not guaranteed to be stable or sortable, so
//! completion detection keys on creation time against a pre-trigger
//! baseline, never on names.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use chromiumoxide::Page;
use chromiumoxide::element::Element;
use tracing::{debug, info, warn};

use crate::TimeoutConfig;
use crate::engine::EngineError;
use crate::resolver;

/// The artifact produced by a successful download action
#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub path: PathBuf,
    pub obtained_at: DateTime<Utc>,
}

/// Page-level fallback: search visible text and iconography for a download
/// affordance in every supported locale and click it in-page
const SCRIPT_SEARCH_JS: &str = r#"(function() {
    function visible(el) {
        const r = el.getBoundingClientRect();
        return r.width > 0 && r.height > 0;
    }
    const needles = ['download', '다운로드'];
    for (const el of document.querySelectorAll('button, a')) {
        const text = (el.textContent || '').toLowerCase();
        const aria = (el.getAttribute('aria-label') || '').toLowerCase();
        if (!needles.some(n => text.includes(n) || aria.includes(n))) continue;
        if (!visible(el)) continue;
        el.click();
        return true;
    }
    const byClass = document.querySelector(
        "[class*='download'][role='button'], button[class*='download'], a[class*='download']");
    if (byClass && visible(byClass)) { byClass.click(); return true; }
    const icon = document.querySelector("svg[data-test-icon*='download']");
    if (icon) {
        const host = icon.closest('button, a');
        if (host && visible(host)) { host.click(); return true; }
    }
    return false;
})()"#;

/// Trigger the export download and wait for the artifact to land.
///
/// Fails `DownloadNotTriggered` when no actionable control is found across
/// all configured intents, and `ArtifactNotFound` when triggering succeeded
/// but no new matching file appears within the bound.
pub async fn download_artifact(
    page: &Page,
    download_dir: &Path,
    expected_ext: &str,
    timeouts: &TimeoutConfig,
) -> Result<DownloadResult, EngineError> {
    // Baseline before the trigger so a stale export from an earlier run can
    // never be mistaken for this run's artifact
    let baseline = newest_artifact(download_dir, expected_ext)
        .map(|(_, created)| created)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    if !trigger_download(page, timeouts).await? {
        return Err(EngineError::DownloadNotTriggered);
    }

    let bound = Duration::from_millis(timeouts.download_ms);
    match poll_for_artifact(download_dir, expected_ext, baseline, bound).await {
        Some(path) => {
            info!(path = %path.display(), "export artifact obtained");
            Ok(DownloadResult {
                path,
                obtained_at: Utc::now(),
            })
        }
        None => Err(EngineError::ArtifactNotFound {
            extension: expected_ext.to_string(),
            waited_ms: timeouts.download_ms,
        }),
    }
}

async fn trigger_download(page: &Page, timeouts: &TimeoutConfig) -> Result<bool, EngineError> {
    let strategy = Duration::from_millis(timeouts.strategy_ms);

    match resolver::resolve(page, &resolver::DOWNLOAD_CONTROL, strategy).await {
        Ok(control) => {
            activate(page, &control).await?;
            Ok(true)
        }
        Err(e) => {
            debug!("{e}; falling back to page-level script search");
            let clicked: bool = page.evaluate(SCRIPT_SEARCH_JS).await?.into_value()?;
            if clicked {
                info!("download triggered via script search");
            }
            Ok(clicked)
        }
    }
}

/// Scroll into view, native click, programmatic activation as fallback
async fn activate(page: &Page, element: &Element) -> Result<(), EngineError> {
    element.scroll_into_view().await?;
    tokio::time::sleep(Duration::from_millis(500)).await;

    match element.clickable_point().await {
        Ok(point) => {
            if page.click(point).await.is_ok() {
                debug!("download control clicked natively");
                return Ok(());
            }
            warn!("native click on download control failed, activating via script");
        }
        Err(e) => warn!("download control has no clickable point ({e}), activating via script"),
    }

    element
        .call_js_fn("function() { this.click(); }", false)
        .await?;
    Ok(())
}

/// Most-recently-created file in `dir` with the expected extension.
/// Creation time is the tie-break; in-progress `.crdownload` files never
/// match the extension and are therefore not candidates.
pub(crate) fn newest_artifact(dir: &Path, extension: &str) -> Option<(PathBuf, SystemTime)> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            if !path.is_file() || !has_extension(&path, extension) {
                return None;
            }
            let metadata = entry.metadata().ok()?;
            let created = metadata.created().or_else(|_| metadata.modified()).ok()?;
            Some((path, created))
        })
        .max_by_key(|(_, created)| *created)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

pub(crate) async fn poll_for_artifact(
    dir: &Path,
    extension: &str,
    baseline: SystemTime,
    timeout: Duration,
) -> Option<PathBuf> {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if let Some((path, created)) = newest_artifact(dir, extension)
            && created > baseline
        {
            return Some(path);
        }
        let now = std::time::Instant::now();
        if now >= deadline {
            return None;
        }
        let remaining = deadline - now;
        tokio::time::sleep(remaining.min(Duration::from_millis(500))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"data").expect("write file");
        path
    }

    #[test]
    fn newest_artifact_prefers_later_creation_time() {
        let dir = tempfile::tempdir().expect("tempdir");
        let _stale = touch(dir.path(), "export-old.csv");
        std::thread::sleep(Duration::from_millis(30));
        let fresh = touch(dir.path(), "a-name-that-sorts-first.csv");

        let (path, _) = newest_artifact(dir.path(), "csv").expect("artifact");
        // creation time decides, not the name
        assert_eq!(path, fresh);
    }

    #[test]
    fn other_extensions_and_partials_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(dir.path(), "export.csv.crdownload");
        touch(dir.path(), "notes.txt");

        assert!(newest_artifact(dir.path(), "csv").is_none());
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let upper = touch(dir.path(), "EXPORT.CSV");

        let (path, _) = newest_artifact(dir.path(), "csv").expect("artifact");
        assert_eq!(path, upper);
    }

    #[tokio::test]
    async fn poll_returns_only_files_newer_than_baseline() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(dir.path(), "stale.csv");
        let baseline = newest_artifact(dir.path(), "csv")
            .map(|(_, t)| t)
            .expect("baseline");

        // nothing newer than the stale file yet
        let missing =
            poll_for_artifact(dir.path(), "csv", baseline, Duration::from_millis(50)).await;
        assert!(missing.is_none());

        std::thread::sleep(Duration::from_millis(30));
        let fresh = touch(dir.path(), "fresh.csv");
        let found = poll_for_artifact(dir.path(), "csv", baseline, Duration::from_millis(200))
            .await
            .expect("fresh artifact");
        assert_eq!(found, fresh);
    }

    #[tokio::test]
    async fn poll_times_out_on_empty_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let found = poll_for_artifact(
            dir.path(),
            "csv",
            SystemTime::UNIX_EPOCH,
            Duration::from_millis(40),
        )
        .await;
        assert!(found.is_none());
    }
}
