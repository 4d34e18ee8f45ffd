//! Page readiness gate
//!
//! A page is not usable the instant navigation completes; content renders
//! asynchronously and no single deterministic signal covers it. Readiness is
//! evaluated in layers, each with its own bound. Layers past the first are
//! best-effort: over-strict readiness conditions caused real regressions as
//! the target UI evolved, so a later layer's failure is recorded as a warning
//! and never aborts the gate.

use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::error::CdpError;
use tracing::{debug, warn};

use crate::TimeoutConfig;

/// Known landmark containers, most specific first
const LANDMARK_SELECTORS: &[&str] = &[
    "main.scaffold-layout__main",
    "div.scaffold-layout__main",
    ".member-analytics-addon",
    "#global-nav",
    "main",
];

const SCROLL_SWEEP: &[&str] = &[
    "window.scrollTo(0, document.body.scrollHeight / 2)",
    "window.scrollTo(0, document.body.scrollHeight)",
    "window.scrollTo(0, 0)",
];

/// Wait until the page has stabilized enough for element resolution.
///
/// Returns `true` once the document-ready layer completes, regardless of
/// later-layer outcomes.
pub async fn await_ready(page: &Page, timeouts: &TimeoutConfig) -> bool {
    let settle = Duration::from_millis(timeouts.settle_ms);

    // Layer 1: document ready signal
    let document_ready =
        wait_document_complete(page, Duration::from_millis(timeouts.readiness_ms)).await;
    if !document_ready {
        warn!("document never reached readyState=complete");
    }

    // Layer 2: settle delay for asynchronous content injection
    tokio::time::sleep(settle).await;

    // Layer 3: landmark container presence
    if !wait_landmark(page, Duration::from_millis(timeouts.strategy_ms)).await {
        warn!("no known landmark container appeared");
    }

    // Layer 4: scroll sweep to trigger lazy-loaded content
    if let Err(e) = scroll_sweep(page, settle).await {
        warn!("scroll sweep failed: {}", e);
    }

    // Layer 5: final settle
    tokio::time::sleep(settle).await;

    document_ready
}

async fn wait_document_complete(page: &Page, timeout: Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        let state: Option<String> = match page.evaluate("document.readyState").await {
            Ok(result) => result.into_value().ok(),
            Err(e) => {
                debug!("readyState probe failed: {}", e);
                None
            }
        };
        if state.as_deref() == Some("complete") {
            debug!("document reached readyState=complete");
            return true;
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

async fn wait_landmark(page: &Page, timeout: Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        for selector in LANDMARK_SELECTORS {
            if page.find_element(*selector).await.is_ok() {
                debug!(selector, "landmark container detected");
                return true;
            }
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// Forced scroll top → middle → bottom → top, pausing between steps so
/// lazy-loaded sections get a chance to mount
async fn scroll_sweep(page: &Page, pause: Duration) -> Result<(), CdpError> {
    for step in SCROLL_SWEEP {
        page.evaluate(*step).await?;
        tokio::time::sleep(pause).await;
    }
    Ok(())
}
