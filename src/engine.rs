//! Top-level session state machine
//!
//! One run is a strictly sequential pipeline:
//! restore-session → verify-or-login → verify-no-challenge → navigate →
//! await-ready → download. The browser context is an exclusively-owned
//! resource for the run's duration and is released on every exit path; hard
//! failures capture a diagnostic snapshot before the context closes.

use std::path::Path;
use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide_cdp::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::browser::BrowserWrapper;
use crate::challenge::{self, PageVerdict};
use crate::credentials::Credential;
use crate::download::{self, DownloadResult};
use crate::session_store::SessionStore;
use crate::{Config, login, readiness};

/// Hard-failure taxonomy of a run. Soft failures (session-restore problems,
/// readiness-layer timeouts, cookie-field incompatibilities) are absorbed
/// and logged by the components that hit them and never appear here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("login credentials are not configured")]
    MissingCredential,

    #[error("login flow broken: {reason}")]
    LoginFlowBroken { reason: String },

    #[error("security challenge interposed at {url}")]
    ChallengeDetected { url: String },

    #[error("no {intent} resolved after trying {strategies} strategies")]
    ElementNotFound {
        intent: &'static str,
        strategies: usize,
    },

    #[error("no actionable download control found on the page")]
    DownloadNotTriggered,

    #[error("download triggered but no new .{extension} file appeared within {waited_ms}ms")]
    ArtifactNotFound { extension: String, waited_ms: u64 },

    #[error("navigation to {url} timed out after {timeout_ms}ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    #[error("browser protocol error: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),

    #[error("unexpected page payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser setup failed: {0}")]
    Setup(#[from] anyhow::Error),
}

/// Owns the whole run. The browser handle is constructed inside `run` and
/// released before `run` returns, success or failure; no browser state
/// outlives a run.
pub struct SessionEngine {
    config: Config,
    store: SessionStore,
    credential: Option<Credential>,
}

impl SessionEngine {
    pub fn new(config: Config, store: SessionStore, credential: Option<Credential>) -> Self {
        Self {
            config,
            store,
            credential,
        }
    }

    /// Execute one full session against the given analytics page and return
    /// the downloaded artifact.
    pub async fn run(&self, analytics_url: &str) -> Result<DownloadResult, EngineError> {
        let download_dir = self.config.paths.download_dir();
        std::fs::create_dir_all(&download_dir)?;

        let browser = BrowserWrapper::launch(&self.config.browser).await?;
        let page = match browser.new_page().await {
            Ok(page) => page,
            Err(e) => {
                browser.close().await;
                return Err(e.into());
            }
        };

        let outcome = self.run_inner(&page, analytics_url, &download_dir).await;

        if let Err(err) = &outcome {
            warn!(error = %err, "run failed, capturing diagnostics");
            self.capture_diagnostics(&page).await;
        }

        // Every exit path releases the browser context
        browser.close().await;
        outcome
    }

    async fn run_inner(
        &self,
        page: &Page,
        analytics_url: &str,
        download_dir: &Path,
    ) -> Result<DownloadResult, EngineError> {
        configure_downloads(page, download_dir).await?;

        // Restore the persisted session; any failure inside downgrades to
        // interactive login
        let restored = self
            .store
            .restore(page, &self.config.target.origin_url)
            .await;
        if restored {
            debug!("cookie jar injected, verifying session");
        }

        self.navigate(page, &self.config.target.feed_url).await?;
        let verdict = challenge::inspect(page).await?;

        match verdict {
            PageVerdict::Ready => {
                info!("session verified, interactive login skipped");
            }
            PageVerdict::Challenged => {
                return Err(EngineError::ChallengeDetected {
                    url: current_url(page).await,
                });
            }
            PageVerdict::LoginRequired => {
                let credential = self
                    .credential
                    .as_ref()
                    .ok_or(EngineError::MissingCredential)?;
                let post_login =
                    login::login(page, credential, &self.config.target, &self.config.timeouts)
                        .await?;
                if let Some(err) = post_login_failure(post_login, current_url(page).await) {
                    return Err(err);
                }
                info!("interactive login succeeded");
                // Best-effort: a failed write must not fail the run
                self.store.persist(page).await;
            }
            PageVerdict::Unknown => {
                // Non-fatal, but the drift is worth a snapshot for triage
                self.snapshot_unknown_page(page).await;
            }
        }

        self.navigate(page, analytics_url).await?;

        if !readiness::await_ready(page, &self.config.timeouts).await {
            warn!("readiness gate degraded, continuing with best-effort page state");
        }

        match challenge::inspect(page).await? {
            PageVerdict::Challenged => {
                return Err(EngineError::ChallengeDetected {
                    url: current_url(page).await,
                });
            }
            PageVerdict::LoginRequired => {
                return Err(EngineError::LoginFlowBroken {
                    reason: "session evaporated while navigating to the analytics page"
                        .to_string(),
                });
            }
            PageVerdict::Unknown => {
                self.snapshot_unknown_page(page).await;
            }
            PageVerdict::Ready => {}
        }

        download::download_artifact(
            page,
            download_dir,
            &self.config.export_extension,
            &self.config.timeouts,
        )
        .await
    }

    /// Bounded navigation plus settle; the post-load settle absorbs the
    /// target's client-side redirects
    async fn navigate(&self, page: &Page, url: &str) -> Result<(), EngineError> {
        let bound = Duration::from_millis(self.config.timeouts.navigation_ms);
        info!(url, "navigating");

        tokio::time::timeout(bound, page.goto(url))
            .await
            .map_err(|_| EngineError::NavigationTimeout {
                url: url.to_string(),
                timeout_ms: self.config.timeouts.navigation_ms,
            })??;

        // The lifecycle wait is best-effort: SPA route changes do not always
        // fire it, and the settle delay below covers the gap
        match tokio::time::timeout(bound, page.wait_for_navigation()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(url, "navigation lifecycle errored: {}", e),
            Err(_) => warn!(url, "navigation lifecycle never settled within bound"),
        }

        tokio::time::sleep(Duration::from_millis(self.config.timeouts.settle_ms)).await;
        Ok(())
    }

    /// Full-page screenshot and HTML snapshot for offline triage, written
    /// before the browser context is closed. Failures here are only logged;
    /// diagnostics must never mask the original error.
    async fn capture_diagnostics(&self, page: &Page) {
        let dir = &self.config.paths.diagnostics_dir;
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("could not create diagnostics dir {}: {}", dir.display(), e);
            return;
        }

        match page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
        {
            Ok(bytes) => {
                let path = dir.join("failure.png");
                if let Err(e) = std::fs::write(&path, bytes) {
                    warn!("could not write {}: {}", path.display(), e);
                } else {
                    info!("failure screenshot written to {}", path.display());
                }
            }
            Err(e) => warn!("failure screenshot capture failed: {}", e),
        }

        match page.content().await {
            Ok(html) => {
                let path = dir.join("failure.html");
                if let Err(e) = std::fs::write(&path, html) {
                    warn!("could not write {}: {}", path.display(), e);
                } else {
                    info!("failure HTML snapshot written to {}", path.display());
                }
            }
            Err(e) => warn!("failure HTML capture failed: {}", e),
        }
    }

    /// An Unknown verdict signals UI drift; keep the page source so the
    /// strategy tables and phrase lists can be updated offline
    async fn snapshot_unknown_page(&self, page: &Page) {
        warn!("page matched no known shape, writing snapshot for offline diagnosis");
        let dir = &self.config.paths.diagnostics_dir;
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("could not create diagnostics dir {}: {}", dir.display(), e);
            return;
        }
        match page.content().await {
            Ok(html) => {
                let path = dir.join("unknown_page.html");
                if let Err(e) = std::fs::write(&path, html) {
                    warn!("could not write {}: {}", path.display(), e);
                }
            }
            Err(e) => warn!("unknown-page snapshot capture failed: {}", e),
        }
    }
}

/// Route downloads into the run's directory via CDP
async fn configure_downloads(page: &Page, download_dir: &Path) -> Result<(), EngineError> {
    let params = SetDownloadBehaviorParams {
        behavior: SetDownloadBehaviorBehavior::Allow,
        download_path: Some(download_dir.to_string_lossy().to_string()),
        browser_context_id: None,
        events_enabled: None,
    };
    page.execute(params).await?;
    debug!(dir = %download_dir.display(), "download behavior configured");
    Ok(())
}

async fn current_url(page: &Page) -> String {
    page.url().await.ok().flatten().unwrap_or_default()
}

/// Map the post-login verdict to the run's next transition. `None` means the
/// session is established. The two `LoginFlowBroken` reasons let operators
/// tell "no challenge but also no success" apart from a changed UI.
fn post_login_failure(verdict: PageVerdict, url: String) -> Option<EngineError> {
    match verdict {
        PageVerdict::Ready => None,
        PageVerdict::Challenged => Some(EngineError::ChallengeDetected { url }),
        PageVerdict::LoginRequired => Some(EngineError::LoginFlowBroken {
            reason: "credentials submitted but the login form is still present".to_string(),
        }),
        PageVerdict::Unknown => Some(EngineError::LoginFlowBroken {
            reason: "credentials submitted but no authenticated landmark appeared".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_verdict_establishes_the_session() {
        assert!(post_login_failure(PageVerdict::Ready, String::new()).is_none());
    }

    #[test]
    fn challenge_verdict_aborts_with_challenge_detected() {
        let err = post_login_failure(
            PageVerdict::Challenged,
            "https://www.linkedin.com/checkpoint/challenge/x".to_string(),
        )
        .expect("challenge must abort");
        assert!(matches!(err, EngineError::ChallengeDetected { url } if url.contains("checkpoint")));
    }

    #[test]
    fn unsuccessful_login_is_flow_broken_not_challenge() {
        for verdict in [PageVerdict::LoginRequired, PageVerdict::Unknown] {
            let err = post_login_failure(verdict, String::new()).expect("must abort");
            assert!(matches!(err, EngineError::LoginFlowBroken { .. }));
        }
    }
}
