//! Exclusively-owned browser handle for one engine run
//!
//! The engine constructs one `BrowserWrapper` per run and must release it on
//! every exit path. There is no shared or global browser state.

use anyhow::{Context, Result};
use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::BrowserConfig as LaunchConfig;

/// Wrapper for a Browser, its event handler task, and its temp profile dir
///
/// The handler MUST be aborted once the browser is gone, or it runs
/// indefinitely against a dead websocket. `close()` is the orderly path;
/// `Drop` is the backstop.
pub struct BrowserWrapper {
    browser: Browser,
    handler: Option<JoinHandle<()>>,
    user_data_dir: Option<PathBuf>,
}

impl BrowserWrapper {
    /// Launch a fresh browser instance owned by the caller
    pub async fn launch(config: &LaunchConfig) -> Result<Self> {
        let (browser, handler, user_data_dir) = crate::browser_setup::launch_browser(config).await?;
        Ok(Self {
            browser,
            handler: Some(handler),
            user_data_dir: Some(user_data_dir),
        })
    }

    /// Create a blank page; navigation happens afterwards so cookies and
    /// download behavior can be configured against a live target first
    pub async fn new_page(&self) -> Result<Page> {
        self.browser
            .new_page("about:blank")
            .await
            .context("Failed to create blank page")
    }

    /// Orderly shutdown: close the Chrome process, wait for it to exit, then
    /// remove the profile directory. Safe to call once per run; the engine
    /// calls this on every exit path, success or failure.
    pub async fn close(mut self) {
        info!("Shutting down browser");

        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }

        if let Err(e) = self.browser.wait().await {
            warn!("Failed to wait for browser exit: {}", e);
        }

        if let Some(handler) = self.handler.take() {
            handler.abort();
        }

        self.cleanup_profile_dir();
    }

    /// Remove the temp profile directory (blocking; also used from Drop)
    ///
    /// Must run after the Chrome process has exited, otherwise Windows fails
    /// to remove files the process still holds open.
    fn cleanup_profile_dir(&mut self) {
        if let Some(path) = self.user_data_dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(
                    "Failed to clean up profile directory {}: {}. Manual cleanup may be required.",
                    path.display(),
                    e
                );
            }
        }
    }
}

impl Drop for BrowserWrapper {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        // Browser::drop kills the Chrome process; the profile dir can only be
        // removed best-effort here since the process may still hold it
        if self.user_data_dir.is_some() {
            warn!("BrowserWrapper dropped without close(); profile dir cleanup is best-effort");
            self.cleanup_profile_dir();
        }
    }
}
