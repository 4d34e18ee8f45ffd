//! Interactive login flow
//!
//! Drives credential entry and submission, then hands the outcome to the
//! challenge detector. The caller distinguishes three failure families:
//! `MissingCredential` (not configured), `LoginFlowBroken` (the UI changed or
//! the submission went nowhere), and `ChallengeDetected` (mapped by the
//! engine from the returned verdict).

use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::element::Element;
use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::challenge::{self, PageVerdict};
use crate::credentials::Credential;
use crate::engine::EngineError;
use crate::resolver;
use crate::{TargetConfig, TimeoutConfig};

/// Run the credential-entry flow and classify the resulting page.
///
/// Preconditions are checked before the browser is touched.
pub async fn login(
    page: &Page,
    credential: &Credential,
    target: &TargetConfig,
    timeouts: &TimeoutConfig,
) -> Result<PageVerdict, EngineError> {
    if !credential.is_complete() {
        return Err(EngineError::MissingCredential);
    }

    let navigation = Duration::from_millis(timeouts.navigation_ms);
    let strategy = Duration::from_millis(timeouts.strategy_ms);
    let settle = Duration::from_millis(timeouts.settle_ms);

    info!(url = %target.login_url, "starting interactive login");

    tokio::time::timeout(navigation, page.goto(&target.login_url))
        .await
        .map_err(|_| EngineError::NavigationTimeout {
            url: target.login_url.clone(),
            timeout_ms: timeouts.navigation_ms,
        })??;
    tokio::time::sleep(settle).await;

    let identity_field = resolver::resolve(page, &resolver::LOGIN_IDENTITY, strategy)
        .await
        .map_err(flow_broken)?;
    fill_field(page, &identity_field, &credential.identity)
        .await
        .map_err(|e| flow_broken_with("could not fill identity field", e))?;

    let secret_field = resolver::resolve(page, &resolver::LOGIN_SECRET, strategy)
        .await
        .map_err(flow_broken)?;
    fill_field(page, &secret_field, credential.secret.expose_secret())
        .await
        .map_err(|e| flow_broken_with("could not fill secret field", e))?;

    let submit = resolver::resolve(page, &resolver::LOGIN_SUBMIT, strategy)
        .await
        .map_err(flow_broken)?;
    activate(page, &submit)
        .await
        .map_err(|e| flow_broken_with("could not activate submit control", e))?;

    debug!("credentials submitted, waiting for navigation settle");
    // SPA logins do not always fire a full navigation; the settle delay plus
    // classification below decides the outcome either way
    let _ = tokio::time::timeout(navigation, page.wait_for_navigation()).await;
    tokio::time::sleep(settle).await;

    let verdict = challenge::inspect(page).await?;
    info!(?verdict, "login flow finished");
    Ok(verdict)
}

/// Focus via a real click, clear any prefill, then type
async fn fill_field(
    page: &Page,
    element: &Element,
    text: &str,
) -> Result<(), chromiumoxide::error::CdpError> {
    element.scroll_into_view().await?;
    let point = element.clickable_point().await?;
    page.click(point).await?;
    element
        .call_js_fn("function() { this.value = ''; }", false)
        .await?;
    element.type_str(text).await?;
    Ok(())
}

/// Native click, falling back to programmatic activation when the native
/// interaction is blocked by an overlay or viewport issue
async fn activate(page: &Page, element: &Element) -> Result<(), chromiumoxide::error::CdpError> {
    element.scroll_into_view().await?;
    match element.clickable_point().await {
        Ok(point) => {
            if page.click(point).await.is_ok() {
                return Ok(());
            }
            debug!("native click failed, activating via script");
        }
        Err(e) => debug!("no clickable point, activating via script: {}", e),
    }
    element.call_js_fn("function() { this.click(); }", false).await?;
    Ok(())
}

fn flow_broken(e: EngineError) -> EngineError {
    EngineError::LoginFlowBroken {
        reason: e.to_string(),
    }
}

fn flow_broken_with(context: &str, e: chromiumoxide::error::CdpError) -> EngineError {
    EngineError::LoginFlowBroken {
        reason: format!("{context}: {e}"),
    }
}
