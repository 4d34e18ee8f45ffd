//! Page classification after navigation
//!
//! Every full navigation is followed by a classification pass: is this the
//! page we expect, a login wall, or a bot-detection interstitial? This is the
//! primary defense against silently proceeding on a broken page.

use chromiumoxide::Page;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::engine::EngineError;

/// Verdict on the current page, drives the engine's next transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageVerdict {
    /// Expected authenticated-area landmark is present
    Ready,
    /// A login form is interposed
    LoginRequired,
    /// A security checkpoint / CAPTCHA / unusual-activity interstitial
    Challenged,
    /// The UI has drifted from every known shape; non-fatal but diagnosed
    Unknown,
}

/// URL path fragments of known checkpoint/verification pages
const CHECKPOINT_URL_MARKERS: &[&str] = &["/checkpoint/", "/uas/", "/authwall", "/captcha"];

/// Localized challenge phrases, matched case-insensitively against page text.
/// Maintained list; extend when the target grows a new interstitial.
const CHALLENGE_PHRASES: &[&str] = &[
    "security verification",
    "quick security check",
    "verify you're human",
    "verify you are human",
    "unusual activity",
    "we've restricted your account",
    "complete this security check",
    "are you a robot",
    "보안 확인",
    "보안 인증",
    "비정상적인 활동",
    "로봇이 아닙니다",
    "빠른 보안 확인",
];

/// Everything classification needs, captured from the page in one evaluation
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub url: String,
    pub text: String,
    pub has_login_form: bool,
    pub has_landmark: bool,
}

const SNAPSHOT_JS: &str = r#"(function() {
    return {
        url: String(window.location && window.location.href || ''),
        text: (document.body && document.body.innerText || '').slice(0, 20000),
        hasLoginForm: !!document.querySelector(
            "input[type='password'], form.login__form, #username, input[name='session_key']"),
        hasLandmark: !!document.querySelector(
            "main.scaffold-layout__main, div.scaffold-layout__main, #global-nav, .global-nav")
    };
})()"#;

/// Classify a captured snapshot. Detection order matters: URL patterns and
/// challenge phrases outrank the login-form and landmark checks, since a
/// checkpoint page can embed both.
pub fn classify(snapshot: &PageSnapshot) -> PageVerdict {
    let url = snapshot.url.to_lowercase();
    if CHECKPOINT_URL_MARKERS.iter().any(|m| url.contains(m)) {
        return PageVerdict::Challenged;
    }

    let text = snapshot.text.to_lowercase();
    if CHALLENGE_PHRASES.iter().any(|p| text.contains(p)) {
        return PageVerdict::Challenged;
    }

    if snapshot.has_login_form {
        return PageVerdict::LoginRequired;
    }

    if snapshot.has_landmark {
        return PageVerdict::Ready;
    }

    PageVerdict::Unknown
}

/// Capture the current page state for classification
pub async fn capture(page: &Page) -> Result<PageSnapshot, EngineError> {
    Ok(page.evaluate(SNAPSHOT_JS).await?.into_value()?)
}

/// Capture + classify in one step
pub async fn inspect(page: &Page) -> Result<PageVerdict, EngineError> {
    let snapshot = capture(page).await?;
    let verdict = classify(&snapshot);
    match verdict {
        PageVerdict::Unknown => warn!(url = %snapshot.url, "page matched no known shape"),
        _ => debug!(url = %snapshot.url, ?verdict, "page classified"),
    }
    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(url: &str, text: &str, login_form: bool, landmark: bool) -> PageSnapshot {
        PageSnapshot {
            url: url.to_string(),
            text: text.to_string(),
            has_login_form: login_form,
            has_landmark: landmark,
        }
    }

    #[test]
    fn checkpoint_url_wins_regardless_of_content() {
        let s = snapshot(
            "https://www.linkedin.com/checkpoint/challenge/abc",
            "welcome back",
            false,
            true,
        );
        assert_eq!(classify(&s), PageVerdict::Challenged);
    }

    #[test]
    fn challenge_phrase_wins_regardless_of_url() {
        for text in [
            "Let's do a quick security check before continuing",
            "We noticed unusual activity on your account",
            "계속하려면 빠른 보안 확인을 완료하세요",
            "로봇이 아닙니다를 증명해 주세요",
        ] {
            let s = snapshot("https://www.linkedin.com/feed/", text, true, true);
            assert_eq!(classify(&s), PageVerdict::Challenged, "text: {text}");
        }
    }

    #[test]
    fn phrase_match_is_case_insensitive() {
        let s = snapshot("https://x.test/", "UNUSUAL ACTIVITY detected", false, false);
        assert_eq!(classify(&s), PageVerdict::Challenged);
    }

    #[test]
    fn login_form_outranks_landmark() {
        let s = snapshot("https://www.linkedin.com/login", "Sign in", true, true);
        assert_eq!(classify(&s), PageVerdict::LoginRequired);
    }

    #[test]
    fn landmark_means_ready() {
        let s = snapshot("https://www.linkedin.com/feed/", "start a post", false, true);
        assert_eq!(classify(&s), PageVerdict::Ready);
    }

    #[test]
    fn nothing_recognized_is_unknown() {
        let s = snapshot("https://www.linkedin.com/feed/", "", false, false);
        assert_eq!(classify(&s), PageVerdict::Unknown);
    }
}
