//! Multi-strategy element resolution
//!
//! Each semantic intent (login fields, submit control, download control)
//! carries an ordered table of locator strategies. Order encodes confidence:
//! stable control identifiers first, localized accessible-name matching next,
//! structural containment after that, broad class heuristics last. A strategy
//! that times out yields to the next one instead of failing the resolution.
//!
//! Resolution is read-only probing. A candidate is accepted only when it is
//! visible and interactable; the target site's responsive layouts leave stale
//! hidden nodes in the tree, and a present-but-hidden element is not a valid
//! hit.

use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::element::Element;
use tracing::{debug, trace};

use crate::engine::EngineError;

/// Attribute stamped on a script-located candidate so it can be re-fetched
/// as a CDP element handle
const HIT_MARKER: &str = "data-pm-hit";
const HIT_SELECTOR: &str = "[data-pm-hit='1']";

/// Visibility + interactability predicate evaluated on a candidate element
const ACTIONABLE_JS: &str = r#"function() {
    const r = this.getBoundingClientRect();
    if (r.width <= 0 || r.height <= 0) return false;
    const cs = window.getComputedStyle(this);
    if (cs.display === 'none' || cs.visibility === 'hidden') return false;
    if (this.disabled || this.getAttribute('aria-disabled') === 'true') return false;
    return true;
}"#;

/// A single deterministic way of finding an element for an intent
pub struct LocatorStrategy {
    pub description: &'static str,
    pub locator: Locator,
}

pub enum Locator {
    /// Direct CSS selector probe
    Css(&'static str),
    /// Accessible-name/text match over candidate elements, all supported
    /// locales at once (the target UI language is not guaranteed)
    Text {
        scope: &'static str,
        needles: &'static [&'static str],
    },
    /// An icon known to represent the action, resolved through its closest
    /// interactive ancestor
    IconAncestor { icon: &'static str },
}

/// A semantic intent and its ordered strategy table
pub struct Intent {
    pub name: &'static str,
    pub strategies: &'static [LocatorStrategy],
}

pub const LOGIN_IDENTITY: Intent = Intent {
    name: "login identity field",
    strategies: &[
        LocatorStrategy {
            description: "login form control id",
            locator: Locator::Css("#username, input[name='session_key']"),
        },
        LocatorStrategy {
            description: "autocomplete/email input attributes",
            locator: Locator::Css("input[autocomplete='username'], input[type='email']"),
        },
        LocatorStrategy {
            description: "accessible name in any locale",
            locator: Locator::Text {
                scope: "input",
                needles: &["email", "phone", "이메일", "전화"],
            },
        },
        LocatorStrategy {
            description: "first text input inside a form",
            locator: Locator::Css("form input[type='text']"),
        },
    ],
};

pub const LOGIN_SECRET: Intent = Intent {
    name: "login secret field",
    strategies: &[
        LocatorStrategy {
            description: "login form control id",
            locator: Locator::Css("#password, input[name='session_password']"),
        },
        LocatorStrategy {
            description: "password input type",
            locator: Locator::Css("input[type='password']"),
        },
    ],
};

pub const LOGIN_SUBMIT: Intent = Intent {
    name: "login submit control",
    strategies: &[
        LocatorStrategy {
            description: "form submit button",
            locator: Locator::Css("button[type='submit'], input[type='submit']"),
        },
        LocatorStrategy {
            description: "accessible name in any locale",
            locator: Locator::Text {
                scope: "button, [role='button']",
                needles: &["sign in", "log in", "로그인"],
            },
        },
        LocatorStrategy {
            description: "login-styled class heuristic",
            locator: Locator::Css("button[class*='login'], button[class*='signin']"),
        },
    ],
};

pub const DOWNLOAD_CONTROL: Intent = Intent {
    name: "download control",
    strategies: &[
        LocatorStrategy {
            description: "explicit download control attribute",
            locator: Locator::Css(
                "button[data-control-name*='download'], a[data-control-name*='download']",
            ),
        },
        LocatorStrategy {
            description: "accessible name in any locale",
            locator: Locator::Text {
                scope: "button, a, [role='button']",
                needles: &["download", "다운로드"],
            },
        },
        LocatorStrategy {
            description: "download icon via interactive ancestor",
            locator: Locator::IconAncestor {
                icon: "svg[data-test-icon*='download'], li-icon[type='download-icon'], svg[class*='download']",
            },
        },
        LocatorStrategy {
            description: "download-styled class heuristic",
            locator: Locator::Css("button[class*='download'], a[class*='download']"),
        },
    ],
};

/// Resolve an intent to a visible, interactable element
///
/// Strategies are tried in table order, each with its own bounded wait.
/// Fails with `ElementNotFound` only after every strategy is exhausted.
pub async fn resolve(
    page: &Page,
    intent: &Intent,
    per_strategy: Duration,
) -> Result<Element, EngineError> {
    let hit = first_hit(intent.strategies.len(), async |idx| {
        let strategy = &intent.strategies[idx];
        let found = try_strategy(page, strategy, per_strategy).await;
        if found.is_none() {
            debug!(
                intent = intent.name,
                strategy = strategy.description,
                "strategy exhausted, yielding to next"
            );
        }
        found
    })
    .await;

    match hit {
        Some((idx, element)) => {
            debug!(
                intent = intent.name,
                strategy = intent.strategies[idx].description,
                "resolved"
            );
            Ok(element)
        }
        None => Err(EngineError::ElementNotFound {
            intent: intent.name,
            strategies: intent.strategies.len(),
        }),
    }
}

/// Walk `count` strategies in order, returning the first hit and its index.
/// Strategies past the first hit are never probed.
pub async fn first_hit<T, F>(count: usize, mut probe: F) -> Option<(usize, T)>
where
    F: AsyncFnMut(usize) -> Option<T>,
{
    for idx in 0..count {
        if let Some(hit) = probe(idx).await {
            return Some((idx, hit));
        }
    }
    None
}

/// One strategy attempt: poll with exponential backoff until the bound expires
async fn try_strategy(
    page: &Page,
    strategy: &LocatorStrategy,
    timeout: Duration,
) -> Option<Element> {
    let start = std::time::Instant::now();
    let mut poll_interval = Duration::from_millis(100);
    let max_interval = Duration::from_secs(1);

    loop {
        if let Some(element) = probe_once(page, &strategy.locator).await {
            return Some(element);
        }

        if start.elapsed() >= timeout {
            return None;
        }

        tokio::time::sleep(poll_interval).await;
        poll_interval = (poll_interval * 2).min(max_interval);
    }
}

async fn probe_once(page: &Page, locator: &Locator) -> Option<Element> {
    match locator {
        Locator::Css(selector) => {
            let candidates = page.find_elements(*selector).await.ok()?;
            for candidate in candidates {
                if is_actionable(&candidate).await {
                    return Some(candidate);
                }
            }
            None
        }
        Locator::Text { scope, needles } => {
            let script = text_probe_script(scope, needles);
            marked_element(page, &script).await
        }
        Locator::IconAncestor { icon } => {
            let script = icon_probe_script(icon);
            marked_element(page, &script).await
        }
    }
}

/// Run a marking script and fetch the element it tagged, if any
async fn marked_element(page: &Page, script: &str) -> Option<Element> {
    let hit: bool = page
        .evaluate(script)
        .await
        .ok()?
        .into_value()
        .unwrap_or(false);
    if !hit {
        return None;
    }
    let element = page.find_element(HIT_SELECTOR).await.ok()?;
    if is_actionable(&element).await {
        Some(element)
    } else {
        trace!("marked candidate rejected by actionability probe");
        None
    }
}

pub(crate) async fn is_actionable(element: &Element) -> bool {
    element
        .call_js_fn(ACTIONABLE_JS, false)
        .await
        .ok()
        .and_then(|ret| ret.result.value)
        .and_then(|value| value.as_bool())
        .unwrap_or(false)
}

fn text_probe_script(scope: &str, needles: &[&str]) -> String {
    let needles_json = serde_json::to_string(
        &needles
            .iter()
            .map(|n| n.to_lowercase())
            .collect::<Vec<_>>(),
    )
    .unwrap_or_else(|_| "[]".to_string());
    let scope_json = serde_json::to_string(scope).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"(function() {{
    const needles = {needles_json};
    document.querySelectorAll('[{marker}]').forEach(el => el.removeAttribute('{marker}'));
    const candidates = Array.from(document.querySelectorAll({scope_json}));
    for (const el of candidates) {{
        const meta = ((el.textContent || '') + ' '
            + (el.getAttribute('aria-label') || '') + ' '
            + (el.getAttribute('placeholder') || '')).toLowerCase();
        if (!needles.some(n => meta.includes(n))) continue;
        const r = el.getBoundingClientRect();
        if (r.width <= 0 || r.height <= 0) continue;
        el.setAttribute('{marker}', '1');
        return true;
    }}
    return false;
}})()"#,
        marker = HIT_MARKER,
    )
}

fn icon_probe_script(icon: &str) -> String {
    let icon_json = serde_json::to_string(icon).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"(function() {{
    document.querySelectorAll('[{marker}]').forEach(el => el.removeAttribute('{marker}'));
    const icon = document.querySelector({icon_json});
    if (!icon) return false;
    const host = icon.closest("button, a, [role='button']");
    if (!host) return false;
    host.setAttribute('{marker}', '1');
    return true;
}})()"#,
        marker = HIT_MARKER,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_hit_stops_at_first_success() {
        let mut probed = Vec::new();
        let outcomes = [None, None, Some("c"), Some("d")];

        let hit = first_hit(outcomes.len(), async |idx| {
            probed.push(idx);
            outcomes[idx]
        })
        .await;

        assert_eq!(hit, Some((2, "c")));
        // the strategy after the hit is never probed
        assert_eq!(probed, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn first_hit_exhausts_all_strategies() {
        let mut probed = 0usize;
        let hit: Option<(usize, ())> = first_hit(3, async |_| {
            probed += 1;
            None
        })
        .await;

        assert!(hit.is_none());
        assert_eq!(probed, 3);
    }

    #[test]
    fn download_table_covers_all_supported_locales() {
        let text_strategy = DOWNLOAD_CONTROL
            .strategies
            .iter()
            .find_map(|s| match s.locator {
                Locator::Text { needles, .. } => Some(needles),
                _ => None,
            })
            .expect("download intent must carry a text strategy");

        assert!(text_strategy.contains(&"download"));
        assert!(text_strategy.contains(&"다운로드"));
    }

    #[test]
    fn strategy_order_goes_specific_to_generic() {
        // first strategy probes stable attributes, last is the class heuristic
        assert!(matches!(
            &DOWNLOAD_CONTROL.strategies[0].locator,
            Locator::Css(_)
        ));
        assert!(matches!(
            &DOWNLOAD_CONTROL.strategies[DOWNLOAD_CONTROL.strategies.len() - 1].locator,
            Locator::Css(sel) if sel.contains("class*=")
        ));
        assert_eq!(DOWNLOAD_CONTROL.strategies.len(), 4);
    }
}
