//! Cookie jar persistence between runs
//!
//! A valid jar lets a run skip interactive login entirely, which matters
//! because repeated automated logins are what trip the target's bot defenses.
//!
//! Loading fails soft: a corrupt or stale jar degrades to "do interactive
//! login", never to a crashed run. Within a jar, a record with an unreadable
//! expiry keeps the record and strips the field; a single bad cookie must not
//! invalidate the rest.

use std::path::PathBuf;

use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, TimeSinceEpoch};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    /// Seconds since the UNIX epoch; absent for session cookies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CookieJar {
    pub cookies: Vec<StoredCookie>,
}

/// Persists and restores the authenticated session across runs
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the persisted jar, or `None` when there is nothing usable.
    /// Any read or deserialization problem degrades to `None` with a warning.
    pub fn load(&self) -> Option<CookieJar> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no cookie jar at {}", self.path.display());
                return None;
            }
            Err(e) => {
                warn!("failed to read cookie jar {}: {}", self.path.display(), e);
                return None;
            }
        };

        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    "cookie jar {} is not valid JSON, ignoring it: {}",
                    self.path.display(),
                    e
                );
                return None;
            }
        };

        let Some(records) = value.as_array() else {
            warn!(
                "cookie jar {} does not hold a cookie list, ignoring it",
                self.path.display()
            );
            return None;
        };

        let cookies: Vec<StoredCookie> = records.iter().filter_map(sanitize_record).collect();

        if cookies.is_empty() {
            warn!("cookie jar {} held no usable cookies", self.path.display());
            return None;
        }

        debug!(count = cookies.len(), "loaded cookie jar");
        Some(CookieJar { cookies })
    }

    /// Inject a persisted jar into the browser. Cookies cannot be set before
    /// a same-origin context exists, so this navigates to the site origin
    /// first. All failures are absorbed; `false` means "do interactive
    /// login".
    pub async fn restore(&self, page: &Page, origin_url: &str) -> bool {
        let Some(jar) = self.load() else {
            return false;
        };

        if let Err(e) = page.goto(origin_url).await {
            warn!("could not open origin for cookie injection: {}", e);
            return false;
        }

        let params: Vec<CookieParam> = jar.cookies.iter().map(to_cookie_param).collect();
        let count = params.len();

        match page.set_cookies(params).await {
            Ok(_) => {
                info!(count, "restored session cookies");
                true
            }
            Err(e) => {
                warn!("cookie injection rejected, falling back to login: {}", e);
                false
            }
        }
    }

    /// Persist the browser's current cookies. Best-effort: a run that already
    /// succeeded must not fail because the jar could not be written.
    pub async fn persist(&self, page: &Page) {
        let cookies = match page.get_cookies().await {
            Ok(cookies) => cookies,
            Err(e) => {
                warn!("could not read cookies from browser: {}", e);
                return;
            }
        };

        let jar = CookieJar {
            cookies: cookies
                .into_iter()
                .map(|c| StoredCookie {
                    name: c.name,
                    value: c.value,
                    domain: c.domain,
                    path: c.path,
                    expires: (!c.session && c.expires > 0.0).then_some(c.expires),
                    secure: c.secure,
                    http_only: c.http_only,
                })
                .collect(),
        };

        if let Some(parent) = self.path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!("could not create cookie jar directory: {}", e);
            return;
        }

        match serde_json::to_string_pretty(&jar) {
            Ok(serialized) => {
                if let Err(e) = std::fs::write(&self.path, serialized) {
                    warn!("could not write cookie jar {}: {}", self.path.display(), e);
                } else {
                    info!(
                        count = jar.cookies.len(),
                        "persisted session cookies to {}",
                        self.path.display()
                    );
                }
            }
            Err(e) => warn!("could not serialize cookie jar: {}", e),
        }
    }
}

/// Salvage one raw record. A record missing name or value is dropped; an
/// unreadable or incompatible expiry strips the field, never the record.
fn sanitize_record(value: &Value) -> Option<StoredCookie> {
    let obj = value.as_object()?;
    let name = obj.get("name")?.as_str()?.to_string();
    if name.is_empty() {
        return None;
    }
    let value_s = obj.get("value")?.as_str()?.to_string();

    let domain = obj
        .get("domain")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let path = obj
        .get("path")
        .and_then(Value::as_str)
        .unwrap_or("/")
        .to_string();

    let expires = obj
        .get("expires")
        .and_then(Value::as_f64)
        .filter(|e| e.is_finite() && *e > 0.0);

    Some(StoredCookie {
        name,
        value: value_s,
        domain,
        path,
        expires,
        secure: obj.get("secure").and_then(Value::as_bool).unwrap_or(false),
        http_only: obj
            .get("http_only")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

fn to_cookie_param(cookie: &StoredCookie) -> CookieParam {
    let mut param = CookieParam::new(cookie.name.clone(), cookie.value.clone());
    if !cookie.domain.is_empty() {
        param.domain = Some(cookie.domain.clone());
    }
    param.path = Some(cookie.path.clone());
    param.secure = Some(cookie.secure);
    param.http_only = Some(cookie.http_only);
    param.expires = cookie.expires.map(TimeSinceEpoch::new);
    param
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with(contents: &str) -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cookies.json");
        std::fs::write(&path, contents).expect("write jar");
        (dir, SessionStore::new(path))
    }

    #[test]
    fn malformed_expiry_strips_field_not_record() {
        let jar = json!([
            {"name": "li_at", "value": "tok", "domain": ".linkedin.com", "path": "/", "expires": "never"},
            {"name": "lang", "value": "ko", "domain": ".linkedin.com", "path": "/", "expires": 1893456000.0},
        ]);
        let (_dir, store) = store_with(&jar.to_string());

        let loaded = store.load().expect("jar must load");
        assert_eq!(loaded.cookies.len(), 2);
        assert_eq!(loaded.cookies[0].name, "li_at");
        assert_eq!(loaded.cookies[0].expires, None);
        // the healthy record is untouched
        assert_eq!(loaded.cookies[1].expires, Some(1893456000.0));
        assert_eq!(loaded.cookies[1].value, "ko");
    }

    #[test]
    fn negative_and_nonfinite_expiry_are_stripped() {
        let jar = json!([
            {"name": "a", "value": "1", "expires": -1.0},
            {"name": "b", "value": "2", "expires": null},
        ]);
        let (_dir, store) = store_with(&jar.to_string());

        let loaded = store.load().expect("jar must load");
        assert!(loaded.cookies.iter().all(|c| c.expires.is_none()));
    }

    #[test]
    fn record_without_name_is_dropped_rest_kept() {
        let jar = json!([
            {"value": "orphan"},
            {"name": "keep", "value": "me"},
        ]);
        let (_dir, store) = store_with(&jar.to_string());

        let loaded = store.load().expect("jar must load");
        assert_eq!(loaded.cookies.len(), 1);
        assert_eq!(loaded.cookies[0].name, "keep");
    }

    #[test]
    fn corrupt_file_degrades_to_none() {
        let (_dir, store) = store_with("not json {{{");
        assert!(store.load().is_none());
    }

    #[test]
    fn non_array_json_degrades_to_none() {
        let (_dir, store) = store_with(r#"{"cookies": "wrong shape"}"#);
        assert!(store.load().is_none());
    }

    #[test]
    fn missing_file_degrades_to_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(dir.path().join("absent.json"));
        assert!(store.load().is_none());
    }

    #[test]
    fn defaults_fill_missing_optional_fields() {
        let jar = json!([{"name": "n", "value": "v"}]);
        let (_dir, store) = store_with(&jar.to_string());

        let cookie = store.load().expect("jar must load").cookies.remove(0);
        assert_eq!(cookie.path, "/");
        assert_eq!(cookie.domain, "");
        assert!(!cookie.secure);
        assert!(!cookie.http_only);
    }
}
