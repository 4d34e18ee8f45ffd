//! Credential sourcing
//!
//! Exactly two sources, tried in order: process environment, then the OS
//! keychain (macOS only; CI runs on env vars alone). The secret lives in a
//! `SecretString` so it is redacted from Debug output and never reaches a
//! log line. Nothing here persists beyond process memory.

use secrecy::{ExposeSecret, SecretString};
#[cfg(target_os = "macos")]
use tracing::warn;

pub const IDENTITY_ENV: &str = "LINKEDIN_EMAIL";
pub const SECRET_ENV: &str = "LINKEDIN_PASSWORD";

#[cfg(target_os = "macos")]
const KEYCHAIN_SERVICE: &str = "LinkedIn";

#[derive(Debug)]
pub struct Credential {
    pub identity: String,
    pub secret: SecretString,
}

impl Credential {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: SecretString::from(secret.into()),
        }
    }

    /// Both halves present and non-empty
    pub fn is_complete(&self) -> bool {
        !self.identity.trim().is_empty() && !self.secret.expose_secret().is_empty()
    }
}

/// Resolve a credential from the environment, filling gaps from the keychain
/// where the platform has one. `None` means "not configured" and maps to
/// `MissingCredential` at the point login is actually needed.
pub fn resolve() -> Option<Credential> {
    let identity = env_value(IDENTITY_ENV);
    let secret = env_value(SECRET_ENV);

    #[cfg(target_os = "macos")]
    let (identity, secret) = (
        identity.or_else(|| keychain_value("email")),
        secret.or_else(|| keychain_value("password")),
    );

    match (identity, secret) {
        (Some(identity), Some(secret)) => Some(Credential::new(identity, secret)),
        _ => None,
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(target_os = "macos")]
fn keychain_value(account: &str) -> Option<String> {
    let entry = match keyring::Entry::new(KEYCHAIN_SERVICE, account) {
        Ok(entry) => entry,
        Err(e) => {
            warn!("keychain entry unavailable for {account}: {e}");
            return None;
        }
    };
    match entry.get_password() {
        Ok(value) if !value.is_empty() => Some(value),
        Ok(_) => None,
        Err(e) => {
            warn!("keychain read failed for {account}: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_credential() {
        assert!(Credential::new("user@example.com", "hunter2").is_complete());
    }

    #[test]
    fn blank_identity_is_incomplete() {
        assert!(!Credential::new("   ", "hunter2").is_complete());
    }

    #[test]
    fn empty_secret_is_incomplete() {
        assert!(!Credential::new("user@example.com", "").is_complete());
    }

    #[test]
    fn debug_output_redacts_the_secret() {
        let rendered = format!("{:?}", Credential::new("user@example.com", "hunter2"));
        assert!(!rendered.contains("hunter2"));
    }
}
