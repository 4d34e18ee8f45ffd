//! Shared configuration constants
//!
//! Default values used throughout the codebase to avoid magic numbers.

/// Chrome user agent string presented to the target site
///
/// Chrome releases new stable versions ~every 4 weeks; update quarterly to
/// stay within a plausible version window.
///
/// Reference: https://chromiumdash.appspot.com/schedule
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";
