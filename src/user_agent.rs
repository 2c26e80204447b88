//! User-Agent strings for share page, API and download traffic.
//!
//! The hosting service serves a stripped page (no download button) to clients
//! that do not look like a browser, so every request uses the same desktop
//! browser identity.

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:131.0) Gecko/20100101 Firefox/131.0";

/// Default User-Agent for all requests.
#[must_use]
pub(crate) fn default_user_agent() -> &'static str {
    BROWSER_USER_AGENT
}
