//! Direct link extraction from share pages.
//!
//! The hosting service's markup is not a stable contract, so extraction is a
//! fixed-priority list of [`ExtractStrategy`] variants:
//!
//! 1. [`ExtractStrategy::Markup`] parses the page and reads the download
//!    button's `href`, or decodes its `data-scrambled-url` attribute.
//! 2. [`ExtractStrategy::Pattern`] scans the raw text for an `href` pointing at
//!    a `download*` host.
//!
//! When neither yields a URL the page is checked for removal markers so that
//! deleted files ([`ExtractError::SourceRemoved`]) are not retried like a
//! markup change ([`ExtractError::LinkNotFound`]).
//!
//! # Example
//!
//! ```
//! use mfbulk_core::extract::{extract, ExtractStrategy};
//!
//! let page = r#"<html><a id="downloadButton" href="https://download1.mediafire.com/x/a.zip">Download</a></html>"#;
//! let found = extract(page).unwrap();
//! assert_eq!(found.url, "https://download1.mediafire.com/x/a.zip");
//! assert_eq!(found.strategy, ExtractStrategy::Markup);
//! ```

use std::fmt;
use std::sync::LazyLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use crate::error::ExtractError;

static DOWNLOAD_BUTTON: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("a#downloadButton"));

static DIRECT_HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r#"href=["'](https?://download[^"']+)["']"#));

/// Lowercase phrases the service uses on pages for removed or invalid files.
const REMOVAL_MARKERS: &[&str] = &[
    "the key you provided for file download was invalid",
    "file has been removed",
    "file was removed",
    "no longer available",
    "removed for a violation",
    "invalid or deleted file",
    "error.php?errno=",
];

#[allow(clippy::expect_used)]
fn compile_static_selector(selector: &str) -> Selector {
    Selector::parse(selector).expect("static CSS selector must parse")
}

#[allow(clippy::expect_used)]
fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static regex must compile")
}

/// A way of locating the direct URL inside a share page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractStrategy {
    /// Structured parse of the download button element.
    Markup,
    /// Regex scan of the raw body for a direct-URL shape.
    Pattern,
}

impl ExtractStrategy {
    /// Strategies in the order they are tried.
    pub const ORDER: [Self; 2] = [Self::Markup, Self::Pattern];

    /// Runs this strategy against a page body.
    #[must_use]
    pub fn apply(self, body: &str) -> Option<String> {
        match self {
            Self::Markup => extract_from_markup(body),
            Self::Pattern => extract_from_pattern(body),
        }
    }
}

impl fmt::Display for ExtractStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Markup => f.write_str("markup"),
            Self::Pattern => f.write_str("pattern"),
        }
    }
}

/// A direct URL plus the strategy that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    /// Byte-serving URL.
    pub url: String,
    /// Which strategy produced it.
    pub strategy: ExtractStrategy,
}

/// Extracts the direct download URL from a share page body.
///
/// # Errors
///
/// - [`ExtractError::MalformedPage`] when the body carries no markup at all
/// - [`ExtractError::SourceRemoved`] when no link is found and the page reports
///   the file as removed
/// - [`ExtractError::LinkNotFound`] otherwise
#[instrument(level = "debug", skip(body), fields(body_len = body.len()))]
pub fn extract(body: &str) -> Result<Extracted, ExtractError> {
    if body.trim().is_empty() || !body.contains('<') {
        return Err(ExtractError::MalformedPage);
    }

    for strategy in ExtractStrategy::ORDER {
        if let Some(url) = strategy.apply(body) {
            debug!(%strategy, url = %url, "direct link extracted");
            return Ok(Extracted { url, strategy });
        }
        debug!(%strategy, "strategy found nothing");
    }

    if is_removed_page(body) {
        Err(ExtractError::SourceRemoved)
    } else {
        Err(ExtractError::LinkNotFound)
    }
}

fn extract_from_markup(body: &str) -> Option<String> {
    let document = Html::parse_document(body);
    let button = document.select(&DOWNLOAD_BUTTON).next()?;

    if let Some(href) = button.value().attr("href").and_then(as_http_url) {
        return Some(href);
    }

    button
        .value()
        .attr("data-scrambled-url")
        .and_then(decode_scrambled)
        .and_then(|decoded| as_http_url(&decoded))
}

fn extract_from_pattern(body: &str) -> Option<String> {
    DIRECT_HREF_RE
        .captures(body)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().replace("&amp;", "&"))
        .and_then(|candidate| as_http_url(&candidate))
}

fn decode_scrambled(value: &str) -> Option<String> {
    let bytes = STANDARD.decode(value.trim()).ok()?;
    String::from_utf8(bytes).ok()
}

fn as_http_url(candidate: &str) -> Option<String> {
    let trimmed = candidate.trim();
    let parsed = Url::parse(trimmed).ok()?;
    matches!(parsed.scheme(), "http" | "https").then(|| trimmed.to_string())
}

fn is_removed_page(body: &str) -> bool {
    let lowered = body.to_ascii_lowercase();
    REMOVAL_MARKERS.iter().any(|marker| lowered.contains(marker))
}
