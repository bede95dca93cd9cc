//! Fetching and scraping ModHub: the fetch seam, link helpers, progress events, stop flag,
//! and retry. Site markup lives in [modhub].

mod client;
mod error;

pub mod modhub;

pub use client::{PoliteClient, PoliteClientBuilder};
pub use error::ScraperError;

use crate::model::ModId;
use reqwest::Url;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of page HTML. Implemented by [PoliteClient]; tests substitute canned pages.
pub trait Fetcher {
    fn fetch_html(&mut self, url: &str) -> Result<String, ScraperError>;
}

/// Extract the numeric `mod_id` query parameter. Trailing non-digits in the value are ignored.
pub fn extract_mod_id(url: &str) -> Option<ModId> {
    let parsed = Url::parse(url).ok()?;
    let value = parsed
        .query_pairs()
        .find(|(k, _)| k == "mod_id")
        .map(|(_, v)| v.into_owned())?;
    let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Absolute hrefs are returned unchanged; relative ones are joined onto `site_url`.
pub fn resolve_link(href: &str, site_url: &str) -> Result<String, ScraperError> {
    let href = href.trim();
    if href.starts_with("http") {
        return Ok(href.to_string());
    }
    let invalid = |reason: String| ScraperError::InvalidUrl {
        input: href.to_string(),
        reason,
    };
    let base = Url::parse(site_url).map_err(|e| invalid(e.to_string()))?;
    base.join(href)
        .map(|u| u.to_string())
        .map_err(|e| invalid(e.to_string()))
}

/// URL of listing page `page` (1-based).
pub fn listing_page_url(listing_url: &str, page: u32) -> String {
    let sep = if listing_url.contains('?') { '&' } else { '?' };
    format!("{}{}page={}", listing_url, sep, page)
}

/// Trim text and collapse whitespace runs within each line; blank lines are dropped.
pub fn clean_text(s: &str) -> String {
    s.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Shared stop request. Cloned into the worker; any clone can request a stop.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `dur`, waking early if a stop is requested. Returns false if interrupted.
    pub fn sleep(&self, dur: Duration) -> bool {
        const SLICE: Duration = Duration::from_millis(100);
        let deadline = Instant::now() + dur;
        loop {
            if self.is_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLICE));
        }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Listing pages fetched.
    pub pages: u32,
    pub scraped: u32,
    pub skipped: u32,
    pub errors: u32,
    /// The run ended because a stop was requested.
    pub stopped: bool,
}

/// Progress of a run, in order. `Display` gives the log line shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum ScrapeEvent {
    RunStarted { max_pages: u32 },
    PageStarted { page: u32 },
    NoModsOnPage { page: u32 },
    ModSkipped { mod_id: ModId },
    ModStarted { mod_id: ModId },
    AttemptFailed {
        url: String,
        attempt: u32,
        max_attempts: u32,
        error: String,
    },
    ModSaved { mod_id: ModId, path: PathBuf },
    ModFailed { mod_id: ModId, error: String },
    StopRequested,
    Finished(RunSummary),
}

impl fmt::Display for ScrapeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrapeEvent::RunStarted { max_pages } => {
                write!(f, "Starting scrape with max {} pages", max_pages)
            }
            ScrapeEvent::PageStarted { page } => write!(f, "Scraping page {}...", page),
            ScrapeEvent::NoModsOnPage { page } => {
                write!(f, "No mods found on page {}, stopping", page)
            }
            ScrapeEvent::ModSkipped { mod_id } => {
                write!(f, "Mod {} already exists, skipping", mod_id)
            }
            ScrapeEvent::ModStarted { mod_id } => write!(f, "Scraping mod {}...", mod_id),
            ScrapeEvent::AttemptFailed {
                url,
                attempt,
                max_attempts,
                error,
            } => write!(
                f,
                "Attempt {}/{} failed for {}: {}",
                attempt, max_attempts, url, error
            ),
            ScrapeEvent::ModSaved { mod_id, path } => {
                write!(f, "Saved mod {} to {}", mod_id, path.display())
            }
            ScrapeEvent::ModFailed { mod_id, error } => {
                write!(f, "Failed to scrape mod {}: {}", mod_id, error)
            }
            ScrapeEvent::StopRequested => write!(f, "Stop requested, ending run"),
            ScrapeEvent::Finished(s) => write!(
                f,
                "Scraping complete! Pages: {}, Scraped: {}, Skipped: {}, Errors: {}{}",
                s.pages,
                s.scraped,
                s.skipped,
                s.errors,
                if s.stopped { " (stopped)" } else { "" }
            ),
        }
    }
}

/// Attempt count and fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

/// Fetch `url`, retrying transient failures up to `policy.max_attempts` times.
///
/// Non-transient errors (e.g. HTTP 404) are returned at once. A stop request during the
/// pause between attempts ends with [ScraperError::Stopped].
pub fn fetch_with_retry(
    fetcher: &mut dyn Fetcher,
    url: &str,
    policy: RetryPolicy,
    stop: &StopFlag,
    on_event: Option<&dyn Fn(&ScrapeEvent)>,
) -> Result<String, ScraperError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match fetcher.fetch_html(url) {
            Ok(html) => return Ok(html),
            Err(e) => {
                if !e.is_transient() || attempt >= max_attempts {
                    return Err(e);
                }
                tracing::warn!(url, attempt, max_attempts, error = %e, "transient fetch failure");
                if let Some(cb) = on_event {
                    cb(&ScrapeEvent::AttemptFailed {
                        url: url.to_string(),
                        attempt,
                        max_attempts,
                        error: e.to_string(),
                    });
                }
                if !stop.sleep(policy.delay) {
                    return Err(ScraperError::Stopped {
                        url: url.to_string(),
                    });
                }
                attempt += 1;
            }
        }
    }
}
