//! ModHub adapter. Walks listing pages, follows mod links, extracts detail fields, and
//! saves each new mod as it is scraped.

use crate::config::Settings;
use crate::model::{ModId, ModRecord};
use crate::scraper::error::ScraperError;
use crate::scraper::{
    clean_text, extract_mod_id, fetch_with_retry, listing_page_url, resolve_link, Fetcher,
    RetryPolicy, RunSummary, ScrapeEvent, StopFlag,
};
use crate::storage::ModStore;
use scraper::{ElementRef, Html, Selector};

/// Parse a CSS selector or return a parse error (avoids panics from Selector::parse).
fn parse_selector(sel: &str) -> Result<Selector, ScraperError> {
    Selector::parse(sel).map_err(|e| ScraperError::Selector {
        selector: sel.to_string(),
        reason: e.to_string(),
    })
}

/// One mod link found on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub mod_id: ModId,
    pub url: String,
}

/// Collect mod links (`a.mod-item`) in page order. Links without href or mod ID are
/// skipped; a mod linked twice keeps its first position.
pub fn parse_listing(html: &str, site_url: &str) -> Result<Vec<ListingEntry>, ScraperError> {
    let doc = Html::parse_document(html);
    let link_sel = parse_selector("a.mod-item")?;
    let mut entries: Vec<ListingEntry> = Vec::new();
    for link in doc.select(&link_sel) {
        let Some(href) = link.value().attr("href").filter(|h| !h.trim().is_empty()) else {
            continue;
        };
        let url = match resolve_link(href, site_url) {
            Ok(u) => u,
            Err(e) => {
                tracing::debug!(href, error = %e, "unresolvable mod link");
                continue;
            }
        };
        let Some(mod_id) = extract_mod_id(&url) else {
            continue;
        };
        if entries.iter().any(|e| e.mod_id == mod_id) {
            continue;
        }
        entries.push(ListingEntry { mod_id, url });
    }
    Ok(entries)
}

fn element_text(el: ElementRef<'_>) -> Option<String> {
    Some(clean_text(&el.text().collect::<String>())).filter(|s| !s.is_empty())
}

fn detail_field(
    details: ElementRef<'_>,
    class: &str,
) -> Result<Option<String>, ScraperError> {
    let sel = parse_selector(&format!("dd.{}", class))?;
    Ok(details.select(&sel).next().and_then(element_text))
}

/// Extract a mod record from a detail page. The details section is required; every other
/// field is optional.
pub fn parse_mod_page(html: &str, url: &str, mod_id: ModId) -> Result<ModRecord, ScraperError> {
    let doc = Html::parse_document(html);

    let details_sel = parse_selector("div.details-section")?;
    let details = doc
        .select(&details_sel)
        .next()
        .ok_or_else(|| ScraperError::MissingDetails {
            url: url.to_string(),
        })?;

    let mut record = ModRecord::new(mod_id, url);
    record.game = detail_field(details, "game")?;
    record.manufacturer = detail_field(details, "manufacturer")?;
    record.category = detail_field(details, "category")?;
    record.version = detail_field(details, "version")?;
    record.released = detail_field(details, "released")?;

    let desc_sel = parse_selector("div.description-section")?;
    record.description = doc.select(&desc_sel).next().and_then(element_text);

    let download_sel = parse_selector("a.download-link")?;
    record.download_link = doc
        .select(&download_sel)
        .next()
        .and_then(|a| a.value().attr("href"))
        .filter(|h| !h.is_empty())
        .map(String::from);

    let shot_sel = parse_selector("div.screenshot")?;
    let img_sel = parse_selector("img")?;
    record.screenshots = doc
        .select(&shot_sel)
        .filter_map(|div| div.select(&img_sel).next())
        .filter_map(|img| img.value().attr("src"))
        .filter(|src| !src.is_empty())
        .map(String::from)
        .collect();

    Ok(record)
}

/// ModHub scraper. Borrows the fetcher and store for the duration of a run.
pub struct ModhubScraper<'a> {
    fetcher: &'a mut dyn Fetcher,
    store: &'a ModStore,
    settings: &'a Settings,
    on_event: Option<&'a dyn Fn(&ScrapeEvent)>,
}

impl<'a> ModhubScraper<'a> {
    pub fn new(fetcher: &'a mut dyn Fetcher, store: &'a ModStore, settings: &'a Settings) -> Self {
        Self {
            fetcher,
            store,
            settings,
            on_event: None,
        }
    }

    /// Receive every [ScrapeEvent] of the run.
    pub fn on_event(mut self, cb: &'a dyn Fn(&ScrapeEvent)) -> Self {
        self.on_event = Some(cb);
        self
    }

    fn emit(&self, event: ScrapeEvent) {
        if let Some(cb) = self.on_event {
            cb(&event);
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.settings.max_retries,
            delay: self.settings.retry_delay,
        }
    }

    /// Walk up to `max_pages` listing pages, scraping and saving every mod not yet stored.
    ///
    /// Ends early on an empty listing page or a stop request. A listing page that cannot be
    /// fetched, or a record that cannot be saved, aborts the run. `Finished` is emitted
    /// either way.
    pub fn run(&mut self, max_pages: u32, stop: &StopFlag) -> Result<RunSummary, ScraperError> {
        let mut summary = RunSummary::default();
        tracing::info!(max_pages, output = %self.store.dir().display(), "starting run");
        self.emit(ScrapeEvent::RunStarted { max_pages });

        let result = self.walk_pages(max_pages, stop, &mut summary);

        summary.stopped = stop.is_requested();
        match &result {
            Ok(()) => tracing::info!(?summary, "run finished"),
            Err(e) => tracing::warn!(?summary, error = %e, "run aborted"),
        }
        self.emit(ScrapeEvent::Finished(summary.clone()));
        result.map(|()| summary)
    }

    fn walk_pages(
        &mut self,
        max_pages: u32,
        stop: &StopFlag,
        summary: &mut RunSummary,
    ) -> Result<(), ScraperError> {
        for page in 1..=max_pages {
            if stop.is_requested() {
                self.emit(ScrapeEvent::StopRequested);
                return Ok(());
            }
            self.emit(ScrapeEvent::PageStarted { page });
            let page_url = listing_page_url(&self.settings.listing_url, page);
            let (policy, on_event) = (self.retry_policy(), self.on_event);
            let html = match fetch_with_retry(&mut *self.fetcher, &page_url, policy, stop, on_event) {
                Ok(html) => html,
                Err(ScraperError::Stopped { .. }) => {
                    self.emit(ScrapeEvent::StopRequested);
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            summary.pages += 1;
            stop.sleep(self.settings.page_delay);

            let entries = parse_listing(&html, &self.settings.site_url)?;
            tracing::debug!(page, count = entries.len(), "listing parsed");
            if entries.is_empty() {
                self.emit(ScrapeEvent::NoModsOnPage { page });
                return Ok(());
            }

            for entry in entries {
                if stop.is_requested() {
                    self.emit(ScrapeEvent::StopRequested);
                    return Ok(());
                }
                if self.store.exists(entry.mod_id) {
                    summary.skipped += 1;
                    self.emit(ScrapeEvent::ModSkipped {
                        mod_id: entry.mod_id,
                    });
                    continue;
                }

                self.emit(ScrapeEvent::ModStarted {
                    mod_id: entry.mod_id,
                });
                match self.scrape_mod(&entry, stop) {
                    Ok(record) => {
                        let path =
                            self.store
                                .save(&record)
                                .map_err(|e| ScraperError::Store {
                                    mod_id: entry.mod_id,
                                    source: e,
                                })?;
                        summary.scraped += 1;
                        self.emit(ScrapeEvent::ModSaved {
                            mod_id: entry.mod_id,
                            path,
                        });
                    }
                    Err(ScraperError::Stopped { .. }) => {
                        self.emit(ScrapeEvent::StopRequested);
                        return Ok(());
                    }
                    Err(e) => {
                        summary.errors += 1;
                        tracing::warn!(mod_id = %entry.mod_id, error = %e, "mod not scraped");
                        self.emit(ScrapeEvent::ModFailed {
                            mod_id: entry.mod_id,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn scrape_mod(&mut self, entry: &ListingEntry, stop: &StopFlag) -> Result<ModRecord, ScraperError> {
        let (policy, on_event) = (self.retry_policy(), self.on_event);
        let html = fetch_with_retry(&mut *self.fetcher, &entry.url, policy, stop, on_event)?;
        stop.sleep(self.settings.request_delay);
        parse_mod_page(&html, &entry.url, entry.mod_id)
    }
}
