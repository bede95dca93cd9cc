//! modhubscrape: CLI scraper for Farming Simulator ModHub, saving one JSON record per mod.

pub mod cli;
pub mod config;
pub mod model;
pub mod scraper;
pub mod session;
pub mod storage;

// Re-exports for CLI and consumers.
pub use config::Settings;
pub use model::{ModId, ModRecord};
pub use scraper::modhub::{parse_listing, parse_mod_page, ListingEntry, ModhubScraper};
pub use scraper::{
    Fetcher, PoliteClient, PoliteClientBuilder, RunSummary, ScrapeEvent, ScraperError, StopFlag,
};
pub use session::{Session, SessionError, SessionStatus};
pub use storage::{ModStore, StoreError};
