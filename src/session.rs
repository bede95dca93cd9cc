//! Background scrape session: one worker thread, a stop control, an event stream for the
//! log view, and a status value.

use crate::config::Settings;
use crate::scraper::modhub::ModhubScraper;
use crate::scraper::{Fetcher, PoliteClient, RunSummary, ScrapeEvent, ScraperError, StopFlag};
use crate::storage::ModStore;
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Max pages must be positive")]
    InvalidMaxPages,

    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Cannot start scraper thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error(transparent)]
    Scraper(#[from] ScraperError),

    #[error("Scraper thread panicked")]
    WorkerPanicked,
}

/// A session is `Scraping` from the moment it is spawned until its worker ends or a stop
/// is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Scraping,
    Stopping,
    Completed,
    Stopped,
    Failed,
}

/// A scrape running on its own thread.
pub struct Session {
    stop: StopFlag,
    status: Arc<Mutex<SessionStatus>>,
    events: mpsc::Receiver<ScrapeEvent>,
    handle: JoinHandle<Result<RunSummary, ScraperError>>,
}

impl Session {
    /// Start a scrape against the live site using `settings`.
    pub fn start(settings: Settings, max_pages: u32) -> Result<Session, SessionError> {
        if max_pages == 0 {
            return Err(SessionError::InvalidMaxPages);
        }
        let client = PoliteClient::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout)
            .build()
            .map_err(SessionError::Client)?;
        let store = ModStore::new(settings.output_dir.clone());
        Self::spawn(client, store, settings, max_pages)
    }

    /// Start a scrape with any fetcher and store.
    pub fn spawn<F>(
        fetcher: F,
        store: ModStore,
        settings: Settings,
        max_pages: u32,
    ) -> Result<Session, SessionError>
    where
        F: Fetcher + Send + 'static,
    {
        if max_pages == 0 {
            return Err(SessionError::InvalidMaxPages);
        }
        let stop = StopFlag::new();
        let status = Arc::new(Mutex::new(SessionStatus::Scraping));
        let (tx, rx) = mpsc::channel();

        let worker_stop = stop.clone();
        let worker_status = Arc::clone(&status);
        let handle = std::thread::Builder::new()
            .name("modhub-scraper".to_string())
            .spawn(move || {
                let mut fetcher = fetcher;
                // The receiver may be gone if the caller stopped listening; keep scraping.
                let on_event = |e: &ScrapeEvent| {
                    let _ = tx.send(e.clone());
                };
                let result = ModhubScraper::new(&mut fetcher, &store, &settings)
                    .on_event(&on_event)
                    .run(max_pages, &worker_stop);
                let final_status = match &result {
                    Ok(summary) if summary.stopped => SessionStatus::Stopped,
                    Ok(_) => SessionStatus::Completed,
                    Err(_) => SessionStatus::Failed,
                };
                set_status(&worker_status, final_status);
                result
            })
            .map_err(SessionError::Spawn)?;

        Ok(Session {
            stop,
            status,
            events: rx,
            handle,
        })
    }

    /// Ask the worker to finish its current request and end the run. Idempotent.
    pub fn stop(&self) {
        self.stop.request();
        if let Ok(mut status) = self.status.lock() {
            if *status == SessionStatus::Scraping {
                *status = SessionStatus::Stopping;
            }
        }
    }

    /// A handle that can request a stop from another thread.
    pub fn stop_handle(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
            .lock()
            .map(|s| *s)
            .unwrap_or(SessionStatus::Failed)
    }

    /// Events in run order. Iteration ends once the worker has finished.
    pub fn events(&self) -> &mpsc::Receiver<ScrapeEvent> {
        &self.events
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker and return its summary.
    pub fn join(self) -> Result<RunSummary, SessionError> {
        match self.handle.join() {
            Ok(result) => result.map_err(SessionError::from),
            Err(_) => {
                set_status(&self.status, SessionStatus::Failed);
                Err(SessionError::WorkerPanicked)
            }
        }
    }
}

fn set_status(status: &Mutex<SessionStatus>, value: SessionStatus) {
    if let Ok(mut s) = status.lock() {
        *s = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModId;
    use crate::scraper::testing::FakeFetcher;
    use std::error::Error;
    use std::time::Duration;

    const LISTING: &str = "https://www.farming-simulator.com/mods.php";

    fn settings(dir: &std::path::Path) -> Settings {
        Settings {
            output_dir: dir.to_path_buf(),
            request_delay: Duration::ZERO,
            page_delay: Duration::ZERO,
            retry_delay: Duration::ZERO,
            ..Settings::default()
        }
    }

    fn one_mod_site() -> FakeFetcher {
        FakeFetcher::new()
            .page(
                &format!("{}?page=1", LISTING),
                r#"<a class="mod-item" href="/mod.php?mod_id=77">Seven</a>"#,
            )
            .page(&format!("{}?page=2", LISTING), "<html></html>")
            .page(
                "https://www.farming-simulator.com/mod.php?mod_id=77",
                r#"<div class="details-section"><dd class="game">FS25</dd></div>"#,
            )
    }

    #[test]
    fn zero_max_pages_rejected() -> Result<(), Box<dyn Error>> {
        let tmp = tempfile::tempdir()?;
        let result = Session::spawn(
            FakeFetcher::new(),
            ModStore::new(tmp.path()),
            settings(tmp.path()),
            0,
        );
        assert!(matches!(result, Err(SessionError::InvalidMaxPages)));
        assert_eq!(
            SessionError::InvalidMaxPages.to_string(),
            "Max pages must be positive"
        );
        Ok(())
    }

    #[test]
    fn session_runs_to_completion() -> Result<(), Box<dyn Error>> {
        let tmp = tempfile::tempdir()?;
        let store = ModStore::new(tmp.path());
        let session = Session::spawn(one_mod_site(), store.clone(), settings(tmp.path()), 5)?;

        let events: Vec<ScrapeEvent> = session.events().iter().collect();
        assert!(matches!(events.last(), Some(ScrapeEvent::Finished(_))));

        let summary = session.join()?;
        assert_eq!(summary.scraped, 1);
        assert_eq!(summary.pages, 2);
        assert!(!summary.stopped);
        assert!(store.exists(ModId(77)));
        Ok(())
    }

    #[test]
    fn status_reflects_outcome() -> Result<(), Box<dyn Error>> {
        let tmp = tempfile::tempdir()?;
        let session = Session::spawn(
            one_mod_site(),
            ModStore::new(tmp.path()),
            settings(tmp.path()),
            5,
        )?;
        wait_until_finished(&session);
        assert_eq!(session.status(), SessionStatus::Completed);
        Ok(())
    }

    fn wait_until_finished(session: &Session) {
        for _ in session.events().iter() {}
        while !session.is_finished() {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn stop_ends_run_early() -> Result<(), Box<dyn Error>> {
        let tmp = tempfile::tempdir()?;
        let mut s = settings(tmp.path());
        s.page_delay = Duration::from_secs(30);
        let session = Session::spawn(one_mod_site(), ModStore::new(tmp.path()), s, 5)?;
        assert_eq!(session.status(), SessionStatus::Scraping);

        for event in session.events().iter() {
            if event == (ScrapeEvent::PageStarted { page: 1 }) {
                session.stop();
                assert!(matches!(
                    session.status(),
                    SessionStatus::Stopping | SessionStatus::Stopped
                ));
                session.stop();
            }
        }
        while !session.is_finished() {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(session.status(), SessionStatus::Stopped);
        let summary = session.join()?;
        assert!(summary.stopped);
        assert_eq!(summary.scraped, 0);
        Ok(())
    }

    #[test]
    fn listing_failure_surfaces_as_error() -> Result<(), Box<dyn Error>> {
        let tmp = tempfile::tempdir()?;
        let fetcher = FakeFetcher::new().status(&format!("{}?page=1", LISTING), 503);
        let session = Session::spawn(fetcher, ModStore::new(tmp.path()), settings(tmp.path()), 3)?;
        wait_until_finished(&session);
        assert_eq!(session.status(), SessionStatus::Failed);
        let result = session.join();
        assert!(matches!(
            result,
            Err(SessionError::Scraper(ScraperError::HttpStatus { status: 503, .. }))
        ));
        Ok(())
    }

    #[test]
    fn stop_during_retry_wait_ends_as_stopped() -> Result<(), Box<dyn Error>> {
        let tmp = tempfile::tempdir()?;
        let mut s = settings(tmp.path());
        s.retry_delay = Duration::from_secs(60);
        let fetcher = FakeFetcher::new().status(&format!("{}?page=1", LISTING), 503);
        let session = Session::spawn(fetcher, ModStore::new(tmp.path()), s, 3)?;

        let mut events = Vec::new();
        for event in session.events().iter() {
            if matches!(event, ScrapeEvent::AttemptFailed { .. }) {
                session.stop();
            }
            events.push(event);
        }
        assert!(events.contains(&ScrapeEvent::StopRequested));
        while !session.is_finished() {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(session.status(), SessionStatus::Stopped);
        let summary = session.join()?;
        assert!(summary.stopped);
        assert_eq!(summary.errors, 0);
        Ok(())
    }

    #[test]
    fn save_failure_fails_session() -> Result<(), Box<dyn Error>> {
        let tmp = tempfile::tempdir()?;
        let blocked = tmp.path().join("blocked");
        std::fs::write(&blocked, "")?;
        let session = Session::spawn(one_mod_site(), ModStore::new(&blocked), settings(&blocked), 5)?;
        wait_until_finished(&session);
        assert_eq!(session.status(), SessionStatus::Failed);
        assert!(matches!(
            session.join(),
            Err(SessionError::Scraper(ScraperError::Store {
                mod_id: ModId(77),
                ..
            }))
        ));
        Ok(())
    }

    struct PanickingFetcher;

    impl Fetcher for PanickingFetcher {
        fn fetch_html(&mut self, _url: &str) -> Result<String, ScraperError> {
            panic!("fetcher exploded");
        }
    }

    #[test]
    fn worker_panic_reported() -> Result<(), Box<dyn Error>> {
        let tmp = tempfile::tempdir()?;
        let session = Session::spawn(
            PanickingFetcher,
            ModStore::new(tmp.path()),
            settings(tmp.path()),
            1,
        )?;
        assert!(matches!(session.join(), Err(SessionError::WorkerPanicked)));
        Ok(())
    }
}
