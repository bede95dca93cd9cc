//! Blocking HTTP client for ModHub pages: browser-like User-Agent, cookie jar, timeout.

use super::{Fetcher, ScraperError};
use std::time::Duration;

const MAX_REDIRECTS: usize = 10;

/// Blocking HTTP client. Pacing and retries are handled by the caller.
#[derive(Debug)]
pub struct PoliteClient {
    inner: reqwest::blocking::Client,
}

impl PoliteClient {
    /// Builder for custom User-Agent and/or timeout.
    pub fn builder() -> PoliteClientBuilder {
        PoliteClientBuilder::default()
    }

    /// Perform a GET request and return the body of a 2xx response.
    pub fn get_text(&self, url: &str) -> Result<String, ScraperError> {
        tracing::debug!(url, "GET");
        let response = self
            .inner
            .get(url)
            .send()
            .map_err(|e| ScraperError::Network {
                url: url.to_string(),
                source: e,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        response.text().map_err(|e| ScraperError::BodyRead {
            url: url.to_string(),
            source: e,
        })
    }
}

impl Fetcher for PoliteClient {
    fn fetch_html(&mut self, url: &str) -> Result<String, ScraperError> {
        self.get_text(url)
    }
}

/// Builder for PoliteClient with optional User-Agent and timeout.
#[derive(Debug, Default)]
pub struct PoliteClientBuilder {
    user_agent: Option<String>,
    timeout: Option<Duration>,
}

impl PoliteClientBuilder {
    /// Set a custom User-Agent. If not set, the browser-like default from config is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set request timeout. Default 30 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<PoliteClient, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| crate::config::DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(self.timeout.unwrap_or(Duration::from_secs(30)))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(PoliteClient { inner })
    }
}
