//! Defaults and optional config file loading. Search order: ./modhubscrape.toml, then
//! $XDG_CONFIG_HOME/modhubscrape/config.toml (or ~/.config/modhubscrape/config.toml).

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LISTING_URL: &str = "https://www.farming-simulator.com/mods.php";
pub const DEFAULT_SITE_URL: &str = "https://www.farming-simulator.com";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
pub const DEFAULT_OUTPUT_DIR: &str = "output";
const DEFAULT_REQUEST_DELAY_SECS: f64 = 2.5;
const DEFAULT_PAGE_DELAY_SECS: f64 = 3.0;
const DEFAULT_MAX_PAGES: u32 = 50;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_SECS: f64 = 5.0;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Listing page; `?page=N` is appended per page.
    pub listing_url: Option<String>,
    /// Origin used to resolve relative mod links.
    pub site_url: Option<String>,
    /// Directory holding mod_<id>.json records. Relative to CWD.
    pub output_dir: Option<PathBuf>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Pause in seconds after each mod page.
    pub request_delay_secs: Option<f64>,
    /// Pause in seconds after each listing page.
    pub page_delay_secs: Option<f64>,
    /// Listing pages walked per run.
    pub max_pages: Option<u32>,
    /// Attempts per page for transient failures.
    pub max_retries: Option<u32>,
    /// Pause in seconds between attempts.
    pub retry_delay_secs: Option<f64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
}

/// Effective settings for one run: defaults, then config file, then CLI flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub listing_url: String,
    pub site_url: String,
    pub output_dir: PathBuf,
    pub user_agent: String,
    pub request_delay: Duration,
    pub page_delay: Duration,
    pub max_pages: u32,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            site_url: DEFAULT_SITE_URL.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_delay: Duration::from_secs_f64(DEFAULT_REQUEST_DELAY_SECS),
            page_delay: Duration::from_secs_f64(DEFAULT_PAGE_DELAY_SECS),
            max_pages: DEFAULT_MAX_PAGES,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs_f64(DEFAULT_RETRY_DELAY_SECS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    /// Apply the keys present in `config` on top of `self`.
    pub fn with_config(mut self, config: &Config) -> Result<Self, String> {
        if let Some(ref u) = config.listing_url {
            self.listing_url = u.clone();
        }
        if let Some(ref u) = config.site_url {
            self.site_url = u.clone();
        }
        if let Some(ref d) = config.output_dir {
            self.output_dir = d.clone();
        }
        if let Some(ref ua) = config.user_agent {
            self.user_agent = ua.clone();
        }
        if let Some(s) = config.request_delay_secs {
            self.request_delay = secs_to_duration("request_delay_secs", s)?;
        }
        if let Some(s) = config.page_delay_secs {
            self.page_delay = secs_to_duration("page_delay_secs", s)?;
        }
        if let Some(n) = config.max_pages {
            self.max_pages = n;
        }
        if let Some(n) = config.max_retries {
            self.max_retries = n.max(1);
        }
        if let Some(s) = config.retry_delay_secs {
            self.retry_delay = secs_to_duration("retry_delay_secs", s)?;
        }
        if let Some(s) = config.timeout_secs {
            self.timeout = timeout_from_secs("timeout_secs", s)?;
        }
        Ok(self)
    }
}

/// Convert a seconds value from config or CLI. Rejects negative, NaN, and infinite values.
pub fn secs_to_duration(name: &str, secs: f64) -> Result<Duration, String> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| format!("Invalid {}: {} is not a non-negative number of seconds", name, secs))
}

/// Convert a request timeout. Zero would make every request fail at once, so it is rejected.
pub fn timeout_from_secs(name: &str, secs: u64) -> Result<Duration, String> {
    if secs == 0 {
        return Err(format!("Invalid {}: must be at least 1 second", name));
    }
    Ok(Duration::from_secs(secs))
}

/// Search order: (1) ./modhubscrape.toml, (2) $XDG_CONFIG_HOME/modhubscrape/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("modhubscrape.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("modhubscrape").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            tracing::debug!(path = %path.display(), "loaded config");
            return Ok(Some(config));
        }
    }
    Ok(None)
}
