//! CLI parsing and orchestration. Parses args, resolves settings, runs a scrape session or
//! reads stored records. Maps errors to exit codes.

use crate::config::{self, Settings};
use crate::model::{ModId, ModRecord};
use crate::scraper::{ScrapeEvent, ScraperError, StopFlag};
use crate::session::{Session, SessionError};
use crate::storage::{ModStore, StoreError};
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Session(#[from] SessionError),

    #[error("{0}")]
    Store(#[from] StoreError),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Session(SessionError::Scraper(ScraperError::Store { .. })) => 3,
            CliRunError::Session(_) => 2,
            CliRunError::Store(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "modhubscrape")]
#[command(about = "Scrape Farming Simulator ModHub listings into one JSON file per mod")]
#[command(
    after_help = "Config file keys (listing_url, site_url, output_dir, user_agent, request_delay_secs, page_delay_secs, max_pages, max_retries, retry_delay_secs, timeout_secs) are read from ./modhubscrape.toml or the user config dir. CLI flags override config."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Directory of mod_<id>.json records (overrides config; default ./output).
    #[arg(short, long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Print verbose error chain and debug logs.
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Walk listing pages and save every mod not already stored.
    Scrape(ScrapeArgs),
    /// Print a stored record as JSON followed by its content hash.
    Show {
        #[arg(value_parser = parse_mod_id)]
        mod_id: ModId,
        /// Print only the content hash.
        #[arg(long)]
        hash: bool,
    },
    /// List the IDs of stored records.
    List,
}

#[derive(clap::Args, Debug, Default)]
pub struct ScrapeArgs {
    /// Listing pages to walk (overrides config; default 50).
    #[arg(long, value_parser = parse_max_pages)]
    pub max_pages: Option<u32>,

    /// Pause after each mod page in seconds (overrides config; default 2.5).
    #[arg(long, value_parser = parse_secs)]
    pub delay: Option<f64>,

    /// Pause after each listing page in seconds (overrides config; default 3).
    #[arg(long, value_parser = parse_secs)]
    pub page_delay: Option<f64>,

    /// Attempts per page for transient failures (overrides config; default 3).
    #[arg(long)]
    pub retries: Option<u32>,

    /// Pause between attempts in seconds (overrides config; default 5).
    #[arg(long, value_parser = parse_secs)]
    pub retry_delay: Option<f64>,

    /// Request timeout in whole seconds, at least 1 (overrides config; default 30).
    #[arg(long, value_parser = parse_timeout)]
    pub timeout: Option<u64>,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Suppress progress output (failures and errors only).
    #[arg(short, long)]
    pub quiet: bool,
}

fn parse_mod_id(s: &str) -> Result<ModId, String> {
    s.trim().parse::<ModId>().map_err(|e| e.to_string())
}

fn parse_max_pages(s: &str) -> Result<u32, String> {
    let n: u32 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid --max-pages: '{}' is not a number", s))?;
    if n == 0 {
        return Err("Max pages must be positive".to_string());
    }
    Ok(n)
}

fn parse_secs(s: &str) -> Result<f64, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", s))?;
    config::secs_to_duration("delay", secs)?;
    Ok(secs)
}

fn parse_timeout(s: &str) -> Result<u64, String> {
    let secs: u64 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid --timeout: '{}' is not a whole number of seconds", s))?;
    config::timeout_from_secs("--timeout", secs)?;
    Ok(secs)
}

/// Log filter used when RUST_LOG is unset.
pub fn default_log_filter(verbose: bool) -> &'static str {
    if verbose {
        "modhubscrape=debug"
    } else {
        "modhubscrape=warn"
    }
}

/// Whether a line typed on stdin asks the running scrape to stop.
fn is_stop_command(line: &str) -> bool {
    matches!(
        line.trim().to_ascii_lowercase().as_str(),
        "q" | "quit" | "stop"
    )
}

/// Defaults, then config file, then CLI flags.
fn resolve_settings(
    config: Option<&config::Config>,
    output_dir: Option<&PathBuf>,
    scrape: &ScrapeArgs,
) -> Result<Settings, CliRunError> {
    let mut settings = match config {
        Some(c) => Settings::default()
            .with_config(c)
            .map_err(CliRunError::InvalidInput)?,
        None => Settings::default(),
    };
    if let Some(dir) = output_dir {
        settings.output_dir = dir.clone();
    }
    if let Some(n) = scrape.max_pages {
        settings.max_pages = n;
    }
    if let Some(s) = scrape.delay {
        settings.request_delay =
            config::secs_to_duration("--delay", s).map_err(CliRunError::InvalidInput)?;
    }
    if let Some(s) = scrape.page_delay {
        settings.page_delay =
            config::secs_to_duration("--page-delay", s).map_err(CliRunError::InvalidInput)?;
    }
    if let Some(n) = scrape.retries {
        settings.max_retries = n.max(1);
    }
    if let Some(s) = scrape.retry_delay {
        settings.retry_delay =
            config::secs_to_duration("--retry-delay", s).map_err(CliRunError::InvalidInput)?;
    }
    if let Some(t) = scrape.timeout {
        settings.timeout =
            config::timeout_from_secs("--timeout", t).map_err(CliRunError::InvalidInput)?;
    }
    if let Some(ref ua) = scrape.user_agent {
        settings.user_agent = ua.clone();
    }
    Ok(settings)
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let no_scrape_args = ScrapeArgs::default();
    let scrape_args = match &args.command {
        Command::Scrape(s) => s,
        _ => &no_scrape_args,
    };
    let settings = resolve_settings(config.as_ref(), args.output_dir.as_ref(), scrape_args)?;

    match &args.command {
        Command::Scrape(s) => run_scrape(settings, s.quiet),
        Command::Show { mod_id, hash } => run_show(&settings, *mod_id, *hash),
        Command::List => run_list(&settings),
    }
}

fn run_scrape(settings: Settings, quiet: bool) -> Result<(), CliRunError> {
    let max_pages = settings.max_pages;
    let session = Session::start(settings, max_pages).map_err(|e| match e {
        SessionError::InvalidMaxPages | SessionError::Client(_) => {
            CliRunError::InvalidInput(e.to_string())
        }
        other => CliRunError::Session(other),
    })?;
    watch_stdin_for_stop(session.stop_handle());

    let progress = if quiet {
        None
    } else {
        let bar = indicatif::ProgressBar::new_spinner();
        if let Ok(style) = indicatif::ProgressStyle::default_spinner().template("{spinner} {msg} ({elapsed})") {
            bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
        }
        bar.enable_steady_tick(Duration::from_millis(80));
        bar.set_message("Starting (type q + Enter to stop)");
        Some(bar)
    };

    for event in session.events().iter() {
        match &progress {
            Some(bar) => {
                match &event {
                    ScrapeEvent::PageStarted { page } => {
                        bar.set_message(format!("Page {}", page));
                    }
                    ScrapeEvent::ModStarted { mod_id } => {
                        bar.set_message(format!("Mod {}", mod_id));
                    }
                    ScrapeEvent::StopRequested => bar.set_message("Stopping"),
                    _ => {}
                }
                bar.println(event.to_string());
            }
            None => {
                if matches!(event, ScrapeEvent::ModFailed { .. }) {
                    eprintln!("{}", event);
                }
            }
        }
    }

    if let Some(bar) = progress {
        bar.disable_steady_tick();
        bar.finish_and_clear();
    }
    session.join()?;
    Ok(())
}

/// Request a stop when the user types `q` (or `quit`/`stop`) and Enter. EOF is ignored.
fn watch_stdin_for_stop(stop: StopFlag) {
    let spawned = std::thread::Builder::new()
        .name("stdin-stop".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if is_stop_command(&line) {
                    stop.request();
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "stdin stop watcher not started");
    }
}

fn run_show(settings: &Settings, mod_id: ModId, hash_only: bool) -> Result<(), CliRunError> {
    let store = ModStore::new(settings.output_dir.clone());
    let record = store.load(mod_id)?.ok_or_else(|| {
        CliRunError::InvalidInput(format!(
            "No stored record for mod {} in {}",
            mod_id,
            store.dir().display()
        ))
    })?;
    let text = render_show(&record, hash_only).map_err(|e| {
        CliRunError::Store(StoreError::Json {
            path: store.path_for(mod_id),
            source: e,
        })
    })?;
    println!("{}", text);
    Ok(())
}

/// Output of `show`: pretty JSON then a `sha256: <hex>` line, or the bare hash with `--hash`.
fn render_show(record: &ModRecord, hash_only: bool) -> Result<String, serde_json::Error> {
    let hash = record.content_hash()?;
    if hash_only {
        return Ok(hash);
    }
    let json = serde_json::to_string_pretty(record)?;
    Ok(format!("{}\nsha256: {}", json, hash))
}

fn run_list(settings: &Settings) -> Result<(), CliRunError> {
    let store = ModStore::new(settings.output_dir.clone());
    let ids = store.list_ids()?;
    for id in &ids {
        println!("{}", id);
    }
    eprintln!("{} record(s) in {}", ids.len(), store.dir().display());
    Ok(())
}
