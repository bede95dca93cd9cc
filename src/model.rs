//! Record shape for one scraped mod.
//!
//! Field names match the JSON files written by earlier versions of the tool, so existing
//! output directories keep deduplicating.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Timestamp format used for `scraped_at`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Numeric ModHub identifier (the `mod_id` query parameter). Serialized as a JSON string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ModId(pub u64);

/// Mod ID text that is empty or not all ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid mod id '{0}': expected decimal digits")]
pub struct InvalidModId(pub String);

impl FromStr for ModId {
    type Err = InvalidModId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidModId(s.to_string()));
        }
        s.parse::<u64>()
            .map(ModId)
            .map_err(|_| InvalidModId(s.to_string()))
    }
}

impl TryFrom<String> for ModId {
    type Error = InvalidModId;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ModId> for String {
    fn from(id: ModId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for ModId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One mod as persisted to `mod_<id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModRecord {
    pub mod_id: ModId,
    /// Detail page the record was scraped from.
    pub url: String,
    /// Local time of the scrape, see [TIMESTAMP_FORMAT].
    pub scraped_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_link: Option<String>,
    #[serde(default)]
    pub screenshots: Vec<String>,
}

impl ModRecord {
    /// Empty record for `mod_id` stamped with the current local time.
    pub fn new(mod_id: ModId, url: impl Into<String>) -> Self {
        Self {
            mod_id,
            url: url.into(),
            scraped_at: format_timestamp(),
            game: None,
            manufacturer: None,
            category: None,
            version: None,
            released: None,
            description: None,
            download_link: None,
            screenshots: Vec::new(),
        }
    }

    /// SHA-256 hex digest of the record's JSON with keys in sorted order.
    pub fn content_hash(&self) -> Result<String, serde_json::Error> {
        // serde_json::Value objects are BTreeMaps, so re-serializing sorts the keys.
        let value = serde_json::to_value(self)?;
        let canonical = serde_json::to_string(&value)?;
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Current local time as `YYYY-MM-DD HH:MM:SS`.
pub fn format_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}
