// src/config.rs

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use url::Url;

pub const DEFAULT_LAST_UPDATE_URL: &str = "http://data.gdeltproject.org/gdeltv2/lastupdate.txt";
pub const DEFAULT_EVENTS_DIR: &str = "data/gdelta_events";
pub const DEFAULT_MERGED_EVENTS_FILENAME: &str = "merged.parquet";
pub const DEFAULT_COLLECTION_PERIOD_SECS: i64 = 10;

/// Process-wide settings, fixed at startup.
///
/// Every field has a default, so a config file only needs the keys it overrides:
///
/// ```yaml
/// events_dir: /var/lib/gdelt
/// collection_period_secs: 900
/// keep_raw_events_file: true
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Plain-text endpoint whose first line ends with the latest archive URL.
    pub last_update_url: String,
    /// Working directory for downloads, extracted files and the merged dataset.
    pub events_dir: PathBuf,
    /// File name of the merged Parquet dataset inside `events_dir`.
    pub merged_events_filename: String,
    /// Seconds to sleep between collection cycles. Must be positive.
    pub collection_period_secs: i64,
    /// Keep the downloaded zip and the extracted TSV after a successful merge.
    pub keep_raw_events_file: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            last_update_url: DEFAULT_LAST_UPDATE_URL.to_string(),
            events_dir: PathBuf::from(DEFAULT_EVENTS_DIR),
            merged_events_filename: DEFAULT_MERGED_EVENTS_FILENAME.to_string(),
            collection_period_secs: DEFAULT_COLLECTION_PERIOD_SECS,
            keep_raw_events_file: false,
        }
    }
}

impl Config {
    /// Load from `path` if given, otherwise use the defaults.
    /// `.json` files are parsed as JSON, anything else as YAML.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            None => Self::default(),
            Some(path) => Self::from_file(path)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            serde_json::from_str(&text)
                .with_context(|| format!("parsing JSON config {}", path.display()))
        } else {
            serde_yaml::from_str(&text)
                .with_context(|| format!("parsing YAML config {}", path.display()))
        }
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.last_update_url)
            .with_context(|| format!("invalid last_update_url {:?}", self.last_update_url))?;
        if self.merged_events_filename.trim().is_empty() {
            bail!("merged_events_filename must not be empty");
        }
        if self.collection_period_secs <= 0 {
            bail!(
                "collection_period_secs should be greater than zero, got {}",
                self.collection_period_secs
            );
        }
        Ok(())
    }

    pub fn merged_events_path(&self) -> PathBuf {
        self.events_dir.join(&self.merged_events_filename)
    }
}
