// src/collector/mod.rs

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};
use tokio::task;
use tracing::{info, warn};
use url::Url;

use crate::{
    config::Config,
    fetch,
    merged::{MergeStats, MergedDataset},
    process,
};

pub mod schedule;

pub use schedule::{is_connection_error, validate_period, Tick};

/// What a single `collect` call did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The status endpoint still announces the archive we already merged.
    Unchanged { archive_url: Url },
    /// A new archive was downloaded and merged.
    Collected(CollectReport),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectReport {
    pub archive_url: Url,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u128,
    /// Rows left in the new batch after in-batch deduplication.
    pub batch_rows: usize,
    pub merge: MergeStats,
    /// Files deleted after the merge; empty when raw files are kept.
    pub removed_files: Vec<PathBuf>,
}

/// Polls the status endpoint and folds each newly announced events archive
/// into the merged dataset.
pub struct Collector {
    client: Client,
    last_update_url: Url,
    events_dir: PathBuf,
    merged: MergedDataset,
    last_archive_url: Option<Url>,
}

impl Collector {
    /// Ensure `events_dir` and the merged dataset inside it exist. Safe to
    /// repeat across restarts.
    pub fn new(
        client: Client,
        last_update_url: &str,
        events_dir: impl Into<PathBuf>,
        merged_events_filename: &str,
    ) -> Result<Self> {
        let last_update_url = Url::parse(last_update_url)
            .with_context(|| format!("parsing status URL {:?}", last_update_url))?;
        let events_dir = events_dir.into();

        if events_dir.exists() {
            info!(dir = %events_dir.display(), "events directory already exists");
        } else {
            info!(dir = %events_dir.display(), "events directory does not exist, creating");
            fs::create_dir_all(&events_dir)
                .with_context(|| format!("creating events directory {}", events_dir.display()))?;
            info!(dir = %events_dir.display(), "events directory created");
        }

        let merged = MergedDataset::open_or_create(events_dir.join(merged_events_filename))?;

        Ok(Self {
            client,
            last_update_url,
            events_dir,
            merged,
            last_archive_url: None,
        })
    }

    pub fn from_config(client: Client, config: &Config) -> Result<Self> {
        Self::new(
            client,
            &config.last_update_url,
            config.events_dir.clone(),
            &config.merged_events_filename,
        )
    }

    pub fn events_dir(&self) -> &Path {
        &self.events_dir
    }

    pub fn merged(&self) -> &MergedDataset {
        &self.merged
    }

    /// The archive URL seen by the most recent cycle, if any.
    pub fn last_archive_url(&self) -> Option<&Url> {
        self.last_archive_url.as_ref()
    }

    /// Run one detect → download → extract → merge cycle.
    ///
    /// The archive URL is recorded as seen before it is downloaded, so a cycle
    /// that fails part-way is not repeated for the same URL.
    pub async fn collect(&mut self, keep_raw_events_file: bool) -> Result<CycleOutcome> {
        let started_at = Utc::now();
        let start = Instant::now();

        let archive_url =
            fetch::fetch_latest_archive_url(&self.client, &self.last_update_url).await?;
        if self.last_archive_url.as_ref() == Some(&archive_url) {
            info!(url = %archive_url, "no new events archive, same as the last one");
            return Ok(CycleOutcome::Unchanged { archive_url });
        }
        self.last_archive_url = Some(archive_url.clone());
        info!(url = %archive_url, "detected new events archive");

        let zip_path = fetch::download_archive(&self.client, &archive_url, &self.events_dir).await?;

        // extraction, parsing and the parquet rewrite are all blocking work
        let events_dir = self.events_dir.clone();
        let merged = self.merged.clone();
        let zip_clone = zip_path.clone();
        let (extracted, batch_rows, merge) =
            task::spawn_blocking(move || -> Result<(Vec<PathBuf>, usize, MergeStats)> {
                let extracted = process::extract_archive(&zip_clone, &events_dir)?;
                let events_path = process::locate_events_file(&zip_clone, &extracted)?;
                let batch = process::read_events(&events_path)?;
                let stats = merged.merge(&batch)?;
                Ok((extracted, batch.num_rows(), stats))
            })
            .await
            .context("merge task panicked")??;

        info!(
            url = %archive_url,
            batch_rows,
            rows_added = merge.rows_added(),
            total_rows = merge.rows_after,
            "collected and merged new events archive"
        );

        let removed_files = if keep_raw_events_file {
            Vec::new()
        } else {
            remove_raw_files(&zip_path, &extracted)?
        };

        Ok(CycleOutcome::Collected(CollectReport {
            archive_url,
            started_at,
            elapsed_ms: start.elapsed().as_millis(),
            batch_rows,
            merge,
            removed_files,
        }))
    }
}

fn remove_raw_files(zip_path: &Path, extracted: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::with_capacity(extracted.len() + 1);
    for path in std::iter::once(zip_path).chain(extracted.iter().map(PathBuf::as_path)) {
        match fs::remove_file(path) {
            Ok(()) => removed.push(path.to_path_buf()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "raw file already gone");
            }
            Err(e) => {
                return Err(e).with_context(|| format!("deleting {}", path.display()));
            }
        }
    }
    info!(files = ?removed, "deleted the remaining raw event files");
    Ok(removed)
}
