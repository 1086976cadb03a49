// src/fetch/archive.rs

use anyhow::{Context, Result};
use futures_util::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info};
use url::Url;

/// Local file name for an archive: the last non-empty segment of its URL path.
pub fn archive_file_name(url: &Url) -> &str {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or("events.zip")
}

/// Stream `url` into `dest_dir` under its remote file name and return the saved path.
///
/// The body lands in `<name>.part` first and is renamed once complete, so a
/// file carrying the archive's own name is always a whole download.
pub async fn download_archive(
    client: &Client,
    url: &Url,
    dest_dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let dest_dir = dest_dir.as_ref();
    let name = archive_file_name(url);
    let dest_path = dest_dir.join(name);
    let part_path = dest_dir.join(format!("{}.part", name));

    fs::create_dir_all(dest_dir)
        .await
        .with_context(|| format!("creating {}", dest_dir.display()))?;

    let resp = client
        .get(url.as_str())
        .send()
        .await
        .with_context(|| format!("GET {}", url))?
        .error_for_status()?;

    let mut file = fs::File::create(&part_path)
        .await
        .with_context(|| format!("creating {}", part_path.display()))?;
    let mut stream = resp.bytes_stream();
    let mut size = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.with_context(|| format!("reading body from {}", url))?;
        size += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    fs::rename(&part_path, &dest_path)
        .await
        .with_context(|| format!("renaming {} -> {}", part_path.display(), dest_path.display()))?;

    debug!(path = %dest_path.display(), size_bytes = size, "archive saved");
    info!(name = %name, size_bytes = size, "downloaded");
    Ok(dest_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_is_last_path_segment() {
        let url = Url::parse("http://example/gdeltv2/20240101.export.CSV.zip").unwrap();
        assert_eq!(archive_file_name(&url), "20240101.export.CSV.zip");

        let trailing = Url::parse("http://example/dir/a.zip/").unwrap();
        assert_eq!(archive_file_name(&trailing), "a.zip");

        let bare = Url::parse("http://example/").unwrap();
        assert_eq!(archive_file_name(&bare), "events.zip");
    }
}
