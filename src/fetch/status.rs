// src/fetch/status.rs

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use tracing::debug;
use url::Url;

/// GET the status endpoint and return the archive URL it currently announces.
pub async fn fetch_latest_archive_url(client: &Client, status_url: &Url) -> Result<Url> {
    let body = client
        .get(status_url.clone())
        .send()
        .await
        .with_context(|| format!("GET {}", status_url))?
        .error_for_status()?
        .text()
        .await
        .with_context(|| format!("reading body from {}", status_url))?;
    debug!(url = %status_url, bytes = body.len(), "fetched status");

    parse_latest_archive_url(&body).with_context(|| format!("parsing status from {}", status_url))
}

/// The first line looks like `<metadata...> <url>`; the URL is its last
/// whitespace-separated token.
pub fn parse_latest_archive_url(body: &str) -> Result<Url> {
    let first = body
        .lines()
        .next()
        .ok_or_else(|| anyhow!("status body is empty"))?;
    let token = first
        .split_whitespace()
        .last()
        .ok_or_else(|| anyhow!("first status line is blank"))?;
    Url::parse(token).with_context(|| format!("invalid archive URL {:?}", token))
}
