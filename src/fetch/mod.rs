// src/fetch/mod.rs

/// Reading the status endpoint that announces the latest events archive.
pub mod status;

/// Downloading an events archive to disk.
pub mod archive;

pub use archive::download_archive;
pub use status::fetch_latest_archive_url;
