// src/process/mod.rs

/// Unpacking downloaded archives.
pub mod extract;

/// Reading the tab-separated events file into Arrow.
pub mod events;

/// Full-row deduplication of record batches.
pub mod dedup;

pub use dedup::drop_duplicate_rows;
pub use events::{positional_column_names, read_events};
pub use extract::{extract_archive, locate_events_file};
