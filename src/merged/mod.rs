// src/merged/mod.rs

use anyhow::{bail, Context, Result};
use arrow::{
    compute::concat_batches,
    datatypes::{Schema, SchemaRef},
    record_batch::RecordBatch,
};
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::Compression,
    file::properties::WriterProperties,
};
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, instrument, warn};

use crate::process::drop_duplicate_rows;

/// Row counts around a single merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub rows_before: usize,
    pub rows_after: usize,
}

impl MergeStats {
    pub fn rows_added(&self) -> usize {
        self.rows_after - self.rows_before
    }
}

/// The growing, deduplicated events dataset kept in a single Parquet file.
///
/// The empty dataset is a Parquet file with no columns and no rows; the first
/// batch merged into it fixes the columns. Every merge rewrites the whole file;
/// the new contents go to a sibling `.tmp` file which is then renamed over the
/// old one.
#[derive(Debug, Clone)]
pub struct MergedDataset {
    path: PathBuf,
}

impl MergedDataset {
    /// Open the dataset at `path`, creating an empty one if the file does not
    /// exist yet.
    pub fn open_or_create(path: impl Into<PathBuf>) -> Result<Self> {
        let dataset = Self { path: path.into() };
        if dataset.path.exists() {
            info!(path = %dataset.path.display(), "merged events file already exists");
        } else {
            info!(path = %dataset.path.display(), "merged events file does not exist, creating");
            dataset.write(&RecordBatch::new_empty(Arc::new(Schema::empty())))?;
            info!(path = %dataset.path.display(), "empty merged events file created");
        }
        Ok(dataset)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole dataset into one batch.
    pub fn load(&self) -> Result<RecordBatch> {
        let file = File::open(&self.path)
            .with_context(|| format!("failed to open `{}`", self.path.display()))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .with_context(|| format!("reading parquet metadata of `{}`", self.path.display()))?;
        let schema: SchemaRef = builder.schema().clone();
        let reader = builder.with_batch_size(64 * 1024).build()?;

        let batches = reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("reading `{}`", self.path.display()))?;
        concat_batches(&schema, &batches).context("concatenating merged batches")
    }

    /// Number of rows currently stored, from the Parquet footer.
    pub fn num_rows(&self) -> Result<usize> {
        let file = File::open(&self.path)
            .with_context(|| format!("failed to open `{}`", self.path.display()))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        Ok(builder.metadata().file_metadata().num_rows() as usize)
    }

    /// Append `batch` to the dataset, dropping any row already present (or
    /// repeated within `batch`), and persist the result.
    ///
    /// Existing rows come first and are never removed. A dataset without
    /// columns adopts the schema of the first batch it receives; after that
    /// every batch must carry the same columns.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub fn merge(&self, batch: &RecordBatch) -> Result<MergeStats> {
        let existing = self.load()?;
        let rows_before = existing.num_rows();

        let union = if existing.num_columns() == 0 {
            batch.clone()
        } else {
            if existing.schema().fields() != batch.schema().fields() {
                bail!(
                    "batch columns {:?} do not match merged dataset columns {:?}",
                    field_names(batch),
                    field_names(&existing)
                );
            }
            concat_batches(&existing.schema(), [&existing, batch])
                .context("concatenating new events onto merged events")?
        };

        let merged = drop_duplicate_rows(&union)?;
        let stats = MergeStats {
            rows_before,
            rows_after: merged.num_rows(),
        };

        if merged.num_rows() == rows_before && existing.num_columns() > 0 {
            debug!("no new rows; merged file left untouched");
        } else {
            self.write(&merged)?;
        }
        info!(
            rows_before = stats.rows_before,
            rows_after = stats.rows_after,
            rows_added = stats.rows_added(),
            "merged events"
        );
        Ok(stats)
    }

    fn write(&self, batch: &RecordBatch) -> Result<()> {
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let result = write_parquet(&tmp, batch).and_then(|()| {
            fs::rename(&tmp, &self.path).with_context(|| {
                format!("renaming {} -> {}", tmp.display(), self.path.display())
            })
        });
        if result.is_err() && tmp.exists() {
            if let Err(e) = fs::remove_file(&tmp) {
                warn!(path = %tmp.display(), error = %e, "failed to remove partial merged file");
            }
        }
        result
    }
}

fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("creating merged file {}", path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(BufWriter::new(file), batch.schema(), Some(props))
        .context("creating Arrow writer for merged events")?;
    if batch.num_rows() > 0 {
        writer.write(batch).context("writing merged events")?;
    }
    writer.close().context("closing merged events writer")?;
    Ok(())
}

fn field_names(batch: &RecordBatch) -> Vec<String> {
    batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect()
}
