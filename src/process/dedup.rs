// src/process/dedup.rs

use anyhow::{Context, Result};
use arrow::{
    array::BooleanArray,
    compute::filter_record_batch,
    record_batch::RecordBatch,
    row::{RowConverter, SortField},
};
use std::collections::HashSet;

/// Drop rows that equal an earlier row in every column, keeping the first
/// occurrence and the original order. Nulls compare equal to nulls.
pub fn drop_duplicate_rows(batch: &RecordBatch) -> Result<RecordBatch> {
    if batch.num_columns() == 0 || batch.num_rows() < 2 {
        return Ok(batch.clone());
    }

    let fields = batch
        .schema()
        .fields()
        .iter()
        .map(|f| SortField::new(f.data_type().clone()))
        .collect();
    let converter = RowConverter::new(fields).context("building row converter")?;
    let rows = converter
        .convert_columns(batch.columns())
        .context("encoding rows for dedup")?;

    let mut seen = HashSet::with_capacity(rows.num_rows());
    let keep: BooleanArray = rows.iter().map(|row| Some(seen.insert(row))).collect();

    if keep.true_count() == batch.num_rows() {
        return Ok(batch.clone());
    }
    filter_record_batch(batch, &keep).context("filtering duplicate rows")
}
