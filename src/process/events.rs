// src/process/events.rs

use anyhow::{bail, Context, Result};
use arrow::{
    array::{ArrayRef, StringBuilder},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use csv::{ByteRecord, ReaderBuilder};
use std::{borrow::Cow, fs::File, io::Read, path::Path, sync::Arc};
use tracing::{debug, instrument, warn};

use super::dedup::drop_duplicate_rows;

/// Column names `0..n` zero-padded to the width of `n` so they sort
/// lexically in numeric order: 61 columns give `"00"`, `"01"`, ..., `"60"`.
pub fn positional_column_names(n: usize) -> Vec<String> {
    let width = n.to_string().len();
    (0..n).map(|i| format!("{:0width$}", i, width = width)).collect()
}

/// Schema of an events batch: `n` nullable text columns named by position.
pub fn events_schema(n: usize) -> Arc<Schema> {
    let fields: Vec<Field> = positional_column_names(n)
        .into_iter()
        .map(|name| Field::new(name, DataType::Utf8, true))
        .collect();
    Arc::new(Schema::new(fields))
}

/// Read a headerless tab-separated events file and drop duplicate rows.
///
/// The first record fixes the column count. Shorter records are padded with
/// nulls, longer ones are rejected. Empty fields become nulls.
#[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
pub fn read_events<P: AsRef<Path>>(path: P) -> Result<RecordBatch> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let batch = read_events_from(file).with_context(|| format!("reading {}", path.display()))?;
    let rows_read = batch.num_rows();

    let batch = drop_duplicate_rows(&batch)?;
    debug!(
        rows_read,
        rows_kept = batch.num_rows(),
        columns = batch.num_columns(),
        "parsed events"
    );
    Ok(batch)
}

/// Parse tab-separated records from any reader, without deduplication.
pub fn read_events_from<R: Read>(reader: R) -> Result<RecordBatch> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut builders: Vec<StringBuilder> = Vec::new();
    let mut record = ByteRecord::new();
    let mut rows = 0usize;
    let mut lossy_fields = 0usize;

    while rdr
        .read_byte_record(&mut record)
        .with_context(|| format!("TSV parse error at record {}", rows))?
    {
        if rows == 0 {
            builders = (0..record.len()).map(|_| StringBuilder::new()).collect();
        }
        if record.len() > builders.len() {
            bail!(
                "record {} has {} fields, expected at most {}",
                rows,
                record.len(),
                builders.len()
            );
        }

        for (i, builder) in builders.iter_mut().enumerate() {
            match record.get(i) {
                Some(field) if !field.is_empty() => {
                    let text = String::from_utf8_lossy(field);
                    if let Cow::Owned(_) = text {
                        lossy_fields += 1;
                    }
                    builder.append_value(text)
                }
                _ => builder.append_null(),
            }
        }
        rows += 1;
    }

    if rows == 0 {
        bail!("events file has no rows");
    }
    if lossy_fields > 0 {
        warn!(
            fields = lossy_fields,
            "invalid UTF-8 in events file, bytes replaced with U+FFFD"
        );
    }

    let schema = events_schema(builders.len());
    let columns: Vec<ArrayRef> = builders
        .into_iter()
        .map(|mut b| Arc::new(b.finish()) as ArrayRef)
        .collect();
    RecordBatch::try_new(schema, columns).context("building events record batch")
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, StringArray};
    use std::io::Cursor;

    fn column(batch: &RecordBatch, i: usize) -> &StringArray {
        batch
            .column(i)
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("events columns are Utf8")
    }

    #[test]
    fn column_names_are_zero_padded_to_count_width() {
        assert_eq!(positional_column_names(3), vec!["0", "1", "2"]);

        let names = positional_column_names(61);
        assert_eq!(names.first().unwrap(), "00");
        assert_eq!(names[9], "09");
        assert_eq!(names.last().unwrap(), "60");

        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(sorted, names);

        assert_eq!(positional_column_names(10)[0], "00");
        assert_eq!(positional_column_names(100)[7], "007");
    }

    #[test]
    fn parses_headerless_tsv_with_nulls_and_padding() -> Result<()> {
        let tsv = "1\tUSA\t\t2.5\n2\tFRA\tPARIS\n";
        let batch = read_events_from(Cursor::new(tsv))?;

        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 4);
        assert_eq!(batch.schema().field(3).name(), "3");

        assert_eq!(column(&batch, 1).value(0), "USA");
        assert!(column(&batch, 2).is_null(0));
        assert_eq!(column(&batch, 2).value(1), "PARIS");
        // short second row padded
        assert!(column(&batch, 3).is_null(1));
        Ok(())
    }

    #[test]
    fn longer_record_than_first_is_rejected() {
        let tsv = "a\tb\na\tb\tc\n";
        assert!(read_events_from(Cursor::new(tsv)).is_err());
    }

    #[test]
    fn invalid_utf8_is_replaced_not_dropped() -> Result<()> {
        let tsv: &[u8] = b"1\tK\xF6ln\n2\tBONN\n";
        let batch = read_events_from(Cursor::new(tsv))?;

        assert_eq!(batch.num_rows(), 2);
        assert_eq!(column(&batch, 1).value(0), "K\u{FFFD}ln");
        assert_eq!(column(&batch, 1).value(1), "BONN");
        Ok(())
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(read_events_from(Cursor::new("")).is_err());
    }

    #[test]
    fn read_events_drops_in_batch_duplicates() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("20240101.export.CSV");
        std::fs::write(&path, "1\tx\n2\ty\n1\tx\n3\tz\n2\ty\n")?;

        let batch = read_events(&path)?;
        assert_eq!(batch.num_rows(), 3);
        let ids: Vec<&str> = (0..3).map(|i| column(&batch, 0).value(i)).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        Ok(())
    }
}
