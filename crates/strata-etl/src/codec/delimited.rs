//! Decoder for gzip-compressed, `|`-delimited source files.
//!
//! Files are headerless with exactly the eight columns of
//! [`COLUMN_NAMES`](crate::record::COLUMN_NAMES). Short rows are padded with
//! nulls; rows with extra fields fail the whole file. Fields may be quoted
//! with `"`.

use std::io::{Cursor, Read};
use std::sync::Arc;

use arrow::array::{Array as _, StringArray};
use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use flate2::read::MultiGzDecoder;

use crate::error::{EtlError, Result};
use crate::record::{COLUMN_NAMES, Record};

/// Field separator of source files.
pub const FIELD_DELIMITER: u8 = b'|';

const BATCH_SIZE: usize = 8 * 1024;

fn raw_schema() -> Arc<Schema> {
    Arc::new(Schema::new(
        COLUMN_NAMES
            .iter()
            .map(|name| Field::new(*name, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ))
}

/// Decodes one source file into records, in file order.
///
/// Date columns are parsed best-effort, so a bad date never fails the file.
///
/// # Errors
///
/// Returns [`EtlError::Decode`] if the blob is not gzip, or the text is not
/// valid delimited data for the eight-column schema.
pub fn decode_delimited(bytes: &[u8]) -> Result<Vec<Record>> {
    let mut text = Vec::new();
    MultiGzDecoder::new(bytes)
        .read_to_end(&mut text)
        .map_err(|e| EtlError::decode(format!("gzip decompression failed: {e}")))?;

    let reader = ReaderBuilder::new(raw_schema())
        .with_header(false)
        .with_delimiter(FIELD_DELIMITER)
        .with_quote(b'"')
        .with_truncated_rows(true)
        .with_batch_size(BATCH_SIZE)
        .build(Cursor::new(text))
        .map_err(|e| EtlError::decode(format!("delimited reader init failed: {e}")))?;

    let mut records = Vec::new();
    for batch in reader {
        let batch =
            batch.map_err(|e| EtlError::decode(format!("delimited parse failed: {e}")))?;
        append_records(&batch, &mut records)?;
    }
    Ok(records)
}

fn append_records(batch: &RecordBatch, out: &mut Vec<Record>) -> Result<()> {
    let columns = COLUMN_NAMES
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            batch
                .column(idx)
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| EtlError::decode(format!("column '{name}' is not text")))
        })
        .collect::<Result<Vec<_>>>()?;

    out.reserve(batch.num_rows());
    for row in 0..batch.num_rows() {
        let value = |col: usize| {
            let array = columns[col];
            (!array.is_null(row)).then(|| array.value(row))
        };
        out.push(Record::from_raw([
            value(0),
            value(1),
            value(2),
            value(3),
            value(4),
            value(5),
            value(6),
            value(7),
        ]));
    }
    Ok(())
}
