//! Parquet encoding/decoding of partition snapshots.
//!
//! Each partition file holds one record batch with the string columns as
//! nullable `Utf8` and `c6`/`c7` as nullable `Date32`, where null stands for an
//! unparseable date. Files are SNAPPY-compressed.

use std::io::Cursor;
use std::sync::Arc;

use arrow::array::{Array as _, ArrayRef, Date32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use chrono::{NaiveDate, TimeDelta};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;

use crate::error::{EtlError, Result};
use crate::record::{COLUMN_NAMES, DateField, Record};

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn data_type(column: &str) -> DataType {
    match column {
        "c6" | "c7" => DataType::Date32,
        _ => DataType::Utf8,
    }
}

fn schema() -> Arc<Schema> {
    Arc::new(Schema::new(
        COLUMN_NAMES
            .iter()
            .map(|name| Field::new(*name, data_type(name), true))
            .collect::<Vec<_>>(),
    ))
}

fn writer_properties() -> WriterProperties {
    let created_by = KeyValue {
        key: "created_by".to_string(),
        value: Some("strata-etl".to_string()),
    };
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_key_value_metadata(Some(vec![created_by]))
        .build()
}

fn days_since_epoch(field: DateField) -> Option<i32> {
    field
        .date()
        .and_then(|date| i32::try_from((date - epoch()).num_days()).ok())
}

fn date_from_days(days: i32) -> DateField {
    epoch()
        .checked_add_signed(TimeDelta::days(i64::from(days)))
        .into()
}

fn strings(rows: &[Record], column: impl Fn(&Record) -> Option<&str>) -> ArrayRef {
    Arc::new(StringArray::from(rows.iter().map(column).collect::<Vec<_>>()))
}

fn dates(rows: &[Record], column: impl Fn(&Record) -> DateField) -> ArrayRef {
    Arc::new(Date32Array::from(
        rows.iter()
            .map(|r| days_since_epoch(column(r)))
            .collect::<Vec<_>>(),
    ))
}

/// Encodes a row set as a SNAPPY-compressed Parquet file.
///
/// # Errors
///
/// Returns an error if the record batch cannot be built or the Parquet write
/// fails.
pub fn encode_columnar(rows: &[Record]) -> Result<Bytes> {
    let schema = schema();

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            strings(rows, |r| r.c1.as_deref()),
            strings(rows, |r| r.c2.as_deref()),
            strings(rows, |r| r.c3.as_deref()),
            strings(rows, |r| r.c4.as_deref()),
            strings(rows, |r| r.c5.as_deref()),
            dates(rows, |r| r.c6),
            dates(rows, |r| r.c7),
            strings(rows, |r| r.c8.as_deref()),
        ],
    )
    .map_err(|e| EtlError::codec(format!("record batch build failed: {e}")))?;

    let mut cursor = Cursor::new(Vec::<u8>::new());
    let mut writer = ArrowWriter::try_new(&mut cursor, schema, Some(writer_properties()))
        .map_err(|e| EtlError::codec(format!("parquet writer init failed: {e}")))?;
    writer
        .write(&batch)
        .map_err(|e| EtlError::codec(format!("parquet write failed: {e}")))?;
    writer
        .close()
        .map_err(|e| EtlError::codec(format!("parquet close failed: {e}")))?;
    Ok(Bytes::from(cursor.into_inner()))
}

fn read_batches(bytes: &Bytes) -> Result<Vec<RecordBatch>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes.clone())
        .map_err(|e| EtlError::codec(format!("parquet reader init failed: {e}")))?
        .build()
        .map_err(|e| EtlError::codec(format!("parquet reader build failed: {e}")))?;

    reader
        .map(|batch| batch.map_err(|e| EtlError::codec(format!("parquet read batch failed: {e}"))))
        .collect()
}

fn column_index(batch: &RecordBatch, name: &str) -> Result<usize> {
    batch
        .schema()
        .index_of(name)
        .map_err(|e| EtlError::codec(format!("missing column '{name}': {e}")))
}

fn col_string<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column(column_index(batch, name)?)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| EtlError::codec(format!("column '{name}' is not StringArray")))
}

fn col_date<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Date32Array> {
    batch
        .column(column_index(batch, name)?)
        .as_any()
        .downcast_ref::<Date32Array>()
        .ok_or_else(|| EtlError::codec(format!("column '{name}' is not Date32Array")))
}

fn opt_string(array: &StringArray, row: usize) -> Option<String> {
    (!array.is_null(row)).then(|| array.value(row).to_string())
}

fn opt_date(array: &Date32Array, row: usize) -> DateField {
    if array.is_null(row) {
        DateField::Unparseable
    } else {
        date_from_days(array.value(row))
    }
}

/// Decodes a Parquet partition file back into records, in file order.
///
/// # Errors
///
/// Returns an error if the bytes are not Parquet or a column is missing or
/// has the wrong type.
pub fn decode_columnar(bytes: &Bytes) -> Result<Vec<Record>> {
    let mut out = Vec::new();
    for batch in read_batches(bytes)? {
        let c1 = col_string(&batch, "c1")?;
        let c2 = col_string(&batch, "c2")?;
        let c3 = col_string(&batch, "c3")?;
        let c4 = col_string(&batch, "c4")?;
        let c5 = col_string(&batch, "c5")?;
        let c6 = col_date(&batch, "c6")?;
        let c7 = col_date(&batch, "c7")?;
        let c8 = col_string(&batch, "c8")?;

        out.reserve(batch.num_rows());
        for row in 0..batch.num_rows() {
            out.push(Record {
                c1: opt_string(c1, row),
                c2: opt_string(c2, row),
                c3: opt_string(c3, row),
                c4: opt_string(c4, row),
                c5: opt_string(c5, row),
                c6: opt_date(c6, row),
                c7: opt_date(c7, row),
                c8: opt_string(c8, row),
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, c7: Option<NaiveDate>) -> Record {
        Record {
            c1: Some(id.to_string()),
            c2: None,
            c3: Some("three".into()),
            c4: Some(String::new()),
            c5: None,
            c6: DateField::Parsed(NaiveDate::from_ymd_opt(1969, 12, 31).unwrap()),
            c7: c7.into(),
            c8: Some("k".into()),
        }
    }

    #[test]
    fn snapshot_preserves_rows_order_and_nulls() {
        let rows = vec![
            record("b", NaiveDate::from_ymd_opt(2020, 1, 1)),
            record("a", None),
            record("c", NaiveDate::from_ymd_opt(1999, 12, 31)),
        ];

        let bytes = encode_columnar(&rows).expect("encode");
        assert_eq!(&bytes[..4], b"PAR1");
        let decoded = decode_columnar(&bytes).expect("decode");
        assert_eq!(decoded, rows);
    }

    #[test]
    fn snapshot_uses_snappy_and_records_writer() {
        let bytes = encode_columnar(&[record("a", None)]).expect("encode");
        let builder = ParquetRecordBatchReaderBuilder::try_new(bytes).expect("reader");
        let metadata = builder.metadata();

        let column = metadata.row_group(0).column(0);
        assert_eq!(column.compression(), Compression::SNAPPY);

        let kv = metadata
            .file_metadata()
            .key_value_metadata()
            .expect("key value metadata");
        assert!(
            kv.iter()
                .any(|e| e.key == "created_by" && e.value.as_deref() == Some("strata-etl"))
        );
    }

    #[test]
    fn schema_contract() {
        let schema = schema();
        let names: Vec<_> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, COLUMN_NAMES);
        assert_eq!(schema.field(5).data_type(), &DataType::Date32);
        assert_eq!(schema.field(6).data_type(), &DataType::Date32);
        assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
        assert!(schema.fields().iter().all(|f| f.is_nullable()));
    }

    #[test]
    fn garbage_bytes_are_a_codec_error() {
        let err = decode_columnar(&Bytes::from_static(b"not parquet")).expect_err("garbage");
        assert!(matches!(err, EtlError::Codec { .. }));
    }
}
