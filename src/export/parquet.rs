// src/export/parquet.rs
use arrow::array::{ArrayRef, Date32Array, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use chrono::Datelike;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::{fs, fs::File, path::Path, sync::Arc};
use tracing::debug;

use super::write_err;
use crate::error::Result;
use crate::table::{Cell, CellKind, Tabular};

/// Days from 0001-01-01 to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// One arrow column per schema entry: dates as Date32, numbers as Float64,
/// everything else Utf8.
pub fn record_batch(table: &dyn Tabular) -> std::result::Result<RecordBatch, ArrowError> {
    let schema = table.schema();
    let rows = 0..table.num_rows();

    let mut fields = Vec::with_capacity(schema.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.len());
    for (col, (name, kind)) in schema.iter().enumerate() {
        let (dt, array): (DataType, ArrayRef) = match kind {
            CellKind::Date => (
                DataType::Date32,
                Arc::new(Date32Array::from(
                    rows.clone()
                        .map(|r| match table.cell(r, col) {
                            Cell::Date(d) => Some(d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE),
                            _ => None,
                        })
                        .collect::<Vec<_>>(),
                )),
            ),
            CellKind::Number => (
                DataType::Float64,
                Arc::new(Float64Array::from(
                    rows.clone()
                        .map(|r| match table.cell(r, col) {
                            Cell::Number(v) => v,
                            _ => None,
                        })
                        .collect::<Vec<_>>(),
                )),
            ),
            CellKind::Text => (
                DataType::Utf8,
                Arc::new(StringArray::from(
                    rows.clone()
                        .map(|r| table.cell(r, col).render())
                        .collect::<Vec<_>>(),
                )),
            ),
        };
        fields.push(Field::new(name.as_str(), dt, true));
        columns.push(array);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
}

/// Snappy-compressed single-batch parquet file, written to a temp path and
/// renamed into place.
pub fn write_parquet(table: &dyn Tabular, path: &Path) -> Result<()> {
    let batch = record_batch(table).map_err(|e| write_err(path, e))?;
    let temp_path = path.with_extension("parquet.tmp");

    let file = File::create(&temp_path).map_err(|e| write_err(&temp_path, e))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .map_err(|e| write_err(path, e))?;
    writer.write(&batch).map_err(|e| write_err(path, e))?;
    writer.close().map_err(|e| write_err(path, e))?;

    fs::rename(&temp_path, path).map_err(|e| write_err(path, e))?;
    debug!(path = %path.display(), rows = batch.num_rows(), "wrote parquet");
    Ok(())
}
