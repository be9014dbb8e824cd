use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray,
};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use chrono::{Datelike, NaiveDate};
use log::{debug, info, warn};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{CellValue, Dataset, Record};
use super::schema::{Schema, TimestampSource};
use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Rows read from a source before schema validation: header order plus one
/// column_name → value map per row.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<BTreeMap<String, CellValue>>,
}

/// Load a dataset from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row, delimiter taken from the schema (recommended)
/// * `.json`    – `[{ "marca": "Fiat", "valor": 30000.0, ... }, ...]`
/// * `.parquet` – flat columns of strings, numbers, bools, dates or timestamps
///
/// The whole load fails on the first invalid row; records with a missing
/// or non-positive price are dropped.
pub fn load_file(path: &Path, schema: &Schema) -> Result<Dataset> {
    let table = read_table(path, schema)?;
    let dataset = build_dataset(schema, table)?;
    info!(
        "Loaded {} records from {} (schema '{}')",
        dataset.len(),
        path.display(),
        schema.name
    );
    Ok(dataset)
}

/// Like [`load_file`], but a missing or unreadable source yields an empty
/// dataset. Schema and value errors still propagate.
pub fn load_or_empty(path: &Path, schema: &Schema) -> Result<Dataset> {
    match load_file(path, schema) {
        Err(err) if err.is_not_found() => {
            warn!("{err}; continuing with an empty dataset");
            Ok(Dataset::empty(schema.clone()))
        }
        other => other,
    }
}

/// Read the raw table without applying the schema beyond text columns
/// and the CSV delimiter.
pub fn read_table(path: &Path, schema: &Schema) -> Result<RawTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "csv" => load_csv(path, schema),
        "json" => load_json(path),
        "parquet" | "pq" => load_parquet(path),
        other => Err(EngineError::UnsupportedFormat(other.to_string())),
    }
}

/// Open a source file. A path that cannot be opened, or that names a
/// directory, is reported as [`EngineError::DataNotFound`].
fn open_source(path: &Path) -> Result<File> {
    let not_found = |source| EngineError::DataNotFound {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(not_found)?;
    if file.metadata().map_err(not_found)?.is_dir() {
        return Err(not_found(io::Error::new(
            io::ErrorKind::InvalidInput,
            "path is a directory",
        )));
    }
    Ok(file)
}

// ---------------------------------------------------------------------------
// Schema application
// ---------------------------------------------------------------------------

/// Validate a raw table against `schema`, derive the date column and drop
/// records whose price is missing or not positive. Whole-number floats in
/// the schema's integer columns (`2022.0` from a column with gaps) are
/// stored as integers.
pub fn build_dataset(schema: &Schema, table: RawTable) -> Result<Dataset> {
    let missing = schema.missing_columns(&table.headers);
    if !missing.is_empty() {
        return Err(EngineError::SchemaMismatch {
            schema: schema.name.clone(),
            missing,
        });
    }

    let columns = schema.output_columns(&table.headers);
    let integer_columns = schema.integer_columns();
    let total = table.rows.len();
    let mut records = Vec::with_capacity(total);

    for (row_no, mut fields) in table.rows.into_iter().enumerate() {
        for col in &schema.text_columns {
            if let Some(value) = fields.remove(col) {
                fields.insert(col.clone(), value.into_text());
            }
        }
        for col in &integer_columns {
            if let Some(cell) = fields.get_mut(*col) {
                if let CellValue::Float(v) = *cell {
                    if v.fract() == 0.0 {
                        *cell = CellValue::Integer(v as i64);
                    }
                }
            }
        }

        let timestamp = derive_timestamp(schema, row_no, &mut fields)?;
        let price = match read_price(schema, row_no, &fields)? {
            Some(p) if p > 0.0 => p,
            _ => continue,
        };

        fields.insert(schema.date_column.clone(), CellValue::Date(timestamp));
        records.push(Record {
            timestamp,
            price,
            fields,
        });
    }

    if records.len() < total {
        debug!(
            "Dropped {} of {total} rows without a positive '{}'",
            total - records.len(),
            schema.price
        );
    }

    Ok(Dataset::from_records(schema.clone(), columns, records))
}

fn invalid(row: usize, column: &str, value: Option<&CellValue>) -> EngineError {
    EngineError::InvalidValue {
        row,
        column: column.to_string(),
        value: value.map(|v| v.to_string()).unwrap_or_default(),
    }
}

fn read_price(
    schema: &Schema,
    row: usize,
    fields: &BTreeMap<String, CellValue>,
) -> Result<Option<f64>> {
    match fields.get(&schema.price) {
        None | Some(CellValue::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| invalid(row, &schema.price, Some(value))),
    }
}

fn derive_timestamp(
    schema: &Schema,
    row: usize,
    fields: &mut BTreeMap<String, CellValue>,
) -> Result<NaiveDate> {
    match &schema.timestamp {
        TimestampSource::YearMonth { year, month } => {
            let y = fields.get(year);
            let m = fields.get(month);
            let year_num = y
                .and_then(CellValue::as_i64)
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(|| invalid(row, year, y))?;
            let month_num = m
                .and_then(CellValue::as_i64)
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| invalid(row, month, m))?;
            NaiveDate::from_ymd_opt(year_num, month_num, 1).ok_or_else(|| invalid(row, month, m))
        }
        TimestampSource::Date {
            column,
            format,
            year_column,
            month_column,
        } => {
            let cell = fields.get(column);
            let date = match cell {
                Some(CellValue::Date(d)) => Some(*d),
                Some(CellValue::String(s)) => parse_date(s, format),
                _ => None,
            }
            .ok_or_else(|| invalid(row, column, cell))?;

            if let Some(col) = year_column {
                fields.insert(col.clone(), CellValue::Integer(date.year() as i64));
            }
            if let Some(col) = month_column {
                fields.insert(col.clone(), CellValue::Integer(date.month() as i64));
            }
            Ok(date)
        }
    }
}

/// Parse with the configured format, falling back to the leading
/// `YYYY-MM-DD` of a timestamp such as `2023-01-01 00:00:00`.
fn parse_date(s: &str, format: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, format).ok().or_else(|| {
        s.get(..10)
            .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
    })
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout:  header row with column names, one record per line.
/// Cell types are guessed per value; schema text columns are kept verbatim.
fn load_csv(path: &Path, schema: &Schema) -> Result<RawTable> {
    let delimiter = u8::try_from(schema.delimiter).map_err(|_| {
        EngineError::Malformed(format!(
            "delimiter '{}' is not a single-byte character",
            schema.delimiter
        ))
    })?;

    let file = open_source(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let text_cols: Vec<bool> = headers.iter().map(|h| schema.is_text_column(h)).collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let mut row = BTreeMap::new();
        for (col_idx, value) in record.iter().enumerate() {
            let cell = if text_cols[col_idx] {
                text_cell(value)
            } else {
                guess_cell_type(value)
            };
            row.insert(headers[col_idx].clone(), cell);
        }
        rows.push(row);
    }

    Ok(RawTable { headers, rows })
}

fn text_cell(s: &str) -> CellValue {
    if s.is_empty() {
        CellValue::Null
    } else {
        CellValue::String(s.to_string())
    }
}

fn guess_cell_type(s: &str) -> CellValue {
    if s.is_empty() {
        return CellValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return CellValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return CellValue::Float(f);
    }
    if s == "true" || s == "false" {
        return CellValue::Bool(s == "true");
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return CellValue::Date(d);
    }
    CellValue::String(s.to_string())
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, the default `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "marca": "Fiat", "modelo": "Uno", "anoModelo": 2020,
///     "mesReferencia": 1, "anoReferencia": 2021, "valor": 30000.0 },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<RawTable> {
    let mut text = String::new();
    open_source(path)?.read_to_string(&mut text)?;
    let root: JsonValue = serde_json::from_str(&text)?;

    let records = root
        .as_array()
        .ok_or_else(|| EngineError::Malformed("expected top-level JSON array".to_string()))?;

    let mut headers: Vec<String> = Vec::new();
    let mut rows = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .ok_or_else(|| EngineError::Malformed(format!("row {i} is not a JSON object")))?;

        let mut row = BTreeMap::new();
        for (key, val) in obj {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
            row.insert(key.clone(), json_to_cell(val));
        }
        rows.push(row);
    }

    Ok(RawTable { headers, rows })
}

fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::String(s) => CellValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                CellValue::Float(f)
            } else {
                CellValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Null => CellValue::Null,
        other => CellValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with one flat column per field.
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`): categoricals, small or unsigned
/// integers, string views and datetimes are cast to the types a cell can hold.
fn load_parquet(path: &Path) -> Result<RawTable> {
    let file = open_source(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build()?;

    let mut rows = Vec::new();

    for batch_result in reader {
        let batch = batch_result?;
        let columns = headers
            .iter()
            .zip(batch.columns())
            .map(|(name, col)| normalize_column(name, col))
            .collect::<Result<Vec<ArrayRef>>>()?;

        for row in 0..batch.num_rows() {
            let mut values = BTreeMap::new();
            for (col_name, col) in headers.iter().zip(&columns) {
                values.insert(col_name.clone(), extract_cell(col_name, col, row)?);
            }
            rows.push(values);
        }
    }

    Ok(RawTable { headers, rows })
}

/// The Arrow type a column is read as, or `None` when no cell type fits.
fn cell_data_type(data_type: &DataType) -> Option<DataType> {
    match data_type {
        DataType::Utf8
        | DataType::Int64
        | DataType::Float64
        | DataType::Boolean
        | DataType::Date32 => Some(data_type.clone()),
        DataType::LargeUtf8 | DataType::Utf8View => Some(DataType::Utf8),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => Some(DataType::Int64),
        DataType::Float16
        | DataType::Float32
        | DataType::Decimal128(..)
        | DataType::Decimal256(..) => Some(DataType::Float64),
        DataType::Date64 | DataType::Timestamp(..) => Some(DataType::Date32),
        DataType::Dictionary(_, values) => cell_data_type(values),
        _ => None,
    }
}

fn unsupported_column(name: &str, data_type: &DataType) -> EngineError {
    EngineError::Malformed(format!("column '{name}' has unsupported type {data_type:?}"))
}

/// Cast a column to its cell data type.
fn normalize_column(name: &str, col: &ArrayRef) -> Result<ArrayRef> {
    let target =
        cell_data_type(col.data_type()).ok_or_else(|| unsupported_column(name, col.data_type()))?;
    if col.data_type() == &target {
        return Ok(col.clone());
    }
    Ok(cast(col, &target)?)
}

/// Extract a single cell from a normalized Arrow column at a given row.
fn extract_cell(name: &str, col: &ArrayRef, row: usize) -> Result<CellValue> {
    if col.is_null(row) {
        return Ok(CellValue::Null);
    }
    let any = col.as_any();
    let value = match col.data_type() {
        DataType::Utf8 => any
            .downcast_ref::<StringArray>()
            .map(|s| CellValue::String(s.value(row).to_string())),
        DataType::Int64 => any
            .downcast_ref::<Int64Array>()
            .map(|a| CellValue::Integer(a.value(row))),
        DataType::Float64 => any
            .downcast_ref::<Float64Array>()
            .map(|a| CellValue::Float(a.value(row))),
        DataType::Boolean => any
            .downcast_ref::<BooleanArray>()
            .map(|a| CellValue::Bool(a.value(row))),
        DataType::Date32 => any
            .downcast_ref::<Date32Array>()
            .and_then(|a| a.value_as_date(row))
            .map(CellValue::Date),
        _ => None,
    };
    value.ok_or_else(|| unsupported_column(name, col.data_type()))
}
