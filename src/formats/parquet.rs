//! Eager Parquet source: decode the whole file up front, then serve it in
//! fixed row ranges.
//!
//! Parquet is self-describing, so the schema and exact row count are known
//! before the first batch. Datetime detection here is type-based: any column
//! whose Arrow type is a date or timestamp lands as TIMESTAMP, independent of
//! its name.

use std::fs::File;
use std::ops::Range;
use std::path::Path;

use arrow::array::*;
use arrow::datatypes::{
    ArrowPrimitiveType, DataType, Date32Type, Date64Type, Decimal128Type, Decimal256Type,
    Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, TimeUnit,
    TimestampMicrosecondType, TimestampMillisecondType, TimestampNanosecondType,
    TimestampSecondType, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::config::CHUNK_ROWS;
use crate::db::schema::format_datetime;
use crate::db::{Column, SqlType, TableSchema};
use crate::error::LoadError;
use crate::formats::{BatchSource, Record, SourceMetadata};

const SECONDS_PER_DAY: i64 = 86_400;

/// Parquet batch source. Holds the fully decoded file for the run's duration.
#[derive(Debug)]
pub struct ParquetBatchSource {
    schema: TableSchema,
    records: Vec<Record>,
    ranges: Vec<Range<usize>>,
    cursor: usize,
}

impl ParquetBatchSource {
    /// Decode a `.parquet` file with the standard chunk size.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        Self::with_chunk_rows(path, CHUNK_ROWS)
    }

    pub(crate) fn with_chunk_rows(path: &Path, chunk_rows: usize) -> Result<Self, LoadError> {
        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

        let columns = builder
            .schema()
            .fields()
            .iter()
            .map(|field| {
                Ok(Column {
                    name: field.name().clone(),
                    sql_type: sql_type_for(field.name(), field.data_type())?,
                })
            })
            .collect::<Result<Vec<Column>, LoadError>>()?;

        let mut records = Vec::new();
        for batch in builder.build()? {
            records.extend(record_batch_to_records(&batch?)?);
        }

        let ranges = batch_ranges(records.len(), chunk_rows);

        Ok(Self {
            schema: TableSchema { columns },
            records,
            ranges,
            cursor: 0,
        })
    }
}

impl BatchSource for ParquetBatchSource {
    fn schema(&self) -> &TableSchema {
        &self.schema
    }

    fn metadata(&self) -> SourceMetadata {
        SourceMetadata {
            total_rows: Some(self.records.len() as u64),
            batch_count: Some(self.ranges.len()),
        }
    }

    fn next_batch(&mut self) -> Result<Option<Vec<Record>>, LoadError> {
        let Some(range) = self.ranges.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        Ok(Some(self.records[range.clone()].to_vec()))
    }
}

/// Consecutive row ranges of at most `chunk_rows` rows each.
///
/// When the total is a nonzero exact multiple of the chunk size, one trailing
/// empty range is included; callers must treat it as a no-op batch rather
/// than an error. An empty source yields no ranges at all.
pub(crate) fn batch_ranges(total_rows: usize, chunk_rows: usize) -> Vec<Range<usize>> {
    if total_rows == 0 {
        return Vec::new();
    }

    let mut ranges = Vec::new();
    let mut start = 0;
    while start < total_rows {
        let end = (start + chunk_rows).min(total_rows);
        ranges.push(start..end);
        start = end;
    }
    if total_rows % chunk_rows == 0 {
        ranges.push(total_rows..total_rows);
    }
    ranges
}

/// Map an Arrow field type to the destination column type. Date and
/// timestamp types land as TIMESTAMP, which is what routes them through
/// datetime normalization during conversion.
fn sql_type_for(name: &str, data_type: &DataType) -> Result<SqlType, LoadError> {
    Ok(match data_type {
        DataType::Boolean => SqlType::Boolean,
        DataType::Int8 | DataType::Int16 => SqlType::SmallInt,
        DataType::Int32 | DataType::UInt8 | DataType::UInt16 => SqlType::Integer,
        DataType::Int64 | DataType::UInt32 => SqlType::BigInt,
        DataType::UInt64 | DataType::Decimal128(_, _) | DataType::Decimal256(_, _) => {
            SqlType::Numeric
        }
        DataType::Float32 => SqlType::Real,
        DataType::Float64 => SqlType::DoublePrecision,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Binary | DataType::LargeBinary => {
            SqlType::Text
        }
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => SqlType::Timestamp,
        other => {
            return Err(LoadError::SourceRead(format!(
                "column '{}': unsupported Parquet type {:?}",
                name, other
            )));
        }
    })
}

/// Convert a columnar batch to row-based records. Every value becomes a
/// string; nulls become empty strings, the same convention the CSV path uses.
fn record_batch_to_records(batch: &RecordBatch) -> Result<Vec<Record>, LoadError> {
    let num_rows = batch.num_rows();
    if num_rows == 0 {
        return Ok(Vec::new());
    }

    let schema = batch.schema();
    let mut column_strings = Vec::with_capacity(batch.num_columns());
    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        column_strings.push(array_to_strings(field.name(), array.as_ref())?);
    }

    let mut records = Vec::with_capacity(num_rows);
    for row_idx in 0..num_rows {
        let fields = column_strings
            .iter()
            .map(|col| col[row_idx].clone())
            .collect();
        records.push(Record { fields });
    }

    Ok(records)
}

fn array_to_strings(name: &str, array: &dyn Array) -> Result<Vec<String>, LoadError> {
    let mut strings = Vec::with_capacity(array.len());

    match array.data_type() {
        DataType::Boolean => {
            let arr = as_boolean_array(array);
            for i in 0..arr.len() {
                strings.push(if arr.is_null(i) {
                    String::new()
                } else {
                    arr.value(i).to_string()
                });
            }
        }
        DataType::Int8 => primitive_column::<Int8Type>(array, &mut strings),
        DataType::Int16 => primitive_column::<Int16Type>(array, &mut strings),
        DataType::Int32 => primitive_column::<Int32Type>(array, &mut strings),
        DataType::Int64 => primitive_column::<Int64Type>(array, &mut strings),
        DataType::UInt8 => primitive_column::<UInt8Type>(array, &mut strings),
        DataType::UInt16 => primitive_column::<UInt16Type>(array, &mut strings),
        DataType::UInt32 => primitive_column::<UInt32Type>(array, &mut strings),
        DataType::UInt64 => primitive_column::<UInt64Type>(array, &mut strings),
        DataType::Float32 => primitive_column::<Float32Type>(array, &mut strings),
        DataType::Float64 => primitive_column::<Float64Type>(array, &mut strings),
        DataType::Utf8 => {
            let arr = as_string_array(array);
            for i in 0..arr.len() {
                strings.push(if arr.is_null(i) {
                    String::new()
                } else {
                    arr.value(i).to_string()
                });
            }
        }
        DataType::LargeUtf8 => {
            let arr = as_largestring_array(array);
            for i in 0..arr.len() {
                strings.push(if arr.is_null(i) {
                    String::new()
                } else {
                    arr.value(i).to_string()
                });
            }
        }
        DataType::Binary => {
            let arr = as_generic_binary_array::<i32>(array);
            for i in 0..arr.len() {
                strings.push(if arr.is_null(i) {
                    String::new()
                } else {
                    hex::encode(arr.value(i))
                });
            }
        }
        DataType::LargeBinary => {
            let arr = as_generic_binary_array::<i64>(array);
            for i in 0..arr.len() {
                strings.push(if arr.is_null(i) {
                    String::new()
                } else {
                    hex::encode(arr.value(i))
                });
            }
        }
        DataType::Date32 => {
            datetime_column::<Date32Type>(name, array, &mut strings, |days| {
                DateTime::from_timestamp(days as i64 * SECONDS_PER_DAY, 0)
            })?;
        }
        DataType::Date64 => {
            datetime_column::<Date64Type>(name, array, &mut strings, |millis| {
                DateTime::from_timestamp_millis(millis)
            })?;
        }
        DataType::Timestamp(unit, _) => {
            timestamp_column(name, array, unit, &mut strings)?;
        }
        DataType::Decimal128(_, scale) => {
            let arr = as_primitive_array::<Decimal128Type>(array);
            // Arrow permits negative scales; those values are whole numbers.
            let scale = (*scale).max(0) as u32;
            for i in 0..arr.len() {
                strings.push(if arr.is_null(i) {
                    String::new()
                } else {
                    format_decimal(&arr.value(i).to_string(), scale)
                });
            }
        }
        DataType::Decimal256(_, scale) => {
            let arr = as_primitive_array::<Decimal256Type>(array);
            let scale = (*scale).max(0) as u32;
            for i in 0..arr.len() {
                strings.push(if arr.is_null(i) {
                    String::new()
                } else {
                    format_decimal(&arr.value(i).to_string(), scale)
                });
            }
        }
        other => {
            return Err(LoadError::SourceRead(format!(
                "column '{}': unsupported Parquet type {:?}",
                name, other
            )));
        }
    }

    Ok(strings)
}

fn primitive_column<T: ArrowPrimitiveType>(array: &dyn Array, strings: &mut Vec<String>)
where
    T::Native: std::fmt::Display,
{
    let arr = as_primitive_array::<T>(array);
    for i in 0..arr.len() {
        strings.push(if arr.is_null(i) {
            String::new()
        } else {
            arr.value(i).to_string()
        });
    }
}

fn timestamp_column(
    name: &str,
    array: &dyn Array,
    unit: &TimeUnit,
    strings: &mut Vec<String>,
) -> Result<(), LoadError> {
    match unit {
        TimeUnit::Second => datetime_column::<TimestampSecondType>(name, array, strings, |secs| {
            DateTime::from_timestamp(secs, 0)
        }),
        TimeUnit::Millisecond => {
            datetime_column::<TimestampMillisecondType>(name, array, strings, |millis| {
                DateTime::from_timestamp_millis(millis)
            })
        }
        TimeUnit::Microsecond => {
            datetime_column::<TimestampMicrosecondType>(name, array, strings, |micros| {
                DateTime::from_timestamp_micros(micros)
            })
        }
        TimeUnit::Nanosecond => {
            datetime_column::<TimestampNanosecondType>(name, array, strings, |nanos| {
                Some(DateTime::from_timestamp_nanos(nanos))
            })
        }
    }
}

/// Render one date or timestamp column in the canonical representation.
fn datetime_column<T: ArrowPrimitiveType>(
    name: &str,
    array: &dyn Array,
    strings: &mut Vec<String>,
    to_datetime: impl Fn(T::Native) -> Option<DateTime<Utc>>,
) -> Result<(), LoadError> {
    let arr = as_primitive_array::<T>(array);
    for i in 0..arr.len() {
        strings.push(if arr.is_null(i) {
            String::new()
        } else {
            let datetime = to_datetime(arr.value(i)).ok_or_else(|| {
                LoadError::SourceRead(format!(
                    "column '{}': timestamp value out of the representable range",
                    name
                ))
            })?;
            format_datetime(datetime.naive_utc())
        });
    }
    Ok(())
}

/// Place the decimal point `scale` digits from the right of an unscaled
/// integer's base-10 rendering. The sign travels with the digits, so values
/// between -1 and 0 keep it. Works unchanged for both decimal widths.
fn format_decimal(unscaled: &str, scale: u32) -> String {
    if scale == 0 {
        return unscaled.to_string();
    }

    let (sign, digits) = match unscaled.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", unscaled),
    };

    let scale = scale as usize;
    let padded = if digits.len() <= scale {
        format!("{:0>width$}", digits, width = scale + 1)
    } else {
        digits.to_string()
    };
    let split = padded.len() - scale;
    format!("{}{}.{}", sign, &padded[..split], &padded[split..])
}
