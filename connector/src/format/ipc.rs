// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Arrow IPC stream codec
//!
//! One serialized batch is a complete Arrow IPC *stream* (schema message,
//! record batches, end-of-stream marker), which is how read sessions hand
//! out Arrow data.

use std::io::Cursor;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BinaryBuilder, BooleanBuilder, Date32Builder, Float64Builder,
    Int64Builder, StringBuilder, TimestampMicrosecondBuilder,
};
use arrow::datatypes::{
    DataType, Date32Type, Field as ArrowField, Float64Type, Int64Type, Schema as ArrowSchema,
    SchemaRef, TimeUnit, TimestampMicrosecondType,
};
use arrow::error::ArrowError;
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;

use super::{
    check_rows, date_from_days, days_since_epoch, timestamp_from_micros, BatchCodec, CodecError,
    CodecResult, DataFormat,
};
use crate::types::{Field, FieldType, Row, Schema, Value};

const UTC: &str = "UTC";

/// Arrow IPC stream encoder/decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrowCodec;

fn arrow_type(field_type: FieldType) -> DataType {
    match field_type {
        FieldType::Int64 => DataType::Int64,
        FieldType::Float64 => DataType::Float64,
        FieldType::Bool => DataType::Boolean,
        FieldType::String => DataType::Utf8,
        FieldType::Bytes => DataType::Binary,
        FieldType::Date => DataType::Date32,
        FieldType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, Some(UTC.into())),
    }
}

/// Arrow schema equivalent of a warehouse schema
pub fn to_arrow_schema(schema: &Schema) -> SchemaRef {
    Arc::new(ArrowSchema::new(
        schema
            .fields
            .iter()
            .map(|f| ArrowField::new(&f.name, arrow_type(f.field_type), f.nullable))
            .collect::<Vec<_>>(),
    ))
}

fn encode_error(e: ArrowError) -> CodecError {
    CodecError::Encode(e.to_string())
}

fn decode_error(e: ArrowError) -> CodecError {
    CodecError::Decode(e.to_string())
}

fn build_column(field_type: FieldType, index: usize, rows: &[Row]) -> ArrayRef {
    let cells = rows.iter().map(|row| &row.values[index]);
    match field_type {
        FieldType::Int64 => {
            let mut builder = Int64Builder::with_capacity(rows.len());
            for cell in cells {
                match cell {
                    Value::Int64(v) => builder.append_value(*v),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        FieldType::Float64 => {
            let mut builder = Float64Builder::with_capacity(rows.len());
            for cell in cells {
                match cell {
                    Value::Float64(v) => builder.append_value(*v),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        FieldType::Bool => {
            let mut builder = BooleanBuilder::with_capacity(rows.len());
            for cell in cells {
                match cell {
                    Value::Bool(v) => builder.append_value(*v),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        FieldType::String => {
            let mut builder = StringBuilder::new();
            for cell in cells {
                match cell {
                    Value::String(v) => builder.append_value(v),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        FieldType::Bytes => {
            let mut builder = BinaryBuilder::new();
            for cell in cells {
                match cell {
                    Value::Bytes(v) => builder.append_value(v),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        FieldType::Date => {
            let mut builder = Date32Builder::with_capacity(rows.len());
            for cell in cells {
                match cell {
                    Value::Date(d) => builder.append_value(days_since_epoch(d)),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        FieldType::Timestamp => {
            let mut builder =
                TimestampMicrosecondBuilder::with_capacity(rows.len()).with_timezone(UTC);
            for cell in cells {
                match cell {
                    Value::Timestamp(ts) => builder.append_value(ts.timestamp_micros()),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
    }
}

fn column_values(field: &Field, array: &ArrayRef) -> CodecResult<Vec<Value>> {
    let len = array.len();
    let mut values = Vec::with_capacity(len);
    match (field.field_type, array.data_type()) {
        (FieldType::Int64, DataType::Int64) => {
            let a = array.as_primitive::<Int64Type>();
            for i in 0..len {
                values.push(if a.is_null(i) { Value::Null } else { Value::Int64(a.value(i)) });
            }
        }
        (FieldType::Float64, DataType::Float64) => {
            let a = array.as_primitive::<Float64Type>();
            for i in 0..len {
                values.push(if a.is_null(i) { Value::Null } else { Value::Float64(a.value(i)) });
            }
        }
        (FieldType::Bool, DataType::Boolean) => {
            let a = array.as_boolean();
            for i in 0..len {
                values.push(if a.is_null(i) { Value::Null } else { Value::Bool(a.value(i)) });
            }
        }
        (FieldType::String, DataType::Utf8) => {
            let a = array.as_string::<i32>();
            for i in 0..len {
                values.push(if a.is_null(i) {
                    Value::Null
                } else {
                    Value::String(a.value(i).to_string())
                });
            }
        }
        (FieldType::Bytes, DataType::Binary) => {
            let a = array.as_binary::<i32>();
            for i in 0..len {
                values.push(if a.is_null(i) {
                    Value::Null
                } else {
                    Value::Bytes(a.value(i).to_vec())
                });
            }
        }
        (FieldType::Date, DataType::Date32) => {
            let a = array.as_primitive::<Date32Type>();
            for i in 0..len {
                values.push(if a.is_null(i) {
                    Value::Null
                } else {
                    Value::Date(date_from_days(a.value(i))?)
                });
            }
        }
        (FieldType::Timestamp, DataType::Timestamp(TimeUnit::Microsecond, _)) => {
            let a = array.as_primitive::<TimestampMicrosecondType>();
            for i in 0..len {
                values.push(if a.is_null(i) {
                    Value::Null
                } else {
                    Value::Timestamp(timestamp_from_micros(a.value(i))?)
                });
            }
        }
        (expected, actual) => {
            return Err(CodecError::TypeMismatch {
                column: field.name.clone(),
                expected: expected.to_string(),
                actual: actual.to_string(),
                row: 0,
            })
        }
    }
    if !field.nullable {
        if let Some(row) = values.iter().position(Value::is_null) {
            return Err(CodecError::NullInRequiredColumn {
                column: field.name.clone(),
                row,
            });
        }
    }
    Ok(values)
}

fn batch_to_rows(schema: &Schema, batch: &RecordBatch) -> CodecResult<Vec<Row>> {
    if batch.num_columns() != schema.len() {
        return Err(CodecError::Schema(format!(
            "batch has {} columns, expected {}",
            batch.num_columns(),
            schema.len()
        )));
    }
    let columns = schema
        .fields
        .iter()
        .zip(batch.columns())
        .map(|(field, array)| column_values(field, array))
        .collect::<CodecResult<Vec<_>>>()?;

    let mut rows: Vec<Row> = (0..batch.num_rows())
        .map(|_| Row::new(Vec::with_capacity(schema.len())))
        .collect();
    for column in columns {
        for (row, value) in rows.iter_mut().zip(column) {
            row.values.push(value);
        }
    }
    Ok(rows)
}

impl BatchCodec for ArrowCodec {
    fn format(&self) -> DataFormat {
        DataFormat::Arrow
    }

    fn encode(&self, schema: &Schema, rows: &[Row]) -> CodecResult<Vec<u8>> {
        if schema.is_empty() {
            return Err(CodecError::Schema("cannot encode an empty schema".to_string()));
        }
        check_rows(schema, rows)?;

        let arrow_schema = to_arrow_schema(schema);
        let columns = schema
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| build_column(f.field_type, i, rows))
            .collect::<Vec<_>>();
        let batch = RecordBatch::try_new(arrow_schema.clone(), columns).map_err(encode_error)?;

        let mut buffer = Vec::new();
        {
            let mut writer =
                StreamWriter::try_new(&mut buffer, &arrow_schema).map_err(encode_error)?;
            writer.write(&batch).map_err(encode_error)?;
            writer.finish().map_err(encode_error)?;
        }
        Ok(buffer)
    }

    fn decode(&self, schema: &Schema, bytes: &[u8]) -> CodecResult<Vec<Row>> {
        let reader = StreamReader::try_new(Cursor::new(bytes), None).map_err(decode_error)?;
        let mut rows = Vec::new();
        for batch in reader {
            let batch = batch.map_err(decode_error)?;
            rows.extend(batch_to_rows(schema, &batch)?);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn all_types_schema() -> Schema {
        Schema::new(vec![
            Field::required("id", FieldType::Int64),
            Field::nullable("score", FieldType::Float64),
            Field::nullable("active", FieldType::Bool),
            Field::nullable("name", FieldType::String),
            Field::nullable("payload", FieldType::Bytes),
            Field::nullable("day", FieldType::Date),
            Field::nullable("seen_at", FieldType::Timestamp),
        ])
    }

    #[test]
    fn test_round_trip_preserves_values_and_nulls() {
        let schema = all_types_schema();
        let rows = vec![
            Row::new(vec![
                Value::Int64(i64::MIN),
                Value::Float64(-0.5),
                Value::Bool(true),
                Value::from("héllo"),
                Value::Bytes(vec![0, 255, 7]),
                Value::Date(NaiveDate::from_ymd_opt(1969, 7, 20).unwrap()),
                Value::Timestamp(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
            ]),
            Row::new(vec![
                Value::Int64(42),
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
            ]),
        ];

        let bytes = ArrowCodec.encode(&schema, &rows).unwrap();
        let decoded = ArrowCodec.decode(&schema, &bytes).unwrap();
        assert_eq!(decoded, rows);
    }

    #[test]
    fn test_encode_rejects_null_in_required_column() {
        let schema = all_types_schema();
        let mut values = vec![Value::Null; 7];
        values[1] = Value::Float64(1.0);
        let err = ArrowCodec.encode(&schema, &[Row::new(values)]).unwrap_err();
        assert_eq!(
            err,
            CodecError::NullInRequiredColumn {
                column: "id".to_string(),
                row: 0
            }
        );
    }

    #[test]
    fn test_decode_rejects_mismatched_schema() {
        let written = Schema::new(vec![Field::required("id", FieldType::Int64)]);
        let bytes = ArrowCodec
            .encode(&written, &[Row::new(vec![Value::Int64(1)])])
            .unwrap();
        let expected = Schema::new(vec![Field::required("id", FieldType::String)]);
        assert!(matches!(
            ArrowCodec.decode(&expected, &bytes),
            Err(CodecError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_batch() {
        let schema = all_types_schema();
        let bytes = ArrowCodec.encode(&schema, &[]).unwrap();
        assert!(ArrowCodec.decode(&schema, &bytes).unwrap().is_empty());
    }
}
