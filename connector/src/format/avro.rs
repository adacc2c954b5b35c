// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Avro object container codec
//!
//! Nullable columns become `["null", T]` unions. DATE and TIMESTAMP use
//! the `date` and `timestamp-micros` logical types.

use apache_avro::types::Value as AvroValue;
use apache_avro::{Reader, Schema as AvroSchema, Writer};
use serde_json::json;

use super::{
    check_rows, date_from_days, days_since_epoch, timestamp_from_micros, BatchCodec, CodecError,
    CodecResult, DataFormat,
};
use crate::types::{Field, FieldType, Row, Schema, Value};

const RECORD_NAME: &str = "Row";

/// Avro container-file encoder/decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct AvroCodec;

fn avro_type(field_type: FieldType) -> serde_json::Value {
    match field_type {
        FieldType::Int64 => json!("long"),
        FieldType::Float64 => json!("double"),
        FieldType::Bool => json!("boolean"),
        FieldType::String => json!("string"),
        FieldType::Bytes => json!("bytes"),
        FieldType::Date => json!({"type": "int", "logicalType": "date"}),
        FieldType::Timestamp => json!({"type": "long", "logicalType": "timestamp-micros"}),
    }
}

/// Avro record schema equivalent of a warehouse schema
pub fn to_avro_schema(schema: &Schema) -> CodecResult<AvroSchema> {
    let fields: Vec<serde_json::Value> = schema
        .fields
        .iter()
        .map(|f| {
            let ty = avro_type(f.field_type);
            let ty = if f.nullable { json!(["null", ty]) } else { ty };
            json!({"name": f.name, "type": ty})
        })
        .collect();
    let document = json!({"type": "record", "name": RECORD_NAME, "fields": fields});
    AvroSchema::parse_str(&document.to_string()).map_err(|e| CodecError::Schema(e.to_string()))
}

fn to_avro_value(field: &Field, value: &Value) -> AvroValue {
    let inner = match value {
        Value::Null => AvroValue::Null,
        Value::Int64(v) => AvroValue::Long(*v),
        Value::Float64(v) => AvroValue::Double(*v),
        Value::Bool(v) => AvroValue::Boolean(*v),
        Value::String(v) => AvroValue::String(v.clone()),
        Value::Bytes(v) => AvroValue::Bytes(v.clone()),
        Value::Date(d) => AvroValue::Date(days_since_epoch(d)),
        Value::Timestamp(ts) => AvroValue::TimestampMicros(ts.timestamp_micros()),
    };
    if !field.nullable {
        return inner;
    }
    match inner {
        AvroValue::Null => AvroValue::Union(0, Box::new(AvroValue::Null)),
        other => AvroValue::Union(1, Box::new(other)),
    }
}

fn from_avro_value(field: &Field, value: AvroValue, row: usize) -> CodecResult<Value> {
    let value = match value {
        AvroValue::Union(_, inner) => *inner,
        other => other,
    };
    let mismatch = |actual: &AvroValue| CodecError::TypeMismatch {
        column: field.name.clone(),
        expected: field.field_type.to_string(),
        actual: format!("{:?}", actual),
        row,
    };
    let converted = match (field.field_type, value) {
        (_, AvroValue::Null) => {
            if !field.nullable {
                return Err(CodecError::NullInRequiredColumn {
                    column: field.name.clone(),
                    row,
                });
            }
            Value::Null
        }
        (FieldType::Int64, AvroValue::Long(v)) => Value::Int64(v),
        (FieldType::Int64, AvroValue::Int(v)) => Value::Int64(i64::from(v)),
        (FieldType::Float64, AvroValue::Double(v)) => Value::Float64(v),
        (FieldType::Bool, AvroValue::Boolean(v)) => Value::Bool(v),
        (FieldType::String, AvroValue::String(v)) => Value::String(v),
        (FieldType::Bytes, AvroValue::Bytes(v)) => Value::Bytes(v),
        (FieldType::Date, AvroValue::Date(days)) => Value::Date(date_from_days(days)?),
        (FieldType::Timestamp, AvroValue::TimestampMicros(us)) => {
            Value::Timestamp(timestamp_from_micros(us)?)
        }
        (_, other) => return Err(mismatch(&other)),
    };
    Ok(converted)
}

fn record_to_row(schema: &Schema, value: AvroValue, row: usize) -> CodecResult<Row> {
    let fields = match value {
        AvroValue::Record(fields) => fields,
        other => {
            return Err(CodecError::Decode(format!(
                "expected a record at row {}, got {:?}",
                row, other
            )))
        }
    };
    if fields.len() != schema.len() {
        return Err(CodecError::Schema(format!(
            "record has {} fields, expected {}",
            fields.len(),
            schema.len()
        )));
    }
    let mut values = Vec::with_capacity(schema.len());
    for (field, (name, value)) in schema.fields.iter().zip(fields) {
        if !name.eq_ignore_ascii_case(&field.name) {
            return Err(CodecError::Schema(format!(
                "record field '{}' does not match column '{}'",
                name, field.name
            )));
        }
        values.push(from_avro_value(field, value, row)?);
    }
    Ok(Row::new(values))
}

impl BatchCodec for AvroCodec {
    fn format(&self) -> DataFormat {
        DataFormat::Avro
    }

    fn encode(&self, schema: &Schema, rows: &[Row]) -> CodecResult<Vec<u8>> {
        check_rows(schema, rows)?;
        let avro_schema = to_avro_schema(schema)?;
        let mut writer = Writer::new(&avro_schema, Vec::new());
        for row in rows {
            let record = schema
                .fields
                .iter()
                .zip(row.values.iter())
                .map(|(field, value)| (field.name.clone(), to_avro_value(field, value)))
                .collect();
            writer
                .append(AvroValue::Record(record))
                .map_err(|e| CodecError::Encode(e.to_string()))?;
        }
        writer
            .into_inner()
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, schema: &Schema, bytes: &[u8]) -> CodecResult<Vec<Row>> {
        let reader = Reader::new(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
        let mut rows = Vec::new();
        for (index, value) in reader.enumerate() {
            let value = value.map_err(|e| CodecError::Decode(e.to_string()))?;
            rows.push(record_to_row(schema, value, index)?);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    #[test]
    fn test_round_trip_preserves_values_and_nulls() {
        let schema = Schema::new(vec![
            Field::required("number", FieldType::Int64),
            Field::nullable("text", FieldType::String),
            Field::nullable("ratio", FieldType::Float64),
            Field::nullable("flag", FieldType::Bool),
            Field::nullable("blob", FieldType::Bytes),
            Field::nullable("day", FieldType::Date),
            Field::required("ts", FieldType::Timestamp),
        ]);
        let ts = Utc.with_ymd_and_hms(1999, 12, 31, 23, 59, 59).unwrap();
        let rows = vec![
            Row::new(vec![
                Value::Int64(123),
                Value::from("hello"),
                Value::Float64(f64::MAX),
                Value::Bool(false),
                Value::Bytes(vec![]),
                Value::Date(NaiveDate::from_ymd_opt(2000, 2, 29).unwrap()),
                Value::Timestamp(ts),
            ]),
            Row::new(vec![
                Value::Int64(999),
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Timestamp(ts),
            ]),
        ];

        let bytes = AvroCodec.encode(&schema, &rows).unwrap();
        assert_eq!(AvroCodec.decode(&schema, &bytes).unwrap(), rows);
    }

    #[test]
    fn test_encode_rejects_wrong_type() {
        let schema = Schema::new(vec![Field::nullable("number", FieldType::Int64)]);
        let err = AvroCodec
            .encode(&schema, &[Row::new(vec![Value::from("999")])])
            .unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { .. }));
    }

    #[test]
    fn test_garbage_input_is_a_decode_error() {
        let schema = Schema::new(vec![Field::nullable("number", FieldType::Int64)]);
        assert!(matches!(
            AvroCodec.decode(&schema, b"not avro"),
            Err(CodecError::Decode(_))
        ));
    }
}
