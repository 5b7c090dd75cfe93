//! Conversion of driver rows into [`Record`]s.
//!
//! Each backend decodes by the type of the value actually returned, falling
//! back to text and then raw bytes so that no column type makes
//! materialization fail.

use sqlx::mysql::MySqlRow;
use sqlx::sqlite::SqliteRow;
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::{Column, Row, TypeInfo, ValueRef};

use super::types::{Record, Value};

/// A driver row whose cells can be decoded into [`Value`]s.
pub trait DecodeRow: Row {
    /// Decodes the cell at `index`, returning `Value::Null` for SQL NULL.
    fn decode_value(&self, index: usize) -> Value;
}

/// Converts a driver row into an ordered record keyed by column label.
pub fn decode_record<R: DecodeRow>(row: &R) -> Record {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| (col.name().to_string(), row.decode_value(i)))
        .collect()
}

/// Column labels of a driver row, in order.
pub fn column_labels<R: Row>(row: &R) -> Vec<String> {
    row.columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect()
}

impl DecodeRow for MySqlRow {
    fn decode_value(&self, index: usize) -> Value {
        let type_name = match self.try_get_raw(index) {
            Ok(raw) if raw.is_null() => return Value::Null,
            Ok(raw) => raw.type_info().name().to_uppercase(),
            Err(_) => return Value::Null,
        };

        let decoded = match type_name.as_str() {
            "BOOLEAN" => self.try_get::<bool, _>(index).ok().map(Value::Bool),

            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
                self.try_get::<i64, _>(index).ok().map(Value::Int)
            }

            "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
            | "BIGINT UNSIGNED" => self.try_get::<u64, _>(index).ok().map(Value::UInt),

            "FLOAT" => self
                .try_get::<f32, _>(index)
                .ok()
                .map(|v| Value::Float(v as f64)),

            "DOUBLE" => self.try_get::<f64, _>(index).ok().map(Value::Float),

            // DECIMAL travels as text in both protocols.
            "DECIMAL" => self
                .try_get_unchecked::<String, _>(index)
                .ok()
                .map(Value::Decimal),

            "DATE" => self
                .try_get::<NaiveDate, _>(index)
                .ok()
                .map(|v| Value::Temporal(v.to_string())),

            "TIME" => self
                .try_get::<NaiveTime, _>(index)
                .ok()
                .map(|v| Value::Temporal(v.to_string())),

            "DATETIME" => self
                .try_get::<NaiveDateTime, _>(index)
                .ok()
                .map(|v| Value::Temporal(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),

            "TIMESTAMP" => self
                .try_get::<DateTime<Utc>, _>(index)
                .ok()
                .map(|v| Value::Temporal(v.to_rfc3339())),

            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
            | "GEOMETRY" => self.try_get::<Vec<u8>, _>(index).ok().map(Value::Bytes),

            _ => self.try_get::<String, _>(index).ok().map(Value::String),
        };

        decoded.unwrap_or_else(|| {
            self.try_get_unchecked::<String, _>(index)
                .map(Value::String)
                .or_else(|_| self.try_get_unchecked::<Vec<u8>, _>(index).map(Value::Bytes))
                .unwrap_or(Value::Null)
        })
    }
}

impl DecodeRow for SqliteRow {
    fn decode_value(&self, index: usize) -> Value {
        // SQLite values carry their storage class, independent of the declared type.
        let type_name = match self.try_get_raw(index) {
            Ok(raw) if raw.is_null() => return Value::Null,
            Ok(raw) => raw.type_info().name().to_uppercase(),
            Err(_) => return Value::Null,
        };

        let decoded = match type_name.as_str() {
            "INTEGER" | "INT8" | "BIGINT" => self.try_get::<i64, _>(index).ok().map(Value::Int),
            "BOOLEAN" => self.try_get::<bool, _>(index).ok().map(Value::Bool),
            "REAL" | "NUMERIC" => self.try_get::<f64, _>(index).ok().map(Value::Float),
            "BLOB" => self.try_get::<Vec<u8>, _>(index).ok().map(Value::Bytes),
            "DATE" | "TIME" | "DATETIME" => self
                .try_get::<String, _>(index)
                .ok()
                .map(Value::Temporal),
            _ => self.try_get::<String, _>(index).ok().map(Value::String),
        };

        decoded.unwrap_or_else(|| {
            self.try_get_unchecked::<String, _>(index)
                .map(Value::String)
                .or_else(|_| self.try_get_unchecked::<Vec<u8>, _>(index).map(Value::Bytes))
                .unwrap_or(Value::Null)
        })
    }
}
