//! Database-agnostic type mappings.
//!
//! Rows coming back from either backend are flattened into JSON maps so the
//! catalog reader, the serializer and the tools all work on one representation.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies declared column types into logical categories
//! 2. Backend-specific decoders handle the actual value extraction
//!
//! SQLite is dynamically typed, so its decoder dispatches on the storage class
//! of each value and only consults the declared category to recover booleans
//! and JSON text. SQL Server values arrive already tagged (`ColumnData`).

use crate::models::{ColumnMetadata, DatabaseType};
use serde_json::Value as JsonValue;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    Json,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric/Money - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") || lower.contains("money") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower.contains("int") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" || lower == "bit" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "image" {
        return TypeCategory::Binary;
    }

    // Everything else (varchar, text, date, time, uniqueidentifier, ...) decodes as text
    TypeCategory::Unknown
}

// =============================================================================
// Binary Encoding
// =============================================================================

/// Encode binary data as a JSON string (base64).
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    JsonValue::String(STANDARD.encode(bytes))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue>;
    fn get_column_metadata(&self) -> Vec<ColumnMetadata>;
}

impl RowToJson for SqliteRow {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), DatabaseType::SQLite);
                let value = sqlite::decode_column(self, idx, category);
                (col.name().to_string(), value)
            })
            .collect()
    }

    fn get_column_metadata(&self) -> Vec<ColumnMetadata> {
        self.columns()
            .iter()
            .map(|col| ColumnMetadata::new(col.name(), col.type_info().name()))
            .collect()
    }
}

impl RowToJson for tiberius::Row {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.cells()
            .map(|(col, data)| (col.name().to_string(), mssql::decode_column(data)))
            .collect()
    }

    fn get_column_metadata(&self) -> Vec<ColumnMetadata> {
        self.columns()
            .iter()
            .map(|col| ColumnMetadata::new(col.name(), format!("{:?}", col.column_type())))
            .collect()
    }
}

// =============================================================================
// Backend-Specific Decoders
// =============================================================================

mod sqlite {
    use super::*;

    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> JsonValue {
        let storage = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return JsonValue::Null,
            Ok(raw) => raw.type_info().name().to_string(),
            Err(_) => return JsonValue::Null,
        };

        match storage.as_str() {
            "INTEGER" if category == TypeCategory::Boolean => decode_boolean(row, idx),
            "INTEGER" => decode_integer(row, idx),
            "REAL" => decode_float(row, idx),
            "BLOB" => decode_binary_col(row, idx),
            _ => decode_text(row, idx, category),
        }
    }

    fn decode_integer(row: &SqliteRow, idx: usize) -> JsonValue {
        row.try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(|v| JsonValue::Number(v.into()))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_boolean(row: &SqliteRow, idx: usize) -> JsonValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_float(row: &SqliteRow, idx: usize) -> JsonValue {
        row.try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .map(float_value)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_binary_col(row: &SqliteRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| encode_binary(&v))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_text(row: &SqliteRow, idx: usize, category: TypeCategory) -> JsonValue {
        if let Ok(Some(v)) = row.try_get_unchecked::<Option<String>, _>(idx) {
            if category == TypeCategory::Json {
                if let Ok(json) = serde_json::from_str::<JsonValue>(&v) {
                    return json;
                }
            }
            return JsonValue::String(v);
        }
        JsonValue::Null
    }
}

mod mssql {
    use super::*;
    use tiberius::{ColumnData, FromSql};

    pub fn decode_column(data: &ColumnData<'static>) -> JsonValue {
        match data {
            ColumnData::U8(v) => v.map(|v| JsonValue::Number(v.into())).unwrap_or_default(),
            ColumnData::I16(v) => v.map(|v| JsonValue::Number(v.into())).unwrap_or_default(),
            ColumnData::I32(v) => v.map(|v| JsonValue::Number(v.into())).unwrap_or_default(),
            ColumnData::I64(v) => v.map(|v| JsonValue::Number(v.into())).unwrap_or_default(),
            ColumnData::F32(v) => v.map(|v| float_value(v as f64)).unwrap_or_default(),
            ColumnData::F64(v) => v.map(float_value).unwrap_or_default(),
            ColumnData::Bit(v) => v.map(JsonValue::Bool).unwrap_or_default(),
            ColumnData::String(v) => v
                .as_ref()
                .map(|s| JsonValue::String(s.to_string()))
                .unwrap_or_default(),
            ColumnData::Guid(v) => v
                .as_ref()
                .map(|g| JsonValue::String(g.to_string()))
                .unwrap_or_default(),
            ColumnData::Binary(v) => v.as_ref().map(|b| encode_binary(b)).unwrap_or_default(),
            // Keep the exact decimal representation
            ColumnData::Numeric(v) => v
                .as_ref()
                .map(|n| JsonValue::String(n.to_string()))
                .unwrap_or_default(),
            other => decode_temporal(other),
        }
    }

    fn decode_temporal(data: &ColumnData<'static>) -> JsonValue {
        if let Ok(Some(v)) = chrono::NaiveDateTime::from_sql(data) {
            return JsonValue::String(v.to_string());
        }
        if let Ok(Some(v)) = chrono::NaiveDate::from_sql(data) {
            return JsonValue::String(v.to_string());
        }
        if let Ok(Some(v)) = chrono::NaiveTime::from_sql(data) {
            return JsonValue::String(v.to_string());
        }
        if let Ok(Some(v)) = chrono::DateTime::<chrono::FixedOffset>::from_sql(data) {
            return JsonValue::String(v.to_rfc3339());
        }
        JsonValue::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(
            categorize_type("INT", DatabaseType::MsSql),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("bigint", DatabaseType::MsSql),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("INTEGER", DatabaseType::SQLite),
            TypeCategory::Integer
        );
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(
            categorize_type("decimal", DatabaseType::MsSql),
            TypeCategory::Decimal
        );
        assert_eq!(
            categorize_type("money", DatabaseType::MsSql),
            TypeCategory::Decimal
        );
        // SQLite NUMERIC is a float
        assert_eq!(
            categorize_type("numeric", DatabaseType::SQLite),
            TypeCategory::Float
        );
    }

    #[test]
    fn test_categorize_type_boolean_and_binary() {
        assert_eq!(
            categorize_type("bit", DatabaseType::MsSql),
            TypeCategory::Boolean
        );
        assert_eq!(
            categorize_type("BOOLEAN", DatabaseType::SQLite),
            TypeCategory::Boolean
        );
        assert_eq!(
            categorize_type("varbinary", DatabaseType::MsSql),
            TypeCategory::Binary
        );
        assert_eq!(
            categorize_type("image", DatabaseType::MsSql),
            TypeCategory::Binary
        );
    }

    #[test]
    fn test_categorize_type_text_fallback() {
        assert_eq!(
            categorize_type("nvarchar", DatabaseType::MsSql),
            TypeCategory::Unknown
        );
        assert_eq!(
            categorize_type("datetime2", DatabaseType::MsSql),
            TypeCategory::Unknown
        );
    }

    #[test]
    fn test_encode_binary() {
        assert_eq!(
            encode_binary(b"hello world"),
            JsonValue::String("aGVsbG8gd29ybGQ=".to_string())
        );
        assert_eq!(encode_binary(&[]), JsonValue::String(String::new()));
    }

    #[test]
    fn test_float_value_non_finite() {
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
        assert_eq!(float_value(f64::NAN), JsonValue::String("NaN".to_string()));
    }

    #[test]
    fn test_mssql_decode_tagged_values() {
        use std::borrow::Cow;
        use tiberius::ColumnData;

        assert_eq!(
            mssql::decode_column(&ColumnData::I32(Some(7))),
            serde_json::json!(7)
        );
        assert_eq!(mssql::decode_column(&ColumnData::I32(None)), JsonValue::Null);
        assert_eq!(
            mssql::decode_column(&ColumnData::String(Some(Cow::Borrowed("Widget")))),
            serde_json::json!("Widget")
        );
        assert_eq!(
            mssql::decode_column(&ColumnData::Bit(Some(true))),
            JsonValue::Bool(true)
        );
    }
}
