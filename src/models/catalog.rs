//! Raw catalog row shapes.
//!
//! One record per result set returned by the catalog reader. Field names map
//! onto the column aliases used by the catalog queries, so a decoded row can
//! be deserialized straight from the executor's JSON map.

use serde::{Deserialize, Deserializer, Serialize};

use super::schema::ConstraintType;

/// A row of the tables query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    #[serde(rename = "TABLE_SCHEMA")]
    pub table_schema: String,
    #[serde(rename = "TABLE_NAME")]
    pub table_name: String,
    #[serde(rename = "TABLE_DESCRIPTION", default, deserialize_with = "non_empty")]
    pub table_description: Option<String>,
}

/// A row of the columns query, delivered in ordinal order per table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRow {
    #[serde(rename = "TABLE_SCHEMA")]
    pub table_schema: String,
    #[serde(rename = "TABLE_NAME")]
    pub table_name: String,
    #[serde(rename = "COLUMN_NAME")]
    pub column_name: String,
    #[serde(rename = "DATA_TYPE", default)]
    pub data_type: String,
    #[serde(rename = "IS_NULLABLE", deserialize_with = "yes_no")]
    pub is_nullable: bool,
    #[serde(rename = "COLUMN_DESCRIPTION", default, deserialize_with = "non_empty")]
    pub column_description: Option<String>,
    #[serde(rename = "ORDINAL_POSITION", default)]
    pub ordinal_position: i64,
}

/// A row of the constraints query. One row per (constraint, member column).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintRow {
    #[serde(rename = "TABLE_SCHEMA")]
    pub table_schema: String,
    #[serde(rename = "TABLE_NAME")]
    pub table_name: String,
    #[serde(rename = "CONSTRAINT_NAME")]
    pub constraint_name: String,
    #[serde(rename = "ConstraintType")]
    pub constraint_type: ConstraintType,
    #[serde(rename = "COLUMN_NAME")]
    pub column_name: String,
    #[serde(rename = "ORDINAL_POSITION", default)]
    pub ordinal_position: i64,
    #[serde(rename = "ReferencedSchema", default, deserialize_with = "non_empty")]
    pub referenced_schema: Option<String>,
    #[serde(rename = "ReferencedTable", default, deserialize_with = "non_empty")]
    pub referenced_table: Option<String>,
    #[serde(rename = "ReferencedColumn", default, deserialize_with = "non_empty")]
    pub referenced_column: Option<String>,
    #[serde(rename = "CheckClause", default, deserialize_with = "non_empty")]
    pub check_clause: Option<String>,
    #[serde(rename = "DefaultValue", default, deserialize_with = "non_empty")]
    pub default_value: Option<String>,
}

/// Accepts `YES`/`NO` (INFORMATION_SCHEMA), booleans and 0/1.
fn yes_no<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;

    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s.eq_ignore_ascii_case("yes") || s == "1"),
        Value::Bool(b) => Ok(b),
        Value::Number(n) => Ok(n.as_i64().is_some_and(|v| v != 0)),
        Value::Null => Ok(true),
        other => Err(serde::de::Error::custom(format!(
            "expected YES/NO, got {}",
            other
        ))),
    }
}

/// Treats null, blank strings and non-string scalars uniformly.
fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;

    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}
