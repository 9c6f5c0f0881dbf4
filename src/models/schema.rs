//! Schema model types.
//!
//! The normalized, in-memory form of the catalog: tables owning their columns
//! and constraints. Built once per snapshot and never mutated afterwards.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of table constraint. Variant order is the rendering order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum ConstraintType {
    #[serde(rename = "PRIMARY KEY")]
    PrimaryKey,
    #[serde(rename = "FOREIGN KEY")]
    ForeignKey,
    #[serde(rename = "UNIQUE")]
    Unique,
    #[serde(rename = "CHECK")]
    Check,
    #[serde(rename = "DEFAULT")]
    Default,
}

impl ConstraintType {
    /// SQL keyword for this constraint type.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::PrimaryKey => "PRIMARY KEY",
            Self::ForeignKey => "FOREIGN KEY",
            Self::Unique => "UNIQUE",
            Self::Check => "CHECK",
            Self::Default => "DEFAULT",
        }
    }
}

impl std::fmt::Display for ConstraintType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Column {
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_description: Option<String>,
}

impl Column {
    pub fn new(
        column_name: impl Into<String>,
        data_type: impl Into<String>,
        is_nullable: bool,
    ) -> Self {
        Self {
            column_name: column_name.into(),
            data_type: data_type.into(),
            is_nullable,
            column_description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.column_description = Some(description.into());
        self
    }

    /// Binary payloads are useless as prompt context and can be huge.
    pub fn is_binary(&self) -> bool {
        let lower = self.data_type.to_ascii_lowercase();
        lower == "binary" || lower == "image"
    }
}

/// One member column of a (possibly composite) constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Constraint {
    pub constraint_name: String,
    pub constraint_type: ConstraintType,
    pub column_name: String,
    pub ordinal_position: i64,
    /// FOREIGN KEY only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_schema: Option<String>,
    /// FOREIGN KEY only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_table: Option<String>,
    /// FOREIGN KEY only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_column: Option<String>,
    /// CHECK only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_clause: Option<String>,
    /// DEFAULT only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl Constraint {
    pub fn new(
        constraint_name: impl Into<String>,
        constraint_type: ConstraintType,
        column_name: impl Into<String>,
        ordinal_position: i64,
    ) -> Self {
        Self {
            constraint_name: constraint_name.into(),
            constraint_type,
            column_name: column_name.into(),
            ordinal_position,
            referenced_schema: None,
            referenced_table: None,
            referenced_column: None,
            check_clause: None,
            default_value: None,
        }
    }

    pub fn references(
        mut self,
        schema: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        self.referenced_schema = Some(schema.into());
        self.referenced_table = Some(table.into());
        self.referenced_column = Some(column.into());
        self
    }

    pub fn with_check(mut self, clause: impl Into<String>) -> Self {
        self.check_clause = Some(clause.into());
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Table {
    pub table_name: String,
    pub table_schema: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_description: Option<String>,
    /// Catalog ordinal order
    pub columns: Vec<Column>,
    pub constraints: Vec<Constraint>,
}

impl Table {
    pub fn new(table_schema: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            table_schema: table_schema.into(),
            table_description: None,
            columns: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.table_description = Some(description.into());
        self
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// `schema.name`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.table_schema, self.table_name)
    }

    /// Whether this table is identified by the given (schema, name) pair.
    pub fn is(&self, table_schema: &str, table_name: &str) -> bool {
        self.table_schema == table_schema && self.table_name == table_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_type_sql() {
        assert_eq!(ConstraintType::PrimaryKey.as_sql(), "PRIMARY KEY");
        assert_eq!(ConstraintType::Default.to_string(), "DEFAULT");
    }

    #[test]
    fn test_constraint_type_serde_uses_sql_keyword() {
        let json = serde_json::to_string(&ConstraintType::ForeignKey).unwrap();
        assert_eq!(json, "\"FOREIGN KEY\"");
    }

    #[test]
    fn test_column_is_binary() {
        assert!(Column::new("Photo", "image", true).is_binary());
        assert!(Column::new("Hash", "BINARY", false).is_binary());
        assert!(!Column::new("Data", "varbinary", true).is_binary());
        assert!(!Column::new("Name", "nvarchar", true).is_binary());
    }

    #[test]
    fn test_table_identity() {
        let table = Table::new("dbo", "Orders");
        assert!(table.is("dbo", "Orders"));
        assert!(!table.is("sales", "Orders"));
        assert_eq!(table.qualified_name(), "dbo.Orders");
    }
}
