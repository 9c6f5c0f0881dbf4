//! Schema snapshot: catalog read, model build, selection and rendering.
//!
//! A `SchemaSnapshot` is captured once per connection and never refreshed.
//! Schema changes made afterwards are only seen by a new snapshot.

pub mod builder;
pub mod render;
pub mod selection;

use crate::db::{CatalogReader, QueryExecutor};
use crate::error::DbResult;
use crate::models::Table;
use selection::{EXCLUDE_CONTEXT, INCLUDE_CONTEXT, verify_tables_exist};
use std::collections::HashMap;
use tracing::info;

/// Default number of sample rows rendered per table.
pub const DEFAULT_SAMPLE_ROWS: u32 = 3;

/// How a snapshot is captured and rendered.
#[derive(Debug, Clone)]
pub struct SchemaOptions {
    /// Restrict the catalog read to one schema.
    pub schema: Option<String>,
    /// Allow-list of bare table names. Empty means all tables.
    pub include: Vec<String>,
    /// Deny-list of bare table names, applied after `include`.
    pub exclude: Vec<String>,
    /// Per-table descriptions that take precedence over catalog descriptions.
    pub custom_descriptions: HashMap<String, String>,
    pub sample_rows: u32,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            schema: None,
            include: Vec::new(),
            exclude: Vec::new(),
            custom_descriptions: HashMap::new(),
            sample_rows: DEFAULT_SAMPLE_ROWS,
        }
    }
}

/// Immutable schema model of one database connection.
#[derive(Debug, Clone)]
pub struct SchemaSnapshot {
    tables: Vec<Table>,
    options: SchemaOptions,
}

impl SchemaSnapshot {
    /// Read the catalog, build the model and validate the configured lists.
    ///
    /// Fails if any catalog query fails or if `include`/`exclude` name a
    /// table the catalog does not have. Custom descriptions for unknown tables
    /// are dropped.
    pub async fn capture(executor: &dyn QueryExecutor, options: SchemaOptions) -> DbResult<Self> {
        let rows = CatalogReader::new(executor, options.schema.as_deref())
            .read()
            .await?;
        let tables = builder::build(rows.tables, rows.columns, rows.constraints);
        let snapshot = Self::from_tables(tables, options)?;

        info!(
            tables = snapshot.tables.len(),
            selected = snapshot.selected().len(),
            "Schema snapshot captured"
        );
        Ok(snapshot)
    }

    /// Wrap an already-built model, applying the same validation as `capture`.
    pub fn from_tables(tables: Vec<Table>, mut options: SchemaOptions) -> DbResult<Self> {
        options
            .custom_descriptions
            .retain(|name, _| tables.iter().any(|t| &t.table_name == name));
        verify_tables_exist(&tables, &options.include, INCLUDE_CONTEXT)?;
        verify_tables_exist(&tables, &options.exclude, EXCLUDE_CONTEXT)?;

        Ok(Self { tables, options })
    }

    /// Every table in the snapshot, selection ignored.
    pub fn all_tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn options(&self) -> &SchemaOptions {
        &self.options
    }

    /// Tables left after the include and exclude lists.
    pub fn selected(&self) -> Vec<&Table> {
        selection::apply_lists(&self.tables, &self.options.include, &self.options.exclude)
    }

    /// Selected tables, or exactly `targets` when given and non-empty.
    pub fn select(&self, targets: Option<&[String]>) -> DbResult<Vec<&Table>> {
        selection::select(
            &self.tables,
            &self.options.include,
            &self.options.exclude,
            targets,
        )
    }

    /// Description shown for `table`: custom first, then the catalog's.
    pub fn description_of<'a>(&'a self, table: &'a Table) -> Option<&'a str> {
        self.options
            .custom_descriptions
            .get(&table.table_name)
            .map(String::as_str)
            .or(table.table_description.as_deref())
    }

    /// Pseudo-DDL with sample rows for the selection or `targets`.
    pub async fn render(
        &self,
        executor: &dyn QueryExecutor,
        targets: Option<&[String]>,
    ) -> DbResult<String> {
        let tables = self.select(targets)?;
        Ok(render::render(
            &tables,
            executor,
            self.options.sample_rows,
            &self.options.custom_descriptions,
        )
        .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;

    fn tables() -> Vec<Table> {
        vec![
            Table::new("dbo", "Orders").with_description("from catalog"),
            Table::new("dbo", "Customers"),
        ]
    }

    #[test]
    fn test_unknown_include_fails_fast() {
        let options = SchemaOptions {
            include: vec!["Orderz".into()],
            ..Default::default()
        };
        let err = SchemaSnapshot::from_tables(tables(), options).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Include tables not found in database: the table Orderz was not found in the database"
        );
    }

    #[test]
    fn test_unknown_exclude_fails_fast() {
        let options = SchemaOptions {
            exclude: vec!["Audit".into()],
            ..Default::default()
        };
        let err = SchemaSnapshot::from_tables(tables(), options).unwrap_err();
        assert!(matches!(err, DbError::TableNotFound { ref context, .. } if context == EXCLUDE_CONTEXT));
    }

    #[test]
    fn test_custom_descriptions_for_unknown_tables_are_dropped() {
        let options = SchemaOptions {
            custom_descriptions: HashMap::from([
                ("Customers".to_string(), "People who buy".to_string()),
                ("Ghost".to_string(), "Not here".to_string()),
            ]),
            ..Default::default()
        };
        let snapshot = SchemaSnapshot::from_tables(tables(), options).unwrap();
        assert_eq!(snapshot.options().custom_descriptions.len(), 1);

        let customers = &snapshot.all_tables()[1];
        assert_eq!(snapshot.description_of(customers), Some("People who buy"));
        let orders = &snapshot.all_tables()[0];
        assert_eq!(snapshot.description_of(orders), Some("from catalog"));
    }

    #[test]
    fn test_selected_applies_lists() {
        let options = SchemaOptions {
            exclude: vec!["Orders".into()],
            ..Default::default()
        };
        let snapshot = SchemaSnapshot::from_tables(tables(), options).unwrap();
        let names: Vec<_> = snapshot.selected().iter().map(|t| t.qualified_name()).collect();
        assert_eq!(names, vec!["dbo.Customers"]);

        let targeted = snapshot.select(Some(&["Orders".to_string()])).unwrap();
        assert_eq!(targeted[0].table_name, "Orders");
    }

    #[test]
    fn test_default_sample_rows() {
        assert_eq!(SchemaOptions::default().sample_rows, 3);
    }
}
