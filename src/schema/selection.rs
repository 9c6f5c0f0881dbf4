//! Table selection: include/exclude lists and explicit targets.
//!
//! Matching is by bare table name, never schema-qualified.

use crate::error::{DbError, DbResult};
use crate::models::Table;

/// Error prefix for a configured include list naming an unknown table.
pub const INCLUDE_CONTEXT: &str = "Include tables not found in database:";
/// Error prefix for a configured exclude list naming an unknown table.
pub const EXCLUDE_CONTEXT: &str = "Ignore tables not found in database:";
/// Error prefix for explicit targets naming an unknown table.
pub const TARGET_CONTEXT: &str = "Wrong target table name:";

/// Fail on the first name in `names` that no table in `tables` carries.
pub fn verify_tables_exist(tables: &[Table], names: &[String], context: &str) -> DbResult<()> {
    for name in names {
        if !tables.iter().any(|t| &t.table_name == name) {
            return Err(DbError::table_not_found(context, name));
        }
    }
    Ok(())
}

/// Apply the include list, then the exclude list.
///
/// Non-empty `targets` override both and must all exist.
pub fn select<'t>(
    tables: &'t [Table],
    include: &[String],
    exclude: &[String],
    targets: Option<&[String]>,
) -> DbResult<Vec<&'t Table>> {
    if let Some(targets) = targets.filter(|t| !t.is_empty()) {
        verify_tables_exist(tables, targets, TARGET_CONTEXT)?;
        return Ok(tables
            .iter()
            .filter(|t| targets.contains(&t.table_name))
            .collect());
    }

    Ok(apply_lists(tables, include, exclude))
}

/// Include list (when non-empty) then exclude list, by bare name.
pub fn apply_lists<'t>(tables: &'t [Table], include: &[String], exclude: &[String]) -> Vec<&'t Table> {
    tables
        .iter()
        .filter(|t| include.is_empty() || include.contains(&t.table_name))
        .filter(|t| !exclude.contains(&t.table_name))
        .collect()
}
