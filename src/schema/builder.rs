//! Normalizes raw catalog rows into `Table`s.
//!
//! Tables keep catalog delivery order and columns keep ordinal order as
//! delivered by the reader; nothing is re-sorted here. Constraint grouping
//! happens at render time.

use crate::models::{Column, ColumnRow, Constraint, ConstraintRow, Table, TableRow};
use std::collections::HashMap;
use tracing::warn;

/// Join the three catalog result sets on (schema, table) identity.
///
/// Column or constraint rows whose table is missing from `tables` get a
/// placeholder table appended instead of failing the build.
pub fn build(
    tables: Vec<TableRow>,
    columns: Vec<ColumnRow>,
    constraints: Vec<ConstraintRow>,
) -> Vec<Table> {
    let mut builder = Builder::default();

    for row in tables {
        let mut table = Table::new(row.table_schema, row.table_name);
        table.table_description = row.table_description;
        builder.insert(table);
    }

    for row in columns {
        let column = Column {
            column_name: row.column_name,
            data_type: row.data_type,
            is_nullable: row.is_nullable,
            column_description: row.column_description,
        };
        builder
            .owner(&row.table_schema, &row.table_name)
            .columns
            .push(column);
    }

    for row in constraints {
        let constraint = Constraint {
            constraint_name: row.constraint_name,
            constraint_type: row.constraint_type,
            column_name: row.column_name,
            ordinal_position: row.ordinal_position,
            referenced_schema: row.referenced_schema,
            referenced_table: row.referenced_table,
            referenced_column: row.referenced_column,
            check_clause: row.check_clause,
            default_value: row.default_value,
        };
        builder
            .owner(&row.table_schema, &row.table_name)
            .constraints
            .push(constraint);
    }

    builder.tables
}

#[derive(Default)]
struct Builder {
    tables: Vec<Table>,
    index: HashMap<(String, String), usize>,
}

impl Builder {
    fn insert(&mut self, table: Table) -> usize {
        let key = (table.table_schema.clone(), table.table_name.clone());
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.tables.len();
        self.tables.push(table);
        self.index.insert(key, idx);
        idx
    }

    fn owner(&mut self, table_schema: &str, table_name: &str) -> &mut Table {
        let key = (table_schema.to_string(), table_name.to_string());
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                warn!(
                    table_schema = %table_schema,
                    table_name = %table_name,
                    "Catalog row references an unknown table, synthesizing it"
                );
                self.insert(Table::new(table_schema, table_name))
            }
        };
        &mut self.tables[idx]
    }
}
