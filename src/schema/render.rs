//! Pseudo-DDL rendering of selected tables.
//!
//! Each table becomes one block:
//!
//! ```text
//! /* description */
//! CREATE TABLE [schema].[name] (
//!   column type NOT NULL CONSTRAINT pk PRIMARY KEY /* column description */,
//!   ...
//!   CONSTRAINT composite PRIMARY KEY (a, b)
//! )
//! SELECT TOP n a, b FROM [schema].[name];
//! a b c
//! 1 x
//! ```
//!
//! The output is meant as prompt context, not as re-executable DDL: values are
//! printed bare and data types are whatever the catalog reported.

use crate::db::QueryExecutor;
use crate::models::{Column, Constraint, ConstraintType, Table};
use crate::tools::format::format_value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Render `tables` in order, sampling up to `sample_rows` rows from each.
///
/// Tables are sampled one after the other. A failing sample query empties that
/// table's sample section and is logged; it never fails the render.
pub async fn render(
    tables: &[&Table],
    executor: &dyn QueryExecutor,
    sample_rows: u32,
    custom_descriptions: &HashMap<String, String>,
) -> String {
    let mut output = String::new();
    for table in tables {
        let description = custom_descriptions
            .get(&table.table_name)
            .map(String::as_str)
            .or(table.table_description.as_deref());
        output.push_str(&render_table(table, description, executor, sample_rows).await);
    }
    output
}

async fn render_table(
    table: &Table,
    description: Option<&str>,
    executor: &dyn QueryExecutor,
    sample_rows: u32,
) -> String {
    let mut block = String::new();

    if let Some(description) = description {
        block.push_str(&format!("/* {} */\n", description));
    }
    block.push_str(&create_table(table));

    let sample_query = sample_query(table, executor, sample_rows);
    if let Some(query) = &sample_query {
        block.push_str(query);
        block.push('\n');
    }

    block.push_str(&column_recap(table));
    block.push('\n');

    if let Some(query) = &sample_query {
        match executor.fetch(query, sample_rows).await {
            Ok(result) => {
                for index in 0..result.row_count() {
                    let line = result
                        .row_values(index)
                        .into_iter()
                        .map(format_value)
                        .collect::<Vec<_>>()
                        .join(" ");
                    block.push_str(&line);
                    block.push('\n');
                }
            }
            Err(e) => {
                warn!(
                    table = %table.qualified_name(),
                    error = %e,
                    "Sample query failed, leaving sample rows empty"
                );
            }
        }
    }

    block.push('\n');
    block
}

/// `CREATE TABLE` approximation with inline and trailing constraints.
pub fn create_table(table: &Table) -> String {
    let groups = group_constraints(&table.constraints);

    let mut entries = Vec::with_capacity(table.columns.len());
    for column in &table.columns {
        let mut entry = format!("{} {}", column.column_name, column.data_type);
        if !column.is_nullable {
            entry.push_str(" NOT NULL");
        }
        for group in groups.iter().filter(|g| g.is_inline_on(column)) {
            entry.push(' ');
            entry.push_str(&inline_clause(group.members[0]));
        }
        if let Some(description) = &column.column_description {
            entry.push_str(&format!(" /* {} */", description));
        }
        entries.push(entry);
    }

    let mut trailing: Vec<&ConstraintGroup<'_>> = groups
        .iter()
        .filter(|g| !table.columns.iter().any(|c| g.is_inline_on(c)))
        .collect();
    trailing.sort_by_key(|g| g.kind);
    entries.extend(trailing.into_iter().map(trailing_clause));

    let mut ddl = format!(
        "CREATE TABLE [{}].[{}] (\n",
        table.table_schema, table.table_name
    );
    if !entries.is_empty() {
        let body = entries
            .iter()
            .map(|e| format!("  {}", e))
            .collect::<Vec<_>>()
            .join(",\n");
        ddl.push_str(&body);
        ddl.push('\n');
    }
    ddl.push_str(")\n");
    ddl
}

/// Row-limited select over every non-binary column, or `None` when there is
/// nothing to sample.
pub fn sample_query(table: &Table, executor: &dyn QueryExecutor, sample_rows: u32) -> Option<String> {
    let columns: Vec<&str> = table
        .columns
        .iter()
        .filter(|c| !c.is_binary())
        .map(|c| c.column_name.as_str())
        .collect();

    if sample_rows == 0 || columns.is_empty() {
        debug!(table = %table.qualified_name(), "Skipping sample rows");
        return None;
    }

    Some(executor.dialect().limited_select(
        &columns,
        &table.table_schema,
        &table.table_name,
        sample_rows,
    ))
}

/// Every column name, binary ones included.
pub fn column_recap(table: &Table) -> String {
    table
        .columns
        .iter()
        .map(|c| c.column_name.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

// =============================================================================
// Constraint Grouping
// =============================================================================

/// Constraint rows sharing one name, members in ordinal order.
struct ConstraintGroup<'a> {
    name: &'a str,
    kind: ConstraintType,
    members: Vec<&'a Constraint>,
}

impl ConstraintGroup<'_> {
    /// Single-member groups render on their column.
    fn is_inline_on(&self, column: &Column) -> bool {
        self.members.len() == 1 && self.members[0].column_name == column.column_name
    }
}

/// Groups by constraint name, in order of first appearance.
fn group_constraints(constraints: &[Constraint]) -> Vec<ConstraintGroup<'_>> {
    let mut groups: Vec<ConstraintGroup<'_>> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for constraint in constraints {
        match index.get(constraint.constraint_name.as_str()) {
            Some(&idx) => groups[idx].members.push(constraint),
            None => {
                index.insert(&constraint.constraint_name, groups.len());
                groups.push(ConstraintGroup {
                    name: &constraint.constraint_name,
                    kind: constraint.constraint_type,
                    members: vec![constraint],
                });
            }
        }
    }

    for group in &mut groups {
        group.members.sort_by_key(|c| c.ordinal_position);
    }
    groups
}

fn inline_clause(constraint: &Constraint) -> String {
    let name = &constraint.constraint_name;
    match constraint.constraint_type {
        ConstraintType::PrimaryKey => format!("CONSTRAINT {} PRIMARY KEY", name),
        ConstraintType::ForeignKey => format!(
            "CONSTRAINT {} REFERENCES {}",
            name,
            reference(&[constraint])
        ),
        ConstraintType::Unique => format!("CONSTRAINT {} UNIQUE", name),
        ConstraintType::Check => format!(
            "CONSTRAINT {} CHECK {}",
            name,
            parenthesize(constraint.check_clause.as_deref().unwrap_or_default())
        ),
        ConstraintType::Default => format!(
            "CONSTRAINT {} DEFAULT {}",
            name,
            constraint.default_value.as_deref().unwrap_or("NULL")
        ),
    }
}

fn trailing_clause(group: &ConstraintGroup<'_>) -> String {
    let columns = group
        .members
        .iter()
        .map(|c| c.column_name.as_str())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    let first = group.members[0];

    match group.kind {
        ConstraintType::PrimaryKey => {
            format!("CONSTRAINT {} PRIMARY KEY ({})", group.name, columns)
        }
        ConstraintType::ForeignKey => format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}",
            group.name,
            columns,
            reference(&group.members)
        ),
        ConstraintType::Unique => format!("CONSTRAINT {} UNIQUE ({})", group.name, columns),
        ConstraintType::Check => format!(
            "CONSTRAINT {} CHECK {}",
            group.name,
            parenthesize(first.check_clause.as_deref().unwrap_or_default())
        ),
        ConstraintType::Default => format!(
            "CONSTRAINT {} DEFAULT {} FOR {}",
            group.name,
            first.default_value.as_deref().unwrap_or("NULL"),
            columns
        ),
    }
}

/// `schema.table(col, ...)` for foreign key members.
fn reference(members: &[&Constraint]) -> String {
    let first = members[0];
    let table = first.referenced_table.as_deref().unwrap_or_default();
    let target = match first.referenced_schema.as_deref() {
        Some(schema) => format!("{}.{}", schema, table),
        None => table.to_string(),
    };
    let columns: Vec<&str> = members
        .iter()
        .filter_map(|c| c.referenced_column.as_deref())
        .collect();

    if columns.is_empty() {
        target
    } else {
        format!("{}({})", target, columns.join(", "))
    }
}

/// SQL Server stores check definitions already wrapped; SQLite never reports them.
fn parenthesize(clause: &str) -> String {
    if is_wrapped(clause) {
        clause.to_string()
    } else {
        format!("({})", clause)
    }
}

fn is_wrapped(clause: &str) -> bool {
    if !clause.starts_with('(') || !clause.ends_with(')') {
        return false;
    }
    let mut depth = 0i32;
    for (i, ch) in clause.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return i == clause.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}
