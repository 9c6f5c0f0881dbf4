//! Metadata catalog reader.
//!
//! Reads tables, columns and constraints (with extended descriptions where the
//! backend has them) as three independent result sets. Every backend returns
//! the same column aliases, so the rows deserialize into the typed records in
//! `models::catalog` regardless of where they came from.
//!
//! # Architecture
//!
//! SQL text lives in the `queries` submodule, one submodule per backend. The
//! optional schema filter is spliced in as a quoted literal because the
//! executor only accepts plain SQL text.

use crate::db::executor::QueryExecutor;
use crate::error::{DbError, DbResult};
use crate::models::{ColumnRow, ConstraintRow, DatabaseType, QueryResult, TableRow};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::debug;

/// The three raw result sets of a catalog read.
#[derive(Debug, Clone, Default)]
pub struct CatalogRows {
    pub tables: Vec<TableRow>,
    pub columns: Vec<ColumnRow>,
    pub constraints: Vec<ConstraintRow>,
}

/// SQL statements for one catalog read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogQueries {
    pub tables: String,
    pub columns: String,
    pub constraints: String,
}

impl CatalogQueries {
    /// Build the statements for `db`, optionally restricted to one schema.
    pub fn for_dialect(db: DatabaseType, schema: Option<&str>) -> Self {
        let (tables, columns, constraints, column_expr) = match db {
            DatabaseType::MsSql => (
                queries::mssql::TABLES,
                queries::mssql::COLUMNS,
                queries::mssql::CONSTRAINTS,
                ["t.TABLE_SCHEMA", "c.TABLE_SCHEMA", "k.TABLE_SCHEMA"],
            ),
            DatabaseType::SQLite => (
                queries::sqlite::TABLES,
                queries::sqlite::COLUMNS,
                queries::sqlite::CONSTRAINTS,
                ["'main'", "'main'", "k.TABLE_SCHEMA"],
            ),
        };

        let filter = |sql: &str, expr: &str| {
            let predicate = schema
                .map(|s| format!("AND {} = {}", expr, db.quote_literal(s)))
                .unwrap_or_default();
            sql.replace("{schema_filter}", &predicate)
        };

        Self {
            tables: filter(tables, column_expr[0]),
            columns: filter(columns, column_expr[1]),
            constraints: filter(constraints, column_expr[2]),
        }
    }
}

/// Reads the raw catalog through a `QueryExecutor`.
pub struct CatalogReader<'a> {
    executor: &'a dyn QueryExecutor,
    schema: Option<&'a str>,
}

impl<'a> CatalogReader<'a> {
    pub fn new(executor: &'a dyn QueryExecutor, schema: Option<&'a str>) -> Self {
        Self { executor, schema }
    }

    /// Run the three catalog queries concurrently.
    ///
    /// Any failing query fails the whole read. The catalog is read in full;
    /// the run-query row cap does not apply.
    pub async fn read(&self) -> DbResult<CatalogRows> {
        let queries = CatalogQueries::for_dialect(self.executor.dialect(), self.schema);
        debug!(
            dialect = %self.executor.dialect(),
            schema = ?self.schema,
            "Reading metadata catalog"
        );

        let (tables, columns, constraints) = tokio::try_join!(
            self.executor.fetch_all(&queries.tables),
            self.executor.fetch_all(&queries.columns),
            self.executor.fetch_all(&queries.constraints),
        )?;

        let rows = CatalogRows {
            tables: decode_rows(tables, "tables")?,
            columns: decode_rows(columns, "columns")?,
            constraints: decode_rows(constraints, "constraints")?,
        };

        debug!(
            tables = rows.tables.len(),
            columns = rows.columns.len(),
            constraints = rows.constraints.len(),
            "Catalog read complete"
        );
        Ok(rows)
    }
}

fn decode_rows<T: DeserializeOwned>(result: QueryResult, result_set: &str) -> DbResult<Vec<T>> {
    result
        .rows
        .into_iter()
        .map(|row| {
            serde_json::from_value(JsonValue::Object(row)).map_err(|e| {
                DbError::schema(format!("Malformed {} catalog row: {}", result_set, e), result_set)
            })
        })
        .collect()
}

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub mod mssql {
        pub const TABLES: &str = r#"
            SELECT
                t.TABLE_SCHEMA,
                t.TABLE_NAME,
                CAST(ep.value AS NVARCHAR(4000)) AS TABLE_DESCRIPTION
            FROM INFORMATION_SCHEMA.TABLES t
            LEFT JOIN sys.extended_properties ep
                ON ep.class = 1
                AND ep.major_id = OBJECT_ID(QUOTENAME(t.TABLE_SCHEMA) + '.' + QUOTENAME(t.TABLE_NAME))
                AND ep.minor_id = 0
                AND ep.name = 'MS_Description'
            WHERE t.TABLE_TYPE = 'BASE TABLE'
            {schema_filter}
            ORDER BY t.TABLE_SCHEMA, t.TABLE_NAME
            "#;

        pub const COLUMNS: &str = r#"
            SELECT
                c.TABLE_SCHEMA,
                c.TABLE_NAME,
                c.COLUMN_NAME,
                c.DATA_TYPE,
                c.IS_NULLABLE,
                CAST(ep.value AS NVARCHAR(4000)) AS COLUMN_DESCRIPTION,
                c.ORDINAL_POSITION
            FROM INFORMATION_SCHEMA.COLUMNS c
            JOIN INFORMATION_SCHEMA.TABLES t
                ON t.TABLE_SCHEMA = c.TABLE_SCHEMA
                AND t.TABLE_NAME = c.TABLE_NAME
                AND t.TABLE_TYPE = 'BASE TABLE'
            LEFT JOIN sys.extended_properties ep
                ON ep.class = 1
                AND ep.major_id = OBJECT_ID(QUOTENAME(c.TABLE_SCHEMA) + '.' + QUOTENAME(c.TABLE_NAME))
                AND ep.minor_id = COLUMNPROPERTY(ep.major_id, c.COLUMN_NAME, 'ColumnId')
                AND ep.name = 'MS_Description'
            WHERE 1 = 1
            {schema_filter}
            ORDER BY c.TABLE_SCHEMA, c.TABLE_NAME, c.ORDINAL_POSITION
            "#;

        // NULL placeholders are cast so every branch of the UNION agrees on type.
        pub const CONSTRAINTS: &str = r#"
            SELECT * FROM (
                SELECT
                    tc.TABLE_SCHEMA,
                    tc.TABLE_NAME,
                    tc.CONSTRAINT_NAME,
                    tc.CONSTRAINT_TYPE AS ConstraintType,
                    kcu.COLUMN_NAME,
                    kcu.ORDINAL_POSITION,
                    CAST(NULL AS NVARCHAR(128)) AS ReferencedSchema,
                    CAST(NULL AS NVARCHAR(128)) AS ReferencedTable,
                    CAST(NULL AS NVARCHAR(128)) AS ReferencedColumn,
                    CAST(NULL AS NVARCHAR(4000)) AS CheckClause,
                    CAST(NULL AS NVARCHAR(4000)) AS DefaultValue
                FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
                JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
                    ON kcu.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA
                    AND kcu.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
                    AND kcu.TABLE_NAME = tc.TABLE_NAME
                WHERE tc.CONSTRAINT_TYPE IN ('PRIMARY KEY', 'UNIQUE')

                UNION ALL

                SELECT
                    SCHEMA_NAME(fk.schema_id),
                    OBJECT_NAME(fk.parent_object_id),
                    fk.name,
                    'FOREIGN KEY',
                    pc.name,
                    fkc.constraint_column_id,
                    SCHEMA_NAME(rt.schema_id),
                    rt.name,
                    rc.name,
                    NULL,
                    NULL
                FROM sys.foreign_keys fk
                JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id
                JOIN sys.columns pc
                    ON pc.object_id = fkc.parent_object_id
                    AND pc.column_id = fkc.parent_column_id
                JOIN sys.tables rt ON rt.object_id = fkc.referenced_object_id
                JOIN sys.columns rc
                    ON rc.object_id = fkc.referenced_object_id
                    AND rc.column_id = fkc.referenced_column_id

                UNION ALL

                SELECT
                    SCHEMA_NAME(cc.schema_id),
                    OBJECT_NAME(cc.parent_object_id),
                    cc.name,
                    'CHECK',
                    COALESCE(col.name, ''),
                    1,
                    NULL,
                    NULL,
                    NULL,
                    CAST(cc.definition AS NVARCHAR(4000)),
                    NULL
                FROM sys.check_constraints cc
                LEFT JOIN sys.columns col
                    ON col.object_id = cc.parent_object_id
                    AND col.column_id = cc.parent_column_id

                UNION ALL

                SELECT
                    SCHEMA_NAME(dc.schema_id),
                    OBJECT_NAME(dc.parent_object_id),
                    dc.name,
                    'DEFAULT',
                    col.name,
                    1,
                    NULL,
                    NULL,
                    NULL,
                    NULL,
                    CAST(dc.definition AS NVARCHAR(4000))
                FROM sys.default_constraints dc
                JOIN sys.columns col
                    ON col.object_id = dc.parent_object_id
                    AND col.column_id = dc.parent_column_id
            ) AS k
            WHERE 1 = 1
            {schema_filter}
            ORDER BY k.TABLE_SCHEMA, k.TABLE_NAME, k.ConstraintType, k.CONSTRAINT_NAME, k.ORDINAL_POSITION
            "#;
    }

    /// SQLite has no schemas beyond `main` and no object descriptions.
    /// Unnamed keys get synthesized names so they can still be grouped.
    pub mod sqlite {
        pub const TABLES: &str = r#"
            SELECT
                'main' AS TABLE_SCHEMA,
                m.name AS TABLE_NAME,
                NULL AS TABLE_DESCRIPTION
            FROM sqlite_master m
            WHERE m.type = 'table'
            AND m.name NOT LIKE 'sqlite_%'
            {schema_filter}
            ORDER BY m.name
            "#;

        pub const COLUMNS: &str = r#"
            SELECT
                'main' AS TABLE_SCHEMA,
                m.name AS TABLE_NAME,
                p.name AS COLUMN_NAME,
                p.type AS DATA_TYPE,
                CASE WHEN p."notnull" = 0 THEN 'YES' ELSE 'NO' END AS IS_NULLABLE,
                NULL AS COLUMN_DESCRIPTION,
                p.cid + 1 AS ORDINAL_POSITION
            FROM sqlite_master m
            JOIN pragma_table_info(m.name) p
            WHERE m.type = 'table'
            AND m.name NOT LIKE 'sqlite_%'
            {schema_filter}
            ORDER BY m.name, p.cid
            "#;

        pub const CONSTRAINTS: &str = r#"
            SELECT * FROM (
                SELECT
                    'main' AS TABLE_SCHEMA,
                    m.name AS TABLE_NAME,
                    'pk_' || m.name AS CONSTRAINT_NAME,
                    'PRIMARY KEY' AS ConstraintType,
                    p.name AS COLUMN_NAME,
                    p.pk AS ORDINAL_POSITION,
                    NULL AS ReferencedSchema,
                    NULL AS ReferencedTable,
                    NULL AS ReferencedColumn,
                    NULL AS CheckClause,
                    NULL AS DefaultValue
                FROM sqlite_master m
                JOIN pragma_table_info(m.name) p
                WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%' AND p.pk > 0

                UNION ALL

                SELECT
                    'main',
                    m.name,
                    'fk_' || m.name || '_' || f.id,
                    'FOREIGN KEY',
                    f."from",
                    f.seq + 1,
                    'main',
                    f."table",
                    f."to",
                    NULL,
                    NULL
                FROM sqlite_master m
                JOIN pragma_foreign_key_list(m.name) f
                WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%'

                UNION ALL

                SELECT
                    'main',
                    m.name,
                    il.name,
                    'UNIQUE',
                    ii.name,
                    ii.seqno + 1,
                    NULL,
                    NULL,
                    NULL,
                    NULL,
                    NULL
                FROM sqlite_master m
                JOIN pragma_index_list(m.name) il
                JOIN pragma_index_info(il.name) ii
                WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%'
                AND il."unique" = 1 AND il.origin = 'u'

                UNION ALL

                SELECT
                    'main',
                    m.name,
                    'df_' || m.name || '_' || p.name,
                    'DEFAULT',
                    p.name,
                    1,
                    NULL,
                    NULL,
                    NULL,
                    NULL,
                    p.dflt_value
                FROM sqlite_master m
                JOIN pragma_table_info(m.name) p
                WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%'
                AND p.dflt_value IS NOT NULL
            ) AS k
            WHERE 1 = 1
            {schema_filter}
            ORDER BY k.TABLE_SCHEMA, k.TABLE_NAME, k.ConstraintType, k.CONSTRAINT_NAME, k.ORDINAL_POSITION
            "#;
    }
}
