//! Catalog queries used to capture a checkpoint.

use sqlx::{Executor, Postgres};

use crate::{ForeignKey, TableName};

/// Every ordinary and partitioned table outside the system schemas.
///
/// Partitions are skipped: truncating or deleting from the partitioned parent
/// reaches them.
pub async fn user_tables<'c, E>(exe: E) -> Result<Vec<TableName>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        SELECT n.nspname::text AS schema, c.relname::text AS name
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE c.relkind IN ('r', 'p')
          AND NOT c.relispartition
          AND n.nspname NOT IN ('pg_catalog', 'information_schema')
          AND n.nspname NOT LIKE 'pg\_toast%'
          AND n.nspname NOT LIKE 'pg\_temp\_%'
        ORDER BY 1, 2
    "#};
    let rows: Vec<(String, String)> = sqlx::query_as(query).fetch_all(exe).await?;
    Ok(rows
        .into_iter()
        .map(|(schema, name)| TableName { schema, name })
        .collect())
}

#[derive(sqlx::FromRow)]
struct ForeignKeyRow {
    constraint_name: String,
    child_schema: String,
    child_table: String,
    parent_schema: String,
    parent_table: String,
}

/// Every foreign key constraint declared by the user.
///
/// Constraints cloned onto partitions (`conparentid <> 0`) are left out, the
/// declaring constraint already covers them.
pub async fn foreign_keys<'c, E>(exe: E) -> Result<Vec<ForeignKey>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        SELECT con.conname::text AS constraint_name,
               cn.nspname::text  AS child_schema,
               cc.relname::text  AS child_table,
               pn.nspname::text  AS parent_schema,
               pc.relname::text  AS parent_table
        FROM pg_catalog.pg_constraint con
        JOIN pg_catalog.pg_class cc ON cc.oid = con.conrelid
        JOIN pg_catalog.pg_namespace cn ON cn.oid = cc.relnamespace
        JOIN pg_catalog.pg_class pc ON pc.oid = con.confrelid
        JOIN pg_catalog.pg_namespace pn ON pn.oid = pc.relnamespace
        WHERE con.contype = 'f'
          AND con.conparentid = 0
        ORDER BY 2, 3, 1
    "#};
    let rows: Vec<ForeignKeyRow> = sqlx::query_as(query).fetch_all(exe).await?;
    Ok(rows
        .into_iter()
        .map(|row| ForeignKey {
            constraint: row.constraint_name,
            child: TableName::new(row.child_schema, row.child_table),
            parent: TableName::new(row.parent_schema, row.parent_table),
        })
        .collect())
}

/// Sequences owned by a table column, as `(sequence, owning table)` pairs.
///
/// Covers both `serial` columns (auto dependency) and identity columns
/// (internal dependency).
pub async fn owned_sequences<'c, E>(exe: E) -> Result<Vec<(TableName, TableName)>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        SELECT DISTINCT
               sn.nspname::text  AS seq_schema,
               seq.relname::text AS seq_name,
               tn.nspname::text  AS table_schema,
               tbl.relname::text AS table_name
        FROM pg_catalog.pg_depend d
        JOIN pg_catalog.pg_class seq ON seq.oid = d.objid AND seq.relkind = 'S'
        JOIN pg_catalog.pg_namespace sn ON sn.oid = seq.relnamespace
        JOIN pg_catalog.pg_class tbl ON tbl.oid = d.refobjid
        JOIN pg_catalog.pg_namespace tn ON tn.oid = tbl.relnamespace
        WHERE d.classid = 'pg_catalog.pg_class'::regclass
          AND d.refclassid = 'pg_catalog.pg_class'::regclass
          AND d.deptype IN ('a', 'i')
        ORDER BY 1, 2
    "#};
    let rows: Vec<(String, String, String, String)> =
        sqlx::query_as(query).fetch_all(exe).await?;
    Ok(rows
        .into_iter()
        .map(|(seq_schema, seq_name, table_schema, table_name)| {
            (
                TableName::new(seq_schema, seq_name),
                TableName::new(table_schema, table_name),
            )
        })
        .collect())
}

/// Exact row count of a single table.
pub async fn row_count<'c, E>(exe: E, table: &TableName) -> Result<i64, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = format!("SELECT count(*) FROM {}", table.quoted());
    sqlx::query_scalar(&query).fetch_one(exe).await
}
