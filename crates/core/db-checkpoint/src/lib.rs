//! Checkpoint and reset of a PostgreSQL test database.
//!
//! A [`Checkpoint`] records the shape of the database right after the schema has
//! been applied: which user tables exist, how foreign keys link them, and which
//! sequences they own. [`Checkpoint::reset`] brings the database back to that
//! baseline by clearing every recorded table in a single transaction, children
//! before parents, so it is cheap enough to run between test cases.

use std::{collections::BTreeMap, fmt, time::SystemTime};

use sqlx::{PgPool, Postgres, Transaction};

mod options;
mod order;
mod sql;
mod table;

#[cfg(test)]
mod tests;

pub use self::{
    options::CaptureOptions,
    table::{ForeignKey, TableName},
};

/// Table that tracks applied migrations; it must survive a reset.
pub const MIGRATIONS_TABLE: &str = "_sqlx_migrations";

/// How [`Checkpoint::reset`] clears tables.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetStrategy {
    /// One `TRUNCATE ... RESTART IDENTITY` covering every table.
    #[default]
    Truncate,
    /// `DELETE FROM` each table in dependency order, then restart owned sequences.
    ///
    /// Slower on big tables, but takes weaker locks than `TRUNCATE`.
    Delete,
}

impl fmt::Display for ResetStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncate => f.write_str("truncate"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// The captured baseline of a database.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    /// Tables in reset order: every table precedes the tables it references.
    tables: Vec<TableName>,
    foreign_keys: Vec<ForeignKey>,
    sequences: Vec<TableName>,
    strategy: ResetStrategy,
    captured_at: SystemTime,
}

impl Checkpoint {
    /// Introspects the catalog and records the reset order of all user tables.
    ///
    /// Capture reads only; it does not change any data.
    #[tracing::instrument(skip_all, err)]
    pub async fn capture(
        pool: &PgPool,
        options: &CaptureOptions,
    ) -> Result<Self, IntrospectionError> {
        let tables: Vec<TableName> = sql::user_tables(pool)
            .await
            .map_err(IntrospectionError::Tables)?
            .into_iter()
            .filter(|t| options.includes(t))
            .collect();

        let foreign_keys: Vec<ForeignKey> = sql::foreign_keys(pool)
            .await
            .map_err(IntrospectionError::ForeignKeys)?
            .into_iter()
            .filter(|fk| tables.contains(&fk.child) && tables.contains(&fk.parent))
            .collect();

        let sequences: Vec<TableName> = sql::owned_sequences(pool)
            .await
            .map_err(IntrospectionError::Sequences)?
            .into_iter()
            .filter(|(_, owner)| tables.contains(owner))
            .map(|(sequence, _)| sequence)
            .collect();

        let tables = order::children_first(&tables, &foreign_keys);

        tracing::debug!(
            tables = tables.len(),
            foreign_keys = foreign_keys.len(),
            sequences = sequences.len(),
            strategy = %options.strategy,
            "checkpoint captured"
        );

        Ok(Self {
            tables,
            foreign_keys,
            sequences,
            strategy: options.strategy,
            captured_at: SystemTime::now(),
        })
    }

    /// Clears every table recorded in the checkpoint.
    ///
    /// Runs in one transaction: either all tables are cleared and sequences restarted,
    /// or nothing changes. Calling it repeatedly is safe; a reset of an already clean
    /// database changes nothing.
    ///
    /// Rows written concurrently by other connections may or may not survive.
    /// Callers that share a database across parallel tests must serialize
    /// reset-act-assert themselves.
    pub async fn reset(&self, pool: &PgPool) -> Result<(), ResetError> {
        if self.tables.is_empty() {
            return Ok(());
        }

        let mut tx = pool.begin().await.map_err(ResetError::Begin)?;

        match self.strategy {
            ResetStrategy::Truncate => self.truncate_all(&mut tx).await?,
            ResetStrategy::Delete => self.delete_all(&mut tx).await?,
        }

        tx.commit().await.map_err(ResetError::Commit)?;

        tracing::debug!(tables = self.tables.len(), strategy = %self.strategy, "database reset");
        Ok(())
    }

    async fn truncate_all(&self, tx: &mut Transaction<'_, Postgres>) -> Result<(), ResetError> {
        let list = self
            .tables
            .iter()
            .map(TableName::quoted)
            .collect::<Vec<_>>()
            .join(", ");
        let stmt = format!("TRUNCATE TABLE {list} RESTART IDENTITY");

        sqlx::query(&stmt)
            .execute(&mut **tx)
            .await
            .map_err(|err| ResetError::Statement {
                strategy: ResetStrategy::Truncate,
                table: failing_table(&err).unwrap_or_else(|| self.table_list()),
                source: err,
            })?;
        Ok(())
    }

    async fn delete_all(&self, tx: &mut Transaction<'_, Postgres>) -> Result<(), ResetError> {
        // Lets deferrable cycles be emptied in any order within the transaction
        sqlx::query("SET CONSTRAINTS ALL DEFERRED")
            .execute(&mut **tx)
            .await
            .map_err(|err| ResetError::Statement {
                strategy: ResetStrategy::Delete,
                table: self.table_list(),
                source: err,
            })?;

        for table in &self.tables {
            let stmt = format!("DELETE FROM {}", table.quoted());
            sqlx::query(&stmt)
                .execute(&mut **tx)
                .await
                .map_err(|err| ResetError::Statement {
                    strategy: ResetStrategy::Delete,
                    table: table.to_string(),
                    source: err,
                })?;
        }

        for sequence in &self.sequences {
            let stmt = format!("ALTER SEQUENCE {} RESTART", sequence.quoted());
            sqlx::query(&stmt)
                .execute(&mut **tx)
                .await
                .map_err(|err| ResetError::Sequence {
                    sequence: sequence.clone(),
                    source: err,
                })?;
        }

        Ok(())
    }

    /// Current row count of every checkpointed table.
    pub async fn row_counts(&self, pool: &PgPool) -> Result<BTreeMap<TableName, i64>, sqlx::Error> {
        let mut counts = BTreeMap::new();
        for table in &self.tables {
            counts.insert(table.clone(), sql::row_count(pool, table).await?);
        }
        Ok(counts)
    }

    /// Tables in reset order.
    pub fn tables(&self) -> &[TableName] {
        &self.tables
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    /// Sequences restarted by a reset.
    pub fn sequences(&self) -> &[TableName] {
        &self.sequences
    }

    pub fn strategy(&self) -> ResetStrategy {
        self.strategy
    }

    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    fn table_list(&self) -> String {
        self.tables
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// The table a failed statement tripped on, when PostgreSQL reports one.
fn failing_table(err: &sqlx::Error) -> Option<String> {
    let db_err = err.as_database_error()?;
    let pg_err = db_err.try_downcast_ref::<sqlx::postgres::PgDatabaseError>()?;
    let table = pg_err.table()?;
    Some(match pg_err.schema() {
        Some(schema) => format!("{schema}.{table}"),
        None => table.to_string(),
    })
}

/// Errors that can occur while capturing a checkpoint.
#[derive(Debug, thiserror::Error)]
pub enum IntrospectionError {
    /// Listing user tables from `pg_class` failed.
    #[error("failed to list tables")]
    Tables(#[source] sqlx::Error),

    /// Listing foreign key constraints from `pg_constraint` failed.
    #[error("failed to list foreign keys")]
    ForeignKeys(#[source] sqlx::Error),

    /// Listing owned sequences from `pg_depend` failed.
    #[error("failed to list owned sequences")]
    Sequences(#[source] sqlx::Error),
}

/// Errors that can occur while resetting to a checkpoint.
///
/// Every variant implies the reset transaction was rolled back.
#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    /// The reset transaction could not be opened.
    #[error("failed to begin reset transaction")]
    Begin(#[source] sqlx::Error),

    /// Clearing a table failed.
    #[error("failed to reset {table} using {strategy}")]
    Statement {
        strategy: ResetStrategy,
        /// The offending table, or the full table list when PostgreSQL does not say
        table: String,
        #[source]
        source: sqlx::Error,
    },

    /// Restarting an owned sequence failed.
    #[error("failed to restart sequence {sequence}")]
    Sequence {
        sequence: TableName,
        #[source]
        source: sqlx::Error,
    },

    /// The reset transaction could not be committed.
    #[error("failed to commit reset transaction")]
    Commit(#[source] sqlx::Error),
}
