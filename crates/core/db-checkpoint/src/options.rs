use crate::{MIGRATIONS_TABLE, ResetStrategy, TableName};

/// Options for [`Checkpoint::capture`](crate::Checkpoint::capture).
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    ignored: Vec<TableName>,
    schemas: Option<Vec<String>>,
    pub(crate) strategy: ResetStrategy,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            ignored: vec![TableName::public(MIGRATIONS_TABLE)],
            schemas: None,
            strategy: ResetStrategy::default(),
        }
    }
}

impl CaptureOptions {
    /// Leave `table` out of the checkpoint; its rows survive every reset.
    pub fn ignore_table(mut self, table: TableName) -> Self {
        self.ignored.push(table);
        self
    }

    /// Only capture tables from `schema`. May be called repeatedly.
    ///
    /// All non-system schemas are captured when never called.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schemas.get_or_insert_with(Vec::new).push(schema.into());
        self
    }

    pub fn strategy(mut self, strategy: ResetStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub(crate) fn includes(&self, table: &TableName) -> bool {
        let schema_ok = self
            .schemas
            .as_ref()
            .is_none_or(|schemas| schemas.contains(&table.schema));
        schema_ok && !self.ignored.contains(table)
    }
}
