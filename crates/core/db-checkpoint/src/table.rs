use std::fmt;

/// A schema-qualified table (or sequence) name.
///
/// Ordered by schema, then name. That order is the tie-breaker used when sorting
/// tables for reset, so the statement order is stable across runs.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct TableName {
    pub schema: String,
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// A table in the `public` schema.
    pub fn public(name: impl Into<String>) -> Self {
        Self::new("public", name)
    }

    /// The name as a SQL identifier, e.g. `"public"."user notes"`.
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A foreign key edge: rows of `child` reference rows of `parent`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ForeignKey {
    pub constraint: String,
    pub child: TableName,
    pub parent: TableName,
}

impl ForeignKey {
    pub fn is_self_reference(&self) -> bool {
        self.child == self.parent
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
