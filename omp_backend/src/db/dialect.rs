//! SQL dialect helpers for building driver-native statement text.
//!
//! Statements are passed to the driver verbatim; the core never rewrites
//! them. Query builders use [`Params`] to emit the placeholder syntax the
//! active backend expects.

use super::value::Value;

/// SQL flavour spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// PostgreSQL: `$1` placeholders, `schema.table` names.
    Postgres,
    /// TDS servers (Sybase ASE, SQL Server): `@P1` placeholders, `db..table` names.
    Tds,
}

impl Dialect {
    /// Placeholder text for the 1-based parameter `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::Tds => format!("@P{}", index),
        }
    }

    /// Fully qualified table name in database `db`.
    pub fn table(self, db: &str, table: &str) -> String {
        match self {
            Dialect::Postgres => format!("{}.{}", db, table),
            Dialect::Tds => format!("{}..{}", db, table),
        }
    }

    /// Server-side expression for the current UTC time.
    pub fn utc_now(self) -> &'static str {
        match self {
            Dialect::Postgres => "(NOW() AT TIME ZONE 'UTC')",
            Dialect::Tds => "GETUTCDATE()",
        }
    }
}

/// Positional parameter list for one statement.
#[derive(Debug, Clone)]
pub struct Params {
    dialect: Dialect,
    values: Vec<Value>,
}

impl Params {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            values: Vec::new(),
        }
    }

    /// Append a value and return the placeholder that refers to it.
    pub fn bind(&mut self, value: impl Into<Value>) -> String {
        self.values.push(value.into());
        self.dialect.placeholder(self.values.len())
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
