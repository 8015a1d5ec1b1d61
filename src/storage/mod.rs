//! Storage port and its adapters.
//!
//! The engine only talks to a [`Store`]. [`MemoryStore`] keeps tables in
//! process (dry runs, tests); [`SqlStore`] writes through a diesel
//! connection taken from the [`Database`] pool.

pub mod database;
pub mod dialect;
pub mod memory;
pub mod sql;

use std::fmt;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use database::{Database, DatabaseConfig, DbBackend, DbConnection, Pool, PooledConnection};
pub use dialect::Dialect;
pub use memory::MemoryStore;
pub use sql::SqlStore;

/// Name of the generated surrogate key column of every table.
pub const KEY_COLUMN: &str = "id";

/// Generated surrogate key of an inserted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(pub i64);

impl RowId {
    /// Marker for a row whose insertion failed. Never a generated key.
    pub const INVALID: RowId = RowId(-1);

    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One cell bound into an insert statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    /// Foreign key to a parent row
    Key(RowId),
    /// Extracted text; `None` is SQL NULL
    Text(Option<String>),
}

impl CellValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) => text.as_deref(),
            CellValue::Key(_) => None,
        }
    }

    pub fn as_key(&self) -> Option<RowId> {
        match self {
            CellValue::Key(id) => Some(*id),
            CellValue::Text(_) => None,
        }
    }
}

/// Column name to value, in insertion order.
pub type Row = IndexMap<String, CellValue>;

/// A configured column of a table to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    /// Unbounded text instead of bounded text
    pub long_text: bool,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, long_text: bool) -> Self {
        Self {
            name: name.into(),
            long_text,
        }
    }
}

/// Everything needed to create one table.
///
/// The surrogate key and, when `parent` is set, the `<Parent>Id` foreign
/// key are implicit and not listed in `columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub parent: Option<String>,
    pub columns: Vec<ColumnSpec>,
}

impl TableSpec {
    pub fn foreign_key(&self) -> Option<String> {
        self.parent.as_deref().map(crate::mapping::foreign_key_column)
    }
}

/// A column as reported by the backend catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescription {
    pub name: String,
    pub long_text: bool,
}

/// Errors raised by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("unsupported backend: {0}")]
    Unsupported(String),

    #[error("database error: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("table {0} does not exist")]
    UnknownTable(String),

    #[error("table {0} already exists")]
    TableExists(String),

    #[error("table {table} has no column {column}")]
    UnknownColumn { table: String, column: String },

    #[error("insert into {table} rejected: {reason}")]
    Rejected { table: String, reason: String },
}

/// The backend operations the engine needs.
///
/// Calls are strictly sequential; implementations are not required to be
/// reentrant.
pub trait Store {
    fn table_exists(&mut self, table: &str) -> Result<bool, StoreError>;

    /// Columns of an existing table, surrogate and foreign keys included.
    fn describe_columns(&mut self, table: &str) -> Result<Vec<ColumnDescription>, StoreError>;

    fn create_table(&mut self, spec: &TableSpec) -> Result<(), StoreError>;

    /// Insert one row and return its generated key.
    fn insert_row(&mut self, table: &str, row: &Row) -> Result<RowId, StoreError>;
}

impl<S: Store + ?Sized> Store for &mut S {
    fn table_exists(&mut self, table: &str) -> Result<bool, StoreError> {
        (**self).table_exists(table)
    }

    fn describe_columns(&mut self, table: &str) -> Result<Vec<ColumnDescription>, StoreError> {
        (**self).describe_columns(table)
    }

    fn create_table(&mut self, spec: &TableSpec) -> Result<(), StoreError> {
        (**self).create_table(spec)
    }

    fn insert_row(&mut self, table: &str, row: &Row) -> Result<RowId, StoreError> {
        (**self).insert_row(table, row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_id_sentinel() {
        assert!(!RowId::INVALID.is_valid());
        assert!(RowId(1).is_valid());
        assert_eq!(RowId(42).to_string(), "42");
    }

    #[test]
    fn test_table_spec_foreign_key() {
        let spec = TableSpec {
            name: "Diagnosis".to_string(),
            parent: Some("Encounter".to_string()),
            columns: vec![ColumnSpec::new("Code", false)],
        };
        assert_eq!(spec.foreign_key().as_deref(), Some("EncounterId"));

        let root = TableSpec {
            parent: None,
            ..spec
        };
        assert_eq!(root.foreign_key(), None);
    }

    #[test]
    fn test_cell_value_accessors() {
        assert_eq!(CellValue::Key(RowId(3)).as_key(), Some(RowId(3)));
        assert_eq!(CellValue::Text(Some("x".to_string())).as_text(), Some("x"));
        assert_eq!(CellValue::Text(None).as_text(), None);
    }
}
