//! Diesel-backed SQL storage.
//!
//! All statements are raw SQL produced by [`Dialect`]; cell values are
//! bound as parameters.

use std::collections::HashMap;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Nullable, Text};
use crate::storage::database::{Database, DbBackend, PooledConnection};
use crate::storage::{CellValue, ColumnDescription, Dialect, Row, RowId, Store, StoreError, TableSpec};

#[derive(QueryableByName)]
struct CatalogTable {
    #[diesel(sql_type = Text)]
    name: String,
}

#[derive(QueryableByName)]
struct CatalogColumn {
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Text)]
    data_type: String,
}

#[derive(QueryableByName)]
struct GeneratedKey {
    #[diesel(sql_type = BigInt)]
    id: i64,
}

/// Stored spellings of table and column names, keyed by lowercase name.
///
/// Tables are found and validated case-insensitively, but quoted
/// identifiers are case-exact on Postgres (and on MySQL tables, depending
/// on the server). Inserts therefore use the spelling the catalog reported.
#[derive(Debug, Default)]
struct CatalogNames {
    tables: HashMap<String, String>,
    columns: HashMap<String, HashMap<String, String>>,
}

impl CatalogNames {
    fn record_table(&mut self, name: &str) {
        self.tables.insert(name.to_ascii_lowercase(), name.to_string());
    }

    fn record_columns<'n>(&mut self, table: &str, names: impl IntoIterator<Item = &'n str>) {
        let columns = names
            .into_iter()
            .map(|name| (name.to_ascii_lowercase(), name.to_string()))
            .collect();
        self.columns.insert(table.to_ascii_lowercase(), columns);
    }

    fn table<'s>(&'s self, name: &'s str) -> &'s str {
        self.tables
            .get(&name.to_ascii_lowercase())
            .map_or(name, String::as_str)
    }

    fn column<'s>(&'s self, table: &str, name: &'s str) -> &'s str {
        self.columns
            .get(&table.to_ascii_lowercase())
            .and_then(|columns| columns.get(&name.to_ascii_lowercase()))
            .map_or(name, String::as_str)
    }
}

/// Storage backend writing to a SQL database.
///
/// Holds one pooled connection for its whole lifetime; the connection
/// goes back to the pool when the store is dropped.
pub struct SqlStore {
    conn: PooledConnection,
    dialect: Dialect,
    names: CatalogNames,
}

impl SqlStore {
    /// Take a connection from `database` for the duration of a run.
    pub fn new(database: &Database) -> Result<Self, StoreError> {
        Ok(Self {
            conn: database.get_connection()?,
            dialect: database.dialect(),
            names: CatalogNames::default(),
        })
    }

    /// Open a pool for `database_url` and take a connection from it.
    pub fn connect(database_url: &str) -> Result<Self, StoreError> {
        let database = Database::new(database_url)?;
        database.test_connection()?;
        Self::new(&database)
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }
}

impl Store for SqlStore {
    fn table_exists(&mut self, table: &str) -> Result<bool, StoreError> {
        let found = diesel::sql_query(self.dialect.find_table_sql())
            .into_boxed::<DbBackend>()
            .bind::<Text, _>(table.to_string())
            .load::<CatalogTable>(&mut *self.conn)?;

        // An exact spelling wins when the catalog holds several
        let stored = found
            .iter()
            .find(|t| t.name == table)
            .or_else(|| found.first());

        match stored {
            Some(stored) => {
                self.names.record_table(&stored.name);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn describe_columns(&mut self, table: &str) -> Result<Vec<ColumnDescription>, StoreError> {
        let rows = diesel::sql_query(self.dialect.describe_columns_sql())
            .into_boxed::<DbBackend>()
            .bind::<Text, _>(table.to_string())
            .load::<CatalogColumn>(&mut *self.conn)?;

        if rows.is_empty() {
            return Err(StoreError::UnknownTable(table.to_string()));
        }

        self.names
            .record_columns(table, rows.iter().map(|column| column.name.as_str()));

        Ok(rows
            .into_iter()
            .map(|column| ColumnDescription {
                long_text: self.dialect.is_long_text(&column.data_type),
                name: column.name,
            })
            .collect())
    }

    fn create_table(&mut self, spec: &TableSpec) -> Result<(), StoreError> {
        let sql = self.dialect.create_table_sql(spec);
        tracing::debug!(table = %spec.name, "{}", sql);

        diesel::sql_query(sql).execute(&mut *self.conn)?;

        let foreign_key = spec.foreign_key();
        self.names.record_table(&spec.name);
        self.names.record_columns(
            &spec.name,
            foreign_key
                .as_deref()
                .into_iter()
                .chain(spec.columns.iter().map(|column| column.name.as_str())),
        );
        Ok(())
    }

    fn insert_row(&mut self, table: &str, row: &Row) -> Result<RowId, StoreError> {
        let columns: Vec<&str> = row.keys().map(|name| self.names.column(table, name)).collect();
        let sql = self.dialect.insert_sql(self.names.table(table), &columns);

        let mut query = diesel::sql_query(sql).into_boxed::<DbBackend>();
        for value in row.values() {
            query = match value {
                CellValue::Key(id) => query.bind::<BigInt, _>(id.0),
                CellValue::Text(text) => query.bind::<Nullable<Text>, _>(text.clone()),
            };
        }

        let key = if self.dialect.supports_returning() {
            query.load::<GeneratedKey>(&mut *self.conn)?
        } else {
            query.execute(&mut *self.conn)?;
            diesel::sql_query(self.dialect.last_insert_id_sql()).load::<GeneratedKey>(&mut *self.conn)?
        };

        key.first()
            .map(|key| RowId(key.id))
            .ok_or_else(|| StoreError::Rejected {
                table: table.to_string(),
                reason: "no generated key returned".to_string(),
            })
    }
}
