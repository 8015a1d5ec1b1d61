//! SQL text for each supported backend.
//!
//! Only statement text lives here. Values are never rendered into SQL;
//! every statement uses placeholders and values are bound by the caller.

use std::fmt;
use std::str::FromStr;
use crate::storage::{TableSpec, KEY_COLUMN};

/// Bounded text column type, shared by all backends.
pub const BOUNDED_TEXT: &str = "VARCHAR(255)";

/// Maximum length of a bounded text cell.
pub const BOUNDED_TEXT_LEN: usize = 255;

/// SQL dialect of a storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Detect the dialect from a database URL. Anything that is not a
    /// postgres or mysql URL is treated as a SQLite path.
    ///
    /// # Examples
    /// ```
    /// use docmap::storage::Dialect;
    ///
    /// assert_eq!(Dialect::from_url("postgres://localhost/cda"), Dialect::Postgres);
    /// assert_eq!(Dialect::from_url("mysql://localhost/cda"), Dialect::MySql);
    /// assert_eq!(Dialect::from_url("out/records.db"), Dialect::Sqlite);
    /// ```
    pub fn from_url(url: &str) -> Dialect {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Dialect::Postgres
        } else if url.starts_with("mysql://") || url.starts_with("mariadb://") {
            Dialect::MySql
        } else {
            Dialect::Sqlite
        }
    }

    /// Dialect of the backend this crate was compiled for.
    pub fn compiled() -> Dialect {
        if cfg!(feature = "postgres") {
            Dialect::Postgres
        } else if cfg!(feature = "mysql") {
            Dialect::MySql
        } else {
            Dialect::Sqlite
        }
    }

    /// Quote an identifier, doubling any embedded quote character.
    pub fn quote(&self, identifier: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", identifier.replace('`', "``")),
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", identifier.replace('"', "\"\"")),
        }
    }

    /// Placeholder for the `index`-th (1-based) bound parameter.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
        }
    }

    fn key_column_type(&self) -> &'static str {
        match self {
            Dialect::Postgres => "BIGSERIAL PRIMARY KEY",
            Dialect::MySql => "BIGINT AUTO_INCREMENT PRIMARY KEY",
            Dialect::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        }
    }

    pub fn long_text_type(&self) -> &'static str {
        match self {
            Dialect::MySql => "LONGTEXT",
            Dialect::Postgres | Dialect::Sqlite => "TEXT",
        }
    }

    pub fn text_type(&self, long_text: bool) -> &'static str {
        if long_text {
            self.long_text_type()
        } else {
            BOUNDED_TEXT
        }
    }

    /// Whether a catalog type name denotes unbounded text.
    pub fn is_long_text(&self, data_type: &str) -> bool {
        let data_type = data_type.trim().to_ascii_lowercase();
        match self {
            Dialect::Postgres => data_type == "text",
            Dialect::MySql => matches!(data_type.as_str(), "longtext" | "mediumtext" | "text"),
            Dialect::Sqlite => matches!(data_type.as_str(), "text" | "clob"),
        }
    }

    /// `CREATE TABLE` statement for `spec`: generated key, then the
    /// foreign key column, then the configured columns in order.
    pub fn create_table_sql(&self, spec: &TableSpec) -> String {
        let mut definitions = vec![format!("{} {}", self.quote(KEY_COLUMN), self.key_column_type())];

        let foreign_key = spec.foreign_key();
        if let Some(foreign_key) = &foreign_key {
            definitions.push(format!("{} BIGINT NOT NULL", self.quote(foreign_key)));
        }

        for column in &spec.columns {
            definitions.push(format!(
                "{} {}",
                self.quote(&column.name),
                self.text_type(column.long_text)
            ));
        }

        if let (Some(foreign_key), Some(parent)) = (&foreign_key, &spec.parent) {
            definitions.push(format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                self.quote(foreign_key),
                self.quote(parent),
                self.quote(KEY_COLUMN)
            ));
        }

        format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.quote(&spec.name),
            definitions.join(",\n    ")
        )
    }

    /// Parameterised `INSERT` for the given columns. Postgres and SQLite
    /// return the generated key directly; MySQL needs
    /// [`Dialect::last_insert_id_sql`] afterwards.
    pub fn insert_sql(&self, table: &str, columns: &[&str]) -> String {
        let table = self.quote(table);

        let mut sql = if columns.is_empty() {
            match self {
                Dialect::MySql => format!("INSERT INTO {} () VALUES ()", table),
                Dialect::Postgres | Dialect::Sqlite => format!("INSERT INTO {} DEFAULT VALUES", table),
            }
        } else {
            let names: Vec<String> = columns.iter().map(|c| self.quote(c)).collect();
            let placeholders: Vec<String> = (1..=columns.len()).map(|i| self.placeholder(i)).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                names.join(", "),
                placeholders.join(", ")
            )
        };

        if self.supports_returning() {
            sql.push_str(&format!(" RETURNING {}", self.quote(KEY_COLUMN)));
        }

        sql
    }

    pub fn supports_returning(&self) -> bool {
        !matches!(self, Dialect::MySql)
    }

    pub fn last_insert_id_sql(&self) -> &'static str {
        "SELECT CAST(LAST_INSERT_ID() AS SIGNED) AS id"
    }

    /// Catalog query listing tables named like the bound parameter,
    /// case-insensitively, with their stored spelling. Result column: `name`.
    pub fn find_table_sql(&self) -> String {
        match self {
            Dialect::Postgres => "SELECT table_name::text AS name FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND lower(table_name) = lower($1)"
                .to_string(),
            Dialect::MySql => "SELECT CAST(table_name AS CHAR) AS name FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND lower(table_name) = lower(?)"
                .to_string(),
            Dialect::Sqlite => "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND lower(name) = lower(?)"
                .to_string(),
        }
    }

    /// Catalog query listing the columns of the bound table.
    /// Result columns: `name`, `data_type`.
    pub fn describe_columns_sql(&self) -> String {
        match self {
            Dialect::Postgres => "SELECT column_name::text AS name, data_type::text AS data_type \
                 FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND lower(table_name) = lower($1) \
                 ORDER BY ordinal_position"
                .to_string(),
            Dialect::MySql => "SELECT CAST(column_name AS CHAR) AS name, CAST(data_type AS CHAR) AS data_type \
                 FROM information_schema.columns \
                 WHERE table_schema = DATABASE() AND lower(table_name) = lower(?) \
                 ORDER BY ordinal_position"
                .to_string(),
            Dialect::Sqlite => "SELECT name, type AS data_type FROM pragma_table_info(?) ORDER BY cid".to_string(),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            other => Err(format!("unknown dialect '{}' (expected postgres, mysql or sqlite)", other)),
        }
    }
}
