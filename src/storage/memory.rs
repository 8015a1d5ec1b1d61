//! In-process storage backend.
//!
//! Keeps every table in memory with the same constraints a SQL backend
//! would enforce on the generated schema. Used by dry runs and tests.

use indexmap::IndexMap;
use crate::storage::dialect::BOUNDED_TEXT_LEN;
use crate::storage::{CellValue, ColumnDescription, Row, RowId, Store, StoreError, TableSpec, KEY_COLUMN};

/// One stored row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub id: RowId,
    pub values: IndexMap<String, CellValue>,
}

impl StoredRow {
    fn get(&self, column: &str) -> Option<&CellValue> {
        self.values
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    /// Text cell by column name (case-insensitive).
    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(CellValue::as_text)
    }

    /// Foreign key cell by column name (case-insensitive).
    pub fn key(&self, column: &str) -> Option<RowId> {
        self.get(column).and_then(CellValue::as_key)
    }
}

#[derive(Debug, Clone)]
struct MemoryTable {
    name: String,
    parent: Option<String>,
    foreign_key: Option<String>,
    columns: Vec<ColumnDescription>,
    rows: Vec<StoredRow>,
    next_id: i64,
}

impl MemoryTable {
    fn column(&self, name: &str) -> Option<&ColumnDescription> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn contains_id(&self, id: RowId) -> bool {
        self.rows.iter().any(|row| row.id == id)
    }
}

/// Storage backend holding all tables in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: IndexMap<String, MemoryTable>,
    foreign_key_checks: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject foreign keys that do not reference an existing parent row.
    pub fn with_foreign_key_checks(mut self) -> Self {
        self.foreign_key_checks = true;
        self
    }

    /// Register a table with an explicit catalog description, as if it had
    /// been created by an earlier run or by hand.
    pub fn define_table(&mut self, name: &str, columns: Vec<ColumnDescription>) {
        self.tables.insert(
            name.to_ascii_lowercase(),
            MemoryTable {
                name: name.to_string(),
                parent: None,
                foreign_key: None,
                columns,
                rows: Vec::new(),
                next_id: 1,
            },
        );
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.values().map(|t| t.name.as_str()).collect()
    }

    /// Rows of `table` in insertion order; empty for unknown tables.
    pub fn rows(&self, table: &str) -> &[StoredRow] {
        self.table(table).map(|t| t.rows.as_slice()).unwrap_or(&[])
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.rows(table).len()
    }

    fn table(&self, name: &str) -> Option<&MemoryTable> {
        self.tables.get(&name.to_ascii_lowercase())
    }

    fn check_row(&self, table: &MemoryTable, row: &Row) -> Result<(), StoreError> {
        let rejected = |reason: String| StoreError::Rejected {
            table: table.name.clone(),
            reason,
        };

        let mut seen: Vec<String> = Vec::with_capacity(row.len());
        for (name, value) in row {
            let column = table.column(name).ok_or_else(|| StoreError::UnknownColumn {
                table: table.name.clone(),
                column: name.clone(),
            })?;

            let lower = name.to_ascii_lowercase();
            if seen.contains(&lower) {
                return Err(rejected(format!("column {} specified more than once", name)));
            }
            seen.push(lower);

            if name.eq_ignore_ascii_case(KEY_COLUMN) {
                return Err(rejected(format!("cannot insert an explicit value into generated column {}", name)));
            }

            if let Some(text) = value.as_text() {
                if !column.long_text && text.chars().count() > BOUNDED_TEXT_LEN {
                    return Err(rejected(format!(
                        "value too long for column {} ({} characters, limit {})",
                        name,
                        text.chars().count(),
                        BOUNDED_TEXT_LEN
                    )));
                }
            }
        }

        if let Some(foreign_key) = &table.foreign_key {
            let value = row
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(foreign_key))
                .map(|(_, value)| value);

            let parent_id = match value {
                Some(CellValue::Key(id)) => *id,
                Some(CellValue::Text(Some(text))) => match text.trim().parse::<i64>() {
                    Ok(id) => RowId(id),
                    Err(_) => return Err(rejected(format!("{} is not a valid key for {}", text, foreign_key))),
                },
                Some(CellValue::Text(None)) | None => {
                    return Err(rejected(format!("null value in column {} violates not-null constraint", foreign_key)));
                }
            };

            if self.foreign_key_checks {
                let parent_exists = table
                    .parent
                    .as_deref()
                    .and_then(|parent| self.table(parent))
                    .map_or(false, |parent| parent.contains_id(parent_id));

                if !parent_exists {
                    return Err(rejected(format!(
                        "{} = {} does not reference an existing row",
                        foreign_key, parent_id
                    )));
                }
            }
        }

        Ok(())
    }
}

impl Store for MemoryStore {
    fn table_exists(&mut self, table: &str) -> Result<bool, StoreError> {
        Ok(self.table(table).is_some())
    }

    fn describe_columns(&mut self, table: &str) -> Result<Vec<ColumnDescription>, StoreError> {
        self.table(table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }

    fn create_table(&mut self, spec: &TableSpec) -> Result<(), StoreError> {
        let key = spec.name.to_ascii_lowercase();
        if self.tables.contains_key(&key) {
            return Err(StoreError::TableExists(spec.name.clone()));
        }

        let foreign_key = spec.foreign_key();

        let mut columns = vec![ColumnDescription {
            name: KEY_COLUMN.to_string(),
            long_text: false,
        }];
        if let Some(foreign_key) = &foreign_key {
            columns.push(ColumnDescription {
                name: foreign_key.clone(),
                long_text: false,
            });
        }

        for column in &spec.columns {
            if columns.iter().any(|c| c.name.eq_ignore_ascii_case(&column.name)) {
                return Err(StoreError::Rejected {
                    table: spec.name.clone(),
                    reason: format!("duplicate column name {}", column.name),
                });
            }
            columns.push(ColumnDescription {
                name: column.name.clone(),
                long_text: column.long_text,
            });
        }

        self.tables.insert(
            key,
            MemoryTable {
                name: spec.name.clone(),
                parent: spec.parent.clone(),
                foreign_key,
                columns,
                rows: Vec::new(),
                next_id: 1,
            },
        );
        Ok(())
    }

    fn insert_row(&mut self, table: &str, row: &Row) -> Result<RowId, StoreError> {
        let stored = self
            .table(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        self.check_row(stored, row)?;

        let stored = self
            .tables
            .get_mut(&table.to_ascii_lowercase())
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

        let id = RowId(stored.next_id);
        stored.next_id += 1;
        stored.rows.push(StoredRow {
            id,
            values: row.clone(),
        });

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ColumnSpec;

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store
            .create_table(&TableSpec {
                name: "Encounter".to_string(),
                parent: None,
                columns: vec![ColumnSpec::new("fileName", false)],
            })
            .unwrap();
        store
            .create_table(&TableSpec {
                name: "Diagnosis".to_string(),
                parent: Some("Encounter".to_string()),
                columns: vec![ColumnSpec::new("Code", false), ColumnSpec::new("Note", true)],
            })
            .unwrap();
        store
    }

    fn text(value: &str) -> CellValue {
        CellValue::Text(Some(value.to_string()))
    }

    #[test]
    fn test_generated_ids_are_sequential_per_table() {
        let mut store = store();
        let mut row = Row::new();
        row.insert("fileName".to_string(), text("a.xml"));

        assert_eq!(store.insert_row("Encounter", &row).unwrap(), RowId(1));
        assert_eq!(store.insert_row("encounter", &row).unwrap(), RowId(2));

        let mut child = Row::new();
        child.insert("EncounterId".to_string(), CellValue::Key(RowId(2)));
        child.insert("Code".to_string(), text("A01"));
        assert_eq!(store.insert_row("Diagnosis", &child).unwrap(), RowId(1));

        let stored = &store.rows("Diagnosis")[0];
        assert_eq!(stored.key("encounterid"), Some(RowId(2)));
        assert_eq!(stored.text("code"), Some("A01"));
    }

    #[test]
    fn test_describe_columns_includes_keys() {
        let mut store = store();
        let columns = store.describe_columns("DIAGNOSIS").unwrap();
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();

        assert_eq!(names, vec!["id", "EncounterId", "Code", "Note"]);
        assert!(columns[3].long_text);
        assert!(store.table_exists("diagnosis").unwrap());
        assert!(!store.table_exists("Procedure").unwrap());
    }

    #[test]
    fn test_constraint_violations() {
        let mut store = store();

        let mut missing_fk = Row::new();
        missing_fk.insert("Code".to_string(), text("A01"));
        assert!(matches!(
            store.insert_row("Diagnosis", &missing_fk),
            Err(StoreError::Rejected { .. })
        ));

        let mut explicit_id = Row::new();
        explicit_id.insert("id".to_string(), text("7"));
        assert!(store.insert_row("Encounter", &explicit_id).is_err());

        let mut unknown = Row::new();
        unknown.insert("Other".to_string(), text("x"));
        assert!(matches!(
            store.insert_row("Encounter", &unknown),
            Err(StoreError::UnknownColumn { .. })
        ));

        let mut too_long = Row::new();
        too_long.insert("fileName".to_string(), text(&"x".repeat(256)));
        assert!(store.insert_row("Encounter", &too_long).is_err());

        let mut long_note = Row::new();
        long_note.insert("EncounterId".to_string(), CellValue::Key(RowId(1)));
        long_note.insert("Note".to_string(), text(&"x".repeat(5000)));
        assert!(store.insert_row("Diagnosis", &long_note).is_ok());

        assert_eq!(store.row_count("Encounter"), 0);
    }

    #[test]
    fn test_foreign_key_checks() {
        let mut store = store().with_foreign_key_checks();

        let mut orphan = Row::new();
        orphan.insert("EncounterId".to_string(), CellValue::Key(RowId::INVALID));
        assert!(store.insert_row("Diagnosis", &orphan).is_err());

        let mut header = Row::new();
        header.insert("fileName".to_string(), text("a.xml"));
        let parent = store.insert_row("Encounter", &header).unwrap();

        let mut child = Row::new();
        child.insert("EncounterId".to_string(), CellValue::Key(parent));
        assert!(store.insert_row("Diagnosis", &child).is_ok());
    }

    #[test]
    fn test_create_existing_table_fails() {
        let mut store = store();
        let result = store.create_table(&TableSpec {
            name: "ENCOUNTER".to_string(),
            parent: None,
            columns: Vec::new(),
        });
        assert!(matches!(result, Err(StoreError::TableExists(_))));
    }
}
