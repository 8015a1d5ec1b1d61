//! Schema reconciliation.
//!
//! Makes sure every table of the mapping tree exists with the expected
//! columns before any row is written: missing tables are created, existing
//! ones are checked column by column.

use crate::mapping::{foreign_key_column, Column, GroupId, MappingTree};
use crate::report::{Diagnostic, DiagnosticKind, RunLog};
use crate::storage::{ColumnDescription, ColumnSpec, Store, StoreError, TableSpec, KEY_COLUMN};

/// Errors that stop a run before any document is processed.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Could not find correct definition of column {column} in table {table}")]
    Mismatch { table: String, column: String },

    #[error("could not create table {table}: {source}")]
    Create {
        table: String,
        #[source]
        source: StoreError,
    },

    #[error("could not inspect table {table}: {source}")]
    Inspect {
        table: String,
        #[source]
        source: StoreError,
    },
}

/// Builds table definitions from a mapping tree and reconciles them with a
/// store.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'a> {
    tree: &'a MappingTree,
    file_name_column: &'a str,
}

impl<'a> Reconciler<'a> {
    pub fn new(tree: &'a MappingTree, file_name_column: &'a str) -> Self {
        Self { tree, file_name_column }
    }

    /// Definition of the root table: the file-identifying column, then the
    /// header columns.
    pub fn root_spec(&self) -> TableSpec {
        let mut columns = vec![ColumnSpec::new(self.file_name_column, false)];
        columns.extend(self.tree.header_columns().iter().map(column_spec));
        table_spec(self.tree.root_table(), None, columns)
    }

    pub fn group_spec(&self, id: GroupId) -> TableSpec {
        let group = self.tree.group(id);
        table_spec(
            group.table(),
            Some(self.tree.parent_table(id)),
            group.columns().iter().map(column_spec).collect(),
        )
    }

    /// Every table definition, root first, then groups in pre-order.
    pub fn table_specs(&self) -> Vec<TableSpec> {
        let mut specs = vec![self.root_spec()];
        specs.extend(self.tree.pre_order().into_iter().map(|id| self.group_spec(id)));
        specs
    }

    /// Reconcile the whole tree: the root table, then every group.
    pub fn ensure_schema<S: Store + ?Sized>(&self, store: &mut S, log: &mut RunLog) -> Result<(), SchemaError> {
        ensure_table(store, &self.root_spec(), log)?;

        for &id in self.tree.top_level() {
            self.ensure_group(store, id, log)?;
        }

        log.push(Diagnostic::info(DiagnosticKind::Schema, "Schema validated"));
        Ok(())
    }

    /// Reconcile the table of `id`, then its children, in pre-order.
    pub fn ensure_group<S: Store + ?Sized>(
        &self,
        store: &mut S,
        id: GroupId,
        log: &mut RunLog,
    ) -> Result<(), SchemaError> {
        ensure_table(store, &self.group_spec(id), log)?;

        for &child in self.tree.children(id) {
            self.ensure_group(store, child, log)?;
        }
        Ok(())
    }
}

/// Create `spec`'s table if it is missing, otherwise check that every
/// expected column exists with the right text kind.
///
/// Existing tables are never altered.
pub fn ensure_table<S: Store + ?Sized>(store: &mut S, spec: &TableSpec, log: &mut RunLog) -> Result<(), SchemaError> {
    let inspect = |source| SchemaError::Inspect {
        table: spec.name.clone(),
        source,
    };

    if !store.table_exists(&spec.name).map_err(inspect)? {
        log.push(
            Diagnostic::info(DiagnosticKind::Schema, format!("Creating table {}", spec.name)).with_table(&spec.name),
        );
        return store.create_table(spec).map_err(|source| SchemaError::Create {
            table: spec.name.clone(),
            source,
        });
    }

    let actual = store.describe_columns(&spec.name).map_err(inspect)?;
    for expected in expected_columns(spec) {
        let found = actual
            .iter()
            .any(|column| column.name.eq_ignore_ascii_case(&expected.name) && column.long_text == expected.long_text);

        if !found {
            return Err(SchemaError::Mismatch {
                table: spec.name.clone(),
                column: expected.name.to_ascii_uppercase(),
            });
        }
    }

    log.push(
        Diagnostic::info(DiagnosticKind::Schema, format!("Validated existing table {}", spec.name))
            .with_table(&spec.name),
    );
    Ok(())
}

/// Columns an existing table must have: generated key, foreign key and
/// configured columns.
fn expected_columns(spec: &TableSpec) -> Vec<ColumnDescription> {
    let mut expected = vec![ColumnDescription {
        name: KEY_COLUMN.to_string(),
        long_text: false,
    }];

    if let Some(foreign_key) = spec.foreign_key() {
        expected.push(ColumnDescription {
            name: foreign_key,
            long_text: false,
        });
    }

    expected.extend(spec.columns.iter().map(|column| ColumnDescription {
        name: column.name.clone(),
        long_text: column.long_text,
    }));
    expected
}

fn column_spec(column: &Column) -> ColumnSpec {
    ColumnSpec::new(column.name(), column.is_narrative())
}

/// Drop configured columns that would collide with the generated key, the
/// foreign key or an earlier column of the same table.
fn table_spec(name: &str, parent: Option<&str>, columns: Vec<ColumnSpec>) -> TableSpec {
    let mut declared = vec![KEY_COLUMN.to_ascii_lowercase()];
    if let Some(parent) = parent {
        declared.push(foreign_key_column(parent).to_ascii_lowercase());
    }

    let mut kept = Vec::with_capacity(columns.len());
    for column in columns {
        let lower = column.name.to_ascii_lowercase();
        if declared.contains(&lower) {
            tracing::debug!(table = name, column = %column.name, "Column collides with a declared column");
            continue;
        }
        declared.push(lower);
        kept.push(column);
    }

    TableSpec {
        name: name.to_string(),
        parent: parent.map(str::to_string),
        columns: kept,
    }
}
