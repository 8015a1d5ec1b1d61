//! Row materialization: the recursive walk over groups and document nodes.

use std::fmt;
use std::str::FromStr;
use indexmap::IndexMap;
use roxmltree::Node;
use serde::{Deserialize, Serialize};
use crate::engine::ConvertError;
use crate::extract::Extractor;
use crate::mapping::{foreign_key_column, GroupId, MappingTree};
use crate::report::{Diagnostic, DiagnosticKind, RunLog};
use crate::storage::{CellValue, Row, RowId, Store};

/// What to do with the child groups of a row whose insert failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Keep descending; children reference [`RowId::INVALID`]
    #[default]
    ContinueWithSentinel,
    /// Do not process the failed row's child groups
    SkipSubtree,
}

impl OrphanPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrphanPolicy::ContinueWithSentinel => "continue_with_sentinel",
            OrphanPolicy::SkipSubtree => "skip_subtree",
        }
    }
}

impl fmt::Display for OrphanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrphanPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "continue_with_sentinel" | "continue" => Ok(OrphanPolicy::ContinueWithSentinel),
            "skip_subtree" | "skip" => Ok(OrphanPolicy::SkipSubtree),
            other => Err(format!(
                "unknown orphan policy '{}' (expected continue_with_sentinel or skip_subtree)",
                other
            )),
        }
    }
}

/// Insert counts of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertTally {
    pub rows_per_table: IndexMap<String, usize>,
    pub failed_inserts: usize,
}

impl InsertTally {
    /// Tally with a zero entry for every table, in schema order.
    pub fn for_tree(tree: &MappingTree) -> Self {
        let mut rows_per_table = IndexMap::new();
        rows_per_table.insert(tree.root_table().to_string(), 0);
        for id in tree.pre_order() {
            rows_per_table.insert(tree.group(id).table().to_string(), 0);
        }
        Self {
            rows_per_table,
            failed_inserts: 0,
        }
    }

    pub fn inserted(&mut self, table: &str) {
        *self.rows_per_table.entry(table.to_string()).or_insert(0) += 1;
    }

    pub fn failed(&mut self) {
        self.failed_inserts += 1;
    }

    pub fn total(&self) -> usize {
        self.rows_per_table.values().sum()
    }
}

/// Insert one row and account for it. A rejected row is logged and gets
/// [`RowId::INVALID`].
pub(crate) fn insert_logged<S: Store + ?Sized>(
    store: &mut S,
    table: &str,
    row: &Row,
    log: &mut RunLog,
    tally: &mut InsertTally,
) -> RowId {
    match store.insert_row(table, row) {
        Ok(id) => {
            tally.inserted(table);
            id
        }
        Err(error) => {
            tally.failed();
            log.push(
                Diagnostic::error(
                    DiagnosticKind::Insert,
                    format!("Error inserting row into {}: {}", table, error),
                )
                .with_table(table),
            );
            RowId::INVALID
        }
    }
}

/// Walks the groups of a mapping tree over one document.
pub struct Materializer<'a, S: Store + ?Sized> {
    tree: &'a MappingTree,
    extractor: Extractor<'a>,
    store: &'a mut S,
    log: &'a mut RunLog,
    tally: &'a mut InsertTally,
    policy: OrphanPolicy,
}

impl<'a, S: Store + ?Sized> Materializer<'a, S> {
    pub fn new(
        tree: &'a MappingTree,
        store: &'a mut S,
        log: &'a mut RunLog,
        tally: &'a mut InsertTally,
        policy: OrphanPolicy,
    ) -> Self {
        Self {
            tree,
            extractor: Extractor::new(tree.namespaces()),
            store,
            log,
            tally,
            policy,
        }
    }

    /// Insert one row of `id`'s table for every node its context selects
    /// under `context`, then recurse into the child groups of each row.
    ///
    /// A row is always inserted before any of its children, so children see
    /// their parent's key (or the sentinel, if the insert failed).
    ///
    /// # Errors
    /// Only a context expression that cannot be evaluated is an error; it
    /// is a document-level failure.
    pub fn process_group(&mut self, id: GroupId, context: Node<'_, '_>, parent_id: RowId) -> Result<(), ConvertError> {
        let tree = self.tree;
        let group = tree.group(id);
        let table = group.table();

        let items = self
            .extractor
            .evaluator()
            .select(group.context(), context)
            .map_err(|source| ConvertError::Context {
                table: table.to_string(),
                expression: group.context().source().to_string(),
                source,
            })?;

        let nodes: Vec<Node<'_, '_>> = items.iter().filter_map(|item| item.node()).collect();
        if nodes.len() < items.len() {
            tracing::debug!(table, skipped = items.len() - nodes.len(), "Ignoring attribute matches of group context");
        }

        if nodes.is_empty() {
            self.log.push(
                Diagnostic::info(
                    DiagnosticKind::NoGroupData,
                    format!("No data found for group {} with expression \"{}\"", table, group.context()),
                )
                .with_table(table),
            );
            return Ok(());
        }

        let foreign_key = foreign_key_column(tree.parent_table(id));

        for node in nodes {
            let mut row = Row::new();
            row.insert(foreign_key.clone(), CellValue::Key(parent_id));
            for column in group.columns() {
                // The generated parent key always wins over a configured column of the same name
                if column.name().eq_ignore_ascii_case(&foreign_key) {
                    continue;
                }
                let value = self.extractor.resolve_column(column, node, self.log);
                row.insert(column.name().to_string(), CellValue::Text(value));
            }

            let row_id = insert_logged(self.store, table, &row, self.log, self.tally);

            if !row_id.is_valid() && self.policy == OrphanPolicy::SkipSubtree {
                if !group.children().is_empty() {
                    self.log.push(
                        Diagnostic::warning(
                            DiagnosticKind::Insert,
                            format!("Skipping child groups of failed row in {}", table),
                        )
                        .with_table(table),
                    );
                }
                continue;
            }

            for &child in group.children() {
                self.process_group(child, node, row_id)?;
            }
        }

        Ok(())
    }
}
