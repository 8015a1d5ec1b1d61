//! Immutable mapping tree.
//!
//! Groups are stored in an arena and addressed by [`GroupId`]. Each group's
//! parent link is assigned once, during the single top-down pass that
//! builds the arena, and never changes afterwards.

use std::collections::HashSet;
use crate::document::{Expression, Namespaces};
use crate::mapping::loader::ConfigError;
use crate::mapping::types::{ColumnDef, DescriptorDef, GroupDef};
use crate::report::{Diagnostic, DiagnosticKind};

/// Index of a group in the mapping arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(usize);

impl GroupId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A compiled column extraction rule.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    expression: Expression,
    narrative: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, expression: &str, narrative: bool) -> Self {
        Self {
            name: name.into(),
            expression: Expression::compile(expression),
            narrative,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn is_narrative(&self) -> bool {
        self.narrative
    }
}

impl From<&ColumnDef> for Column {
    fn from(def: &ColumnDef) -> Self {
        Column::new(def.name.clone(), &def.value, def.narrative)
    }
}

/// A group node of the arena.
#[derive(Debug, Clone)]
pub struct GroupNode {
    table: String,
    context: Expression,
    columns: Vec<Column>,
    children: Vec<GroupId>,
    parent: Option<GroupId>,
}

impl GroupNode {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn context(&self) -> &Expression {
        &self.context
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn children(&self) -> &[GroupId] {
        &self.children
    }

    /// Parent group, `None` for top-level groups.
    pub fn parent(&self) -> Option<GroupId> {
        self.parent
    }
}

/// The mapping model for one run.
#[derive(Debug, Clone)]
pub struct MappingTree {
    root_table: String,
    header_columns: Vec<Column>,
    namespaces: Namespaces,
    groups: Vec<GroupNode>,
    top_level: Vec<GroupId>,
}

impl MappingTree {
    /// Build and validate the tree from a loaded descriptor.
    ///
    /// # Errors
    /// Returns [`ConfigError`] for empty or non-identifier table and column
    /// names, empty group contexts and tables mapped more than once.
    /// Malformed expressions are not errors here; they fail per cell
    /// during extraction.
    pub fn build(descriptor: &DescriptorDef) -> Result<Self, ConfigError> {
        check_table_name(&descriptor.table, "root descriptor")?;
        check_columns(&descriptor.columns)?;

        let mut namespaces = Namespaces::new();
        for ns in &descriptor.namespaces {
            namespaces.bind(ns.prefix.clone(), ns.uri.clone());
        }

        let mut tree = MappingTree {
            root_table: descriptor.table.clone(),
            header_columns: descriptor.columns.iter().map(Column::from).collect(),
            namespaces,
            groups: Vec::new(),
            top_level: Vec::new(),
        };

        let mut seen_tables = HashSet::new();
        seen_tables.insert(descriptor.table.to_ascii_lowercase());

        for group in &descriptor.groups {
            let id = tree.add_group(group, None, &mut seen_tables)?;
            tree.top_level.push(id);
        }

        Ok(tree)
    }

    fn add_group(
        &mut self,
        def: &GroupDef,
        parent: Option<GroupId>,
        seen_tables: &mut HashSet<String>,
    ) -> Result<GroupId, ConfigError> {
        check_table_name(&def.table, "group")?;
        check_columns(&def.columns)?;

        if def.context.trim().is_empty() {
            return Err(ConfigError::EmptyContext {
                table: def.table.clone(),
            });
        }

        if !seen_tables.insert(def.table.to_ascii_lowercase()) {
            return Err(ConfigError::DuplicateTable(def.table.clone()));
        }

        let id = GroupId(self.groups.len());
        self.groups.push(GroupNode {
            table: def.table.clone(),
            context: Expression::compile(&def.context),
            columns: def.columns.iter().map(Column::from).collect(),
            children: Vec::new(),
            parent,
        });

        for child in &def.groups {
            let child_id = self.add_group(child, Some(id), seen_tables)?;
            self.groups[id.0].children.push(child_id);
        }

        Ok(id)
    }

    pub fn root_table(&self) -> &str {
        &self.root_table
    }

    pub fn header_columns(&self) -> &[Column] {
        &self.header_columns
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    pub fn top_level(&self) -> &[GroupId] {
        &self.top_level
    }

    pub fn group(&self, id: GroupId) -> &GroupNode {
        &self.groups[id.0]
    }

    pub fn parent(&self, id: GroupId) -> Option<GroupId> {
        self.group(id).parent
    }

    pub fn children(&self, id: GroupId) -> &[GroupId] {
        &self.group(id).children
    }

    /// Table whose rows own the rows of `id`: the parent group's table, or
    /// the root table for top-level groups.
    pub fn parent_table(&self, id: GroupId) -> &str {
        match self.parent(id) {
            Some(parent) => self.group(parent).table(),
            None => &self.root_table,
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// All groups in pre-order (parent before children, siblings in
    /// descriptor order).
    pub fn pre_order(&self) -> Vec<GroupId> {
        let mut order = Vec::with_capacity(self.groups.len());
        let mut stack: Vec<GroupId> = self.top_level.iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }

        order
    }

    /// Report duplicate and reserved column names.
    ///
    /// These are diagnostics, not errors. A column named like the parent
    /// key or the file name column is never written over the generated
    /// value; every other column is still extracted and written.
    pub fn lint(&self, file_name_column: &str) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        let mut root_names = vec![file_name_column.to_string()];
        root_names.extend(self.header_columns.iter().map(|c| c.name().to_string()));
        lint_table(&self.root_table, &root_names, None, &mut diagnostics);

        for id in self.pre_order() {
            let group = self.group(id);
            let names: Vec<String> = group.columns.iter().map(|c| c.name().to_string()).collect();
            lint_table(group.table(), &names, Some(self.parent_table(id)), &mut diagnostics);
        }

        diagnostics
    }
}

/// Name of the foreign key column pointing at `parent_table`.
pub fn foreign_key_column(parent_table: &str) -> String {
    format!("{}Id", parent_table)
}

fn lint_table(table: &str, names: &[String], parent_table: Option<&str>, out: &mut Vec<Diagnostic>) {
    let mut seen = HashSet::new();
    let foreign_key = parent_table.map(foreign_key_column);

    for name in names {
        if !seen.insert(name.to_ascii_lowercase()) {
            out.push(
                Diagnostic::warning(
                    DiagnosticKind::DuplicateColumn,
                    format!("Column {} in table {} is duplicated (occurs more than once)", name, table),
                )
                .with_table(table),
            );
        }

        if name.eq_ignore_ascii_case("id") {
            out.push(
                Diagnostic::warning(
                    DiagnosticKind::ReservedColumn,
                    format!(
                        "Column name \"id\" in table {} is reserved for use. Please rename the column in the descriptor.",
                        table
                    ),
                )
                .with_table(table),
            );
        }

        if let Some(foreign_key) = &foreign_key {
            if name.eq_ignore_ascii_case(foreign_key) {
                out.push(
                    Diagnostic::warning(
                        DiagnosticKind::ReservedColumn,
                        format!(
                            "Column name \"{}\" in table {} is reserved for use. Please rename the column in the descriptor.",
                            foreign_key, table
                        ),
                    )
                    .with_table(table),
                );
            }
        }
    }
}

/// Plain SQL identifier: ASCII letter or underscore, then letters, digits
/// or underscores.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_table_name(table: &str, location: &str) -> Result<(), ConfigError> {
    if table.trim().is_empty() {
        return Err(ConfigError::EmptyTableName {
            location: location.to_string(),
        });
    }
    if !is_identifier(table) {
        return Err(ConfigError::InvalidIdentifier {
            kind: "table",
            name: table.to_string(),
        });
    }
    Ok(())
}

fn check_columns(columns: &[ColumnDef]) -> Result<(), ConfigError> {
    for column in columns {
        if !is_identifier(&column.name) {
            return Err(ConfigError::InvalidIdentifier {
                kind: "column",
                name: column.name.clone(),
            });
        }
    }
    Ok(())
}
