//! Type definitions for mapping descriptor files.
//!
//! These types mirror the YAML/JSON descriptor layout one to one and carry
//! no behaviour; [`MappingTree`](crate::mapping::MappingTree) is built from
//! them once per run.

use serde::{Deserialize, Serialize};

/// Root of a mapping descriptor.
///
/// ```yaml
/// table: Encounter
/// namespaces:
///   - prefix: cda
///     uri: urn:hl7-org:v3
/// columns:
///   - name: PatientId
///     value: "@id"
/// groups:
///   - table: Diagnosis
///     context: ".//diagnosis"
///     columns:
///       - name: Code
///         value: "@code"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DescriptorDef {
    /// Root (header) table, one row per document
    #[serde(alias = "table_name", alias = "tableName")]
    pub table: String,

    /// Header columns, resolved against the document element
    #[serde(default)]
    pub columns: Vec<ColumnDef>,

    #[serde(default)]
    pub namespaces: Vec<NamespaceDef>,

    /// Top-level groups, resolved against the document root
    #[serde(default)]
    pub groups: Vec<GroupDef>,
}

/// A table bound to a context expression.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GroupDef {
    #[serde(alias = "table_name", alias = "tableName")]
    pub table: String,

    /// Selects one node per row, relative to the parent row's node
    pub context: String,

    #[serde(default)]
    pub columns: Vec<ColumnDef>,

    #[serde(default)]
    pub groups: Vec<GroupDef>,
}

/// A single-value extraction rule.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ColumnDef {
    pub name: String,

    /// Path expression; empty means no extraction
    #[serde(default)]
    pub value: String,

    /// Aggregate all descendant text into a long text column
    #[serde(default, alias = "is_narrative", alias = "isNarrative")]
    pub narrative: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NamespaceDef {
    pub prefix: String,
    pub uri: String,
}
