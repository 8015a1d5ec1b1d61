//! # Docmap: Descriptor-Driven XML to Relational Materialization
//!
//! Docmap loads a batch of XML documents into relational tables whose shape
//! is declared by a mapping descriptor: a tree of groups, each bound to a
//! path expression over the document and a set of column extraction rules.
//!
//! ## Features
//!
//! - **Schema reconciliation**: missing tables are created, existing tables are validated
//! - **Recursive materialization**: one row per matched node, parent keys threaded to children
//! - **Path expressions**: an XPath 1.0 subset evaluated over `roxmltree` documents
//! - **Pluggable storage**: SQLite, PostgreSQL or MySQL through Diesel, or in memory
//! - **Diagnostics**: every notable condition is reported, optionally streamed while running
//!
//! ## Example: Mapping Descriptor
//!
//! ```yaml
//! table: Encounter
//! columns:
//!   - name: PatientId
//!     value: "@id"
//! groups:
//!   - table: Diagnosis
//!     context: ".//diagnosis"
//!     columns:
//!       - name: Code
//!         value: "@code"
//! ```
//!
//! ## Example: Conversion Run
//!
//! ```ignore
//! use docmap::{Converter, DirectorySource, MappingTree, MemoryStore, RunLog};
//!
//! let tree = MappingTree::build(&docmap::load_descriptor("encounter.yaml")?)?;
//! let source = DirectorySource::new("input", "*.xml")?;
//! let mut store = MemoryStore::new();
//!
//! let report = Converter::new(&tree).convert(&mut store, source.documents(), RunLog::new());
//! assert!(report.status.is_success());
//! ```

// Input side: descriptors and documents
pub mod document;
pub mod mapping;

// Cell extraction
pub mod extract;

// Storage port and backends
pub mod storage;

// Reconciliation, materialization and runs
pub mod engine;
pub mod report;

// Run configuration
pub mod config;

// Re-export key types
pub use mapping::{load_descriptor, ConfigError, DescriptorDef, GroupId, MappingTree};
pub use document::{Evaluator, Expression, Namespaces, XPathError};
pub use extract::Extractor;

pub use storage::{CellValue, Database, DatabaseConfig, Dialect, MemoryStore, Row, RowId, SqlStore, Store, StoreError};

pub use engine::{
    ConvertError, ConvertOptions, Converter, DirectorySource, DocumentErrorPolicy, InputDocument, OrphanPolicy,
    Reconciler, SchemaError,
};
pub use report::{Diagnostic, DiagnosticKind, RunEvent, RunLog, RunReport, RunStatus, Severity};

pub use config::RunConfig;
