//! The materialization engine.
//!
//! A run reconciles the schema once ([`schema`]), then reads documents
//! ([`source`]) and materializes each one ([`convert`], [`materialize`]).

pub mod convert;
pub mod materialize;
pub mod schema;
pub mod source;

use crate::document::{DocumentError, XPathError};

pub use convert::{ConvertOptions, Converter, DocumentErrorPolicy, DEFAULT_FILE_NAME_COLUMN};
pub use materialize::{InsertTally, Materializer, OrphanPolicy};
pub use schema::{ensure_table, Reconciler, SchemaError};
pub use source::{read_document, DirectorySource, InputDocument, DEFAULT_PATTERN};

/// Document-level failures.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("failed to read {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{name}: {source}")]
    Document {
        name: String,
        #[source]
        source: DocumentError,
    },

    #[error("context expression \"{expression}\" of group {table} failed: {source}")]
    Context {
        table: String,
        expression: String,
        #[source]
        source: XPathError,
    },
}

impl ConvertError {
    /// Name of the document the error belongs to, when known.
    pub fn document_name(&self) -> Option<&str> {
        match self {
            ConvertError::Read { name, .. } | ConvertError::Document { name, .. } => Some(name),
            ConvertError::Context { .. } => None,
        }
    }
}
