//! Conversion runs: reconcile once, then materialize every document.

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::document::parse_document;
use crate::engine::materialize::{insert_logged, InsertTally, Materializer, OrphanPolicy};
use crate::engine::schema::{Reconciler, SchemaError};
use crate::engine::source::InputDocument;
use crate::engine::ConvertError;
use crate::extract::Extractor;
use crate::mapping::MappingTree;
use crate::report::{Diagnostic, DiagnosticKind, DocumentOutcome, DocumentState, RunLog, RunReport, RunStatus};
use crate::storage::{CellValue, Row, Store};

/// Default name of the root table column identifying the source document.
pub const DEFAULT_FILE_NAME_COLUMN: &str = "fileName";

/// What to do when a document cannot be read or parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentErrorPolicy {
    /// Stop the whole run
    #[default]
    AbortRun,
    /// Log the failure and continue with the next document
    SkipDocument,
}

impl DocumentErrorPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentErrorPolicy::AbortRun => "abort_run",
            DocumentErrorPolicy::SkipDocument => "skip_document",
        }
    }
}

impl fmt::Display for DocumentErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "abort_run" | "abort" => Ok(DocumentErrorPolicy::AbortRun),
            "skip_document" | "skip" => Ok(DocumentErrorPolicy::SkipDocument),
            other => Err(format!(
                "unknown document error policy '{}' (expected abort_run or skip_document)",
                other
            )),
        }
    }
}

/// Run options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    pub file_name_column: String,
    pub orphan_policy: OrphanPolicy,
    pub document_policy: DocumentErrorPolicy,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            file_name_column: DEFAULT_FILE_NAME_COLUMN.to_string(),
            orphan_policy: OrphanPolicy::default(),
            document_policy: DocumentErrorPolicy::default(),
        }
    }
}

/// Drives conversion runs for one mapping tree.
///
/// # Example
///
/// ```ignore
/// let tree = MappingTree::build(&load_descriptor("encounter.yaml")?)?;
/// let source = DirectorySource::new("input", "*.xml")?;
/// let mut store = MemoryStore::new();
///
/// let report = Converter::new(&tree).convert(&mut store, source.documents(), RunLog::new());
/// println!("{:?}: {} rows", report.status, report.total_rows());
/// ```
#[derive(Debug, Clone)]
pub struct Converter<'a> {
    tree: &'a MappingTree,
    options: ConvertOptions,
}

impl<'a> Converter<'a> {
    pub fn new(tree: &'a MappingTree) -> Self {
        Self::with_options(tree, ConvertOptions::default())
    }

    pub fn with_options(tree: &'a MappingTree, options: ConvertOptions) -> Self {
        Self { tree, options }
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    pub fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(self.tree, &self.options.file_name_column)
    }

    /// Run one conversion.
    ///
    /// Never fails: every problem ends up in the report's diagnostics and
    /// status. The log's completion event fires exactly once, when this
    /// returns.
    pub fn convert<S, I>(&self, store: &mut S, documents: I, mut log: RunLog) -> RunReport
    where
        S: Store + ?Sized,
        I: IntoIterator<Item = Result<InputDocument, ConvertError>>,
    {
        let mut tally = InsertTally::for_tree(self.tree);
        let mut outcomes = Vec::new();

        log.extend(self.tree.lint(&self.options.file_name_column));

        if let Err(error) = self.reconciler().ensure_schema(store, &mut log) {
            let kind = match error {
                SchemaError::Mismatch { .. } => DiagnosticKind::SchemaMismatch,
                _ => DiagnosticKind::Schema,
            };
            log.push(Diagnostic::error(kind, error.to_string()));
            return self.report(RunStatus::SchemaFailed, log, outcomes, tally);
        }

        let mut status = RunStatus::Completed;

        for document in documents {
            let before = tally.total();

            let (name, result) = match document {
                Ok(document) => {
                    log.set_document(Some(document.name.clone()));
                    log.push(Diagnostic::info(
                        DiagnosticKind::Progress,
                        format!("Processing document {}", document.name),
                    ));
                    let result = self.convert_document(store, &document, &mut log, &mut tally);
                    (document.name, result)
                }
                Err(error) => {
                    let name = error.document_name().unwrap_or_default().to_string();
                    log.set_document(Some(name.clone()));
                    (name, Err(error))
                }
            };

            match result {
                Ok(state) => outcomes.push(DocumentOutcome {
                    name,
                    state,
                    rows_inserted: tally.total() - before,
                }),
                Err(error) => {
                    log.push(Diagnostic::error(DiagnosticKind::Document, error.to_string()));
                    outcomes.push(DocumentOutcome {
                        name,
                        state: DocumentState::Failed,
                        rows_inserted: tally.total() - before,
                    });

                    if self.options.document_policy == DocumentErrorPolicy::AbortRun {
                        status = RunStatus::Aborted;
                        break;
                    }
                }
            }
        }

        log.set_document(None);
        log.push(Diagnostic::info(
            DiagnosticKind::Progress,
            format!(
                "Processed {} document(s), inserted {} row(s)",
                outcomes.len(),
                tally.total()
            ),
        ));

        self.report(status, log, outcomes, tally)
    }

    fn convert_document<S: Store + ?Sized>(
        &self,
        store: &mut S,
        document: &InputDocument,
        log: &mut RunLog,
        tally: &mut InsertTally,
    ) -> Result<DocumentState, ConvertError> {
        let parsed = parse_document(&document.text).map_err(|source| ConvertError::Document {
            name: document.name.clone(),
            source,
        })?;

        let extractor = Extractor::new(self.tree.namespaces());
        let root_element = parsed.root_element();

        let mut header = Row::new();
        header.insert(
            self.options.file_name_column.clone(),
            CellValue::Text(Some(document.name.clone())),
        );
        for column in self.tree.header_columns() {
            if column.name().eq_ignore_ascii_case(&self.options.file_name_column) {
                continue;
            }
            let value = extractor.resolve_column(column, root_element, log);
            header.insert(column.name().to_string(), CellValue::Text(value));
        }

        let header_id = insert_logged(store, self.tree.root_table(), &header, log, tally);
        if !header_id.is_valid() {
            log.push(Diagnostic::warning(
                DiagnosticKind::Insert,
                format!("Skipping document {}: header row was not inserted", document.name),
            ));
            return Ok(DocumentState::Skipped);
        }

        let mut materializer = Materializer::new(self.tree, store, log, tally, self.options.orphan_policy);
        for &group in self.tree.top_level() {
            materializer.process_group(group, parsed.root(), header_id)?;
        }

        Ok(DocumentState::Done)
    }

    fn report(&self, status: RunStatus, log: RunLog, documents: Vec<DocumentOutcome>, tally: InsertTally) -> RunReport {
        RunReport {
            status,
            diagnostics: log.finish(status),
            documents,
            rows_per_table: tally.rows_per_table,
            failed_inserts: tally.failed_inserts,
        }
    }
}
