//! Run diagnostics, progress events and the final run report.
//!
//! Every notable condition met during a conversion run (schema mismatch,
//! missing group data, extraction or insertion failure) becomes a
//! [`Diagnostic`]. Diagnostics are collected in order by a [`RunLog`],
//! mirrored into `tracing`, and optionally streamed to a progress channel
//! while the run is still going.

use std::fmt;
use std::sync::mpsc::Sender;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// What kind of condition a diagnostic reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A column name collides with a generated column
    ReservedColumn,
    /// A column name occurs more than once in one table
    DuplicateColumn,
    /// Schema validation or creation progress
    Schema,
    /// An existing table does not match the descriptor
    SchemaMismatch,
    /// A group context matched nothing
    NoGroupData,
    /// A cell value could not be extracted
    Extraction,
    /// The backend rejected a row
    Insert,
    /// A document could not be read or parsed
    Document,
    /// General progress information
    Progress,
}

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One human-readable event of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub message: String,
    /// Source document the event belongs to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    /// Table the event belongs to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            document: None,
            table: None,
        }
    }

    pub fn info(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Info, message)
    }

    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Warning, message)
    }

    pub fn error(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Error, message)
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.document {
            Some(document) => write!(f, "[{}] {}", document, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every document was visited
    Completed,
    /// Schema reconciliation failed, no document was processed
    SchemaFailed,
    /// A document-level error stopped the run
    Aborted,
}

impl RunStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }
}

/// Events published on the progress channel.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Diagnostic(Diagnostic),
    /// Sent exactly once, last
    Completed(RunStatus),
}

/// Ordered diagnostic sink for one run.
///
/// The completion signal is emitted by [`RunLog::finish`], which consumes
/// the log, so a run can only complete once.
#[derive(Debug, Default)]
pub struct RunLog {
    diagnostics: Vec<Diagnostic>,
    document: Option<String>,
    progress: Option<Sender<RunEvent>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log that also streams every event to `progress`.
    pub fn with_channel(progress: Sender<RunEvent>) -> Self {
        Self {
            diagnostics: Vec::new(),
            document: None,
            progress: Some(progress),
        }
    }

    /// Attach subsequent diagnostics to a source document.
    pub fn set_document(&mut self, document: Option<String>) {
        self.document = document;
    }

    pub fn push(&mut self, mut diagnostic: Diagnostic) {
        if diagnostic.document.is_none() {
            diagnostic.document = self.document.clone();
        }

        match diagnostic.severity {
            Severity::Info => tracing::info!(kind = ?diagnostic.kind, "{}", diagnostic),
            Severity::Warning => tracing::warn!(kind = ?diagnostic.kind, "{}", diagnostic),
            Severity::Error => tracing::error!(kind = ?diagnostic.kind, "{}", diagnostic),
        }

        if let Some(progress) = &self.progress {
            // A dropped receiver only means nobody is watching progress
            let _ = progress.send(RunEvent::Diagnostic(diagnostic.clone()));
        }

        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.push(diagnostic);
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics.iter().filter(|d| d.kind == kind).count()
    }

    /// Signal completion and hand back the collected diagnostics.
    pub fn finish(self, status: RunStatus) -> Vec<Diagnostic> {
        tracing::info!(?status, diagnostics = self.diagnostics.len(), "Conversion finished");

        if let Some(progress) = &self.progress {
            let _ = progress.send(RunEvent::Completed(status));
        }

        self.diagnostics
    }
}

/// What happened to one input document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    /// Header inserted and all groups processed
    Done,
    /// Header insertion failed, groups were not processed
    Skipped,
    /// The document could not be read or parsed
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentOutcome {
    pub name: String,
    pub state: DocumentState,
    pub rows_inserted: usize,
}

/// Result of a whole conversion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub diagnostics: Vec<Diagnostic>,
    pub documents: Vec<DocumentOutcome>,
    /// Inserted rows per table, in schema order
    pub rows_per_table: IndexMap<String, usize>,
    pub failed_inserts: usize,
}

impl RunReport {
    pub fn rows_in(&self, table: &str) -> usize {
        self.rows_per_table.get(table).copied().unwrap_or(0)
    }

    pub fn total_rows(&self) -> usize {
        self.rows_per_table.values().sum()
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
