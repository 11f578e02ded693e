//! Compilation context: the diagnostics sink shared by all workers

use crate::graph::NodeId;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    /// Affects build success
    Error,
    /// Worth the user's attention
    Warning,
    /// Informational
    Note,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticLevel::Error => write!(f, "error"),
            DiagnosticLevel::Warning => write!(f, "warning"),
            DiagnosticLevel::Note => write!(f, "note"),
        }
    }
}

/// One reported problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Severity
    pub level: DiagnosticLevel,
    /// Program element (function) the diagnostic belongs to
    pub element: String,
    /// Raw id of the offending node, if any
    pub node: Option<u32>,
    /// Source line, 0 when unknown
    pub line: u32,
    /// Message text
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.level, self.element)?;
        if self.line > 0 {
            write!(f, ":{}", self.line)?;
        }
        if let Some(node) = self.node {
            write!(f, " (n{})", node)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Accumulates diagnostics from every phase and worker
///
/// Reporting never alters the control flow of the reporting pass.
#[derive(Debug, Default)]
pub struct CompilationContext {
    diagnostics: Mutex<Vec<Diagnostic>>,
    errors: AtomicUsize,
}

impl CompilationContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, diagnostic: Diagnostic) {
        self.diagnostics.lock().push(diagnostic);
    }

    /// Report an error against `element`, optionally at a node and line
    pub fn error(
        &self,
        element: &str,
        node: Option<NodeId>,
        line: u32,
        message: impl Into<String>,
    ) {
        let message = message.into();
        tracing::error!("{}: {}", element, message);
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.push(Diagnostic {
            level: DiagnosticLevel::Error,
            element: element.to_string(),
            node: node.map(|id| id.0),
            line,
            message,
        });
    }

    /// Report a warning against `element`
    pub fn warning(&self, element: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}: {}", element, message);
        self.push(Diagnostic {
            level: DiagnosticLevel::Warning,
            element: element.to_string(),
            node: None,
            line: 0,
            message,
        });
    }

    /// Record a note against `element`
    pub fn note(&self, element: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{}: {}", element, message);
        self.push(Diagnostic {
            level: DiagnosticLevel::Note,
            element: element.to_string(),
            node: None,
            line: 0,
            message,
        });
    }

    /// Number of errors reported so far
    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    /// Snapshot of all diagnostics
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().clone()
    }
}
