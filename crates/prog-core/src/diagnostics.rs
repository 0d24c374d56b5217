//! Structured reports for non-fatal problems found while rebuilding caches
//! or recomputing dynamic data.

use std::fmt;

use crate::id::{CharacterId, EntryId, OutputId};

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Something was skipped or its value is missing.
    Error,
    /// Data is suspicious but was handled.
    Warning,
}

/// What went wrong, with the identifiers needed to find it again.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticKind {
    /// Following revision links from the entry revisits an entry.
    CyclicChain {
        /// The entry at which the cycle was detected.
        entry: EntryId,
    },
    /// An ID points at something that does not exist or is not in history.
    DanglingReference {
        /// The entry holding the reference.
        entry: EntryId,
        /// The missing target, rendered.
        target: String,
    },
    /// An entry is tagged with an output that does not exist, or an output
    /// is tagged on more than one entry.
    UnknownOutput {
        /// The tagged entry.
        entry: EntryId,
        /// The offending output.
        output: OutputId,
    },
    /// An operation's expression failed to evaluate or apply.
    OperationFailed {
        /// History index being processed.
        index: usize,
        /// Character whose snapshot was being computed.
        character: CharacterId,
        /// Entry that declared the operation, if any.
        entry: Option<EntryId>,
        /// Target key.
        key: String,
        /// Expression text as declared.
        expression: String,
        /// Byte range of the problem inside `expression`, when known.
        span: Option<std::ops::Range<usize>>,
    },
    /// An operation still waited on sibling outputs when resolution stopped.
    Unresolved {
        /// History index being processed.
        index: usize,
        /// Character whose snapshot was being computed.
        character: CharacterId,
        /// Entry that declared the operation, if any.
        entry: Option<EntryId>,
        /// Target key.
        key: String,
        /// Expression text as declared.
        expression: String,
        /// Keys that were still pending.
        waiting_on: Vec<String>,
    },
}

/// A diagnostic message with context.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// How serious the problem is.
    pub severity: Severity,
    /// Structured context.
    pub kind: DiagnosticKind,
    /// Human-readable description.
    pub message: String,
}

impl Diagnostic {
    /// An error diagnostic.
    pub fn error(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            message: message.into(),
        }
    }

    /// A warning diagnostic.
    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            message: message.into(),
        }
    }

    /// The expression text and span, for operation diagnostics.
    pub fn expression(&self) -> Option<(&str, Option<std::ops::Range<usize>>)> {
        match &self.kind {
            DiagnosticKind::OperationFailed {
                expression, span, ..
            } => Some((expression, span.clone())),
            DiagnosticKind::Unresolved { expression, .. } => Some((expression, None)),
            _ => None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{prefix}: {}", self.message)
    }
}
