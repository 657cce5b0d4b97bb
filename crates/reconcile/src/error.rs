//! Error types for reconciliation.
//!
//! Problems found while walking a declared object are collected as
//! [`Diagnostic`]s so that one pass reports all of them. An object with any
//! diagnostic is rejected as a whole; no partial operation is produced.

use crate::value::ScalarKind;
use std::fmt;
use thiserror::Error;

/// A single problem found while reconciling one object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    /// A composite's anchor would be removed while dependent fields stay set
    #[error("{path}: `{}` requires the anchor field `{anchor}` to remain set", .dependents.join("`, `"))]
    StructuralContradiction {
        /// Dotted path of the composite
        path: String,
        /// Anchor sub-field being removed
        anchor: String,
        /// Sub-fields that would still hold a value
        dependents: Vec<String>,
    },

    /// Overlapping instructions for the same field or slot (a defect in the caller)
    #[error("internal consistency violation at {path}: {detail}")]
    InternalConsistency {
        /// Dotted path of the field or slot
        path: String,
        /// What overlapped
        detail: String,
    },

    /// A concrete value of the wrong kind
    #[error("{path}: expected a {expected} value, found {found}")]
    KindMismatch {
        /// Dotted path of the attribute
        path: String,
        /// Kind from the descriptor table
        expected: ScalarKind,
        /// Kind of the supplied value
        found: ScalarKind,
    },

    /// A value for a name the descriptor table does not know
    #[error("{path}: not a known attribute")]
    UnknownAttribute {
        /// Dotted path of the value
        path: String,
    },
}

impl Diagnostic {
    /// Whether this diagnostic points at a bug in calling code rather than user input.
    pub fn is_defect(&self) -> bool {
        matches!(self, Self::InternalConsistency { .. })
    }

    /// Dotted path the diagnostic refers to
    pub fn path(&self) -> &str {
        match self {
            Self::StructuralContradiction { path, .. }
            | Self::InternalConsistency { path, .. }
            | Self::KindMismatch { path, .. }
            | Self::UnknownAttribute { path } => path,
        }
    }

    /// Re-anchor the path below `prefix`
    pub fn within(mut self, prefix: &str) -> Self {
        let path = match &mut self {
            Self::StructuralContradiction { path, .. }
            | Self::InternalConsistency { path, .. }
            | Self::KindMismatch { path, .. }
            | Self::UnknownAttribute { path } => path,
        };
        *path = join_path(prefix, path);
        self
    }
}

/// Diagnostics accumulated for one object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        log::trace!("diagnostic: {diagnostic}");
        self.0.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    /// Whether any diagnostic is a defect in calling code
    pub fn has_defects(&self) -> bool {
        self.0.iter().any(Diagnostic::is_defect)
    }

    /// `Ok(value)` when nothing was recorded, otherwise [`Error::Rejected`]
    pub fn into_result<T>(self, value: T) -> Result<T> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(Error::Rejected(self))
        }
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, iter: I) {
        for diagnostic in iter {
            self.push(diagnostic);
        }
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.0.len() == 1 { "problem" } else { "problems" };
        write!(f, "{} {noun}", self.0.len())?;
        for diagnostic in &self.0 {
            write!(f, "; {diagnostic}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostics {}

/// Errors returned by the engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The attribute-descriptor table is malformed
    #[error("invalid schema at {path}: {message}")]
    Schema {
        /// Dotted path of the offending descriptor
        path: String,
        /// What is wrong with it
        message: String,
    },

    /// The object was rejected; nothing should be written
    #[error("reconciliation rejected: {0}")]
    Rejected(Diagnostics),

    /// Worker pool for batch planning could not be built
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    pub(crate) fn schema(path: &str, message: impl Into<String>) -> Self {
        Self::Schema {
            path: if path.is_empty() { "<root>".to_string() } else { path.to_string() },
            message: message.into(),
        }
    }

    /// Diagnostics carried by a rejection
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            Self::Rejected(diagnostics) => Some(diagnostics),
            _ => None,
        }
    }
}

/// Result type for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Join a dotted path prefix and a name
pub fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else if name.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
