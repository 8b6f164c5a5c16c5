use std::fmt;

use crate::diagnostic::{Diagnostic, Invariant};

/// Diagnostics of one verification run. Any diagnostic means the module
/// must not be handed on.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VerificationReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl VerificationReport {
    pub fn is_ok(&self) -> bool {
        !self.has_errors()
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Returns `true` if some diagnostic belongs to `invariant`.
    pub fn violates(&self, invariant: Invariant) -> bool {
        self.diagnostics
            .iter()
            .any(|diag| diag.invariant() == invariant)
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub(crate) fn is_full(&self, max_diagnostics: usize) -> bool {
        max_diagnostics != 0 && self.diagnostics.len() >= max_diagnostics
    }

    pub(crate) fn push(&mut self, diagnostic: Diagnostic, max_diagnostics: usize) {
        if !self.is_full(max_diagnostics) {
            self.diagnostics.push(diagnostic);
        }
    }

    pub(crate) fn extend_with_limit(&mut self, other: Vec<Diagnostic>, max_diagnostics: usize) {
        for diagnostic in other {
            if self.is_full(max_diagnostics) {
                return;
            }
            self.diagnostics.push(diagnostic);
        }
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.diagnostics.is_empty() {
            return "verification succeeded".fmt(f);
        }

        for (index, diagnostic) in self.diagnostics.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{diagnostic}")?;
        }

        Ok(())
    }
}
