mod config;
mod diagnostic;
mod report;
mod verify;

pub use config::{VerificationLevel, VerifierConfig};
pub use diagnostic::{Diagnostic, DiagnosticCode, DiagnosticContext, Invariant, Location, Note};
pub use report::VerificationReport;
pub use verify::{verify, verify_function, verify_module};
