//! Core domain types for settle.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

mod diagnostic;
mod ids;
mod report;

pub use diagnostic::{Diagnostic, DiagnosticSeverity, Position, Range};
pub use ids::{DocumentKey, DocumentVersion, Generation, ProgressToken};
pub use report::{DiagnosticReport, DocumentSnapshot};
