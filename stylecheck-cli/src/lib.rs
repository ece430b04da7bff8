// All engine functionality is in stylecheck-core
// This CLI acts as a thin wrapper around the core library

// CLI-specific modules
pub mod output;

// Re-export core types for convenience
pub use stylecheck_core::*;

// Re-export CLI utilities
pub use output::{OutputFormat, ReportEnvelope, ReportSummary};
