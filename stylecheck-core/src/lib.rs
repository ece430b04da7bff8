// Stylecheck Core Library
//
// Checks extracted document formatting against organization style templates.
// Main interface for classifying paragraphs into template roles, diffing their
// attributes under a tolerance policy and producing a scored compliance report.

pub mod aggregator;
pub mod classifier;
pub mod comparator;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod template;
pub mod tolerance;
pub mod types;
pub mod units;

// Re-export main types and functions for easy use
pub use types::*;
pub use config::{EngineConfig, ToleranceConfig};
pub use engine::{ComplianceEngine, StepProfiler};
pub use error::{ClassificationUnavailable, ConfigError, EngineError};
pub use template::{FileTemplateStore, Template, TemplateStore};
pub use tolerance::TolerancePolicy;
pub use classifier::external::{ExternalClassifier, NoopClassifier};

// Re-export backends for direct use
#[cfg(feature = "http-classifier")]
pub use classifier::HttpClassifier;
