use crate::types::Locator;
use std::path::PathBuf;
use thiserror::Error;

/// Invalid or unreadable configuration: templates, tolerance files, engine settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("template not found: {0}")]
    TemplateNotFound(String),
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Offending configuration key, when the error is tied to one
    pub fn key(&self) -> Option<&str> {
        match self {
            ConfigError::InvalidValue { key, .. } => Some(key),
            _ => None,
        }
    }
}

/// The external classifier could not answer. Never fatal to a check.
#[derive(Debug, Error)]
pub enum ClassificationUnavailable {
    #[error("no external classifier configured")]
    NotConfigured,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("classifier did not answer within {0}s")]
    Timeout(u64),

    #[error("malformed classifier response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid paragraph {locator}: {reason}")]
    InvalidParagraph { locator: Locator, reason: String },

    #[error("failed to serialize check inputs: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
