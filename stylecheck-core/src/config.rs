use crate::error::ConfigError;
use crate::types::AttributeKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

// Default value functions for serde
fn default_pt_tolerance() -> f64 {
    0.1
}

fn default_multiple_tolerance() -> f64 {
    0.05
}

/// Numeric tolerances, loaded once per run from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToleranceConfig {
    /// Applies to attributes measured in points
    #[serde(default = "default_pt_tolerance")]
    pub pt_tolerance: f64,
    /// Applies to multiplier units such as line spacing
    #[serde(default = "default_multiple_tolerance")]
    pub multiple_tolerance: f64,
    /// Per-attribute overrides keyed by dotted attribute key
    #[serde(default)]
    pub specific_tolerances: BTreeMap<String, f64>,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            pt_tolerance: default_pt_tolerance(),
            multiple_tolerance: default_multiple_tolerance(),
            specific_tolerances: BTreeMap::new(),
        }
    }
}

impl ToleranceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_tolerance("pt_tolerance", self.pt_tolerance)?;
        check_tolerance("multiple_tolerance", self.multiple_tolerance)?;
        for (key, value) in &self.specific_tolerances {
            let qualified = format!("specific_tolerances.{key}");
            let parsed = key
                .parse::<AttributeKey>()
                .map_err(|_| ConfigError::invalid(&qualified, "not a dotted attribute key"))?;
            // Lookups use the canonical spelling, so `段落 .首行缩进.pt` would never match
            if parsed.to_string() != *key {
                return Err(ConfigError::invalid(
                    &qualified,
                    format!("write the key as `{parsed}`"),
                ));
            }
            check_tolerance(&qualified, *value)?;
        }
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ToleranceConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file if it exists, otherwise returns defaults and `true` so the
    /// caller can persist them. A file that exists but is malformed is an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<(Self, bool), ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "tolerance file not found, using defaults");
            return Ok((Self::default(), true));
        }
        Ok((Self::load_from_file(path)?, false))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        fs::write(path, json).map_err(io_error)
    }
}

fn check_tolerance(key: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::invalid(key, format!("tolerance must be finite, got {value}")));
    }
    if value < 0.0 {
        return Err(ConfigError::invalid(key, format!("tolerance must be non-negative, got {value}")));
    }
    Ok(())
}

// ===== ENGINE CONFIG =====

/// Engine tuning, loaded from YAML. Every section has defaults so an empty
/// file (or no file) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub heuristics: HeuristicConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub severity: SeverityConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Title of the first body paragraph, e.g. "绪论" or "Introduction"
    #[serde(default)]
    pub body_anchor: Option<String>,
    #[serde(default)]
    pub external_classifier: Option<ExternalClassifierConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicConfig {
    /// Minimum score for a heuristic assignment
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Required lead over the runner-up role
    #[serde(default = "default_min_margin")]
    pub min_margin: f64,
    /// Admission margin for the gross font size signal
    #[serde(default = "default_font_size_margin")]
    pub font_size_margin_pt: f64,
    #[serde(default)]
    pub weights: HeuristicWeights,
}

fn default_min_confidence() -> f64 {
    3.0
}

fn default_min_margin() -> f64 {
    0.5
}

fn default_font_size_margin() -> f64 {
    1.5
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            min_margin: default_min_margin(),
            font_size_margin_pt: default_font_size_margin(),
            weights: HeuristicWeights::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicWeights {
    pub declared_style: f64,
    pub outline_level: f64,
    pub text_pattern: f64,
    pub numbering: f64,
    pub font_size: f64,
    pub bold: f64,
    pub follows_heading: f64,
    pub placement: f64,
}

impl Default for HeuristicWeights {
    fn default() -> Self {
        Self {
            declared_style: 4.0,
            outline_level: 3.0,
            text_pattern: 2.5,
            numbering: 1.0,
            font_size: 1.0,
            bold: 0.5,
            follows_heading: 0.5,
            placement: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Normalized similarity (0..=1) a fuzzy label match must exceed
    #[serde(default = "default_similarity_floor")]
    pub similarity_floor: f64,
}

fn default_similarity_floor() -> f64 {
    0.75
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            similarity_floor: default_similarity_floor(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityConfig {
    /// A numeric mismatch whose excess over tolerance is within this multiple
    /// of the tolerance is minor
    #[serde(default = "default_minor_multiple")]
    pub minor_multiple: f64,
}

fn default_minor_multiple() -> f64 {
    2.0
}

impl Default for SeverityConfig {
    fn default() -> Self {
        Self {
            minor_multiple: default_minor_multiple(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub max_score: f64,
    pub min_score: f64,
    pub minor_penalty: f64,
    pub major_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_score: 100.0,
            min_score: 0.0,
            minor_penalty: 1.0,
            major_penalty: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// One `index,label` pair per line
    #[default]
    Lines,
    /// `{"assignments": [{"index": .., "label": ..}]}`
    Json,
}

/// Connection settings for an OpenAI-compatible chat-completions endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalClassifierConfig {
    #[serde(default)]
    pub provider: Option<String>,
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable to read the key from when `api_key` is unset
    #[serde(default)]
    pub api_key_env: Option<String>,
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub response_format: ResponseFormat,
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f64 {
    0.1
}

fn default_top_p() -> f64 {
    0.7
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    1
}

impl ExternalClassifierConfig {
    /// API key from the config or the named environment variable.
    /// Placeholder keys like `<YOUR_API_KEY>` count as absent.
    pub fn resolve_api_key(&self) -> Option<String> {
        let key = self.api_key.clone().or_else(|| {
            self.api_key_env
                .as_deref()
                .and_then(|name| std::env::var(name).ok())
        })?;
        let key = key.trim().to_string();
        if key.is_empty() || key.starts_with("<YOUR_") {
            None
        } else {
            Some(key)
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.endpoint.trim().is_empty()
            && !self.model.trim().is_empty()
            && self.resolve_api_key().is_some()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "external_classifier.timeout_secs",
                "timeout must be at least one second",
            ));
        }
        if self.max_retries > 1 {
            return Err(ConfigError::invalid(
                "external_classifier.max_retries",
                format!("at most one retry is allowed, got {}", self.max_retries),
            ));
        }
        Ok(())
    }
}

impl EngineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig = if content.trim().is_empty() {
            EngineConfig::default()
        } else {
            serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given and present, otherwise the defaults
    pub fn load_with_fallback(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) if path.exists() => Self::load_from_file(path),
            Some(path) => {
                warn!(path = %path.display(), "engine config not found, using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let h = &self.heuristics;
        for (key, value) in [
            ("heuristics.min_confidence", h.min_confidence),
            ("heuristics.min_margin", h.min_margin),
            ("heuristics.font_size_margin_pt", h.font_size_margin_pt),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid(key, format!("must be non-negative, got {value}")));
            }
        }

        let floor = self.resolver.similarity_floor;
        if !(0.0..=1.0).contains(&floor) {
            return Err(ConfigError::invalid(
                "resolver.similarity_floor",
                format!("must be within 0..=1, got {floor}"),
            ));
        }

        if !self.severity.minor_multiple.is_finite() || self.severity.minor_multiple < 0.0 {
            return Err(ConfigError::invalid(
                "severity.minor_multiple",
                "must be non-negative",
            ));
        }

        let s = &self.scoring;
        if s.min_score > s.max_score {
            return Err(ConfigError::invalid(
                "scoring.min_score",
                format!("min_score {} exceeds max_score {}", s.min_score, s.max_score),
            ));
        }
        if s.minor_penalty < 0.0 || s.major_penalty < 0.0 {
            return Err(ConfigError::invalid("scoring", "penalties must be non-negative"));
        }

        if let Some(external) = &self.external_classifier {
            external.validate()?;
        }
        Ok(())
    }
}
