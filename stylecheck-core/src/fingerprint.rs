use crate::config::{EngineConfig, ToleranceConfig};
use crate::template::Template;
use crate::types::ExtractedParagraph;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Version constants stamped on reports and folded into fingerprints
pub mod versions {
    pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
    pub const REPORT_SCHEMA_VERSION: &str = "1.0.0";
}

/// SHA-256 of a value's canonical JSON form
pub fn hash_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    let json = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&json);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Every input that can change a report. The external classifier settings are
/// left out; only its answers matter and those land in the assignment table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFingerprint {
    pub template_hash: String,
    pub tolerance_hash: String,
    pub settings_hash: String,
    pub paragraphs_hash: String,
}

impl InputFingerprint {
    pub fn compute(
        template: &Template,
        tolerance: &ToleranceConfig,
        config: &EngineConfig,
        paragraphs: &[ExtractedParagraph],
    ) -> serde_json::Result<Self> {
        let settings = (
            &config.heuristics,
            &config.resolver,
            &config.severity,
            &config.scoring,
            &config.body_anchor,
        );
        Ok(Self {
            template_hash: hash_json(template)?,
            tolerance_hash: hash_json(tolerance)?,
            settings_hash: hash_json(&settings)?,
            paragraphs_hash: hash_json(paragraphs)?,
        })
    }

    /// Combined hash stamped on the report
    pub fn to_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.template_hash);
        hasher.update(&self.tolerance_hash);
        hasher.update(&self.settings_hash);
        hasher.update(&self.paragraphs_hash);
        hasher.update(versions::ENGINE_VERSION);
        hasher.update(versions::REPORT_SCHEMA_VERSION);
        format!("{:x}", hasher.finalize())
    }
}
