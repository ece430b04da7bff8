use crate::aggregator::ComplianceAggregator;
use crate::classifier::external::{ExternalClassifier, NoopClassifier};
use crate::classifier::StyleClassifier;
use crate::comparator::AttributeComparator;
use crate::config::{EngineConfig, ToleranceConfig};
use crate::error::{EngineError, Result};
use crate::fingerprint::InputFingerprint;
use crate::template::Template;
use crate::tolerance::TolerancePolicy;
use crate::types::{ComplianceReport, ExtractedParagraph};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Records per-stage timings when enabled
pub struct StepProfiler {
    enabled: bool,
    timings: Vec<(String, Duration)>,
}

impl StepProfiler {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            timings: Vec::new(),
        }
    }

    pub fn time_step<F, R>(&mut self, step_name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        if !self.enabled {
            return f();
        }

        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();

        debug!(step = step_name, elapsed_ms = elapsed.as_millis() as u64, "step finished");
        self.timings.push((step_name.to_string(), elapsed));
        result
    }

    pub fn timings(&self) -> &[(String, Duration)] {
        &self.timings
    }

    pub fn total(&self) -> Duration {
        self.timings.iter().map(|(_, d)| *d).sum()
    }
}

/// Runs one compliance check: classify, compare, aggregate.
///
/// The engine holds no per-run state, so one instance can serve concurrent
/// checks over shared read-only inputs.
pub struct ComplianceEngine {
    config: EngineConfig,
    external: Box<dyn ExternalClassifier>,
}

impl ComplianceEngine {
    /// Engine without an external classifier
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::new_with_classifier(config, Box::new(NoopClassifier))
    }

    pub fn new_with_classifier(
        config: EngineConfig,
        external: Box<dyn ExternalClassifier>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, external })
    }

    /// Builds the HTTP classifier when the configuration carries usable
    /// credentials, otherwise falls back to the no-op classifier.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        let external: Box<dyn ExternalClassifier> = match &config.external_classifier {
            Some(settings) if settings.is_configured() => Self::http_backend(settings.clone())?,
            Some(_) => {
                warn!("external classifier configured without credentials, fallback pass disabled");
                Box::new(NoopClassifier)
            }
            None => Box::new(NoopClassifier),
        };
        Self::new_with_classifier(config, external)
    }

    #[cfg(feature = "http-classifier")]
    fn http_backend(
        settings: crate::config::ExternalClassifierConfig,
    ) -> Result<Box<dyn ExternalClassifier>> {
        Ok(Box::new(crate::classifier::HttpClassifier::new(settings)?))
    }

    #[cfg(not(feature = "http-classifier"))]
    fn http_backend(
        _settings: crate::config::ExternalClassifierConfig,
    ) -> Result<Box<dyn ExternalClassifier>> {
        warn!("built without the http-classifier feature, fallback pass disabled");
        Ok(Box::new(NoopClassifier))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn classifier_name(&self) -> &str {
        self.external.name()
    }

    pub fn check(
        &self,
        paragraphs: &[ExtractedParagraph],
        template: &Template,
        tolerance: &ToleranceConfig,
    ) -> Result<ComplianceReport> {
        self.check_with_profiler(paragraphs, template, tolerance, &mut StepProfiler::new(false))
    }

    pub fn check_with_profiler(
        &self,
        paragraphs: &[ExtractedParagraph],
        template: &Template,
        tolerance: &ToleranceConfig,
        profiler: &mut StepProfiler,
    ) -> Result<ComplianceReport> {
        // Configuration and input problems surface before any comparison
        let policy = TolerancePolicy::new(tolerance)?;
        validate_paragraphs(paragraphs)?;
        let classifier = StyleClassifier::new(&self.config, self.external.as_ref())?;

        info!(
            template = %template.id,
            paragraphs = paragraphs.len(),
            classifier = self.external.name(),
            "starting compliance check"
        );

        let assignments =
            profiler.time_step("Classification", || classifier.assign(paragraphs, template));

        let comparator = AttributeComparator::new(&policy, &self.config.severity);
        let discrepancies = profiler.time_step("Comparison", || {
            paragraphs
                .iter()
                .zip(&assignments)
                .flat_map(|(paragraph, assignment)| {
                    comparator.compare(paragraph, assignment.role.as_deref(), template)
                })
                .collect::<Vec<_>>()
        });

        let aggregator = ComplianceAggregator::new(&self.config.scoring);
        let mut report =
            profiler.time_step("Aggregation", || aggregator.aggregate(discrepancies, assignments));

        report.template_id = template.id.clone();
        report.fingerprint =
            InputFingerprint::compute(template, tolerance, &self.config, paragraphs)?.to_hash();

        info!(
            score = report.score,
            discrepancies = report.discrepancies.len(),
            unresolved = report.unresolved_count(),
            "compliance check finished"
        );
        Ok(report)
    }
}

/// Locators must be unique; bad attribute values are reported per paragraph
fn validate_paragraphs(paragraphs: &[ExtractedParagraph]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for paragraph in paragraphs {
        if !seen.insert(paragraph.index) {
            return Err(EngineError::InvalidParagraph {
                locator: paragraph.index,
                reason: "duplicate paragraph index".to_string(),
            });
        }
    }
    Ok(())
}
