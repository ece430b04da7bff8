//! End-to-end compliance checks: extracted paragraphs in, scored report out.
//!
//! The thesis fixture under `test_fixtures/` covers the full pipeline: heuristic
//! classification with a body anchor, run-level font aggregation, unit-bearing
//! template values and every discrepancy kind. The smaller inline templates pin
//! down tolerance, severity and fallback behaviour.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use stylecheck_core::classifier::external::{ClassificationRequest, LabelGuess};
use stylecheck_core::{
    AssignmentSource, Category, ClassificationUnavailable, ComplianceEngine, DiscrepancyKind,
    EngineConfig, EngineError, ExternalClassifier, ExtractedDocument, ExtractedParagraph, Locator,
    Severity, Template, ToleranceConfig,
};

// ============================================================================
// Fixture helpers
// ============================================================================

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_fixtures")
}

fn thesis_template() -> Template {
    Template::load_from_file(fixtures_dir().join("templates/thesis.json")).expect("Invalid thesis.json")
}

fn thesis_document() -> ExtractedDocument {
    let path = fixtures_dir().join("documents/thesis_sample.json");
    let contents = std::fs::read_to_string(&path)
        .unwrap_or_else(|_| panic!("Missing fixture: {}", path.display()));
    ExtractedDocument::from_json_str(&contents).expect("Invalid thesis_sample.json")
}

fn thesis_config() -> EngineConfig {
    EngineConfig {
        body_anchor: Some("绪论".to_string()),
        ..EngineConfig::default()
    }
}

fn body_text_template() -> Template {
    Template::from_json_str(
        r#"{
            "id": "body-only",
            "roles": {
                "BodyText": {
                    "attributes": { "字体.大小.pt": 12, "段落.首行缩进.pt": 24.0 },
                    "hints": { "outline_level": 9 }
                }
            }
        }"#,
    )
    .unwrap()
}

fn body_paragraph(index: usize, size: f64, indent: f64) -> ExtractedParagraph {
    ExtractedParagraph::new(index, "正文段落")
        .with_outline_level(9)
        .with_attribute("字体.大小.pt", size)
        .with_attribute("段落.首行缩进.pt", indent)
}

/// Two roles nothing can tell apart
fn twin_roles_template() -> Template {
    Template::from_json_str(
        r#"{
            "id": "twins",
            "roles": {
                "BodyText": { "attributes": { "字体.大小.pt": 12 } },
                "Quote": { "attributes": { "字体.大小.pt": 12 }, "synonyms": ["Block Quote"] }
            }
        }"#,
    )
    .unwrap()
}

fn ambiguous_paragraphs() -> Vec<ExtractedParagraph> {
    (0..3)
        .map(|i| ExtractedParagraph::new(i, "ambiguous").with_attribute("字体.大小.pt", 12.0))
        .collect()
}

struct ScriptedClassifier {
    calls: AtomicUsize,
    answer: Result<Vec<(usize, &'static str)>, u64>,
}

impl ExternalClassifier for ScriptedClassifier {
    fn name(&self) -> &str {
        "scripted"
    }

    fn classify(
        &self,
        _request: &ClassificationRequest,
    ) -> Result<Vec<LabelGuess>, ClassificationUnavailable> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.answer {
            Ok(labels) => Ok(labels
                .iter()
                .map(|(index, label)| LabelGuess {
                    locator: Locator(*index),
                    label: label.to_string(),
                })
                .collect()),
            Err(secs) => Err(ClassificationUnavailable::Timeout(*secs)),
        }
    }
}

// ============================================================================
// Tolerance and severity
// ============================================================================

mod tolerance_examples {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn within_point_tolerance_is_compliant() {
        let engine = ComplianceEngine::new(EngineConfig::default()).unwrap();
        let report = engine
            .check(&[body_paragraph(0, 12.05, 24.0)], &body_text_template(), &ToleranceConfig::default())
            .unwrap();
        assert!(report.is_compliant());
        assert_eq!(report.score, report.max_score);
    }

    #[test]
    fn small_excess_is_one_minor_discrepancy() {
        let engine = ComplianceEngine::new(EngineConfig::default()).unwrap();
        let report = engine
            .check(&[body_paragraph(0, 12.3, 24.0)], &body_text_template(), &ToleranceConfig::default())
            .unwrap();

        assert_eq!(report.discrepancies.len(), 1);
        let discrepancy = &report.discrepancies[0];
        assert_eq!(discrepancy.kind, DiscrepancyKind::Mismatch);
        assert_eq!(discrepancy.severity, Severity::Minor);
        assert_eq!(discrepancy.magnitude, Some(0.3));
        assert_eq!(discrepancy.tolerance, Some(0.1));
        assert_eq!(discrepancy.role.as_deref(), Some("BodyText"));
        assert_eq!(discrepancy.category, Category::Font);
    }

    #[test]
    fn specific_override_widens_indent_tolerance() {
        let engine = ComplianceEngine::new(EngineConfig::default()).unwrap();
        let mut tolerance = ToleranceConfig::default();
        tolerance
            .specific_tolerances
            .insert("段落.首行缩进.pt".to_string(), 1.0);

        let report = engine
            .check(&[body_paragraph(0, 12.0, 24.9)], &body_text_template(), &tolerance)
            .unwrap();
        assert!(report.is_compliant());

        // Without the override the same paragraph is flagged
        let strict = engine
            .check(&[body_paragraph(0, 12.0, 24.9)], &body_text_template(), &ToleranceConfig::default())
            .unwrap();
        assert_eq!(strict.discrepancies.len(), 1);
        assert_eq!(strict.discrepancies[0].severity, Severity::Major);
    }

    #[test]
    fn negative_tolerance_fails_before_comparison() {
        let engine = ComplianceEngine::new(EngineConfig::default()).unwrap();
        let tolerance = ToleranceConfig {
            multiple_tolerance: -0.05,
            ..ToleranceConfig::default()
        };
        let err = engine
            .check(&[body_paragraph(0, 12.0, 24.0)], &body_text_template(), &tolerance)
            .unwrap_err();
        match err {
            EngineError::Config(config) => assert_eq!(config.key(), Some("multiple_tolerance")),
            other => panic!("expected a config error, got {other:?}"),
        }
    }
}

// ============================================================================
// Assignment invariants
// ============================================================================

mod assignments {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ambiguous_paragraphs_without_classifier_are_unresolved() {
        let engine = ComplianceEngine::new(EngineConfig::default()).unwrap();
        let report = engine
            .check(&ambiguous_paragraphs(), &twin_roles_template(), &ToleranceConfig::default())
            .unwrap();

        assert_eq!(report.assignments.len(), 3);
        assert!(report
            .assignments
            .iter()
            .all(|a| a.source == AssignmentSource::Unresolved && a.role.is_none()));
        assert_eq!(report.discrepancies.len(), 3);
        assert!(report.discrepancies.iter().all(|d| {
            d.kind == DiscrepancyKind::UnassignedStyle && d.attribute_key.is_none() && d.role.is_none()
        }));
        assert_eq!(report.counts_by_category[&Category::Structure], 3);
    }

    #[test]
    fn every_paragraph_is_assigned_exactly_once() {
        let engine = ComplianceEngine::new(thesis_config()).unwrap();
        let document = thesis_document();
        let report = engine
            .check(&document.paragraphs, &thesis_template(), &ToleranceConfig::default())
            .unwrap();

        let locators: Vec<_> = report.assignments.iter().map(|a| a.locator).collect();
        let expected: Vec<_> = document.paragraphs.iter().map(|p| p.index).collect();
        assert_eq!(locators, expected);
    }

    #[test]
    fn external_labels_resolve_through_synonyms() {
        let external = ScriptedClassifier {
            calls: AtomicUsize::new(0),
            answer: Ok(vec![(0, "body text"), (1, "block-quote"), (2, "Footnote")]),
        };
        let engine =
            ComplianceEngine::new_with_classifier(EngineConfig::default(), Box::new(external)).unwrap();
        let report = engine
            .check(&ambiguous_paragraphs(), &twin_roles_template(), &ToleranceConfig::default())
            .unwrap();

        let roles: Vec<_> = report.assignments.iter().map(|a| a.role.as_deref()).collect();
        assert_eq!(roles, vec![Some("BodyText"), Some("Quote"), None]);
        assert_eq!(report.assignments[0].source, AssignmentSource::ExternalClassifier);
        assert_eq!(report.assignments[2].external_label.as_deref(), Some("Footnote"));
        // Only the unresolved paragraph is flagged; the others match their role
        assert_eq!(report.discrepancies.len(), 1);
        assert_eq!(report.discrepancies[0].locator, Locator(2));
    }

    #[test]
    fn classifier_failure_degrades_to_unresolved() {
        let external = Arc::new(ScriptedClassifier {
            calls: AtomicUsize::new(0),
            answer: Err(120),
        });
        let engine = ComplianceEngine::new_with_classifier(
            EngineConfig::default(),
            Box::new(SharedClassifier(external.clone())),
        )
        .unwrap();
        let report = engine
            .check(&ambiguous_paragraphs(), &twin_roles_template(), &ToleranceConfig::default())
            .unwrap();

        assert_eq!(external.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.unresolved_count(), 3);
    }

    struct SharedClassifier(Arc<ScriptedClassifier>);

    impl ExternalClassifier for SharedClassifier {
        fn name(&self) -> &str {
            self.0.name()
        }

        fn classify(
            &self,
            request: &ClassificationRequest,
        ) -> Result<Vec<LabelGuess>, ClassificationUnavailable> {
            self.0.classify(request)
        }
    }
}

// ============================================================================
// Full thesis fixture
// ============================================================================

mod thesis_fixture {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn heuristics_assign_every_recognizable_paragraph() {
        let engine = ComplianceEngine::new(thesis_config()).unwrap();
        let report = engine
            .check(&thesis_document().paragraphs, &thesis_template(), &ToleranceConfig::default())
            .unwrap();

        let roles: Vec<_> = report.assignments.iter().map(|a| a.role.as_deref()).collect();
        assert_eq!(
            roles,
            vec![
                Some("摘要正文"),
                Some("标题1"),
                Some("标题2"),
                Some("正文"),
                Some("正文"),
                Some("图题"),
                Some("正文"),
                None,
            ]
        );
    }

    #[test]
    fn report_lists_each_discrepancy_kind_in_order() {
        let engine = ComplianceEngine::new(thesis_config()).unwrap();
        let report = engine
            .check(&thesis_document().paragraphs, &thesis_template(), &ToleranceConfig::default())
            .unwrap();

        let summary: Vec<_> = report
            .discrepancies
            .iter()
            .map(|d| (d.locator.0, d.kind, d.severity))
            .collect();
        assert_eq!(
            summary,
            vec![
                (4, DiscrepancyKind::Mismatch, Severity::Minor),
                (6, DiscrepancyKind::MissingAttribute, Severity::Major),
                (7, DiscrepancyKind::UnassignedStyle, Severity::Major),
            ]
        );
        assert_eq!(
            report.discrepancies[1].attribute_key.as_ref().map(|k| k.to_string()),
            Some("段落.行间距.multiple".to_string())
        );
        assert_eq!(report.score, 100.0 - 1.0 - 3.0 - 3.0);
        assert_eq!(report.paragraph_count, 8);
        assert_eq!(report.compliant_paragraphs, 5);
        assert_eq!(report.counts_by_role["正文"], 2);
        assert_eq!(report.template_id, "thesis");
        assert_eq!(report.fingerprint.len(), 64);
    }

    #[test]
    fn repeated_runs_are_byte_identical() {
        let engine = ComplianceEngine::new(thesis_config()).unwrap();
        let template = thesis_template();
        let document = thesis_document();
        let tolerance = ToleranceConfig::default();

        let first = engine.check(&document.paragraphs, &template, &tolerance).unwrap();
        let second = engine.check(&document.paragraphs, &template, &tolerance).unwrap();
        assert_eq!(first.to_json_pretty().unwrap(), second.to_json_pretty().unwrap());
    }

    #[test]
    fn concurrent_checks_share_one_engine() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ComplianceEngine>();
        assert_send_sync::<Template>();
        assert_send_sync::<ToleranceConfig>();

        let engine = ComplianceEngine::new(thesis_config()).unwrap();
        let template = thesis_template();
        let document = thesis_document();
        let tolerance = ToleranceConfig::default();
        let expected = engine.check(&document.paragraphs, &template, &tolerance).unwrap();

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| engine.check(&document.paragraphs, &template, &tolerance).unwrap()))
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), expected);
            }
        });
    }
}
