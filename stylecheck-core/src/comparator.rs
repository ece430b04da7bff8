use crate::config::SeverityConfig;
use crate::template::{StyleSpec, Template};
use crate::tolerance::{Evaluation, TolerancePolicy, FLOAT_NOISE};
use crate::types::{
    AttributeValue, Category, Discrepancy, DiscrepancyKind, ExtractedParagraph, Severity,
};
use std::collections::BTreeSet;

/// Characters of paragraph text carried on each discrepancy
pub const PREVIEW_CHARS: usize = 30;

/// Diffs a paragraph's actual formatting against its role's declared attributes
pub struct AttributeComparator<'a> {
    policy: &'a TolerancePolicy<'a>,
    severity: &'a SeverityConfig,
}

impl<'a> AttributeComparator<'a> {
    pub fn new(policy: &'a TolerancePolicy<'a>, severity: &'a SeverityConfig) -> Self {
        Self { policy, severity }
    }

    /// `role` is `None` for unresolved paragraphs, which yield an
    /// `unassigned-style` discrepancy and no attribute checks. Non-finite
    /// extracted values are reported per key whether or not a role was found.
    pub fn compare(
        &self,
        paragraph: &ExtractedParagraph,
        role: Option<&str>,
        template: &Template,
    ) -> Vec<Discrepancy> {
        let preview = paragraph.text_preview(PREVIEW_CHARS);
        let spec = role.and_then(|name| template.role(name));
        let mut discrepancies = invalid_values(paragraph, spec, &preview);
        let Some(spec) = spec else {
            discrepancies.push(Discrepancy {
                locator: paragraph.index,
                kind: DiscrepancyKind::UnassignedStyle,
                role: None,
                attribute_key: None,
                expected: None,
                actual: None,
                magnitude: None,
                tolerance: None,
                severity: Severity::Major,
                category: Category::Structure,
                text_preview: preview,
            });
            return discrepancies;
        };

        for (key, expected) in &spec.attributes {
            let base = Discrepancy {
                locator: paragraph.index,
                kind: DiscrepancyKind::MissingAttribute,
                role: Some(spec.role.clone()),
                attribute_key: Some(key.clone()),
                expected: Some(expected.clone()),
                actual: None,
                magnitude: None,
                tolerance: None,
                severity: Severity::Major,
                category: key.category_kind(),
                text_preview: preview.clone(),
            };

            let Some(actual) = paragraph.attribute(key) else {
                discrepancies.push(base);
                continue;
            };
            if !actual.is_finite() {
                continue;
            }

            match self.policy.evaluate(key, expected, &actual) {
                Evaluation::Numeric { within: true, .. } | Evaluation::Categorical { equal: true } => {}
                Evaluation::Numeric {
                    magnitude,
                    tolerance,
                    ..
                } => discrepancies.push(Discrepancy {
                    kind: DiscrepancyKind::Mismatch,
                    actual: Some(actual),
                    magnitude: Some(magnitude),
                    tolerance: Some(tolerance),
                    severity: self.numeric_severity(magnitude, tolerance),
                    ..base
                }),
                Evaluation::Categorical { equal: false } => discrepancies.push(Discrepancy {
                    kind: DiscrepancyKind::Mismatch,
                    actual: Some(actual),
                    ..base
                }),
            }
        }
        discrepancies
    }

    /// Minor while the excess over tolerance stays within `minor_multiple`
    /// tolerances. With zero tolerance every numeric mismatch is major.
    fn numeric_severity(&self, magnitude: f64, tolerance: f64) -> Severity {
        let excess = magnitude - tolerance;
        if excess <= self.severity.minor_multiple * tolerance + FLOAT_NOISE && tolerance > 0.0 {
            Severity::Minor
        } else {
            Severity::Major
        }
    }
}

/// One major discrepancy per key carrying a non-finite number, paragraph
/// level first, then runs
fn invalid_values(
    paragraph: &ExtractedParagraph,
    spec: Option<&StyleSpec>,
    preview: &str,
) -> Vec<Discrepancy> {
    let mut seen = BTreeSet::new();
    paragraph
        .attributes
        .iter()
        .chain(paragraph.runs.iter().flat_map(|run| run.attributes.iter()))
        .filter(|(key, value)| !value.is_finite() && seen.insert(*key))
        .map(|(key, value)| Discrepancy {
            locator: paragraph.index,
            kind: DiscrepancyKind::InvalidValue,
            role: spec.map(|s| s.role.clone()),
            attribute_key: Some(key.clone()),
            expected: spec.and_then(|s| s.attributes.get(key)).cloned(),
            actual: Some(AttributeValue::Text(value.to_string())),
            magnitude: None,
            tolerance: None,
            severity: Severity::Major,
            category: key.category_kind(),
            text_preview: preview.to_string(),
        })
        .collect()
}
