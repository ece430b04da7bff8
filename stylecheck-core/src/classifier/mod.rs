// Two-pass style classification: deterministic heuristics first, then one
// batched external request for whatever the heuristics could not settle.

pub mod external;
pub mod heuristics;
#[cfg(feature = "http-classifier")]
pub mod http;
pub mod resolver;

use crate::config::EngineConfig;
use crate::error::{ClassificationUnavailable, ConfigError};
use crate::template::Template;
use crate::types::{Assignment, ExtractedParagraph, Locator};
use external::{ClassificationItem, ClassificationRequest, ExternalClassifier};
use heuristics::{BodyAnchor, HeuristicOutcome, HeuristicScorer, ParagraphContext};
use resolver::LabelResolver;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub use external::NoopClassifier;
#[cfg(feature = "http-classifier")]
pub use http::HttpClassifier;

pub struct StyleClassifier<'a> {
    config: &'a EngineConfig,
    external: &'a dyn ExternalClassifier,
    anchor: Option<BodyAnchor>,
}

impl<'a> StyleClassifier<'a> {
    pub fn new(
        config: &'a EngineConfig,
        external: &'a dyn ExternalClassifier,
    ) -> Result<Self, ConfigError> {
        let anchor = config.body_anchor.as_deref().map(BodyAnchor::new).transpose()?;
        Ok(Self {
            config,
            external,
            anchor,
        })
    }

    /// Exactly one assignment per paragraph, in input order
    pub fn assign(&self, paragraphs: &[ExtractedParagraph], template: &Template) -> Vec<Assignment> {
        let resolver = LabelResolver::new(template, self.config.resolver.similarity_floor);
        let scorer = HeuristicScorer::new(&self.config.heuristics, &resolver);

        let body_start = self.anchor.as_ref().and_then(|anchor| {
            let found = anchor.locate(paragraphs);
            if found.is_none() {
                warn!(anchor = anchor.title(), "body anchor not found, placement hints ignored");
            }
            found
        });

        let mut assignments: Vec<Option<Assignment>> = Vec::with_capacity(paragraphs.len());
        let mut pending: Vec<ClassificationItem> = Vec::new();
        let mut preceding_heading: Option<&str> = None;

        for (position, paragraph) in paragraphs.iter().enumerate() {
            let ctx = ParagraphContext {
                paragraph,
                previous: position.checked_sub(1).map(|p| &paragraphs[p]),
                in_body: body_start.map(|start| position >= start),
                preceding_heading,
            };

            match scorer.classify(&ctx, template) {
                HeuristicOutcome::Confident(candidate) => {
                    debug!(locator = %paragraph.index, role = %candidate.role, score = candidate.score, "heuristic assignment");
                    assignments.push(Some(Assignment::heuristic(
                        paragraph.index,
                        &candidate.role,
                        candidate.score,
                    )));
                }
                HeuristicOutcome::Ambiguous { best } => {
                    debug!(locator = %paragraph.index, "deferred to fallback pass");
                    pending.push(ClassificationItem {
                        locator: paragraph.index,
                        text: paragraph.text.clone(),
                        outline_level: paragraph.outline_level,
                        preceding_heading: preceding_heading.map(str::to_string),
                        suggestion: best.map(|candidate| candidate.role),
                    });
                    assignments.push(None);
                }
            }

            if paragraph.heading_level().is_some() {
                preceding_heading = Some(paragraph.text.trim());
            }
        }

        let resolved = if pending.is_empty() {
            BTreeMap::new()
        } else {
            self.fallback(template, &resolver, pending)
        };

        paragraphs
            .iter()
            .zip(assignments)
            .map(|(paragraph, assignment)| {
                assignment.unwrap_or_else(|| {
                    resolved
                        .get(&paragraph.index)
                        .cloned()
                        .unwrap_or_else(|| Assignment::unresolved(paragraph.index))
                })
            })
            .collect()
    }

    /// One batched request. Any failure leaves every pending paragraph unresolved.
    fn fallback(
        &self,
        template: &Template,
        resolver: &LabelResolver,
        pending: Vec<ClassificationItem>,
    ) -> BTreeMap<Locator, Assignment> {
        let request = ClassificationRequest {
            template_id: template.id.clone(),
            roles: template.role_names().map(str::to_string).collect(),
            items: pending,
        };

        let guesses = match self.external.classify(&request) {
            Ok(guesses) => guesses,
            Err(ClassificationUnavailable::NotConfigured) => {
                info!(
                    unresolved = request.items.len(),
                    "no external classifier, ambiguous paragraphs left unresolved"
                );
                return BTreeMap::new();
            }
            Err(error) => {
                warn!(
                    backend = self.external.name(),
                    %error,
                    unresolved = request.items.len(),
                    "external classification failed"
                );
                return BTreeMap::new();
            }
        };

        // First label per locator wins; labels for paragraphs not in the batch are ignored
        let mut labels: BTreeMap<Locator, String> = BTreeMap::new();
        for guess in guesses {
            if !request.items.iter().any(|item| item.locator == guess.locator) {
                debug!(locator = %guess.locator, "ignoring label for unknown paragraph");
                continue;
            }
            labels.entry(guess.locator).or_insert(guess.label);
        }

        labels
            .into_iter()
            .map(|(locator, label)| {
                let assignment = match resolver.resolve(&label).role() {
                    Some(role) => Assignment::external(locator, role, &label),
                    None => {
                        debug!(%locator, label = %label, "external label did not resolve");
                        Assignment::unresolved(locator).with_external_label(&label)
                    }
                };
                (locator, assignment)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AssignmentSource;
    use super::external::LabelGuess;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingClassifier {
        calls: AtomicUsize,
        answer: Vec<LabelGuess>,
    }

    impl ExternalClassifier for CountingClassifier {
        fn name(&self) -> &str {
            "counting"
        }

        fn classify(
            &self,
            _request: &ClassificationRequest,
        ) -> Result<Vec<LabelGuess>, ClassificationUnavailable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.clone())
        }
    }

    fn template() -> Template {
        Template::from_json_str(
            r#"{
                "id": "memo",
                "roles": {
                    "Heading": { "hints": { "outline_level": 1 } },
                    "BodyText": { "synonyms": ["Normal"] },
                    "Quote": {}
                }
            }"#,
        )
        .unwrap()
    }

    fn paragraphs() -> Vec<ExtractedParagraph> {
        vec![
            ExtractedParagraph::new(0, "Purpose").with_outline_level(1),
            ExtractedParagraph::new(1, "first"),
            ExtractedParagraph::new(2, "second"),
        ]
    }

    #[test]
    fn fallback_is_one_batched_call() {
        let config = EngineConfig::default();
        let external = CountingClassifier {
            calls: AtomicUsize::new(0),
            answer: vec![
                LabelGuess { locator: Locator(2), label: "quote".to_string() },
                LabelGuess { locator: Locator(1), label: "normal".to_string() },
                LabelGuess { locator: Locator(1), label: "Quote".to_string() },
                LabelGuess { locator: Locator(99), label: "Quote".to_string() },
            ],
        };
        let classifier = StyleClassifier::new(&config, &external).unwrap();
        let assignments = classifier.assign(&paragraphs(), &template());

        assert_eq!(external.calls.load(Ordering::SeqCst), 1);
        assert_eq!(assignments.len(), 3);
        assert_eq!(assignments[0].source, AssignmentSource::Heuristic);
        assert_eq!(assignments[0].role.as_deref(), Some("Heading"));
        assert_eq!(assignments[1].role.as_deref(), Some("BodyText"));
        assert_eq!(assignments[1].source, AssignmentSource::ExternalClassifier);
        assert_eq!(assignments[2].role.as_deref(), Some("Quote"));
    }

    #[test]
    fn no_external_call_when_heuristics_settle_everything() {
        let config = EngineConfig::default();
        let external = CountingClassifier {
            calls: AtomicUsize::new(0),
            answer: Vec::new(),
        };
        let classifier = StyleClassifier::new(&config, &external).unwrap();
        let assignments = classifier.assign(&paragraphs()[..1], &template());

        assert_eq!(external.calls.load(Ordering::SeqCst), 0);
        assert_eq!(assignments.len(), 1);
    }

    #[test]
    fn unresolvable_labels_are_kept_for_auditing() {
        let config = EngineConfig::default();
        let external = CountingClassifier {
            calls: AtomicUsize::new(0),
            answer: vec![LabelGuess { locator: Locator(1), label: "Bibliography".to_string() }],
        };
        let classifier = StyleClassifier::new(&config, &external).unwrap();
        let assignments = classifier.assign(&paragraphs(), &template());

        assert_eq!(assignments[1].source, AssignmentSource::Unresolved);
        assert_eq!(assignments[1].external_label.as_deref(), Some("Bibliography"));
        assert_eq!(assignments[2].source, AssignmentSource::Unresolved);
    }
}
