use crate::classifier::resolver::LabelResolver;
use crate::config::HeuristicConfig;
use crate::error::ConfigError;
use crate::template::{Placement, StyleSpec, Template};
use crate::types::{AttributeKey, ExtractedParagraph};
use regex::Regex;
use std::sync::LazyLock;

/// Leading list/heading numbers: `1.`, `1.2 方法`, `1.2.3`, `第一章`, `(1)`, `一、`.
/// A separator must not be followed by a digit and a bare `x.y` needs a title
/// after it, so decimals such as `3.14` do not count.
static NUMBERING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:\d+(?:\.\d+)*[.、．)）](?:\D|$)|\d+(?:\.\d+){2,}|\d+\.\d+\s+[\p{Han}A-Z]|第\s*[一二三四五六七八九十百千\d]+\s*[章节条部篇]|[(（]\s*[\d一二三四五六七八九十a-zA-Z]+\s*[)）]|[一二三四五六七八九十]+\s*[、．.])",
    )
    .unwrap()
});

/// Optional numbering prefix in front of a body anchor title
const ANCHOR_PREFIX: &str = r"(?:第?\s*[一二三四五六七八九十百千万亿\d]+\s*[章节、．.]?\s*)?";

pub fn has_numbering(paragraph: &ExtractedParagraph) -> bool {
    paragraph
        .numbering
        .as_deref()
        .is_some_and(|label| !label.trim().is_empty())
        || NUMBERING_REGEX.is_match(&paragraph.text)
}

/// Full-width ASCII folded, whitespace collapsed, lowercased
fn normalize_title(raw: &str) -> String {
    let folded: String = raw
        .chars()
        .map(|c| match c {
            '\u{3000}' => ' ',
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            _ => c,
        })
        .collect();
    folded
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Locates the first body paragraph by its title, tolerating a numbering prefix
#[derive(Debug, Clone)]
pub struct BodyAnchor {
    title: String,
    pattern: Regex,
}

impl BodyAnchor {
    pub fn new(title: &str) -> Result<Self, ConfigError> {
        let normalized = normalize_title(title);
        if normalized.is_empty() {
            return Err(ConfigError::invalid("body_anchor", "anchor title is empty"));
        }
        let pattern = Regex::new(&format!(
            r"^\s*{ANCHOR_PREFIX}{}\s*$",
            regex::escape(&normalized)
        ))
        .map_err(|e| ConfigError::invalid("body_anchor", e.to_string()))?;
        Ok(Self {
            title: normalized,
            pattern,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(&normalize_title(text))
    }

    /// Position of the anchor paragraph within `paragraphs`
    pub fn locate(&self, paragraphs: &[ExtractedParagraph]) -> Option<usize> {
        paragraphs.iter().position(|p| self.is_match(&p.text))
    }
}

/// What the heuristic pass knows about one paragraph's surroundings
#[derive(Debug, Clone, Copy)]
pub struct ParagraphContext<'p> {
    pub paragraph: &'p ExtractedParagraph,
    pub previous: Option<&'p ExtractedParagraph>,
    /// `None` when no body anchor is configured or it was not found
    pub in_body: Option<bool>,
    pub preceding_heading: Option<&'p str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub role: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeuristicOutcome {
    Confident(Candidate),
    /// Below threshold or too close to the runner-up. `best` is the leading
    /// candidate when it scored above zero.
    Ambiguous { best: Option<Candidate> },
}

/// Deterministic, side-effect-free role scoring
pub struct HeuristicScorer<'a> {
    config: &'a HeuristicConfig,
    resolver: &'a LabelResolver,
}

impl<'a> HeuristicScorer<'a> {
    pub fn new(config: &'a HeuristicConfig, resolver: &'a LabelResolver) -> Self {
        Self { config, resolver }
    }

    pub fn score(&self, ctx: &ParagraphContext<'_>, spec: &StyleSpec) -> f64 {
        let w = &self.config.weights;
        let paragraph = ctx.paragraph;
        let hints = &spec.hints;
        let mut score = 0.0;

        if let Some(declared) = paragraph.style_name.as_deref() {
            match self.resolver.exact(declared) {
                Some(role) if role == spec.role => score += w.declared_style,
                Some(_) => score -= w.declared_style,
                None => {}
            }
        }

        if let (Some(expected), Some(actual)) = (hints.outline_level, paragraph.outline_level) {
            let expected_body = expected >= 9;
            let actual_body = actual >= 9 || actual == 0;
            if (expected_body && actual_body) || expected == actual {
                score += w.outline_level;
            } else {
                score -= w.outline_level;
            }
        }

        if !spec.patterns().is_empty() {
            if spec.matches_text(&paragraph.text) {
                score += w.text_pattern;
            } else {
                score -= w.text_pattern;
            }
        }

        if let Some(numbered) = hints.numbered {
            score += signed(w.numbering, has_numbering(paragraph) == numbered);
        }

        if let Some(expected) = spec.font_size_pt() {
            if let Some(actual) = actual_font_size(paragraph, spec) {
                let close = (expected - actual).abs() <= self.config.font_size_margin_pt;
                score += signed(w.font_size, close);
            }
        }

        if let Some(expected) = spec.expects_bold() {
            if let Some(actual) = actual_bold(paragraph, spec) {
                score += signed(w.bold, actual == expected);
            }
        }

        if let Some(follows) = hints.follows_heading {
            let after_heading = ctx.previous.is_some_and(|p| p.heading_level().is_some());
            score += signed(w.follows_heading, after_heading == follows);
        }

        if let (Some(in_body), placement) = (ctx.in_body, hints.placement) {
            match placement {
                Placement::Any => {}
                Placement::Body => score += signed(w.placement, in_body),
                Placement::FrontMatter => score += signed(w.placement, !in_body),
            }
        }

        score
    }

    /// All roles by descending score, ties broken by role name
    pub fn rank(&self, ctx: &ParagraphContext<'_>, template: &Template) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = template
            .roles
            .values()
            .map(|spec| Candidate {
                role: spec.role.clone(),
                score: self.score(ctx, spec),
            })
            .collect();
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.role.cmp(&b.role)));
        candidates
    }

    pub fn classify(&self, ctx: &ParagraphContext<'_>, template: &Template) -> HeuristicOutcome {
        let ranked = self.rank(ctx, template);
        let mut iter = ranked.into_iter();
        let Some(best) = iter.next() else {
            return HeuristicOutcome::Ambiguous { best: None };
        };
        let margin = iter
            .next()
            .map_or(f64::INFINITY, |runner_up| best.score - runner_up.score);

        if best.score >= self.config.min_confidence && margin >= self.config.min_margin {
            HeuristicOutcome::Confident(best)
        } else if best.score > 0.0 {
            HeuristicOutcome::Ambiguous { best: Some(best) }
        } else {
            HeuristicOutcome::Ambiguous { best: None }
        }
    }
}

fn signed(weight: f64, agrees: bool) -> f64 {
    if agrees {
        weight
    } else {
        -weight
    }
}

fn actual_font_size(paragraph: &ExtractedParagraph, spec: &StyleSpec) -> Option<f64> {
    let key = spec.attributes.keys().find(|key| key.is_font_size())?;
    paragraph.attribute(key)?.as_number()
}

fn actual_bold(paragraph: &ExtractedParagraph, spec: &StyleSpec) -> Option<bool> {
    let key: Option<&AttributeKey> = spec
        .attributes
        .keys()
        .find(|key| key.is_bold())
        .or_else(|| paragraph.attributes.keys().find(|key| key.is_bold()));
    paragraph.attribute(key?)?.as_bool()
}
