use crate::error::ConfigError;
use crate::units::Unit;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Stable, order-based paragraph identifier.
///
/// Locators are the indices the extraction collaborator assigned, so a downstream
/// annotation step can map a locator back to the original document position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(pub usize);

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ===== ATTRIBUTE KEYS =====
// Keys are dotted triples `<category>.<property>.<unit>`, e.g. `字体.大小.pt`.
// Templates and extracted paragraphs share the same key space.

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AttributeKey {
    category: String,
    property: String,
    unit: String,
}

impl AttributeKey {
    pub fn new(category: &str, property: &str, unit: &str) -> Result<Self, ConfigError> {
        format!("{category}.{property}.{unit}").parse()
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Unit named by the key, if it is one the engine knows how to convert
    pub fn known_unit(&self) -> Option<Unit> {
        Unit::parse(&self.unit)
    }

    pub fn category_kind(&self) -> Category {
        match self.category.to_lowercase().as_str() {
            "字体" | "font" => Category::Font,
            "段落" | "paragraph" => Category::Paragraph,
            "编号" | "numbering" | "列表" | "list" => Category::Numbering,
            _ => Category::Structure,
        }
    }

    pub fn is_font(&self) -> bool {
        self.category_kind() == Category::Font
    }

    pub fn is_font_size(&self) -> bool {
        self.is_font() && matches!(self.property.to_lowercase().as_str(), "大小" | "字号" | "size")
    }

    pub fn is_bold(&self) -> bool {
        self.is_font() && matches!(self.property.to_lowercase().as_str(), "粗体" | "加粗" | "bold")
    }

    pub fn is_color(&self) -> bool {
        let property = self.property.to_lowercase();
        property.contains("颜色") || property.contains("color") || property.contains("colour")
    }
}

impl FromStr for AttributeKey {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = raw.split('.').map(str::trim).collect();
        match parts.as_slice() {
            [category, property, unit]
                if !category.is_empty() && !property.is_empty() && !unit.is_empty() =>
            {
                Ok(Self {
                    category: category.to_string(),
                    property: property.to_string(),
                    unit: unit.to_string(),
                })
            }
            _ => Err(ConfigError::invalid(
                raw,
                "attribute keys must be dotted triples `<category>.<property>.<unit>`",
            )),
        }
    }
}

impl TryFrom<String> for AttributeKey {
    type Error = ConfigError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<AttributeKey> for String {
    fn from(key: AttributeKey) -> Self {
        key.to_string()
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.category, self.property, self.unit)
    }
}

// ===== ATTRIBUTE VALUES =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl AttributeValue {
    /// Numeric view of the value. Text that is a plain number counts as numeric.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::Text(s) => s.trim().parse::<f64>().ok(),
            AttributeValue::Bool(_) => None,
        }
    }

    /// Boolean view of the value, accepting the spellings extractors commonly emit
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            AttributeValue::Text(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "on" | "是" => Some(true),
                // "none" is how underline-style extractors spell "not underlined"
                "false" | "no" | "off" | "none" | "否" => Some(false),
                _ => None,
            },
            AttributeValue::Number(_) => None,
        }
    }

    pub fn is_finite(&self) -> bool {
        match self {
            AttributeValue::Number(n) => n.is_finite(),
            _ => true,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Number(n) => write!(f, "{n}"),
            AttributeValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

// ===== EXTRACTED DOCUMENT =====

/// Font attributes of one text run inside a paragraph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunAttributes {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attributes: BTreeMap<AttributeKey, AttributeValue>,
}

/// One paragraph as produced by the extraction collaborator.
/// Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedParagraph {
    pub index: Locator,
    #[serde(default)]
    pub text: String,
    /// Outline level as the word processor reports it (1-8 headings, 9 body text)
    #[serde(default)]
    pub outline_level: Option<u8>,
    /// Style name the document itself declares for this paragraph
    #[serde(default)]
    pub style_name: Option<String>,
    /// List label rendered by automatic numbering (e.g. "1.2", "(a)")
    #[serde(default)]
    pub numbering: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<AttributeKey, AttributeValue>,
    #[serde(default)]
    pub runs: Vec<RunAttributes>,
}

impl ExtractedParagraph {
    pub fn new(index: usize, text: &str) -> Self {
        Self {
            index: Locator(index),
            text: text.to_string(),
            outline_level: None,
            style_name: None,
            numbering: None,
            attributes: BTreeMap::new(),
            runs: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        if let Ok(key) = key.parse() {
            self.attributes.insert(key, value.into());
        }
        self
    }

    pub fn with_outline_level(mut self, level: u8) -> Self {
        self.outline_level = Some(level);
        self
    }

    /// Heading level if the outline level marks a heading (1-8)
    pub fn heading_level(&self) -> Option<u8> {
        self.outline_level.filter(|level| (1..=8).contains(level))
    }

    /// Actual value for `key`. Font keys missing at paragraph level fall back to
    /// the dominant value across the paragraph's runs.
    pub fn attribute(&self, key: &AttributeKey) -> Option<AttributeValue> {
        if let Some(value) = self.attributes.get(key) {
            return Some(value.clone());
        }
        if key.is_font() {
            return self.dominant_run_value(key);
        }
        None
    }

    /// Run value covering the most characters; ties go to the earliest run
    pub fn dominant_run_value(&self, key: &AttributeKey) -> Option<AttributeValue> {
        let mut weights: Vec<(&AttributeValue, usize)> = Vec::new();
        for run in &self.runs {
            let Some(value) = run.attributes.get(key) else {
                continue;
            };
            let weight = run.text.chars().count().max(1);
            match weights.iter_mut().find(|(seen, _)| *seen == value) {
                Some(entry) => entry.1 += weight,
                None => weights.push((value, weight)),
            }
        }

        let mut best: Option<(&AttributeValue, usize)> = None;
        for (value, weight) in weights {
            if best.map_or(true, |(_, best_weight)| weight > best_weight) {
                best = Some((value, weight));
            }
        }
        best.map(|(value, _)| value.clone())
    }

    pub fn text_preview(&self, max_chars: usize) -> String {
        let trimmed = self.text.trim();
        if trimmed.chars().count() > max_chars {
            let head: String = trimmed.chars().take(max_chars).collect();
            format!("{head}…")
        } else {
            trimmed.to_string()
        }
    }
}

/// Extraction output: the ordered paragraph sequence of one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    #[serde(default)]
    pub source: Option<String>,
    pub paragraphs: Vec<ExtractedParagraph>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DocumentShape {
    Wrapped(ExtractedDocument),
    Bare(Vec<ExtractedParagraph>),
}

impl ExtractedDocument {
    /// Accepts either `{ "source": .., "paragraphs": [..] }` or a bare paragraph array
    pub fn from_json_str(raw: &str) -> serde_json::Result<Self> {
        let shape: DocumentShape = serde_json::from_str(raw)?;
        Ok(match shape {
            DocumentShape::Wrapped(document) => document,
            DocumentShape::Bare(paragraphs) => Self {
                source: None,
                paragraphs,
            },
        })
    }
}

// ===== ASSIGNMENTS =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssignmentSource {
    Heuristic,
    ExternalClassifier,
    Unresolved,
}

/// Paragraph → role mapping with a record of how it was determined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub locator: Locator,
    pub role: Option<String>,
    pub source: AssignmentSource,
    /// Heuristic score of the chosen role (heuristic assignments only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Raw label the external classifier returned, kept for auditing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_label: Option<String>,
}

impl Assignment {
    pub fn heuristic(locator: Locator, role: &str, score: f64) -> Self {
        Self {
            locator,
            role: Some(role.to_string()),
            source: AssignmentSource::Heuristic,
            score: Some(score),
            external_label: None,
        }
    }

    pub fn external(locator: Locator, role: &str, label: &str) -> Self {
        Self {
            locator,
            role: Some(role.to_string()),
            source: AssignmentSource::ExternalClassifier,
            score: None,
            external_label: Some(label.to_string()),
        }
    }

    pub fn unresolved(locator: Locator) -> Self {
        Self {
            locator,
            role: None,
            source: AssignmentSource::Unresolved,
            score: None,
            external_label: None,
        }
    }

    pub fn with_external_label(mut self, label: &str) -> Self {
        self.external_label = Some(label.to_string());
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.source != AssignmentSource::Unresolved
    }
}

// ===== DISCREPANCIES =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Major,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Font,
    Paragraph,
    Numbering,
    Structure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscrepancyKind {
    /// Actual value differs from the declared value beyond tolerance
    Mismatch,
    /// The role declares an attribute the paragraph does not carry
    MissingAttribute,
    /// Neither heuristics nor the external classifier produced a role
    UnassignedStyle,
    /// Extraction produced a non-finite number; the value is kept as text
    InvalidValue,
}

/// One recorded mismatch between expected and actual formatting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub locator: Locator,
    pub kind: DiscrepancyKind,
    pub role: Option<String>,
    pub attribute_key: Option<AttributeKey>,
    pub expected: Option<AttributeValue>,
    pub actual: Option<AttributeValue>,
    /// Absolute deviation, numeric attributes only
    pub magnitude: Option<f64>,
    pub tolerance: Option<f64>,
    pub severity: Severity,
    pub category: Category,
    pub text_preview: String,
}

// ===== REPORT =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub schema_version: String,
    pub template_id: String,
    /// SHA-256 over every input that influences the report
    pub fingerprint: String,
    pub paragraph_count: usize,
    pub compliant_paragraphs: usize,
    pub score: f64,
    pub max_score: f64,
    pub counts_by_category: BTreeMap<Category, usize>,
    pub counts_by_severity: BTreeMap<Severity, usize>,
    pub counts_by_role: BTreeMap<String, usize>,
    pub discrepancies: Vec<Discrepancy>,
    pub assignments: Vec<Assignment>,
}

impl ComplianceReport {
    pub fn is_compliant(&self) -> bool {
        self.discrepancies.is_empty()
    }

    pub fn discrepancies_for(&self, locator: Locator) -> impl Iterator<Item = &Discrepancy> {
        self.discrepancies
            .iter()
            .filter(move |discrepancy| discrepancy.locator == locator)
    }

    pub fn assignment_for(&self, locator: Locator) -> Option<&Assignment> {
        self.assignments
            .iter()
            .find(|assignment| assignment.locator == locator)
    }

    pub fn unresolved_count(&self) -> usize {
        self.assignments
            .iter()
            .filter(|assignment| !assignment.is_resolved())
            .count()
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> AttributeKey {
        raw.parse().unwrap()
    }

    #[test]
    fn attribute_key_requires_three_segments() {
        assert!("字体.大小.pt".parse::<AttributeKey>().is_ok());
        assert!("字体.大小".parse::<AttributeKey>().is_err());
        assert!("字体..pt".parse::<AttributeKey>().is_err());
        assert!("a.b.c.d".parse::<AttributeKey>().is_err());
    }

    #[test]
    fn attribute_key_classifies_category_and_unit() {
        let size = key("字体.大小.pt");
        assert_eq!(size.category_kind(), Category::Font);
        assert!(size.is_font_size());
        assert_eq!(size.known_unit(), Some(Unit::Point));

        let spacing = key("段落.行间距.multiple");
        assert_eq!(spacing.category_kind(), Category::Paragraph);
        assert_eq!(spacing.known_unit(), Some(Unit::Multiple));

        assert_eq!(key("编号.级别.level").category_kind(), Category::Numbering);
        assert_eq!(key("大纲.级别.level").category_kind(), Category::Structure);
        assert!(key("字体.颜色.hex").is_color());
    }

    #[test]
    fn attribute_key_serializes_as_dotted_string() {
        let json = serde_json::to_string(&key("段落.首行缩进.pt")).unwrap();
        assert_eq!(json, "\"段落.首行缩进.pt\"");
        let back: AttributeKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key("段落.首行缩进.pt"));
        assert!(serde_json::from_str::<AttributeKey>("\"bogus\"").is_err());
    }

    #[test]
    fn dominant_run_value_weights_by_text_length() {
        let size = key("字体.大小.pt");
        let mut paragraph = ExtractedParagraph::new(0, "mixed runs");
        for (text, value) in [("ab", 10.5), ("abcdef", 12.0), ("abc", 10.5)] {
            let mut attributes = BTreeMap::new();
            attributes.insert(size.clone(), AttributeValue::Number(value));
            paragraph.runs.push(RunAttributes {
                text: text.to_string(),
                attributes,
            });
        }
        assert_eq!(paragraph.attribute(&size), Some(AttributeValue::Number(12.0)));

        // Paragraph-level value wins over runs
        let paragraph = paragraph.with_attribute("字体.大小.pt", 14.0);
        assert_eq!(paragraph.attribute(&size), Some(AttributeValue::Number(14.0)));
    }

    #[test]
    fn non_font_keys_do_not_fall_back_to_runs() {
        let indent = key("段落.首行缩进.pt");
        let mut paragraph = ExtractedParagraph::new(0, "text");
        let mut attributes = BTreeMap::new();
        attributes.insert(indent.clone(), AttributeValue::Number(24.0));
        paragraph.runs.push(RunAttributes {
            text: "text".to_string(),
            attributes,
        });
        assert_eq!(paragraph.attribute(&indent), None);
    }

    #[test]
    fn document_accepts_bare_and_wrapped_shapes() {
        let bare = r#"[{"index": 0, "text": "a"}, {"index": 1, "text": "b"}]"#;
        let wrapped = r#"{"source": "thesis.docx", "paragraphs": [{"index": 0, "text": "a"}]}"#;
        assert_eq!(ExtractedDocument::from_json_str(bare).unwrap().paragraphs.len(), 2);
        let document = ExtractedDocument::from_json_str(wrapped).unwrap();
        assert_eq!(document.source.as_deref(), Some("thesis.docx"));
    }

    #[test]
    fn heading_level_ignores_body_outline_level() {
        let heading = ExtractedParagraph::new(0, "1 Intro").with_outline_level(1);
        let body = ExtractedParagraph::new(1, "text").with_outline_level(9);
        assert_eq!(heading.heading_level(), Some(1));
        assert_eq!(body.heading_level(), None);
    }
}
