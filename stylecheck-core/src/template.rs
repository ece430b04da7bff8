use crate::classifier::resolver::normalize_label;
use crate::error::ConfigError;
use crate::types::{AttributeKey, AttributeValue};
use crate::units::{self, Quantity, Unit};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TemplateMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Where in the document a role is expected to appear, relative to the body anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    #[default]
    Any,
    FrontMatter,
    Body,
}

/// Structural hints for the heuristic classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RoleHints {
    /// Expected outline level (1-8 heading, 9 body text)
    #[serde(default)]
    pub outline_level: Option<u8>,
    #[serde(default)]
    pub bold: Option<bool>,
    #[serde(default)]
    pub numbered: Option<bool>,
    /// Must immediately follow a heading paragraph
    #[serde(default)]
    pub follows_heading: Option<bool>,
    #[serde(default)]
    pub placement: Placement,
    /// Regexes matched against paragraph text (captions, formulas)
    #[serde(default)]
    pub text_patterns: Vec<String>,
}

/// One canonical role and the formatting it requires
#[derive(Debug, Clone, Serialize)]
pub struct StyleSpec {
    pub role: String,
    pub attributes: BTreeMap<AttributeKey, AttributeValue>,
    pub hints: RoleHints,
    pub synonyms: Vec<String>,
    #[serde(skip)]
    patterns: Vec<Regex>,
}

impl StyleSpec {
    pub fn patterns(&self) -> &[Regex] {
        &self.patterns
    }

    pub fn matches_text(&self, text: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(text))
    }

    /// Declared font size in points, used by the heuristic size signal
    pub fn font_size_pt(&self) -> Option<f64> {
        self.attributes
            .iter()
            .find(|(key, _)| key.is_font_size() && key.known_unit() == Some(Unit::Point))
            .and_then(|(_, value)| value.as_number())
    }

    pub fn expects_bold(&self) -> Option<bool> {
        self.hints.bold.or_else(|| {
            self.attributes
                .iter()
                .find(|(key, _)| key.is_bold())
                .and_then(|(_, value)| value.as_bool())
        })
    }
}

/// Immutable template: identifier, metadata and role table
#[derive(Debug, Clone, Serialize)]
pub struct Template {
    pub id: String,
    pub metadata: TemplateMetadata,
    pub roles: BTreeMap<String, StyleSpec>,
}

// ===== RAW (ON-DISK) SHAPE =====

#[derive(Debug, Deserialize)]
struct RawTemplate {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    metadata: TemplateMetadata,
    roles: BTreeMap<String, RawRole>,
}

#[derive(Debug, Deserialize)]
struct RawRole {
    #[serde(default)]
    attributes: BTreeMap<String, RawValue>,
    #[serde(default)]
    hints: RoleHints,
    #[serde(default)]
    synonyms: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Bool(bool),
    Number(f64),
    Quantity { value: f64, unit: String },
    Text(String),
}

impl Template {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let parsed: RawTemplate = serde_json::from_str(raw)
            .map_err(|e| ConfigError::invalid("template", e.to_string()))?;
        Self::from_raw(parsed, None)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let parsed: RawTemplate = serde_yaml::from_str(raw)
            .map_err(|e| ConfigError::invalid("template", e.to_string()))?;
        Self::from_raw(parsed, None)
    }

    /// Loads a `.json`, `.yaml` or `.yml` template. The file stem is the id
    /// when the document does not declare one.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_error = |reason: String| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        };
        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );
        let parsed: RawTemplate = if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string()))?
        } else {
            serde_json::from_str(&content).map_err(|e| parse_error(e.to_string()))?
        };
        let fallback_id = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_string);
        Self::from_raw(parsed, fallback_id)
    }

    fn from_raw(raw: RawTemplate, fallback_id: Option<String>) -> Result<Self, ConfigError> {
        let id = raw
            .id
            .or(fallback_id)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ConfigError::invalid("id", "template has no identifier"))?;
        if raw.roles.is_empty() {
            return Err(ConfigError::invalid("roles", "template declares no roles"));
        }

        let mut roles = BTreeMap::new();
        let mut seen_aliases: BTreeMap<String, String> = BTreeMap::new();
        for (name, role) in raw.roles {
            let spec = normalize_role(&name, role)?;
            for alias in std::iter::once(&spec.role).chain(spec.synonyms.iter()) {
                let normalized = normalize_label(alias);
                if let Some(owner) = seen_aliases.get(&normalized) {
                    if *owner != name {
                        return Err(ConfigError::invalid(
                            format!("roles.{name}.synonyms"),
                            format!("`{alias}` is already an alias of role `{owner}`"),
                        ));
                    }
                }
                seen_aliases.insert(normalized, name.clone());
            }
            roles.insert(name, spec);
        }

        debug!(template = %id, roles = roles.len(), "template loaded");
        Ok(Self {
            id,
            metadata: raw.metadata,
            roles,
        })
    }

    pub fn role(&self, name: &str) -> Option<&StyleSpec> {
        self.roles.get(name)
    }

    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    pub fn display_name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or(&self.id)
    }
}

fn normalize_role(name: &str, raw: RawRole) -> Result<StyleSpec, ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::invalid("roles", "role names must not be empty"));
    }

    let mut keyed = Vec::with_capacity(raw.attributes.len());
    for (raw_key, value) in raw.attributes {
        let qualified = format!("roles.{name}.attributes.{raw_key}");
        let key: AttributeKey = raw_key
            .parse()
            .map_err(|_| ConfigError::invalid(&qualified, "not a dotted attribute key"))?;
        keyed.push((key, value, qualified));
    }

    // Character units resolve against the role's own font size, so convert it first
    let font_size_pt = keyed
        .iter()
        .find(|(key, _, _)| key.is_font_size() && key.known_unit() == Some(Unit::Point))
        .map(|(key, value, qualified)| normalize_value(key, value, None, qualified))
        .transpose()?
        .and_then(|value| value.as_number());

    let mut attributes = BTreeMap::new();
    for (key, value, qualified) in &keyed {
        let normalized = normalize_value(key, value, font_size_pt, qualified)?;
        if !normalized.is_finite() {
            return Err(ConfigError::invalid(qualified, "value must be finite"));
        }
        attributes.insert(key.clone(), normalized);
    }

    if let Some(level) = raw.hints.outline_level {
        if !(1..=9).contains(&level) {
            return Err(ConfigError::invalid(
                format!("roles.{name}.hints.outline_level"),
                format!("outline level must be within 1..=9, got {level}"),
            ));
        }
    }

    let mut patterns = Vec::with_capacity(raw.hints.text_patterns.len());
    for pattern in &raw.hints.text_patterns {
        let compiled = Regex::new(pattern).map_err(|e| {
            ConfigError::invalid(format!("roles.{name}.hints.text_patterns"), e.to_string())
        })?;
        patterns.push(compiled);
    }

    Ok(StyleSpec {
        role: name.to_string(),
        attributes,
        hints: raw.hints,
        synonyms: raw.synonyms,
        patterns,
    })
}

fn normalize_value(
    key: &AttributeKey,
    value: &RawValue,
    font_size_pt: Option<f64>,
    qualified: &str,
) -> Result<AttributeValue, ConfigError> {
    let quantity = match value {
        RawValue::Bool(b) => return Ok(AttributeValue::Bool(*b)),
        RawValue::Number(n) => return Ok(AttributeValue::Number(*n)),
        RawValue::Quantity { value, unit } => {
            let unit = Unit::parse(unit)
                .ok_or_else(|| ConfigError::invalid(qualified, format!("unknown unit `{unit}`")))?;
            Quantity {
                value: *value,
                unit: Some(unit),
            }
        }
        RawValue::Text(text) => match units::parse_quantity(text) {
            Some(quantity) => quantity,
            None if looks_numeric(text) && key.known_unit().is_some() => {
                return Err(ConfigError::invalid(
                    qualified,
                    format!("cannot read `{text}` as a quantity"),
                ));
            }
            None => return Ok(AttributeValue::Text(text.trim().to_string())),
        },
    };

    let Some(target) = key.known_unit() else {
        // Keys with an opaque unit keep the number as written
        return Ok(AttributeValue::Number(quantity.value));
    };
    units::convert(quantity, target, font_size_pt)
        .map(AttributeValue::Number)
        .map_err(|reason| ConfigError::invalid(qualified, reason))
}

fn looks_numeric(text: &str) -> bool {
    text.trim_start()
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '.')
}

// ===== TEMPLATE STORE =====

/// Listing entry for a stored template
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateSummary {
    pub id: String,
    pub name: Option<String>,
    pub organization: Option<String>,
    pub role_count: usize,
}

/// Supplies templates by identifier
pub trait TemplateStore {
    fn load(&self, id: &str) -> Result<Template, ConfigError>;
    fn list(&self) -> Result<Vec<TemplateSummary>, ConfigError>;
}

/// Directory of `<id>.json` / `<id>.yaml` template files
pub struct FileTemplateStore {
    root: PathBuf,
}

const TEMPLATE_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

impl FileTemplateStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, id: &str) -> Option<PathBuf> {
        TEMPLATE_EXTENSIONS
            .iter()
            .map(|ext| self.root.join(format!("{id}.{ext}")))
            .find(|path| path.is_file())
    }
}

impl TemplateStore for FileTemplateStore {
    fn load(&self, id: &str) -> Result<Template, ConfigError> {
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(ConfigError::invalid("template", format!("invalid template id `{id}`")));
        }
        let path = self
            .path_for(id)
            .ok_or_else(|| ConfigError::TemplateNotFound(id.to_string()))?;
        Template::load_from_file(path)
    }

    fn list(&self) -> Result<Vec<TemplateSummary>, ConfigError> {
        let entries = fs::read_dir(&self.root).map_err(|source| ConfigError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut summaries = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let is_template = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| TEMPLATE_EXTENSIONS.contains(&ext));
            if !path.is_file() || !is_template {
                continue;
            }
            match Template::load_from_file(&path) {
                Ok(template) => summaries.push(TemplateSummary {
                    id: template.id.clone(),
                    name: template.metadata.name.clone(),
                    organization: template.metadata.organization.clone(),
                    role_count: template.roles.len(),
                }),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable template"),
            }
        }
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(summaries)
    }
}
