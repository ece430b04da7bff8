// Maps free-form labels (external classifier output, declared document style
// names) back onto canonical template roles.

use crate::template::Template;
use tracing::debug;

/// Canonical comparison form of a label.
///
/// Trims, strips quotes and brackets, folds full-width ASCII to half-width,
/// lowercases, drops whitespace and separators, and writes a trailing Chinese
/// numeral as a digit so `标题一`, `标题 1` and `“标题1”` compare equal.
pub fn normalize_label(raw: &str) -> String {
    let mut folded: String = raw
        .chars()
        .map(fold_width)
        .filter(|c| !c.is_whitespace() && !matches!(c, '_' | '-' | '·'))
        .filter(|c| !is_quote(*c))
        .flat_map(char::to_lowercase)
        .collect();

    if let Some(last) = folded.chars().last() {
        if let Some(digit) = chinese_digit(last) {
            let head_len = folded.len() - last.len_utf8();
            let preceded_by_numeral = folded[..head_len]
                .chars()
                .last()
                .is_some_and(|c| chinese_digit(c).is_some() || c == '十');
            if !preceded_by_numeral && head_len > 0 {
                folded.truncate(head_len);
                folded.push(digit);
            }
        }
    }
    folded
}

fn fold_width(c: char) -> char {
    match c {
        '\u{3000}' => ' ',
        '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
        _ => c,
    }
}

fn is_quote(c: char) -> bool {
    matches!(
        c,
        '"' | '\'' | '`' | '“' | '”' | '‘' | '’' | '「' | '」' | '『' | '』' | '【' | '】' | '《' | '》'
    )
}

fn chinese_digit(c: char) -> Option<char> {
    let digit = match c {
        '一' => '1',
        '二' => '2',
        '三' => '3',
        '四' => '4',
        '五' => '5',
        '六' => '6',
        '七' => '7',
        '八' => '8',
        '九' => '9',
        _ => return None,
    };
    Some(digit)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Exact(String),
    Fuzzy { role: String, similarity: f64 },
    /// No role cleared the similarity floor, or two roles tied for the top
    Unresolved { best: Option<(String, f64)> },
}

impl Resolution {
    pub fn role(&self) -> Option<&str> {
        match self {
            Resolution::Exact(role) | Resolution::Fuzzy { role, .. } => Some(role),
            Resolution::Unresolved { .. } => None,
        }
    }
}

/// Alias table built from role names and their synonyms
pub struct LabelResolver {
    aliases: Vec<(String, String)>,
    floor: f64,
}

impl LabelResolver {
    pub fn new(template: &Template, floor: f64) -> Self {
        let mut aliases = Vec::new();
        for (name, spec) in &template.roles {
            aliases.push((normalize_label(name), name.clone()));
            for synonym in &spec.synonyms {
                aliases.push((normalize_label(synonym), name.clone()));
            }
        }
        aliases.retain(|(alias, _)| !alias.is_empty());
        Self { aliases, floor }
    }

    /// Exact alias lookup only
    pub fn exact(&self, label: &str) -> Option<&str> {
        let normalized = normalize_label(label);
        self.aliases
            .iter()
            .find(|(alias, _)| *alias == normalized)
            .map(|(_, role)| role.as_str())
    }

    pub fn resolve(&self, label: &str) -> Resolution {
        let normalized = normalize_label(label);
        if normalized.is_empty() {
            return Resolution::Unresolved { best: None };
        }
        if let Some(role) = self.exact(label) {
            return Resolution::Exact(role.to_string());
        }

        // Best similarity per role; aliases are grouped by role in insertion order
        let mut per_role: Vec<(&str, f64)> = Vec::new();
        for (alias, role) in &self.aliases {
            let similarity = strsim::normalized_levenshtein(&normalized, alias);
            match per_role.iter_mut().find(|(seen, _)| *seen == role) {
                Some(entry) => entry.1 = entry.1.max(similarity),
                None => per_role.push((role, similarity)),
            }
        }
        per_role.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let Some(&(best_role, best)) = per_role.first() else {
            return Resolution::Unresolved { best: None };
        };
        let best_pair = Some((best_role.to_string(), best));

        if best <= self.floor {
            debug!(label, best_role, similarity = best, "label below similarity floor");
            return Resolution::Unresolved { best: best_pair };
        }
        if let Some(&(_, runner_up)) = per_role.get(1) {
            if (best - runner_up).abs() < 1e-12 {
                debug!(label, "label ties between roles");
                return Resolution::Unresolved { best: best_pair };
            }
        }
        Resolution::Fuzzy {
            role: best_role.to_string(),
            similarity: best,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Template;

    fn template() -> Template {
        Template::from_json_str(
            r#"{
                "id": "thesis",
                "roles": {
                    "标题1": { "synonyms": ["Heading 1", "一级标题"] },
                    "标题2": { "synonyms": ["Heading 2"] },
                    "正文": { "synonyms": ["Body Text", "Normal"] }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn normalizes_width_quotes_and_numerals() {
        assert_eq!(normalize_label("“标题一”"), "标题1");
        assert_eq!(normalize_label(" Heading　1 "), "heading1");
        assert_eq!(normalize_label("ＢＯＤＹ_Text"), "bodytext");
        // A numeral inside a number word stays as written
        assert_eq!(normalize_label("第十一"), "第十一");
    }

    #[test]
    fn resolves_exact_synonyms() {
        let resolver = LabelResolver::new(&template(), 0.75);
        assert_eq!(resolver.resolve("标题一"), Resolution::Exact("标题1".to_string()));
        assert_eq!(resolver.resolve("normal"), Resolution::Exact("正文".to_string()));
    }

    #[test]
    fn resolves_near_misses_above_floor() {
        let resolver = LabelResolver::new(&template(), 0.75);
        let resolution = resolver.resolve("Body Txt");
        assert_eq!(resolution.role(), Some("正文"));
        assert!(matches!(resolution, Resolution::Fuzzy { .. }));
    }

    #[test]
    fn unrelated_labels_stay_unresolved() {
        let resolver = LabelResolver::new(&template(), 0.75);
        assert!(resolver.resolve("Bibliography").role().is_none());
        assert!(resolver.resolve("   ").role().is_none());
    }

    #[test]
    fn ties_between_roles_are_unresolved() {
        let resolver = LabelResolver::new(&template(), 0.5);
        // "heading" is equally close to "heading1" and "heading2"
        assert!(resolver.resolve("Heading").role().is_none());
    }
}
