// External text-understanding classifier: capability trait, no-op backend,
// prompt construction and response parsing shared by concrete backends.

use crate::config::ResponseFormat;
use crate::error::ClassificationUnavailable;
use crate::types::Locator;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Paragraph texts sent to the classifier are cut to this many characters
pub const MAX_ITEM_CHARS: usize = 200;

/// One paragraph the heuristic pass could not settle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationItem {
    pub locator: Locator,
    pub text: String,
    pub outline_level: Option<u8>,
    pub preceding_heading: Option<String>,
    /// Leading heuristic candidate, offered as a hint
    pub suggestion: Option<String>,
}

/// Single batched request per document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationRequest {
    pub template_id: String,
    pub roles: Vec<String>,
    pub items: Vec<ClassificationItem>,
}

/// Free-form label returned for one paragraph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelGuess {
    pub locator: Locator,
    pub label: String,
}

/// Capability seam for the fallback pass. Implementations must be safe to share
/// between concurrent checks.
pub trait ExternalClassifier: Send + Sync {
    fn name(&self) -> &str;

    fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<Vec<LabelGuess>, ClassificationUnavailable>;
}

/// Used when no classifier is configured; every request is unavailable
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopClassifier;

impl ExternalClassifier for NoopClassifier {
    fn name(&self) -> &str {
        "noop"
    }

    fn classify(
        &self,
        _request: &ClassificationRequest,
    ) -> Result<Vec<LabelGuess>, ClassificationUnavailable> {
        Err(ClassificationUnavailable::NotConfigured)
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(max).collect();
        format!("{head}...")
    }
}

/// System and user prompts for a chat-completions style backend
pub fn build_prompt(request: &ClassificationRequest, format: ResponseFormat) -> (String, String) {
    let answer_shape = match format {
        ResponseFormat::Lines => {
            "Answer with one line per paragraph in the form `index,style` and nothing else."
        }
        ResponseFormat::Json => {
            "Answer with JSON only: {\"assignments\": [{\"index\": <index>, \"label\": \"<style>\"}]}."
        }
    };
    let system = format!(
        "You assign document paragraphs to style roles of the template `{}`. \
         Valid roles: {}. Use exactly one role name per paragraph. {answer_shape}",
        request.template_id,
        request.roles.join(", ")
    );

    let mut user = String::new();
    for item in &request.items {
        user.push_str(&format!("[{}]", item.locator.0));
        if let Some(level) = item.outline_level {
            user.push_str(&format!(" outline={level}"));
        }
        if let Some(heading) = &item.preceding_heading {
            user.push_str(&format!(" after=\"{}\"", truncate_chars(heading, 40)));
        }
        if let Some(suggestion) = &item.suggestion {
            user.push_str(&format!(" hint={suggestion}"));
        }
        user.push_str(": ");
        user.push_str(&truncate_chars(&item.text, MAX_ITEM_CHARS).replace('\n', " "));
        user.push('\n');
    }
    (system, user)
}

fn strip_code_fences(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses `index,label` lines. Malformed lines are skipped with a warning; a
/// response with no usable line at all is malformed.
pub fn parse_line_response(raw: &str) -> Result<Vec<LabelGuess>, ClassificationUnavailable> {
    let mut guesses = Vec::new();
    for line in strip_code_fences(raw).lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parsed = line
            .split_once([',', '，'])
            .and_then(|(index, label)| {
                let index = index.trim().trim_start_matches('[').trim_end_matches(']');
                let label = label.trim();
                Some((index.parse::<usize>().ok()?, label))
            })
            .filter(|(_, label)| !label.is_empty());
        match parsed {
            Some((index, label)) => guesses.push(LabelGuess {
                locator: Locator(index),
                label: label.to_string(),
            }),
            None => warn!(line, "skipping malformed classifier line"),
        }
    }
    if guesses.is_empty() {
        return Err(ClassificationUnavailable::MalformedResponse(
            "no `index,label` lines in response".to_string(),
        ));
    }
    Ok(guesses)
}

#[derive(Debug, Deserialize)]
struct JsonAnswer {
    assignments: Vec<JsonAssignment>,
}

#[derive(Debug, Deserialize)]
struct JsonAssignment {
    index: usize,
    label: String,
}

pub fn parse_json_response(raw: &str) -> Result<Vec<LabelGuess>, ClassificationUnavailable> {
    let body = strip_code_fences(raw);
    let answer: JsonAnswer = serde_json::from_str(body.trim())
        .map_err(|e| ClassificationUnavailable::MalformedResponse(e.to_string()))?;
    Ok(answer
        .assignments
        .into_iter()
        .map(|a| LabelGuess {
            locator: Locator(a.index),
            label: a.label,
        })
        .collect())
}

pub fn parse_response(
    raw: &str,
    format: ResponseFormat,
) -> Result<Vec<LabelGuess>, ClassificationUnavailable> {
    match format {
        ResponseFormat::Lines => parse_line_response(raw),
        ResponseFormat::Json => parse_json_response(raw),
    }
}
