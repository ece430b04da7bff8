use crate::classifier::external::{
    build_prompt, parse_response, ClassificationRequest, ExternalClassifier, LabelGuess,
};
use crate::config::ExternalClassifierConfig;
use crate::error::{ClassificationUnavailable, ConfigError};
use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;
use tracing::{debug, info, warn};

/// OpenAI-compatible chat-completions backend over blocking HTTP
pub struct HttpClassifier {
    agent: ureq::Agent,
    url: String,
    api_key: String,
    config: ExternalClassifierConfig,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

enum Attempt {
    Done(String),
    Retryable(ClassificationUnavailable),
    Fatal(ClassificationUnavailable),
}

impl HttpClassifier {
    pub fn new(config: ExternalClassifierConfig) -> Result<Self, ConfigError> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            ConfigError::invalid("external_classifier.api_key", "no usable API key")
        })?;
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        let url = format!("{}/chat/completions", config.endpoint.trim_end_matches('/'));
        Ok(Self {
            agent,
            url,
            api_key,
            config,
        })
    }

    fn attempt(&self, body: &ChatCompletionRequest<'_>) -> Attempt {
        let response = self
            .agent
            .post(&self.url)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(body);

        match response {
            Ok(response) => match response.into_json::<ChatCompletionResponse>() {
                Ok(parsed) => match parsed.choices.into_iter().next().and_then(|c| c.message.content) {
                    Some(content) => Attempt::Done(content),
                    None => Attempt::Fatal(ClassificationUnavailable::MalformedResponse(
                        "response has no message content".to_string(),
                    )),
                },
                Err(e) => Attempt::Fatal(ClassificationUnavailable::MalformedResponse(e.to_string())),
            },
            Err(ureq::Error::Status(code, _)) if code == 429 || code >= 500 => {
                Attempt::Retryable(ClassificationUnavailable::Transport(format!("HTTP {code}")))
            }
            Err(ureq::Error::Status(code, _)) => {
                Attempt::Fatal(ClassificationUnavailable::Transport(format!("HTTP {code}")))
            }
            Err(ureq::Error::Transport(transport)) => {
                if is_timeout(&transport) {
                    Attempt::Fatal(ClassificationUnavailable::Timeout(self.config.timeout_secs))
                } else {
                    Attempt::Retryable(ClassificationUnavailable::Transport(transport.to_string()))
                }
            }
        }
    }
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    std::error::Error::source(transport)
        .and_then(|source| source.downcast_ref::<io::Error>())
        .is_some_and(|e| matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock))
}

impl ExternalClassifier for HttpClassifier {
    fn name(&self) -> &str {
        self.config.provider.as_deref().unwrap_or("http")
    }

    fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<Vec<LabelGuess>, ClassificationUnavailable> {
        let (system, user) = build_prompt(request, self.config.response_format);
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
        };

        info!(
            backend = self.name(),
            items = request.items.len(),
            "requesting external classification"
        );
        let mut attempts_left = self.config.max_retries + 1;
        loop {
            attempts_left -= 1;
            match self.attempt(&body) {
                Attempt::Done(content) => {
                    debug!(chars = content.len(), "classifier answered");
                    return parse_response(&content, self.config.response_format);
                }
                Attempt::Retryable(error) if attempts_left > 0 => {
                    warn!(%error, "transient classifier failure, retrying once");
                }
                Attempt::Retryable(error) | Attempt::Fatal(error) => return Err(error),
            }
        }
    }
}
