//! Chat-model content generator
//!
//! Asks a hosted language model for one episode as timeline JSON. The wire
//! format differs per vendor, so each request/response shape is a
//! [`ChatDialect`]; the generator itself only builds the prompt and parses the
//! reply.

use super::{ContentGenerator, GenerateRequest};
use crate::error::{Error, Result};
use airwave_common::config::{GeneratorConfig, GeneratorDialect};
use airwave_common::Timeline;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = r#"You are the director of a music radio show.
Reply with ONE JSON object and nothing else:
{"title": string, "estimatedDurationSec": number, "blocks": [Block]}
Block is one of:
{"type":"talk","id":string,"scripts":[{"speaker":string,"text":string,"mood":string?,"pauseMs":number?}],"backgroundMusic":{"action":"duck"|"pause"|"continue","volume":number?}?}
{"type":"music","id":string,"searchQuery":string,"durationSec":number?,"intro":{"speaker":string,"text":string}?}
{"type":"musicControl","id":string,"action":"pause"|"resume"|"fadeIn"|"fadeOut"|"stop","targetVolume":number?,"fadeDurationMs":number?}
{"type":"silence","id":string,"durationMs":number}
Alternate talk and music. Search queries name real songs as "artist title"."#;

/// One vendor's chat request/response shape
pub trait ChatDialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// Build the HTTP request for a system + user prompt pair
    fn request(
        &self,
        client: &reqwest::Client,
        config: &GeneratorConfig,
        api_key: &str,
        system: &str,
        user: &str,
    ) -> reqwest::RequestBuilder;

    /// Pull the model's text out of the response body
    fn extract_text(&self, body: &Value) -> Option<String>;
}

/// `/chat/completions` as served by OpenAI and compatible gateways
pub struct OpenAiDialect;

impl ChatDialect for OpenAiDialect {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn request(
        &self,
        client: &reqwest::Client,
        config: &GeneratorConfig,
        api_key: &str,
        system: &str,
        user: &str,
    ) -> reqwest::RequestBuilder {
        let url = format!("{}/chat/completions", config.endpoint.trim_end_matches('/'));
        client.post(url).bearer_auth(api_key).json(&json!({
            "model": config.model,
            "temperature": config.temperature,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        }))
    }

    fn extract_text(&self, body: &Value) -> Option<String> {
        body.pointer("/choices/0/message/content")?
            .as_str()
            .map(str::to_string)
    }
}

/// `models/{model}:generateContent`
pub struct GeminiDialect;

impl ChatDialect for GeminiDialect {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn request(
        &self,
        client: &reqwest::Client,
        config: &GeneratorConfig,
        api_key: &str,
        system: &str,
        user: &str,
    ) -> reqwest::RequestBuilder {
        let url = format!(
            "{}/models/{}:generateContent",
            config.endpoint.trim_end_matches('/'),
            config.model
        );
        client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&json!({
                "systemInstruction": {"parts": [{"text": system}]},
                "contents": [{"role": "user", "parts": [{"text": user}]}],
                "generationConfig": {
                    "temperature": config.temperature,
                    "responseMimeType": "application/json",
                },
            }))
    }

    fn extract_text(&self, body: &Value) -> Option<String> {
        let parts = body.pointer("/candidates/0/content/parts")?.as_array()?;
        let text: String = parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect();
        (!text.is_empty()).then_some(text)
    }
}

/// Pick the dialect named in config; `None` for non-HTTP generators
pub fn dialect_for(dialect: GeneratorDialect) -> Option<Box<dyn ChatDialect>> {
    match dialect {
        GeneratorDialect::OpenAi => Some(Box::new(OpenAiDialect)),
        GeneratorDialect::Gemini => Some(Box::new(GeminiDialect)),
        GeneratorDialect::Scripted => None,
    }
}

/// Content generator backed by a hosted chat model
pub struct LlmGenerator {
    http_client: reqwest::Client,
    dialect: Box<dyn ChatDialect>,
    config: GeneratorConfig,
    api_key: String,
}

impl LlmGenerator {
    pub fn new(config: GeneratorConfig, dialect: Box<dyn ChatDialect>, api_key: String) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_sec))
            .build()?;

        Ok(Self {
            http_client,
            dialect,
            config,
            api_key,
        })
    }

    /// Build from config, reading the key from `config.api_key_env`
    pub fn from_config(config: GeneratorConfig) -> Result<Self> {
        let dialect = dialect_for(config.dialect)
            .ok_or_else(|| Error::Config("scripted dialect has no HTTP endpoint".to_string()))?;
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| Error::Config(format!("environment variable {} is not set", config.api_key_env)))?;
        Self::new(config, dialect, api_key)
    }
}

fn user_prompt(request: &GenerateRequest) -> String {
    let mut prompt = format!(
        "Plan the next episode, about {} minutes long.",
        (request.duration_sec / 60).max(1)
    );
    if let Some(theme) = &request.theme {
        prompt.push_str(&format!(" Theme: {}.", theme));
    }
    if let Some(user_request) = &request.user_request {
        prompt.push_str(&format!(" A listener asked: \"{}\". Honor it.", user_request));
    }
    prompt
}

/// Cut the JSON object out of a model reply (code fences, chatter)
pub fn extract_json(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

#[async_trait]
impl ContentGenerator for LlmGenerator {
    async fn generate(&self, request: GenerateRequest) -> Result<Timeline> {
        let user = user_prompt(&request);
        debug!(dialect = self.dialect.name(), model = %self.config.model, "Requesting timeline");

        let response = self
            .dialect
            .request(&self.http_client, &self.config, &self.api_key, SYSTEM_PROMPT, &user)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Model request failed");
            return Err(Error::Generation(format!("model returned {}: {}", status.as_u16(), error_text)));
        }

        let body: Value = response.json().await?;
        let text = self
            .dialect
            .extract_text(&body)
            .ok_or_else(|| Error::Generation("model reply has no text".to_string()))?;
        let json = extract_json(&text)
            .ok_or_else(|| Error::Generation("model reply has no JSON object".to_string()))?;

        let timeline = Timeline::from_json(json).map_err(|e| Error::InvalidTimeline(e.to_string()))?;
        info!(title = %timeline.title, blocks = timeline.len(), "Model produced timeline");
        Ok(timeline)
    }

    fn name(&self) -> &str {
        self.dialect.name()
    }
}
