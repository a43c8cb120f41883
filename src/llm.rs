//! Chat-completion clients.
//!
//! [`ChatClient`] is the seam between crawlrag and the LLM. [`OpenAiChat`]
//! talks to any OpenAI-compatible `/chat/completions` endpoint using the
//! shared retry policy in [`crate::http`]; [`DisabledChat`] fails every call.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::LlmConfig;
use crate::http::{build_client, post_json_with_retry, RetryPolicy};

pub const TITLE_FALLBACK: &str = "Error processing title";
pub const SUMMARY_FALLBACK: &str = "Error processing summary";

/// Characters of a chunk sent when asking for a title and summary.
const TITLE_CONTEXT_CHARS: usize = 1000;

const TITLE_SUMMARY_PROMPT: &str = "You are an AI that extracts titles and summaries from documentation chunks.
Return a JSON object with 'title' and 'summary' keys.
For the title: If this seems like the start of a document, extract its title. If it's a middle chunk, derive a descriptive title.
For the summary: Create a concise summary of the main points in this chunk.
Keep both title and summary concise but informative.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    fn model_name(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }

    /// Send `messages` and return the assistant's reply. With `json_mode`
    /// the model is asked for a JSON object.
    async fn complete(&self, messages: &[ChatMessage], json_mode: bool) -> Result<String>;
}

pub struct DisabledChat;

#[async_trait]
impl ChatClient for DisabledChat {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn complete(&self, _messages: &[ChatMessage], _json_mode: bool) -> Result<String> {
        bail!("LLM is disabled (set llm.provider = \"openai\")")
    }
}

pub struct OpenAiChat {
    model: String,
    temperature: f32,
    api_key: String,
    endpoint: String,
    policy: RetryPolicy,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = match &config.api_key {
            Some(k) => k.clone(),
            None => bail!("OPENAI_API_KEY environment variable not set"),
        };

        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            policy: RetryPolicy::new(config.max_retries),
            client: build_client(config.timeout_secs, concat!("crawlrag/", env!("CARGO_PKG_VERSION")))?,
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl ChatClient for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage], json_mode: bool) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });
        if json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }

        let json = post_json_with_retry(
            &self.client,
            &self.endpoint,
            &self.api_key,
            &body,
            self.policy,
            "OpenAI chat",
        )
        .await?;

        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
    }
}

pub fn create_chat(config: &LlmConfig) -> Result<Box<dyn ChatClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledChat)),
        "openai" => Ok(Box::new(OpenAiChat::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct TitleSummary {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
}

impl TitleSummary {
    fn fallback() -> Self {
        Self {
            title: TITLE_FALLBACK.to_string(),
            summary: SUMMARY_FALLBACK.to_string(),
        }
    }
}

/// Ask the LLM for a title and summary of `chunk`.
///
/// Never fails. Any error or unparsable reply yields the fallback strings;
/// keys missing from a valid reply come back empty.
pub async fn title_and_summary(chat: &dyn ChatClient, chunk: &str, url: &str) -> TitleSummary {
    if !chat.is_enabled() {
        return TitleSummary::fallback();
    }

    let head: String = chunk.chars().take(TITLE_CONTEXT_CHARS).collect();
    let messages = [
        ChatMessage::system(TITLE_SUMMARY_PROMPT),
        ChatMessage::user(format!("URL: {}\n\nContent:\n{}...", url, head)),
    ];

    match chat.complete(&messages, true).await {
        Ok(reply) => match serde_json::from_str::<TitleSummary>(&reply) {
            Ok(ts) => ts,
            Err(e) => {
                warn!(url, error = %e, "Unparsable title/summary reply");
                TitleSummary::fallback()
            }
        },
        Err(e) => {
            warn!(url, error = %e, "Error getting title and summary");
            TitleSummary::fallback()
        }
    }
}
