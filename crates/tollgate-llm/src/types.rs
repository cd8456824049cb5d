//! Upstream payload and chat-completion wire format

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request sent to an OpenAI-compatible `/chat/completions` endpoint
///
/// A batched call carries one user message per member; the upstream replies
/// with one choice per message, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamPayload {
    /// Model identifier
    pub model: String,
    /// One message per prompt
    pub messages: Vec<ChatMessage>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Provider routing preferences forwarded to the aggregator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Value>,
}

impl UpstreamPayload {
    /// Payload carrying a single prompt
    pub fn single(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::batch(model, [prompt.into()])
    }

    /// Payload carrying one user message per prompt
    pub fn batch(model: impl Into<String>, prompts: impl IntoIterator<Item = String>) -> Self {
        Self {
            model: model.into(),
            messages: prompts.into_iter().map(ChatMessage::user).collect(),
            max_tokens: None,
            provider: None,
        }
    }

    /// Attach provider preferences, skipping empty tables
    #[must_use]
    pub fn with_provider(mut self, provider: Option<Value>) -> Self {
        self.provider = provider.filter(|v| v.as_object().is_none_or(|o| !o.is_empty()));
        self
    }
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_owned(),
            content: content.into(),
        }
    }
}

/// Parsed upstream reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamReply {
    /// Choice texts in index order
    pub choices: Vec<String>,
    /// Prompt tokens reported by the upstream, if any
    pub input_tokens: Option<usize>,
    /// Completion tokens reported by the upstream, if any
    pub output_tokens: Option<usize>,
}

impl From<ChatCompletionResponse> for UpstreamReply {
    fn from(mut response: ChatCompletionResponse) -> Self {
        response.choices.sort_by_key(|c| c.index);
        Self {
            choices: response
                .choices
                .into_iter()
                .map(|c| c.message.content.unwrap_or_default())
                .collect(),
            input_tokens: response.usage.as_ref().map(|u| u.prompt_tokens),
            output_tokens: response.usage.as_ref().map(|u| u.completion_tokens),
        }
    }
}

// -- Wire response types --

/// `/chat/completions` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub choices: Vec<ChatChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub index: usize,
    pub message: ChatChoiceMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoiceMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: usize,
    #[serde(default)]
    pub completion_tokens: usize,
}
